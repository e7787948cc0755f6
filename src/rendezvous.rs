//! Peers that were handed an offer and still wait for the answer.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, Notify},
    time::{Instant, interval, timeout},
};
use tracing::{info, warn};

use crate::{
    engine::{DataChannel, PeerConnection},
    error::SignalError,
    models::session::{PeerId, SessionDescriptionEnvelope},
};

/// How an incoming answer finds the connection it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Pairing {
    /// The k-th answer goes to the k-th offer, whatever id it carries. Only correct while
    /// clients answer one at a time and in order.
    Fifo,
    /// The answer goes to the connection whose id it carries.
    ById,
}

/// Owns the connection and its channel until the answer hands both to the hub.
#[derive(derive_more::Debug)]
pub struct PendingPeer {
    pub id: PeerId,
    #[debug(skip)]
    pub connection: Arc<dyn PeerConnection>,
    #[debug(skip)]
    pub channel: Arc<dyn DataChannel>,
    pub offer: SessionDescriptionEnvelope,
    issued_at: Instant,
    polled: bool,
}

pub struct Rendezvous {
    pairing: Pairing,
    capacity: usize,
    answer_timeout: Duration,
    pending: Mutex<VecDeque<PendingPeer>>,
    notify: Notify,
}

impl Rendezvous {
    pub fn new(pairing: Pairing, capacity: usize, answer_timeout: Duration) -> Self {
        Self {
            pairing,
            capacity,
            answer_timeout,
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
        }
    }

    pub fn pairing(&self) -> Pairing {
        self.pairing
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn push(
        &self,
        connection: Arc<dyn PeerConnection>,
        channel: Arc<dyn DataChannel>,
        offer: SessionDescriptionEnvelope,
    ) -> Result<(), SignalError> {
        let mut pending = self.pending.lock().await;
        if pending.len() >= self.capacity {
            return Err(SignalError::RendezvousFull(self.capacity));
        }
        pending.push_back(PendingPeer {
            id: offer.id,
            connection,
            channel,
            offer,
            issued_at: Instant::now(),
            polled: false,
        });
        drop(pending);
        self.notify.notify_one();
        Ok(())
    }

    /// Removes the peer an answer belongs to. In FIFO mode this waits (up to the answer
    /// timeout) for an offer to be issued; by id it fails at once when nothing matches.
    pub async fn take(&self, id: Option<PeerId>) -> Result<PendingPeer, SignalError> {
        match self.pairing {
            Pairing::Fifo => {
                let peer = timeout(self.answer_timeout, self.pop_oldest())
                    .await
                    .map_err(|_| SignalError::AnswerTimeout(self.answer_timeout))?;
                if let Some(id) = id {
                    if id != peer.id {
                        warn!("answer for peer {id} paired with peer {} by arrival order", peer.id);
                    }
                }
                Ok(peer)
            },
            Pairing::ById => {
                let id = id.ok_or(SignalError::MissingId)?;
                let mut pending = self.pending.lock().await;
                pending.iter()
                    .position(|peer| peer.id == id)
                    .and_then(|pos| pending.remove(pos))
                    .ok_or(SignalError::UnknownPeer(id))
            },
        }
    }

    async fn pop_oldest(&self) -> PendingPeer {
        loop {
            {
                let mut pending = self.pending.lock().await;
                if let Some(peer) = pending.pop_front() {
                    // a single stored permit may stand for several pushes
                    if !pending.is_empty() {
                        self.notify.notify_one();
                    }
                    return peer;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Hands out the oldest offer nobody polled for yet.
    pub async fn poll_offer(&self) -> Option<SessionDescriptionEnvelope> {
        let mut pending = self.pending.lock().await;
        let peer = pending.iter_mut().find(|peer| !peer.polled)?;
        peer.polled = true;
        Some(peer.offer.clone())
    }

    /// Drops and closes peers whose answer did not arrive within `max_age`.
    pub async fn expire(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let expired = {
            let mut pending = self.pending.lock().await;
            let mut kept = VecDeque::with_capacity(self.capacity);
            let mut expired = Vec::new();
            for peer in pending.drain(..) {
                if now.duration_since(peer.issued_at) >= max_age {
                    expired.push(peer);
                } else {
                    kept.push_back(peer);
                }
            }
            *pending = kept;
            expired
        };
        for peer in &expired {
            warn!("peer {} never answered, dropping it", peer.id);
            if let Err(err) = peer.connection.close().await {
                warn!("failed to close peer {}: {err}", peer.id);
            }
        }
        expired.len()
    }

    pub async fn drain(&self) {
        let drained: Vec<_> = self.pending.lock().await.drain(..).collect();
        for peer in drained {
            if let Err(err) = peer.connection.close().await {
                warn!("failed to close peer {}: {err}", peer.id);
            }
        }
    }

    /// Runs `expire` periodically until the rendezvous is dropped.
    pub fn start_sweeper(self: &Arc<Self>, max_age: Duration) {
        let this = Arc::downgrade(self);
        let period = (max_age / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                let Some(rendezvous) = this.upgrade() else {
                    break;
                };
                let expired = rendezvous.expire(max_age).await;
                if expired > 0 {
                    info!("expired {expired} pending peers");
                }
            }
        });
    }
}
