use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::anyhow;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{
    actors::hub::Hub,
    engine::{PeerConnection, PeerEngine},
    error::SignalError,
    models::{
        config::IceConfiguration,
        session::{AnswerBody, PeerId, SessionDescriptionEnvelope},
    },
    rendezvous::{PendingPeer, Rendezvous},
};

/// Drives the offer/answer exchange and hands finished channels to the hub.
pub struct Signaling {
    engine: Arc<dyn PeerEngine>,
    rendezvous: Arc<Rendezvous>,
    hub: Hub,
    ice: IceConfiguration,
    next_id: AtomicU64,
}

impl Signaling {
    pub fn new(
        engine: Arc<dyn PeerEngine>,
        rendezvous: Arc<Rendezvous>,
        hub: Hub,
        ice: IceConfiguration,
    ) -> Self {
        Self { engine, rendezvous, hub, ice, next_id: AtomicU64::new(1) }
    }

    pub fn configuration(&self) -> &IceConfiguration {
        &self.ice
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub async fn request_new_peer(&self) -> Result<SessionDescriptionEnvelope, SignalError> {
        let id = PeerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        info!("creating peer {id}");
        let conn = self.engine.new_connection(&self.ice).await?;
        match self.offer(id, &conn).await {
            Ok(offer) => Ok(offer),
            Err(err) => {
                warn!("failed to set up peer {id}: {err}");
                close(id, conn.as_ref()).await;
                Err(err)
            },
        }
    }

    async fn offer(
        &self,
        id: PeerId,
        conn: &Arc<dyn PeerConnection>,
    ) -> Result<SessionDescriptionEnvelope, SignalError> {
        conn.on_ice_candidate(Box::new(move |candidate| {
            debug!("peer {id} candidate: {candidate}");
        }));
        let channel = conn.create_data_channel(&channel_label(id)).await?;

        let offer = conn.create_offer().await?;
        conn.set_local_description(offer.clone()).await?;
        // after gathering the local description carries the candidates as well
        let description = conn.local_description().await.unwrap_or(offer);
        let envelope = SessionDescriptionEnvelope { id, description };
        self.rendezvous.push(conn.clone(), channel, envelope.clone()).await?;
        Ok(envelope)
    }

    pub async fn submit_answer(&self, answer: AnswerBody) -> Result<(), SignalError> {
        let peer = self.rendezvous.take(answer.id()).await?;
        // detached, so a requester hanging up cannot drop the connection half applied
        let apply = tokio::spawn(apply_answer(self.hub.clone(), peer, answer));
        apply.await.map_err(anyhow::Error::from)?
    }

    /// Oldest offer nobody fetched yet, for clients that poll instead of reading the
    /// `/newpeer` response.
    pub async fn poll_offer(&self) -> Option<SessionDescriptionEnvelope> {
        self.rendezvous.poll_offer().await
    }

    pub async fn shutdown(&self) {
        self.rendezvous.drain().await;
        self.hub.stop();
    }
}

async fn apply_answer(hub: Hub, peer: PendingPeer, answer: AnswerBody) -> Result<(), SignalError> {
    let PendingPeer { id, connection, channel, .. } = peer;
    info!("applying answer to peer {id}");
    if hub.adopt(id, connection.clone(), channel).is_err() {
        close(id, connection.as_ref()).await;
        return Err(anyhow!("hub is not running").into());
    }
    if let Err(err) = connection.set_remote_description(answer.into_description()).await {
        warn!("peer {id} rejected the answer: {err}");
        if hub.unregister(id).is_err() {
            close(id, connection.as_ref()).await;
        }
        return Err(err.into());
    }
    Ok(())
}

async fn close(id: PeerId, connection: &dyn PeerConnection) {
    if let Err(err) = connection.close().await {
        warn!("failed to close peer {id}: {err}");
    }
}

pub fn channel_label(id: PeerId) -> String {
    format!("{:x}", Sha256::digest(format!("Channel{id}")))
}
