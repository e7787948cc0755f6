use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use bytes::Bytes;
use futures_util::future::join_all;
use ractor::{
    Actor, ActorProcessingErr, ActorRef, MessagingErr, RactorErr, RpcReplyPort, async_trait, call,
    concurrency::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    dispatch::{Delivery, Dispatcher},
    engine::{ChannelEvent, DataChannel, PeerConnection},
    models::{message::DataMessage, session::PeerId},
};

#[derive(derive_more::Debug)]
pub enum HubMsg {
    // a peer whose answer is being applied; the hub owns it from here on
    #[debug("Adopt({_0})")]
    Adopt(PeerId, Arc<dyn PeerConnection>, Arc<dyn DataChannel>),

    // events from channels
    Open(PeerId),
    Inbound(PeerId, Bytes),
    Closed(PeerId),

    // requests
    Broadcast(Bytes),
    Unicast(PeerId, Bytes),
    #[debug("Peers")]
    Peers(RpcReplyPort<Vec<PeerId>>),
}

struct PeerEntry {
    connection: Arc<dyn PeerConnection>,
    channel: Arc<dyn DataChannel>,
    open: bool,
}

impl PeerEntry {
    async fn close(&self, peer: PeerId) {
        if let Err(err) = self.channel.close().await {
            warn!("failed to close channel of peer {peer}: {err}");
        }
        if let Err(err) = self.connection.close().await {
            warn!("failed to close connection of peer {peer}: {err}");
        }
    }
}

pub struct HubState {
    peers: HashMap<PeerId, PeerEntry>,
    dispatcher: Box<dyn Dispatcher>,
}

impl HubState {
    fn open_channels(&self) -> impl Iterator<Item = (PeerId, &Arc<dyn DataChannel>)> {
        self.peers.iter()
            .filter(|(_, entry)| entry.open)
            .map(|(peer, entry)| (*peer, &entry.channel))
    }

    async fn broadcast(&self, data: &Bytes) {
        let sends: Vec<_> = self.open_channels()
            .map(|(peer, channel)| async move { (peer, channel.send(data).await) })
            .collect();
        debug!("broadcasting {} bytes to {} peers", data.len(), sends.len());
        for (peer, result) in join_all(sends).await {
            if let Err(err) = result {
                warn!("failed to send to peer {peer}: {err}");
            }
        }
    }

    async fn unicast(&self, peer: PeerId, data: &Bytes) {
        let Some(entry) = self.peers.get(&peer).filter(|entry| entry.open) else {
            warn!("no open channel for peer {peer}, dropping {} bytes", data.len());
            return;
        };
        if let Err(err) = entry.channel.send(data).await {
            warn!("failed to send to peer {peer}: {err}");
        }
    }

    async fn deliver(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            match delivery {
                Delivery::Broadcast(data) => self.broadcast(&data).await,
                Delivery::Unicast(peer, data) => self.unicast(peer, &data).await,
            }
        }
    }
}

// owns the registry; every mutation goes through its mailbox.
pub struct HubActor;

#[async_trait]
impl Actor for HubActor {
    type Msg = HubMsg;
    type State = HubState;
    type Arguments = Box<dyn Dispatcher>;

    async fn pre_start(
        &self,
        _: ActorRef<Self::Msg>,
        dispatcher: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        Ok(HubState { peers: HashMap::new(), dispatcher })
    }

    async fn handle(
        &self,
        _: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        debug!("received event: {message:?}");
        match message {
            HubMsg::Adopt(peer, connection, channel) => {
                // ids are never reused, so there is nothing to replace
                state.peers.insert(peer, PeerEntry { connection, channel, open: false });
            },
            HubMsg::Open(peer) => {
                let Some(entry) = state.peers.get_mut(&peer) else {
                    warn!("open event for unknown peer {peer}");
                    return Ok(());
                };
                if entry.open {
                    return Ok(());
                }
                entry.open = true;
                info!("channel '{}' ({}) of peer {peer} is open", entry.channel.label(), entry.channel.id());
                let deliveries = state.dispatcher.on_join(peer);
                state.deliver(deliveries).await;
            },
            HubMsg::Inbound(peer, data) => {
                let message = match DataMessage::from_bytes(&data) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!("dropping undecodable payload from peer {peer}: {err}");
                        return Ok(());
                    },
                };
                let deliveries = state.dispatcher.on_message(peer, message, data);
                state.deliver(deliveries).await;
            },
            HubMsg::Closed(peer) => {
                let Some(entry) = state.peers.remove(&peer) else {
                    return Ok(());
                };
                info!("peer {peer} is gone");
                entry.close(peer).await;
                if entry.open {
                    let deliveries = state.dispatcher.on_leave(peer);
                    state.deliver(deliveries).await;
                }
            },
            HubMsg::Broadcast(data) => state.broadcast(&data).await,
            HubMsg::Unicast(peer, data) => state.unicast(peer, &data).await,
            HubMsg::Peers(reply) => {
                let mut peers: Vec<_> = state.open_channels().map(|(peer, _)| peer).collect();
                peers.sort();
                if reply.send(peers).is_err() {
                    debug!("peers requester went away");
                }
            },
        };
        Ok(())
    }

    async fn post_stop(
        &self,
        _: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        info!("closing {} peers", state.peers.len());
        let closes = state.peers.drain().map(|(peer, entry)| async move { entry.close(peer).await });
        join_all(closes).await;
        Ok(())
    }
}

/// Cheap handle to the hub actor.
#[derive(Clone)]
pub struct Hub {
    actor: ActorRef<HubMsg>,
}

impl Hub {
    pub async fn spawn(dispatcher: Box<dyn Dispatcher>) -> Result<(Hub, JoinHandle<()>)> {
        let (actor, handle) = Actor::spawn(None, HubActor, dispatcher).await?;
        Ok((Hub { actor }, handle))
    }

    /// Hands a peer whose answer is about to be applied to the hub. The hub keeps the
    /// connection and channel until the channel closes or the connection fails, then
    /// closes both. Must happen before the answer is applied, so the open event cannot
    /// overtake it.
    pub fn adopt(
        &self,
        peer: PeerId,
        connection: Arc<dyn PeerConnection>,
        channel: Arc<dyn DataChannel>,
    ) -> Result<(), MessagingErr<HubMsg>> {
        let hub = self.clone();
        channel.on_event(Arc::new(move |event| {
            let result = match event {
                ChannelEvent::Open => hub.open(peer),
                ChannelEvent::Message(data) => hub.inbound(peer, data),
                ChannelEvent::Close => hub.unregister(peer),
            };
            if let Err(err) = result {
                error!("failed to forward channel event of peer {peer}: {err}");
            }
        }));
        let hub = self.clone();
        connection.on_terminated(Box::new(move || {
            if let Err(err) = hub.unregister(peer) {
                error!("failed to forward termination of peer {peer}: {err}");
            }
        }));
        self.actor.cast(HubMsg::Adopt(peer, connection, channel))
    }

    pub fn open(&self, peer: PeerId) -> Result<(), MessagingErr<HubMsg>> {
        self.actor.cast(HubMsg::Open(peer))
    }

    pub fn inbound(&self, peer: PeerId, data: Bytes) -> Result<(), MessagingErr<HubMsg>> {
        self.actor.cast(HubMsg::Inbound(peer, data))
    }

    /// Drops the peer and closes its connection.
    pub fn unregister(&self, peer: PeerId) -> Result<(), MessagingErr<HubMsg>> {
        self.actor.cast(HubMsg::Closed(peer))
    }

    pub fn broadcast(&self, data: Bytes) -> Result<(), MessagingErr<HubMsg>> {
        self.actor.cast(HubMsg::Broadcast(data))
    }

    pub fn unicast(&self, peer: PeerId, data: Bytes) -> Result<(), MessagingErr<HubMsg>> {
        self.actor.cast(HubMsg::Unicast(peer, data))
    }

    /// Peers with an open channel.
    pub async fn peers(&self) -> Result<Vec<PeerId>, RactorErr<HubMsg>> {
        call!(self.actor, HubMsg::Peers)
    }

    pub fn stop(&self) {
        self.actor.stop(Some("shutdown".to_string()));
    }
}
