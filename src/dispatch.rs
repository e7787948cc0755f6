//! Policies deciding where an inbound payload goes. The hub only delivers.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::warn;

use crate::models::{
    message::{DataMessage, PlayerData, PlayerId},
    session::PeerId,
};

pub const CHANNEL_CONNECTED: &str = "connected";
pub const CHANNEL_DISCONNECTED: &str = "disconnected";
pub const CHANNEL_MOVE: &str = "move";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Broadcast(Bytes),
    Unicast(PeerId, Bytes),
}

/// Called from the hub's message loop, one event at a time.
pub trait Dispatcher: Send + Sync + 'static {
    fn on_join(&mut self, _peer: PeerId) -> Vec<Delivery> {
        Vec::new()
    }

    fn on_message(&mut self, peer: PeerId, message: DataMessage, raw: Bytes) -> Vec<Delivery>;

    fn on_leave(&mut self, _peer: PeerId) -> Vec<Delivery> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DispatchKind {
    Relay,
    Arena,
}

impl DispatchKind {
    pub fn build(self) -> Box<dyn Dispatcher> {
        match self {
            DispatchKind::Relay => Box::new(Relay),
            DispatchKind::Arena => Box::new(Arena::default()),
        }
    }
}

/// Echoes every payload, untouched, to every peer including the sender.
#[derive(Debug, Default)]
pub struct Relay;

impl Dispatcher for Relay {
    fn on_message(&mut self, _: PeerId, _: DataMessage, raw: Bytes) -> Vec<Delivery> {
        vec![Delivery::Broadcast(raw)]
    }
}

/// Tracks one position per player and keeps every peer informed of joins, moves and leaves.
#[derive(Debug, Default)]
pub struct Arena {
    players: HashMap<PlayerId, PlayerData>,
}

impl Arena {
    pub fn player(&self, id: PlayerId) -> Option<PlayerData> {
        self.players.get(&id).copied()
    }

    fn encode(player: PlayerId, channel: &str, data: &PlayerData) -> Option<Bytes> {
        let result = serde_json::to_vec(data)
            .and_then(|data| DataMessage::new(player, channel, data).to_bytes());
        match result {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(err) => {
                warn!("failed to encode {channel} for player {player}: {err}");
                None
            },
        }
    }
}

impl Dispatcher for Arena {
    fn on_join(&mut self, peer: PeerId) -> Vec<Delivery> {
        let mut deliveries: Vec<_> = self.players.iter()
            .filter_map(|(id, data)| Self::encode(*id, CHANNEL_CONNECTED, data))
            .map(|bytes| Delivery::Unicast(peer, bytes))
            .collect();
        let data = PlayerData::default();
        self.players.insert(peer.0, data);
        if let Some(bytes) = Self::encode(peer.0, CHANNEL_CONNECTED, &data) {
            deliveries.push(Delivery::Broadcast(bytes));
        }
        deliveries
    }

    fn on_message(&mut self, peer: PeerId, message: DataMessage, raw: Bytes) -> Vec<Delivery> {
        if message.channel != CHANNEL_MOVE {
            return vec![Delivery::Broadcast(raw)];
        }
        if message.player_id != peer.0 {
            warn!("peer {peer} tried to move player {}", message.player_id);
        }
        let data: PlayerData = match serde_json::from_slice(&message.data) {
            Ok(data) => data,
            Err(err) => {
                warn!("invalid move from peer {peer}: {err}");
                return Vec::new();
            },
        };
        self.players.insert(peer.0, data);
        Self::encode(peer.0, CHANNEL_MOVE, &data)
            .map(Delivery::Broadcast)
            .into_iter()
            .collect()
    }

    fn on_leave(&mut self, peer: PeerId) -> Vec<Delivery> {
        let Some(data) = self.players.remove(&peer.0) else {
            return Vec::new();
        };
        Self::encode(peer.0, CHANNEL_DISCONNECTED, &data)
            .map(Delivery::Broadcast)
            .into_iter()
            .collect()
    }
}
