//! The peer-connection engine as the rest of the crate sees it.
//!
//! ICE, DTLS and SCTP live behind these traits. [`rtc::WebRtcEngine`] backs them with
//! webrtc-rs; tests use the in-memory engine instead.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::models::{config::IceConfiguration, session::SessionDescription};

#[cfg(test)]
pub mod memory;
pub mod rtc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(Bytes),
    Close,
}

/// Receives channel events on the engine's own tasks; must not block.
pub type EventSink = Arc<dyn Fn(ChannelEvent) + Send + Sync>;
pub type CandidateSink = Box<dyn Fn(String) + Send + Sync>;
/// Called once the connection has failed or was closed.
pub type TerminationSink = Box<dyn Fn() + Send + Sync>;

#[async_trait]
pub trait PeerEngine: Send + Sync {
    async fn new_connection(&self, config: &IceConfiguration) -> Result<Arc<dyn PeerConnection>>;
}

/// Wrappers returned here do not keep each other alive: whoever holds the
/// connection must hold its channels too.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>>;
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;
    async fn local_description(&self) -> Option<SessionDescription>;
    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;
    fn on_ice_candidate(&self, sink: CandidateSink);
    fn on_terminated(&self, sink: TerminationSink);
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;
    fn id(&self) -> u16;
    async fn send(&self, data: &Bytes) -> Result<()>;
    async fn close(&self) -> Result<()>;
    fn on_event(&self, sink: EventSink);
}
