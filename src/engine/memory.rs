use std::sync::{
    Arc, Mutex, Weak,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;

use crate::models::{config::IceConfiguration, session::SessionDescription};

use super::{
    CandidateSink, ChannelEvent, DataChannel, EventSink, PeerConnection, PeerEngine, TerminationSink,
};

/// Offers are `O1`, `O2`, ... in creation order, so tests can tell connections apart.
///
/// Like webrtc-rs, the engine keeps no strong reference to the handles it gives out; tests
/// look at connections through their [`ConnectionRecord`] instead.
#[derive(Default)]
pub struct MemoryEngine {
    created: AtomicUsize,
    records: Mutex<Vec<Arc<ConnectionRecord>>>,
    pub fail_connection: AtomicBool,
    pub fail_channel: AtomicBool,
    pub fail_offer: AtomicBool,
    pub fail_remote: AtomicBool,
    pub slow_remote: AtomicBool,
}

impl MemoryEngine {
    pub fn connections(&self) -> Vec<Arc<ConnectionRecord>> {
        self.records.lock().unwrap().clone()
    }

    pub fn connection(&self, index: usize) -> Arc<ConnectionRecord> {
        self.connections()
            .into_iter()
            .find(|record| record.index == index)
            .unwrap()
    }
}

#[async_trait]
impl PeerEngine for MemoryEngine {
    async fn new_connection(&self, _: &IceConfiguration) -> Result<Arc<dyn PeerConnection>> {
        if self.fail_connection.load(Ordering::SeqCst) {
            bail!("connection refused by engine");
        }
        let index = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let record = Arc::new(ConnectionRecord {
            index,
            handle: Mutex::new(Weak::new()),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            channels: Mutex::new(Vec::new()),
            candidates: Mutex::new(None),
            terminated: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        let conn = Arc::new(MemoryConnection {
            record: record.clone(),
            fail_channel: self.fail_channel.load(Ordering::SeqCst),
            fail_offer: self.fail_offer.load(Ordering::SeqCst),
            fail_remote: self.fail_remote.load(Ordering::SeqCst),
            slow_remote: self.slow_remote.load(Ordering::SeqCst),
        });
        *record.handle.lock().unwrap() = Arc::downgrade(&conn);
        self.records.lock().unwrap().push(record);
        Ok(conn)
    }
}

/// Everything a test can observe about one connection without keeping it alive.
pub struct ConnectionRecord {
    pub index: usize,
    handle: Mutex<Weak<MemoryConnection>>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    channels: Mutex<Vec<Weak<MemoryChannel>>>,
    candidates: Mutex<Option<CandidateSink>>,
    terminated: Mutex<Option<TerminationSink>>,
    closed: AtomicBool,
}

impl ConnectionRecord {
    pub fn remote(&self) -> Option<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    /// The first data channel; panics once nobody holds it anymore.
    pub fn channel(&self) -> Arc<MemoryChannel> {
        self.channels.lock().unwrap()[0]
            .upgrade()
            .expect("data channel handle was dropped")
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether anything still holds the connection handle.
    pub fn is_owned(&self) -> bool {
        self.handle.lock().unwrap().upgrade().is_some()
    }

    pub fn gather(&self, candidate: &str) {
        if let Some(sink) = self.candidates.lock().unwrap().as_ref() {
            sink(candidate.to_string());
        }
    }

    /// Plays an ICE failure.
    pub fn fail(&self) {
        if let Some(sink) = self.terminated.lock().unwrap().as_ref() {
            sink();
        }
    }
}

pub struct MemoryConnection {
    record: Arc<ConnectionRecord>,
    fail_channel: bool,
    fail_offer: bool,
    fail_remote: bool,
    slow_remote: bool,
}

#[async_trait]
impl PeerConnection for MemoryConnection {
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        if self.fail_channel {
            bail!("data channel rejected");
        }
        let mut channels = self.record.channels.lock().unwrap();
        let channel = MemoryChannel::new(label, channels.len() as u16);
        channels.push(Arc::downgrade(&channel));
        Ok(channel)
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        if self.fail_offer {
            bail!("offer generation failed");
        }
        Ok(SessionDescription::offer(format!("O{}", self.record.index)))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        *self.record.local.lock().unwrap() = Some(description);
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.record.local.lock().unwrap().clone()
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        if self.slow_remote {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        if self.fail_remote {
            bail!("remote description rejected");
        }
        *self.record.remote.lock().unwrap() = Some(description);
        Ok(())
    }

    fn on_ice_candidate(&self, sink: CandidateSink) {
        *self.record.candidates.lock().unwrap() = Some(sink);
    }

    fn on_terminated(&self, sink: TerminationSink) {
        *self.record.terminated.lock().unwrap() = Some(sink);
    }

    async fn close(&self) -> Result<()> {
        self.record.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MemoryChannel {
    label: String,
    id: u16,
    sent: Mutex<Vec<Bytes>>,
    sink: Mutex<Option<EventSink>>,
    pub fail_send: AtomicBool,
    closed: AtomicBool,
}

impl MemoryChannel {
    pub fn new(label: &str, id: u16) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            id,
            sent: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            fail_send: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Plays the engine's part: delivers an event to whoever subscribed.
    pub fn fire(&self, event: ChannelEvent) {
        let sink = self.sink.lock().unwrap().clone();
        if let Some(sink) = sink {
            sink(event);
        }
    }
}

#[async_trait]
impl DataChannel for MemoryChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn id(&self) -> u16 {
        self.id
    }

    async fn send(&self, data: &Bytes) -> Result<()> {
        if self.fail_send.load(Ordering::SeqCst) || self.is_closed() {
            bail!("channel {} is closed", self.label);
        }
        self.sent.lock().unwrap().push(data.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn on_event(&self, sink: EventSink) {
        *self.sink.lock().unwrap() = Some(sink);
    }
}
