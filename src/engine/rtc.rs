use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};
use webrtc::{
    api::{
        API, APIBuilder, interceptor_registry::register_default_interceptors, media_engine::MediaEngine,
        setting_engine::SettingEngine,
    },
    data_channel::{RTCDataChannel, data_channel_message::DataChannelMessage},
    ice_transport::{ice_candidate::RTCIceCandidate, ice_server::RTCIceServer},
    interceptor::registry::Registry,
    peer_connection::{
        RTCPeerConnection,
        configuration::RTCConfiguration,
        peer_connection_state::RTCPeerConnectionState,
        sdp::{sdp_type::RTCSdpType, session_description::RTCSessionDescription},
    },
};

use crate::models::{config::IceConfiguration, session::{SdpType, SessionDescription}};

use super::{CandidateSink, ChannelEvent, DataChannel, EventSink, PeerConnection, PeerEngine, TerminationSink};

pub struct WebRtcEngine {
    api: API,
}

impl WebRtcEngine {
    pub fn new() -> Result<Self> {
        Self::with_setting_engine(SettingEngine::default())
    }

    pub fn with_setting_engine(setting_engine: SettingEngine) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build();
        Ok(Self { api })
    }
}

#[async_trait]
impl PeerEngine for WebRtcEngine {
    async fn new_connection(&self, cfg: &IceConfiguration) -> Result<Arc<dyn PeerConnection>> {
        debug!("ice servers: {:?}", cfg.ice_servers);
        let ice_servers = cfg.ice_servers.iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();
        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };
        let pc = self.api.new_peer_connection(config).await?;
        Ok(Arc::new(WebRtcConnection { pc }))
    }
}

struct WebRtcConnection {
    pc: RTCPeerConnection,
}

#[async_trait]
impl PeerConnection for WebRtcConnection {
    async fn create_data_channel(&self, label: &str) -> Result<Arc<dyn DataChannel>> {
        let dc = self.pc.create_data_channel(label, None).await?;
        Ok(Arc::new(WebRtcChannel { dc }))
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        from_rtc(self.pc.create_offer(None).await?)
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        // wait for gathering so the description carries every candidate
        let mut gather = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(to_rtc(description)?).await?;
        let _ = gather.recv().await;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let description = self.pc.local_description().await?;
        from_rtc(description).ok()
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc(description)?).await?;
        Ok(())
    }

    fn on_ice_candidate(&self, sink: CandidateSink) {
        self.pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(candidate) = candidate {
                match candidate.to_json() {
                    Ok(init) => sink(init.candidate),
                    Err(err) => warn!("failed to serialize ice candidate: {err}"),
                }
            }
            Box::pin(async {})
        }));
    }

    fn on_terminated(&self, sink: TerminationSink) {
        self.pc.on_peer_connection_state_change(Box::new(move |state| {
            debug!("peer connection state: {state}");
            if let RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed = state {
                sink();
            }
            Box::pin(async {})
        }));
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}

struct WebRtcChannel {
    dc: Arc<RTCDataChannel>,
}

#[async_trait]
impl DataChannel for WebRtcChannel {
    fn label(&self) -> &str {
        self.dc.label()
    }

    fn id(&self) -> u16 {
        self.dc.id()
    }

    async fn send(&self, data: &Bytes) -> Result<()> {
        self.dc.send(data).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.dc.close().await?;
        Ok(())
    }

    fn on_event(&self, sink: EventSink) {
        let open = sink.clone();
        self.dc.on_open(Box::new(move || {
            open(ChannelEvent::Open);
            Box::pin(async {})
        }));
        let message = sink.clone();
        self.dc.on_message(Box::new(move |msg: DataChannelMessage| {
            message(ChannelEvent::Message(msg.data));
            Box::pin(async {})
        }));
        self.dc.on_close(Box::new(move || {
            sink(ChannelEvent::Close);
            Box::pin(async {})
        }));
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    let SessionDescription { sdp_type, sdp } = description;
    Ok(match sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp)?,
        SdpType::Rollback => Err(anyhow!("rollback descriptions are not supported"))?,
    })
}

fn from_rtc(description: RTCSessionDescription) -> Result<SessionDescription> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => Err(anyhow!("unspecified sdp type"))?,
    };
    Ok(SessionDescription { sdp_type, sdp: description.sdp })
}
