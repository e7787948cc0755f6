use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// A session description as browsers serialize it: `{"type": "offer", "sdp": "v=0..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Answer, sdp: sdp.into() }
    }
}

/// Correlates a peer with the offer sent to it, or with the answer it sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptionEnvelope {
    pub id: PeerId,
    pub description: SessionDescription,
}

/// Body accepted on `/answer`. Older clients post the bare description with no id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AnswerBody {
    Envelope(SessionDescriptionEnvelope),
    Bare(SessionDescription),
}

impl AnswerBody {
    pub fn id(&self) -> Option<PeerId> {
        match self {
            AnswerBody::Envelope(envelope) => Some(envelope.id),
            AnswerBody::Bare(_) => None,
        }
    }

    pub fn into_description(self) -> SessionDescription {
        match self {
            AnswerBody::Envelope(envelope) => envelope.description,
            AnswerBody::Bare(description) => description,
        }
    }
}
