use std::time::Duration;

use thiserror::Error;

use crate::models::session::PeerId;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("engine error: {0}")]
    Engine(#[from] anyhow::Error),
    #[error("malformed signaling payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("forbidden")]
    Forbidden,
    #[error("no pending peer with id {0}")]
    UnknownPeer(PeerId),
    #[error("answer carries no peer id")]
    MissingId,
    #[error("pending peer limit of {0} reached")]
    RendezvousFull(usize),
    #[error("no pending peer within {0:?}")]
    AnswerTimeout(Duration),
}
