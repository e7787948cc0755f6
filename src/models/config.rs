use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self { urls: vec![url.into()], username: None, credential: None }
    }
}

/// Served on `/rtcconfiguration` in the shape of a browser `RTCConfiguration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceConfiguration {
    pub ice_servers: Vec<IceServer>,
}

impl Default for IceConfiguration {
    fn default() -> Self {
        Self { ice_servers: vec![IceServer::new(DEFAULT_STUN_SERVER)] }
    }
}

/// Accepts `url` or `url|username|credential`.
pub fn parse_ice_server(input: &str) -> Result<IceServer> {
    let splited: Vec<_> = input.split('|').collect();
    match splited.as_slice() {
        [url] if !url.is_empty() => Ok(IceServer::new(*url)),
        [url, username, credential] => Ok(IceServer {
            urls: vec![url.to_string()],
            username: Some(username.to_string()),
            credential: Some(credential.to_string()),
        }),
        _ => Err(anyhow!("Unexpected ice server: {input}")),
    }
}
