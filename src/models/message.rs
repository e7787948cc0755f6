use serde::{Deserialize, Serialize};

pub type PlayerId = u64;

/// Application envelope carried inside an open data channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMessage {
    #[serde(rename = "playerid")]
    pub player_id: PlayerId,
    #[serde(default)]
    pub channel: String,
    #[serde(default, with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default)]
    pub tick: u64,
}

impl DataMessage {
    pub fn new(player_id: PlayerId, channel: impl Into<String>, data: Vec<u8>) -> Self {
        Self { player_id, channel: channel.into(), data, tick: 0 }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    pub x: f64,
    pub y: f64,
}

// byte slices travel as base64 strings, a nil slice as null
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub(super) fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Vec::new()),
            Some(encoded) => STANDARD.decode(encoded).map_err(D::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_is_base64_on_the_wire() {
        let msg = DataMessage::new(42, "chat", b"hello".to_vec());
        let json = String::from_utf8(msg.to_bytes().unwrap()).unwrap();
        assert!(json.contains(r#""playerid":42"#));
        assert!(json.contains(r#""data":"aGVsbG8=""#));
        assert_eq!(DataMessage::from_bytes(json.as_bytes()).unwrap(), msg);
    }

    #[test]
    fn empty_and_null_data() {
        let msg = DataMessage { player_id: 1, channel: "move".into(), data: Vec::new(), tick: 9 };
        let parsed = DataMessage::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, msg);

        let parsed =
            DataMessage::from_bytes(br#"{"playerid":5,"channel":"","data":null,"tick":0}"#).unwrap();
        assert!(parsed.data.is_empty());
        assert_eq!(parsed.player_id, 5);
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(DataMessage::from_bytes(br#"{"playerid":1,"data":"***"}"#).is_err());
    }
}
