//! Framing for every WebSocket text frame: `{"event": "...", "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One logical message on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    /// Missing `data` decodes as an empty object
    #[serde(default = "empty_object")]
    pub data: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Envelope with an empty-object payload
    pub fn bare(event: impl Into<String>) -> Self {
        Self::new(event, empty_object())
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_data_defaults_to_empty_object() {
        let env = Envelope::decode(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(env.event, "ping");
        assert_eq!(env.data, json!({}));
    }

    #[test]
    fn test_unknown_event_names_decode() {
        let env = Envelope::decode(r#"{"event":"crash_found","data":{"id":3}}"#).unwrap();
        assert_eq!(env.event, "crash_found");
        assert_eq!(env.data["id"], 3);
    }

    #[test]
    fn test_missing_event_is_rejected() {
        assert!(Envelope::decode(r#"{"data":{}}"#).is_err());
        assert!(Envelope::decode("not json").is_err());
    }
}
