//! # Producer Message Protocol
//!
//! JSON text messages exchanged with the audio producer over the websocket.
//! Every message carries a `type` discriminator.
//!
//! ## Producer → Server:
//! - `handshake`: optional `version` announcement
//! - `audio`: one base64-encoded PCM chunk in `audio`
//! - `status`: request for the connected/streaming flags
//! - `streamStart` / `streamStop` / `streamPause` / `streamResume`: explicit overrides
//!
//! ## Server → Producer:
//! - `handshake`: greeting sent when the connection opens
//! - `versionMismatch`: warning when the producer's version is not the expected one
//! - `status`: reply to a `status` request

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Messages the producer sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProducerMessage {
    Handshake {
        #[serde(default)]
        version: Option<String>,
    },

    Audio {
        /// Base64 (standard alphabet, padded) of raw 16-bit LE mono PCM
        #[serde(default)]
        audio: String,
    },

    Status,

    StreamStart,

    StreamStop,

    StreamPause,

    StreamResume,
}

impl ProducerMessage {
    /// Parse one text frame. Unknown `type` values are an error like any other
    /// malformed input.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ProducerMessage::Handshake { .. } => "handshake",
            ProducerMessage::Audio { .. } => "audio",
            ProducerMessage::Status => "status",
            ProducerMessage::StreamStart => "streamStart",
            ProducerMessage::StreamStop => "streamStop",
            ProducerMessage::StreamPause => "streamPause",
            ProducerMessage::StreamResume => "streamResume",
        }
    }
}

/// Messages the server sends back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Handshake,

    #[serde(rename_all = "camelCase")]
    VersionMismatch {
        message: String,
        expected_version: String,
        actual_version: String,
    },

    Status {
        /// Whether the voice session is joined
        connected: bool,
        /// Whether the producer is currently considered live
        streaming: bool,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decode the base64 payload of an `audio` message.
pub fn decode_audio_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(payload)
}

/// Encode raw PCM the way the producer does. Used by tests and tooling.
pub fn encode_audio_payload(pcm: &[u8]) -> String {
    STANDARD.encode(pcm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_producer_message() {
        let cases = [
            (r#"{"type":"handshake","version":"1.3.5"}"#, ProducerMessage::Handshake { version: Some("1.3.5".to_string()) }),
            (r#"{"type":"handshake"}"#, ProducerMessage::Handshake { version: None }),
            (r#"{"type":"audio","audio":"AAE="}"#, ProducerMessage::Audio { audio: "AAE=".to_string() }),
            (r#"{"type":"status"}"#, ProducerMessage::Status),
            (r#"{"type":"streamStart"}"#, ProducerMessage::StreamStart),
            (r#"{"type":"streamStop"}"#, ProducerMessage::StreamStop),
            (r#"{"type":"streamPause"}"#, ProducerMessage::StreamPause),
            (r#"{"type":"streamResume"}"#, ProducerMessage::StreamResume),
        ];

        for (text, expected) in cases {
            assert_eq!(ProducerMessage::parse(text).unwrap(), expected, "{}", text);
        }
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        // Producers attach a timestamp to audio messages
        let msg = ProducerMessage::parse(r#"{"type":"audio","audio":"","timestamp":12}"#).unwrap();
        assert_eq!(msg, ProducerMessage::Audio { audio: String::new() });
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(ProducerMessage::parse(r#"{"type":"video"}"#).is_err());
        assert!(ProducerMessage::parse("not json").is_err());
    }

    #[test]
    fn test_server_messages_use_camel_case() {
        let json = ServerMessage::VersionMismatch {
            message: "update".to_string(),
            expected_version: "1.3.5".to_string(),
            actual_version: "1.0.0".to_string(),
        }
        .to_json()
        .unwrap();
        assert!(json.contains(r#""type":"versionMismatch""#));
        assert!(json.contains(r#""expectedVersion":"1.3.5""#));
        assert!(json.contains(r#""actualVersion":"1.0.0""#));

        let status = ServerMessage::Status { connected: false, streaming: true }.to_json().unwrap();
        assert_eq!(status, r#"{"type":"status","connected":false,"streaming":true}"#);

        assert_eq!(ServerMessage::Handshake.to_json().unwrap(), r#"{"type":"handshake"}"#);
    }

    #[test]
    fn test_audio_payload_decoding() {
        let pcm = vec![0u8, 1, 2, 255];
        assert_eq!(decode_audio_payload(&encode_audio_payload(&pcm)).unwrap(), pcm);
        assert!(decode_audio_payload("***").is_err());
    }
}
