// WebSocket message protocol

use argus_core::{FrameAnalysis, SessionId, SessionSummary};
use argus_eye::frame::now_secs;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Client -> server messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "frame")]
    Frame {
        /// Base64 JPEG/PNG, optionally as a `data:` URL
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<f64>,
    },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "get_stats")]
    GetStats,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageError {
    UnknownType(String),
    InvalidFrame(String),
}

impl MessageError {
    /// Text reported back to the client
    pub fn client_message(&self) -> String {
        match self {
            MessageError::UnknownType(kind) => format!("Unknown message type: {}", kind),
            MessageError::InvalidFrame(_) => "Invalid frame format".to_string(),
        }
    }
}

impl ClientMessage {
    /// Parse a text message. Text that is not JSON is taken to be a bare
    /// base64 frame.
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let value: JsonValue = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => {
                return Ok(ClientMessage::Frame {
                    data: text.trim().to_string(),
                    timestamp: None,
                })
            }
        };

        let kind = value
            .get("type")
            .and_then(JsonValue::as_str)
            .unwrap_or("none")
            .to_string();

        match kind.as_str() {
            "frame" | "ping" | "get_stats" => serde_json::from_value(value)
                .map_err(|e| MessageError::InvalidFrame(e.to_string())),
            _ => Err(MessageError::UnknownType(kind)),
        }
    }
}

/// Decode a base64 frame payload, accepting `data:image/...;base64,` prefixes
pub fn decode_base64_frame(data: &str) -> Result<Vec<u8>, MessageError> {
    let payload = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };

    if payload.is_empty() {
        return Err(MessageError::InvalidFrame("empty frame data".to_string()));
    }

    STANDARD
        .decode(payload.trim())
        .map_err(|e| MessageError::InvalidFrame(e.to_string()))
}

/// Server -> client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connected")]
    Connected {
        session_id: SessionId,
        message: String,
        timestamp: f64,
    },
    #[serde(rename = "analysis")]
    Analysis {
        session_id: SessionId,
        #[serde(flatten)]
        analysis: Box<FrameAnalysis>,
    },
    #[serde(rename = "pong")]
    Pong { timestamp: f64 },
    #[serde(rename = "stats")]
    Stats {
        session_id: SessionId,
        data: Box<SessionSummary>,
        timestamp: f64,
    },
    #[serde(rename = "error")]
    Error { message: String, timestamp: f64 },
}

impl ServerMessage {
    pub fn connected(session_id: &str) -> Self {
        ServerMessage::Connected {
            session_id: session_id.to_string(),
            message: "WebSocket connection established".to_string(),
            timestamp: now_secs(),
        }
    }

    pub fn analysis(session_id: &str, analysis: FrameAnalysis) -> Self {
        ServerMessage::Analysis {
            session_id: session_id.to_string(),
            analysis: Box::new(analysis),
        }
    }

    pub fn pong() -> Self {
        ServerMessage::Pong { timestamp: now_secs() }
    }

    pub fn stats(session_id: &str, summary: SessionSummary) -> Self {
        ServerMessage::Stats {
            session_id: session_id.to_string(),
            data: Box::new(summary),
            timestamp: now_secs(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            timestamp: now_secs(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_message() {
        let message = ClientMessage::parse(r#"{"type":"frame","data":"aGVsbG8=","timestamp":12.5}"#).unwrap();
        assert_eq!(
            message,
            ClientMessage::Frame {
                data: "aGVsbG8=".to_string(),
                timestamp: Some(12.5),
            }
        );
    }

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(ClientMessage::parse(r#"{"type":"ping"}"#).unwrap(), ClientMessage::Ping);
        assert_eq!(
            ClientMessage::parse(r#"{"type":"get_stats","extra":1}"#).unwrap(),
            ClientMessage::GetStats
        );
    }

    #[test]
    fn test_raw_text_is_bare_frame() {
        let message = ClientMessage::parse("  /9j/4AAQSkZJRg==\n").unwrap();
        assert_eq!(
            message,
            ClientMessage::Frame {
                data: "/9j/4AAQSkZJRg==".to_string(),
                timestamp: None,
            }
        );
    }

    #[test]
    fn test_unknown_type_is_named() {
        let err = ClientMessage::parse(r#"{"type":"subscribe"}"#).unwrap_err();
        assert_eq!(err.client_message(), "Unknown message type: subscribe");

        let err = ClientMessage::parse(r#"{"hello":"world"}"#).unwrap_err();
        assert_eq!(err, MessageError::UnknownType("none".to_string()));
    }

    #[test]
    fn test_frame_without_data_is_invalid() {
        let err = ClientMessage::parse(r#"{"type":"frame"}"#).unwrap_err();
        assert!(matches!(err, MessageError::InvalidFrame(_)));
        assert_eq!(err.client_message(), "Invalid frame format");
    }

    #[test]
    fn test_decode_base64_variants() {
        assert_eq!(decode_base64_frame("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_base64_frame("data:image/jpeg;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
        assert!(decode_base64_frame("not base64!").is_err());
        assert!(decode_base64_frame("").is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let json = ServerMessage::pong().to_json().unwrap();
        let value: JsonValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "pong");
        assert!(value["timestamp"].as_f64().unwrap() > 0.0);

        let json = ServerMessage::error("Invalid frame format").to_json().unwrap();
        let value: JsonValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["message"], "Invalid frame format");
    }

    #[test]
    fn test_analysis_is_flattened() {
        use argus_core::{
            BehaviorSummary, FrameMetadata, GazeReading, ObjectReading, RiskAssessment,
        };

        let analysis = FrameAnalysis {
            gaze: GazeReading::no_face(),
            objects: ObjectReading::default(),
            behavior: BehaviorSummary::with_note("Normal behavior"),
            risk: RiskAssessment::skipped(),
            metadata: FrameMetadata::default(),
        };
        let json = ServerMessage::analysis("exam-1", analysis.clone()).to_json().unwrap();
        let value: JsonValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "analysis");
        assert_eq!(value["session_id"], "exam-1");
        assert_eq!(value["behavior"]["summary"], "Normal behavior");
        assert!(value.get("analysis").is_none());

        let parsed = ServerMessage::from_json(&json).unwrap();
        assert_eq!(parsed, ServerMessage::analysis("exam-1", analysis));
    }
}
