//! Frames exchanged between a session and its renderer.
//!
//! Wire format (bincode-encoded envelope, JSON payload):
//! ```text
//! ┌────────────┬────────────┬──────────┬──────────────────────┐
//! │ frame_type │ session_id │ sequence │ payload              │
//! │ 1 byte     │ 16 bytes   │ varint   │ JSON, by frame_type  │
//! └────────────┴────────────┴──────────┴──────────────────────┘
//! ```
//!
//! | frame_type | direction          | payload                       |
//! |------------|--------------------|-------------------------------|
//! | ClientSync | renderer → server  | `ClientBatch`                 |
//! | Changes    | server → renderer  | `[ChangeRecord]`              |
//! | Failure    | server → renderer  | UTF-8 reason                  |
//! | Ping/Pong  | either             | empty                         |
//!
//! Payloads are JSON because change values are arbitrary JSON, which bincode
//! cannot decode without a schema.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use treesync_core::{ChangeRecord, PropertyUpdate};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    /// Numbered batch of property updates read back by the renderer
    ClientSync = 1,
    /// Change records produced by a flush
    Changes = 2,
    /// The session was terminated; no further frames follow
    Failure = 3,
    Ping = 4,
    Pong = 5,
}

/// Property updates sent together by the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientBatch {
    pub updates: Vec<PropertyUpdate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub frame_type: FrameType,
    pub session_id: Uuid,
    /// Client batches count from 1 per session; server frames carry their own counter.
    pub sequence: u64,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn client_sync(session_id: Uuid, sequence: u64, batch: &ClientBatch) -> Result<Self, CodecError> {
        Ok(Self {
            frame_type: FrameType::ClientSync,
            session_id,
            sequence,
            payload: serde_json::to_vec(batch)?,
        })
    }

    pub fn changes(session_id: Uuid, sequence: u64, records: &[ChangeRecord]) -> Result<Self, CodecError> {
        Ok(Self {
            frame_type: FrameType::Changes,
            session_id,
            sequence,
            payload: serde_json::to_vec(records)?,
        })
    }

    pub fn failure(session_id: Uuid, sequence: u64, reason: &str) -> Self {
        Self {
            frame_type: FrameType::Failure,
            session_id,
            sequence,
            payload: reason.as_bytes().to_vec(),
        }
    }

    pub fn ping(session_id: Uuid) -> Self {
        Self {
            frame_type: FrameType::Ping,
            session_id,
            sequence: 0,
            payload: Vec::new(),
        }
    }

    pub fn pong(session_id: Uuid) -> Self {
        Self {
            frame_type: FrameType::Pong,
            session_id,
            sequence: 0,
            payload: Vec::new(),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(frame)
    }

    pub fn client_batch(&self) -> Result<ClientBatch, CodecError> {
        self.expect(FrameType::ClientSync)?;
        Ok(serde_json::from_slice(&self.payload)?)
    }

    pub fn change_records(&self) -> Result<Vec<ChangeRecord>, CodecError> {
        self.expect(FrameType::Changes)?;
        Ok(serde_json::from_slice(&self.payload)?)
    }

    pub fn failure_reason(&self) -> Result<String, CodecError> {
        self.expect(FrameType::Failure)?;
        Ok(String::from_utf8_lossy(&self.payload).into_owned())
    }

    fn expect(&self, expected: FrameType) -> Result<(), CodecError> {
        if self.frame_type != expected {
            return Err(CodecError::UnexpectedFrame {
                expected,
                found: self.frame_type,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame encoding failed: {0}")]
    Encode(String),

    #[error("frame decoding failed: {0}")]
    Decode(String),

    #[error("invalid JSON payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("expected a {expected:?} frame, got {found:?}")]
    UnexpectedFrame { expected: FrameType, found: FrameType },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use treesync_core::NodeId;

    #[test]
    fn test_client_sync_roundtrip() {
        let session = Uuid::new_v4();
        let batch = ClientBatch {
            updates: vec![PropertyUpdate {
                node: NodeId::new(3),
                feature: 1,
                property: "value".into(),
                value: json!({"nested": [1, 2, {"deep": null}]}),
            }],
        };

        let frame = Frame::client_sync(session, 7, &batch).unwrap();
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.frame_type, FrameType::ClientSync);
        assert_eq!(decoded.session_id, session);
        assert_eq!(decoded.sequence, 7);
        assert_eq!(decoded.client_batch().unwrap(), batch);
    }

    #[test]
    fn test_changes_payload_is_json() {
        let records = vec![ChangeRecord::Attach { node: NodeId::new(1) }];
        let frame = Frame::changes(Uuid::nil(), 1, &records).unwrap();
        let text = std::str::from_utf8(&frame.payload).unwrap();
        assert_eq!(text, r#"[{"attach":{"node":1}}]"#);
        assert_eq!(frame.change_records().unwrap(), records);
    }

    #[test]
    fn test_wrong_frame_type_rejected() {
        let ping = Frame::ping(Uuid::new_v4());
        assert!(matches!(
            ping.client_batch(),
            Err(CodecError::UnexpectedFrame {
                expected: FrameType::ClientSync,
                found: FrameType::Ping
            })
        ));
        assert!(ping.change_records().is_err());
    }

    #[test]
    fn test_failure_reason() {
        let frame = Frame::failure(Uuid::nil(), 4, "unknown feature id 99");
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded.failure_reason().unwrap(), "unknown feature id 99");
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert!(matches!(Frame::decode(&garbage), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_malformed_payload() {
        let frame = Frame {
            frame_type: FrameType::ClientSync,
            session_id: Uuid::nil(),
            sequence: 1,
            payload: b"{not json".to_vec(),
        };
        assert!(matches!(frame.client_batch(), Err(CodecError::Payload(_))));
    }

    #[test]
    fn test_header_is_compact() {
        let encoded = Frame::ping(Uuid::new_v4()).encode().unwrap();
        // 1 type + 16 id (+ length prefix) + 1 sequence + 1 empty payload length
        assert!(encoded.len() < 24, "ping encoded to {} bytes", encoded.len());
    }

    #[test]
    fn test_frame_type_values() {
        assert_eq!(FrameType::ClientSync as u8, 1);
        assert_eq!(FrameType::Changes as u8, 2);
        assert_eq!(FrameType::Failure as u8, 3);
        assert_eq!(FrameType::Ping as u8, 4);
        assert_eq!(FrameType::Pong as u8, 5);
    }
}
