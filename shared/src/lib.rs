//! Wire protocol shared by the session server and its peers
//!
//! Every datagram is a small frame: a two byte magic, a protocol version
//! byte and a bincode encoded message body. Both ends link this crate, so the
//! frame layout and the message schema can only change together.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Identifies a frame as belonging to this protocol.
pub const FRAME_MAGIC: [u8; 2] = *b"TK";
/// Bumped whenever the frame layout or the `Message` schema changes.
pub const PROTOCOL_VERSION: u8 = 1;
/// Magic plus version byte.
pub const HEADER_LEN: usize = FRAME_MAGIC.len() + 1;
/// Largest datagram either end will send or read.
pub const MAX_DATAGRAM_SIZE: usize = 1048;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize message: {0}")]
    Serialize(#[source] bincode::Error),

    #[error("failed to deserialize message: {0}")]
    Deserialize(#[source] bincode::Error),

    #[error("frame of {size} bytes exceeds the {max} byte datagram limit")]
    TooLarge { size: usize, max: usize },

    #[error("frame of {0} bytes is shorter than the header")]
    Truncated(usize),

    #[error("frame does not start with the protocol magic")]
    BadMagic,

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
}

/// Default message schema spoken by the bundled server and client binaries.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Message {
    Hello { name: String },
    Heartbeat { timestamp: u64 },
    Text(String),
    Snapshot { tick: u64, peers: u32 },
}

/// Encodes `message` into a versioned frame ready for a single datagram.
pub fn encode<M: Serialize>(message: &M) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serialize(message).map_err(CodecError::Serialize)?;
    let size = HEADER_LEN + body.len();
    if size > MAX_DATAGRAM_SIZE {
        return Err(CodecError::TooLarge {
            size,
            max: MAX_DATAGRAM_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(size);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.push(PROTOCOL_VERSION);
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes a frame produced by [`encode`].
pub fn decode<M: DeserializeOwned>(frame: &[u8]) -> Result<M, CodecError> {
    if frame.len() < HEADER_LEN {
        return Err(CodecError::Truncated(frame.len()));
    }
    if frame[..FRAME_MAGIC.len()] != FRAME_MAGIC {
        return Err(CodecError::BadMagic);
    }

    let version = frame[FRAME_MAGIC.len()];
    if version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    bincode::deserialize(&frame[HEADER_LEN..]).map_err(CodecError::Deserialize)
}

/// Current wall clock time in milliseconds since the Unix epoch.
pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_writes_header() {
        let frame = encode(&Message::Heartbeat { timestamp: 7 }).unwrap();
        assert_eq!(&frame[..2], b"TK");
        assert_eq!(frame[2], PROTOCOL_VERSION);
        assert!(frame.len() > HEADER_LEN);
    }

    #[test]
    fn test_message_roundtrip_snapshot() {
        let message = Message::Snapshot { tick: 42, peers: 3 };
        let frame = encode(&message).unwrap();
        let decoded: Message = decode(&frame).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_custom_message_type() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Position {
            x: f32,
            y: f32,
        }

        let frame = encode(&Position { x: 1.5, y: -2.0 }).unwrap();
        let decoded: Position = decode(&frame).unwrap();
        assert_eq!(decoded, Position { x: 1.5, y: -2.0 });
    }

    #[test]
    fn test_encode_rejects_oversized_message() {
        let message = Message::Text("x".repeat(MAX_DATAGRAM_SIZE));
        match encode(&message) {
            Err(CodecError::TooLarge { size, max }) => {
                assert!(size > max);
                assert_eq!(max, MAX_DATAGRAM_SIZE);
            }
            other => panic!("expected TooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_accepts_message_at_limit() {
        // bincode prefixes the enum tag (u32) and the string length (u64)
        let text_len = MAX_DATAGRAM_SIZE - HEADER_LEN - 4 - 8;
        let frame = encode(&Message::Text("y".repeat(text_len))).unwrap();
        assert_eq!(frame.len(), MAX_DATAGRAM_SIZE);
    }

    #[test]
    fn test_decode_truncated_frame() {
        assert!(matches!(
            decode::<Message>(b"TK"),
            Err(CodecError::Truncated(2))
        ));
        assert!(matches!(decode::<Message>(&[]), Err(CodecError::Truncated(0))));
    }

    #[test]
    fn test_decode_bad_magic() {
        let mut frame = encode(&Message::Text("hi".to_string())).unwrap();
        frame[0] = b'X';
        assert!(matches!(decode::<Message>(&frame), Err(CodecError::BadMagic)));
    }

    #[test]
    fn test_decode_unsupported_version() {
        let mut frame = encode(&Message::Text("hi".to_string())).unwrap();
        frame[2] = PROTOCOL_VERSION + 1;
        match decode::<Message>(&frame) {
            Err(CodecError::UnsupportedVersion(v)) => assert_eq!(v, PROTOCOL_VERSION + 1),
            other => panic!("expected UnsupportedVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_garbage_body() {
        let frame = [b'T', b'K', PROTOCOL_VERSION, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            decode::<Message>(&frame),
            Err(CodecError::Deserialize(_))
        ));
    }

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let first = timestamp_millis();
        std::thread::sleep(Duration::from_millis(2));
        assert!(timestamp_millis() > first);
    }
}
