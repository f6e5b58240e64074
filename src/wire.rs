//! Wire schemas and the framed binary codec.
//!
//! Collaborator transports exchange [`BrokerMessage`] envelopes. Framing on
//! an actual socket is the transport's concern; this module fixes the frame
//! layout so independent implementations interoperate:
//!
//! ```text
//! [version: 1 byte][length: 4 bytes LE][payload: N bytes JSON][crc32: 4 bytes LE]
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::TransportError;
use crate::event::Event;
use crate::notification::Notification;

/// Current codec version.
const CODEC_VERSION: u8 = 1;

/// Maximum payload size accepted in one frame.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024; // 4 MiB

/// Milliseconds since the Unix epoch, now.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Kind tag of a [`BrokerMessage`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Event,
    Notification,
    Heartbeat,
}

impl MessageKind {
    /// Stable wire ordinal for binary-schema compatibility.
    #[must_use]
    pub const fn wire_code(self) -> u8 {
        match self {
            Self::Event => 0,
            Self::Notification => 1,
            Self::Heartbeat => 2,
        }
    }

    /// Inverse of [`MessageKind::wire_code`].
    #[must_use]
    pub const fn from_wire_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Event),
            1 => Some(Self::Notification),
            2 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// Liveness beacon emitted by the broker every heartbeat interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerHeartbeat {
    /// Emitting broker.
    pub broker_id: String,
    /// Health status; currently always `"healthy"`.
    pub status: String,
    /// Registered subscriptions at emission time.
    pub active_subscriptions: u64,
    /// Events processed since start.
    pub processed_events: u64,
}

/// Payload union of a broker message.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    Event(Event),
    Notification(Notification),
    Heartbeat(BrokerHeartbeat),
}

impl MessagePayload {
    /// The kind tag matching this payload.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Event(_) => MessageKind::Event,
            Self::Notification(_) => MessageKind::Notification,
            Self::Heartbeat(_) => MessageKind::Heartbeat,
        }
    }
}

/// Envelope exchanged with ingress and egress collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    /// Opaque, per-emitter message id.
    pub message_id: String,
    /// Emission time, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Tagged payload.
    pub payload: MessagePayload,
}

impl BrokerMessage {
    /// Wraps a notification in a broker-stamped envelope.
    #[must_use]
    pub fn notification(notification: Notification, now_ms: i64) -> Self {
        Self {
            message_id: format!("broker_msg_{now_ms}"),
            timestamp_ms: now_ms,
            payload: MessagePayload::Notification(notification),
        }
    }

    /// The envelope's kind tag.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

/// Encodes a value into one frame.
///
/// # Errors
///
/// Returns [`TransportError::Encode`] when serialization fails and
/// [`TransportError::FrameTooLarge`] when the payload exceeds the cap.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TransportError> {
    let data = serde_json::to_vec(value).map_err(|e| TransportError::Encode {
        message: e.to_string(),
    })?;
    if data.len() > MAX_FRAME_BYTES {
        return Err(TransportError::FrameTooLarge {
            size: data.len(),
            max: MAX_FRAME_BYTES,
        });
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(1 + 4 + data.len() + 4);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

/// Decodes one frame, verifying version, length, and checksum.
///
/// # Errors
///
/// Returns the specific [`TransportError`]: truncation and JSON failures as
/// `Decode`, plus `UnsupportedVersion`, `FrameTooLarge`, and
/// `ChecksumMismatch`.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, TransportError> {
    let truncated = || TransportError::Decode {
        message: "frame truncated".to_string(),
    };

    let (&version, rest) = frame.split_first().ok_or_else(truncated)?;
    if version != CODEC_VERSION {
        return Err(TransportError::UnsupportedVersion { version });
    }

    if rest.len() < 4 {
        return Err(truncated());
    }
    let (len_bytes, rest) = rest.split_at(4);
    let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(TransportError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_BYTES,
        });
    }
    if rest.len() < len + 4 {
        return Err(truncated());
    }
    let (data, crc_bytes) = rest.split_at(len);

    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    let computed = hasher.finalize();
    if stored != computed {
        return Err(TransportError::ChecksumMismatch { stored, computed });
    }

    serde_json::from_slice(data).map_err(|e| TransportError::Decode {
        message: e.to_string(),
    })
}
