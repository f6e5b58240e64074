//! Control-plane protocol.
//!
//! Subscribers manage their registrations over a textual request/reply
//! protocol: JSON objects discriminated by a `type` field. The subscribe
//! request carries the subscription as a hex-encoded binary wire frame so
//! the same schema travels on both planes.

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::matcher::MatcherStatistics;
use crate::subscription::Subscription;
use crate::wire;

/// A control-plane request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Register a subscription.
    Subscribe {
        /// Hex-encoded wire frame of the [`Subscription`].
        subscription: String,
        /// Where the subscriber listens for notifications. Remembered,
        /// never interpreted.
        address: String,
    },
    /// Remove a subscription wholesale.
    Unsubscribe {
        /// Id to remove; unknown ids still succeed.
        subscription_id: String,
    },
    /// Fetch broker statistics.
    Status,
}

impl ControlRequest {
    /// Builds a subscribe request from a typed subscription.
    ///
    /// # Errors
    ///
    /// Returns the frame-encoding failure.
    pub fn subscribe(
        subscription: &Subscription,
        address: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let frame = wire::encode(subscription)?;
        Ok(Self::Subscribe {
            subscription: hex::encode(frame),
            address: address.into(),
        })
    }

    /// Parses a raw request frame.
    ///
    /// A recognizable envelope with an unrecognized `type` yields the
    /// literal `Unknown request type` error the protocol promises;
    /// anything else malformed is a decode error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| TransportError::Decode {
                message: e.to_string(),
            })?;

        match value.get("type").and_then(serde_json::Value::as_str) {
            Some("subscribe" | "unsubscribe" | "status") => serde_json::from_value(value)
                .map_err(|e| TransportError::Decode {
                    message: e.to_string(),
                }),
            _ => Err(TransportError::UnknownRequestType),
        }
    }

    /// Serializes the request to a frame.
    ///
    /// # Errors
    ///
    /// Returns the JSON serialization failure.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::Encode {
            message: e.to_string(),
        })
    }

    /// Decodes the hex-carried subscription of a subscribe request.
    ///
    /// # Errors
    ///
    /// Returns a decode error for invalid hex, then any frame error.
    pub fn decode_subscription(payload: &str) -> Result<Subscription, TransportError> {
        let frame = hex::decode(payload).map_err(|e| TransportError::Decode {
            message: format!("invalid hex subscription payload: {e}"),
        })?;
        wire::decode(&frame)
    }
}

/// Outcome tag of a [`ControlResponse`].
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Broker-wide statistics returned by a status request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Registry counts.
    #[serde(flatten)]
    pub subscriptions: MatcherStatistics,
    /// Events processed since start.
    pub events_processed: u64,
    /// Notifications handed to egress since start.
    pub notifications_sent: u64,
    /// Notifications dropped on egress failure or backpressure.
    pub notifications_dropped: u64,
    /// Seconds since the broker started.
    pub uptime_seconds: f64,
}

/// A control-plane reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Success or error.
    pub status: ResponseStatus,
    /// Human-readable outcome, present on everything but status replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Statistics, present on status replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<StatusReport>,
}

impl ControlResponse {
    /// Successful reply with a message.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: Some(message.into()),
            statistics: None,
        }
    }

    /// Error reply with a message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: Some(message.into()),
            statistics: None,
        }
    }

    /// Successful status reply.
    #[must_use]
    pub fn with_statistics(statistics: StatusReport) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: None,
            statistics: Some(statistics),
        }
    }

    /// True on success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, ResponseStatus::Success)
    }

    /// Serializes the reply to a frame. Serialization of these flat shapes
    /// cannot fail; a defensive fallback still reports an error frame.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self)
            .unwrap_or_else(|_| br#"{"status":"error","message":"Internal error"}"#.to_vec())
    }
}
