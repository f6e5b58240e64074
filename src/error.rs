//! Error types for merx.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error messages
//! on the control plane.

use thiserror::Error;

/// Validation errors raised when a subscription (or broker configuration)
/// is structurally invalid.
///
/// These map to the control plane's "invalid subscription" rejections: the
/// registry is left unchanged and the caller receives the message.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Required field missing or empty.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Name of missing field.
        field: String,
    },

    /// Subscription carries no conditions at all.
    #[error("Subscription '{subscription_id}' has an empty conditions list")]
    EmptyConditions {
        /// Offending subscription.
        subscription_id: String,
    },

    /// Simple subscription carries windowed state it must not have.
    #[error("Simple subscription '{subscription_id}' must not carry windowed conditions or a window config")]
    SimpleWithWindow {
        /// Offending subscription.
        subscription_id: String,
    },

    /// Complex subscription has no windowed condition.
    #[error("Complex subscription '{subscription_id}' has no windowed condition")]
    MissingWindowedCondition {
        /// Offending subscription.
        subscription_id: String,
    },

    /// Complex subscription has no window configuration.
    #[error("Complex subscription '{subscription_id}' is missing a window config")]
    MissingWindowConfig {
        /// Offending subscription.
        subscription_id: String,
    },

    /// Window size must be at least one event.
    #[error("Window size {window_size} for subscription '{subscription_id}' must be positive")]
    NonPositiveWindowSize {
        /// Offending subscription.
        subscription_id: String,
        /// The invalid size.
        window_size: i64,
    },

    /// Aggregation type outside the recognized set.
    #[error("Unknown aggregation type '{aggregation}' for subscription '{subscription_id}'")]
    UnknownAggregation {
        /// Offending subscription.
        subscription_id: String,
        /// The unrecognized aggregation string.
        aggregation: String,
    },
}

/// Execution errors that occur inside the running dataplane.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Operation timed out.
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        /// Duration before timeout.
        duration_ms: u64,
    },

    /// A dataplane channel closed before producing a reply.
    #[error("Dataplane channel disconnected for {path} path")]
    Disconnected {
        /// Dataplane path name.
        path: String,
    },

    /// A bounded dataplane queue is full.
    #[error("Dataplane queue is full for {path} path (capacity={capacity})")]
    QueueFull {
        /// Dataplane path name.
        path: String,
        /// Queue capacity.
        capacity: usize,
    },

    /// Dispatch of one notification to the egress collaborator failed.
    #[error("Egress dispatch failed: {message}")]
    Egress {
        /// Error details.
        message: String,
    },
}

/// Transport errors for wire frames and control payloads.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Frame serialization failed.
    #[error("Failed to encode frame: {message}")]
    Encode {
        /// Error details.
        message: String,
    },

    /// Frame deserialization failed.
    #[error("Failed to decode frame: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// Frame written by an incompatible codec version.
    #[error("Unsupported codec version: {version}")]
    UnsupportedVersion {
        /// Version byte found in the frame.
        version: u8,
    },

    /// Frame exceeds the size cap.
    #[error("Frame payload of {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// Declared payload size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Frame checksum does not match its payload.
    #[error("CRC mismatch: stored={stored:08x}, computed={computed:08x} (data corrupted)")]
    ChecksumMismatch {
        /// Checksum stored in the frame.
        stored: u32,
        /// Checksum computed over the payload.
        computed: u32,
    },

    /// Control request with an unrecognized type tag.
    #[error("Unknown request type")]
    UnknownRequestType,
}

/// Top-level error type for merx.
///
/// This enum encompasses all possible errors that can occur when embedding
/// the broker.
#[derive(Debug, Error)]
pub enum MerxError {
    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Dataplane failure.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Wire or control-payload failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Internal system error.
    #[error("Internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

impl MerxError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            // Validation and decode errors won't change on retry.
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. } | ExecutionError::QueueFull { .. }
            ),
            Self::Validation(_) | Self::Transport(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for merx operations.
pub type MerxResult<T> = Result<T, MerxError>;
