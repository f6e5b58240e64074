//! Notification types: the dispatch artifacts of a match.
//!
//! The matcher produces [`PendingNotification`]s; the broker stamps them
//! with an id and timestamp at dispatch time, yielding [`Notification`]s
//! addressed by `subscriber_id`.

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Payload of a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationBody {
    /// A simple subscription matched; carries the full matching event.
    Simple {
        /// The event that satisfied every condition.
        matched_event: Event,
    },
    /// A windowed condition of a complex subscription fired and held.
    Complex {
        /// Category label from the subscription's conditions.
        category: String,
        /// The windowed field (e.g. `avg_rating`).
        field_name: String,
        /// The aggregate the window emitted.
        aggregated_value: f64,
        /// Samples per window.
        window_size: i64,
        /// Always true: only satisfied windows are notified.
        condition_met: bool,
    },
}

impl NotificationBody {
    /// Notification-id prefix; downstream consumers parse on it to
    /// distinguish kinds without inspecting the payload.
    #[must_use]
    pub const fn id_prefix(&self) -> &'static str {
        match self {
            Self::Simple { .. } => "notif",
            Self::Complex { .. } => "complex_notif",
        }
    }

    /// True for windowed-match notifications.
    #[must_use]
    pub const fn is_complex(&self) -> bool {
        matches!(self, Self::Complex { .. })
    }
}

/// A match produced by the matcher, not yet stamped for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNotification {
    /// The subscription that matched.
    pub subscription_id: String,
    /// Delivery address (egress topic).
    pub subscriber_id: String,
    /// Match payload.
    pub body: NotificationBody,
}

/// A stamped notification, ready for the egress collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// `notif_<millis>_<subscription_id>` or
    /// `complex_notif_<millis>_<subscription_id>`. Advisory: collisions are
    /// possible under bursts and nothing keys on uniqueness.
    pub notification_id: String,
    /// The subscription that matched.
    pub subscription_id: String,
    /// Delivery address (egress topic).
    pub subscriber_id: String,
    /// Dispatch time, milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Match payload.
    pub body: NotificationBody,
}

impl Notification {
    /// Stamps a pending match with its dispatch id and timestamp.
    #[must_use]
    pub fn stamp(pending: PendingNotification, now_ms: i64) -> Self {
        let notification_id = format!(
            "{}_{now_ms}_{}",
            pending.body.id_prefix(),
            pending.subscription_id
        );
        Self {
            notification_id,
            subscription_id: pending.subscription_id,
            subscriber_id: pending.subscriber_id,
            timestamp_ms: now_ms,
            body: pending.body,
        }
    }
}
