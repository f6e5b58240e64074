//! # Merx - Content-Based Pub/Sub for E-Commerce Event Streams
//!
//! Merx is the matching engine and dataplane of a content-based
//! publish/subscribe broker. Subscribers register predicates over typed
//! e-commerce events - plain field comparisons or thresholds on
//! tumbling-window aggregates - and the broker dispatches a notification to
//! every subscription a given event satisfies, at most once per match.
//!
//! ## Core Concepts
//!
//! - **Event**: a tagged record (purchase, product view, inventory update,
//!   user rating) flowing in from the ingress collaborator
//! - **Subscription**: an AND-conjunction of conditions, simple or windowed
//! - **Tumbling window**: a fixed-capacity sample buffer that emits one
//!   aggregate when full, then resets
//! - **Notification**: the dispatch artifact, addressed by subscriber id
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use merx::{Broker, BrokerConfig, ChannelEgress, Condition, ControlRequest,
//!            NullHeartbeats, Operator, Subscription};
//!
//! let (egress, notifications) = ChannelEgress::bounded(1024);
//! let broker = Broker::start(BrokerConfig::default(), Arc::new(egress), Arc::new(NullHeartbeats))?;
//!
//! let subscription = Subscription::simple(
//!     "sub_1",
//!     "subscriber_1",
//!     vec![Condition::new("category", Operator::Equal, "Electronics")],
//! );
//! broker.control(ControlRequest::subscribe(&subscription, "tcp://localhost:6001")?)?;
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod broker;
pub mod control;
pub mod error;
pub mod event;
pub mod matcher;
pub mod notification;
pub mod subscription;
pub mod window;
pub mod wire;

// Re-export primary types at crate root for convenience
pub use broker::{
    Broker, BrokerConfig, BrokerStatistics, ChannelEgress, ChannelHeartbeats, EgressSink,
    HeartbeatSink, NullHeartbeats,
};
pub use control::{ControlRequest, ControlResponse, ResponseStatus, StatusReport};
pub use error::{ExecutionError, MerxError, MerxResult, TransportError, ValidationError};
pub use event::{
    Event, EventKind, EventPayload, FieldValue, InventoryUpdate, ProductView, Purchase, UserRating,
};
pub use matcher::{MatcherStatistics, SubscriptionMatcher};
pub use notification::{Notification, NotificationBody, PendingNotification};
pub use subscription::{
    Aggregation, Condition, Operator, Subscription, SubscriptionKind, WindowConfig,
};
pub use window::WindowManager;
pub use wire::{now_ms, BrokerHeartbeat, BrokerMessage, MessageKind, MessagePayload};
