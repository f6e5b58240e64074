//! Subscription and filter-condition types.
//!
//! A subscription is an AND-conjunction of conditions registered by a
//! subscriber. Conditions are either evaluated directly against an event
//! (non-windowed) or against a tumbling-window aggregate (windowed).
//! These types are serializable so they can travel on the control plane.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Comparison operator of a filter condition.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
}

impl Operator {
    /// Stable wire ordinal for binary-schema compatibility.
    #[must_use]
    pub const fn wire_code(self) -> u8 {
        match self {
            Self::Equal => 0,
            Self::NotEqual => 1,
            Self::GreaterThan => 2,
            Self::LessThan => 3,
            Self::GreaterEqual => 4,
            Self::LessEqual => 5,
        }
    }

    /// Inverse of [`Operator::wire_code`].
    #[must_use]
    pub const fn from_wire_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Equal),
            1 => Some(Self::NotEqual),
            2 => Some(Self::GreaterThan),
            3 => Some(Self::LessThan),
            4 => Some(Self::GreaterEqual),
            5 => Some(Self::LessEqual),
            _ => None,
        }
    }

    /// Applies the operator to two comparable values.
    ///
    /// Strings compare lexicographically, which is what the ordering
    /// operators mean on non-numeric fields.
    pub fn compare<T: PartialOrd + ?Sized>(self, lhs: &T, rhs: &T) -> bool {
        match self {
            Self::Equal => lhs == rhs,
            Self::NotEqual => lhs != rhs,
            Self::GreaterThan => lhs > rhs,
            Self::LessThan => lhs < rhs,
            Self::GreaterEqual => lhs >= rhs,
            Self::LessEqual => lhs <= rhs,
        }
    }
}

/// One `field / operator / value` filter condition.
///
/// `value` is carried as a string and coerced per the field's type at
/// evaluation time. Windowed conditions name their field as
/// `<agg>_<base>` (e.g. `avg_rating`) and compare against the window
/// aggregate instead of the raw field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Field addressed on the event (or `<agg>_<base>` when windowed).
    pub field_name: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Right-hand side, as a string.
    pub value: String,
    /// Whether this condition evaluates over a window aggregate.
    #[serde(default)]
    pub is_windowed: bool,
}

impl Condition {
    /// Convenience constructor for a non-windowed condition.
    pub fn new(field_name: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            operator,
            value: value.into(),
            is_windowed: false,
        }
    }

    /// Convenience constructor for a windowed condition.
    pub fn windowed(
        field_name: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            operator,
            value: value.into(),
            is_windowed: true,
        }
    }

    /// Strips the aggregation prefix from a windowed field name.
    ///
    /// `avg_rating` samples the event's `rating` field. Non-windowed names
    /// pass through untouched.
    #[must_use]
    pub fn base_field(&self) -> &str {
        for prefix in ["avg_", "max_", "min_"] {
            if let Some(base) = self.field_name.strip_prefix(prefix) {
                return base;
            }
        }
        &self.field_name
    }
}

/// Subscription kind.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    Simple,
    Complex,
}

impl SubscriptionKind {
    /// Stable wire ordinal for binary-schema compatibility.
    #[must_use]
    pub const fn wire_code(self) -> u8 {
        match self {
            Self::Simple => 0,
            Self::Complex => 1,
        }
    }
}

/// Window reduction applied when a tumbling window fills.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Avg,
    Max,
    Min,
    Sum,
}

impl Aggregation {
    /// Parses the wire-level aggregation string. Unknown strings are `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "avg" => Some(Self::Avg),
            "max" => Some(Self::Max),
            "min" => Some(Self::Min),
            "sum" => Some(Self::Sum),
            _ => None,
        }
    }

    /// Parses with the legacy fallback: anything unrecognized averages.
    ///
    /// Subscription validation rejects unknown aggregations up front, so
    /// this only decides behavior for state that slipped past it.
    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::Avg)
    }

    /// The wire-level string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Max => "max",
            Self::Min => "min",
            Self::Sum => "sum",
        }
    }
}

/// Window configuration of a complex subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Number of samples per tumbling window. Must be positive.
    pub window_size: i64,
    /// Aggregation applied on fill, as the wire-level string.
    pub aggregation_type: String,
}

impl WindowConfig {
    /// Convenience constructor.
    pub fn new(window_size: i64, aggregation: Aggregation) -> Self {
        Self {
            window_size,
            aggregation_type: aggregation.as_str().to_string(),
        }
    }
}

/// A subscriber's registered predicate over the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Caller-provided opaque id, unique per broker.
    pub subscription_id: String,
    /// The subscriber this subscription delivers to.
    pub subscriber_id: String,
    /// Simple (direct conditions only) or complex (windowed).
    pub kind: SubscriptionKind,
    /// AND-conjoined conditions, in declaration order.
    pub conditions: Vec<Condition>,
    /// Window configuration; required for complex subscriptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_config: Option<WindowConfig>,
}

impl Subscription {
    /// Builds a simple subscription.
    pub fn simple(
        subscription_id: impl Into<String>,
        subscriber_id: impl Into<String>,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            subscriber_id: subscriber_id.into(),
            kind: SubscriptionKind::Simple,
            conditions,
            window_config: None,
        }
    }

    /// Builds a complex subscription.
    pub fn complex(
        subscription_id: impl Into<String>,
        subscriber_id: impl Into<String>,
        conditions: Vec<Condition>,
        window_config: WindowConfig,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            subscriber_id: subscriber_id.into(),
            kind: SubscriptionKind::Complex,
            conditions,
            window_config: Some(window_config),
        }
    }

    /// Checks every structural invariant before registration.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule: missing ids, empty conditions, a
    /// simple subscription carrying window state, a complex subscription
    /// missing its windowed condition or window config, a non-positive
    /// window size, or an unrecognized aggregation type.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.subscription_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "subscription_id".to_string(),
            });
        }
        if self.subscriber_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "subscriber_id".to_string(),
            });
        }
        if self.conditions.is_empty() {
            return Err(ValidationError::EmptyConditions {
                subscription_id: self.subscription_id.clone(),
            });
        }

        let has_windowed = self.conditions.iter().any(|c| c.is_windowed);
        match self.kind {
            SubscriptionKind::Simple => {
                if has_windowed || self.window_config.is_some() {
                    return Err(ValidationError::SimpleWithWindow {
                        subscription_id: self.subscription_id.clone(),
                    });
                }
            }
            SubscriptionKind::Complex => {
                if !has_windowed {
                    return Err(ValidationError::MissingWindowedCondition {
                        subscription_id: self.subscription_id.clone(),
                    });
                }
                let Some(config) = &self.window_config else {
                    return Err(ValidationError::MissingWindowConfig {
                        subscription_id: self.subscription_id.clone(),
                    });
                };
                if config.window_size <= 0 {
                    return Err(ValidationError::NonPositiveWindowSize {
                        subscription_id: self.subscription_id.clone(),
                        window_size: config.window_size,
                    });
                }
                if Aggregation::parse(&config.aggregation_type).is_none() {
                    return Err(ValidationError::UnknownAggregation {
                        subscription_id: self.subscription_id.clone(),
                        aggregation: config.aggregation_type.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Category label stamped on complex notifications.
    ///
    /// The first `category EQUAL <x>` condition supplies the label;
    /// otherwise `"unknown"`.
    #[must_use]
    pub fn category_label(&self) -> &str {
        self.conditions
            .iter()
            .find(|c| c.field_name == "category" && c.operator == Operator::Equal)
            .map_or("unknown", |c| c.value.as_str())
    }
}
