//! Content-based subscription matching.
//!
//! The matcher owns the subscription registry and, for each incoming event,
//! produces the matches to dispatch. Condition values are coerced once at
//! registration time; evaluation against an event is pure lookup-and-compare
//! and never suspends.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event::{is_numeric_field, Event, FieldValue};
use crate::notification::{NotificationBody, PendingNotification};
use crate::subscription::{Aggregation, Condition, Operator, Subscription, SubscriptionKind};
use crate::window::WindowManager;

/// Absolute tolerance for equality on window aggregates, which carry
/// accumulated rounding.
const WINDOW_EQ_TOLERANCE: f64 = 1e-2;

/// Registry counts, reported on the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherStatistics {
    /// Registered simple subscriptions.
    pub simple_subscriptions: usize,
    /// Registered complex subscriptions.
    pub complex_subscriptions: usize,
    /// Sum of both.
    pub total_subscriptions: usize,
}

/// A condition with its value coerced to the comparison domain.
#[derive(Debug, Clone)]
struct CompiledCondition {
    field_name: String,
    operator: Operator,
    is_windowed: bool,
    target: Target,
}

/// The right-hand side of a compiled condition.
#[derive(Debug, Clone)]
enum Target {
    /// Numeric comparison (numeric fields and all windowed conditions).
    Number(f64),
    /// Lexicographic string comparison.
    Text(String),
    /// Numeric field whose condition value failed to parse: never true.
    Unparseable,
}

fn compile(condition: &Condition) -> CompiledCondition {
    let target = if condition.is_windowed || is_numeric_field(&condition.field_name) {
        condition
            .value
            .trim()
            .parse::<f64>()
            .map_or(Target::Unparseable, Target::Number)
    } else {
        Target::Text(condition.value.clone())
    };

    CompiledCondition {
        field_name: condition.field_name.clone(),
        operator: condition.operator,
        is_windowed: condition.is_windowed,
        target,
    }
}

#[derive(Debug)]
struct RegisteredSubscription {
    subscription: Subscription,
    compiled: Vec<CompiledCondition>,
}

impl RegisteredSubscription {
    fn new(subscription: Subscription) -> Self {
        let compiled = subscription.conditions.iter().map(compile).collect();
        Self {
            subscription,
            compiled,
        }
    }
}

/// Registry of subscriptions plus per-event matching.
#[derive(Debug, Default)]
pub struct SubscriptionMatcher {
    simple: HashMap<String, RegisteredSubscription>,
    complex: HashMap<String, RegisteredSubscription>,
    /// subscription_id -> windowed field name -> window.
    windows: HashMap<String, HashMap<String, WindowManager>>,
}

impl SubscriptionMatcher {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription.
    ///
    /// Complex subscriptions get one window per windowed condition, sized
    /// by the subscription's window config. A subscription re-added under
    /// an existing id replaces the previous registration wholesale.
    ///
    /// # Errors
    ///
    /// Returns the subscription's structural violation, leaving the
    /// registry unchanged.
    pub fn add(&mut self, subscription: Subscription) -> Result<(), ValidationError> {
        subscription.validate()?;

        let id = subscription.subscription_id.clone();
        self.remove(&id);

        match subscription.kind {
            SubscriptionKind::Simple => {
                self.simple.insert(id, RegisteredSubscription::new(subscription));
            }
            SubscriptionKind::Complex => {
                // validate() guarantees the config is present and sane.
                let (size, aggregation) = subscription
                    .window_config
                    .as_ref()
                    .map_or((1, Aggregation::Avg), |c| {
                        (
                            c.window_size.max(1) as usize,
                            Aggregation::parse_lossy(&c.aggregation_type),
                        )
                    });

                let mut windows = HashMap::new();
                for condition in subscription.conditions.iter().filter(|c| c.is_windowed) {
                    windows.insert(
                        condition.field_name.clone(),
                        WindowManager::new(size, aggregation),
                    );
                }

                self.windows.insert(id.clone(), windows);
                self.complex.insert(id, RegisteredSubscription::new(subscription));
            }
        }

        Ok(())
    }

    /// Removes a subscription and all of its window state.
    ///
    /// Unknown ids are a silent no-op; in-flight samples are discarded.
    pub fn remove(&mut self, subscription_id: &str) {
        if self.simple.remove(subscription_id).is_some() {
            return;
        }
        if self.complex.remove(subscription_id).is_some() {
            self.windows.remove(subscription_id);
        }
    }

    /// Matches one event against the whole registry.
    ///
    /// Simple matches come first, then complex matches; within one complex
    /// subscription, windowed conditions fire in declaration order. No
    /// ordering is guaranteed across distinct subscriptions.
    pub fn match_event(&mut self, event: &Event) -> Vec<PendingNotification> {
        let mut notifications = Vec::new();

        for entry in self.simple.values() {
            if entry.compiled.iter().all(|c| eval_condition(event, c)) {
                notifications.push(PendingNotification {
                    subscription_id: entry.subscription.subscription_id.clone(),
                    subscriber_id: entry.subscription.subscriber_id.clone(),
                    body: NotificationBody::Simple {
                        matched_event: event.clone(),
                    },
                });
            }
        }

        for entry in self.complex.values() {
            match_complex(entry, &mut self.windows, event, &mut notifications);
        }

        notifications
    }

    /// Registry counts.
    #[must_use]
    pub fn statistics(&self) -> MatcherStatistics {
        MatcherStatistics {
            simple_subscriptions: self.simple.len(),
            complex_subscriptions: self.complex.len(),
            total_subscriptions: self.simple.len() + self.complex.len(),
        }
    }

    /// True when no subscription is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.simple.is_empty() && self.complex.is_empty()
    }

    #[cfg(test)]
    fn window_len(&self, subscription_id: &str, field_name: &str) -> Option<usize> {
        self.windows
            .get(subscription_id)
            .and_then(|w| w.get(field_name))
            .map(WindowManager::len)
    }
}

fn match_complex(
    entry: &RegisteredSubscription,
    windows: &mut HashMap<String, HashMap<String, WindowManager>>,
    event: &Event,
    notifications: &mut Vec<PendingNotification>,
) {
    // Sampling gate: every non-windowed condition must hold, else the
    // event neither samples nor fires any window of this subscription.
    for condition in entry.compiled.iter().filter(|c| !c.is_windowed) {
        if !eval_condition(event, condition) {
            return;
        }
    }

    let Some(subscription_windows) = windows.get_mut(&entry.subscription.subscription_id) else {
        return;
    };

    let window_size = entry
        .subscription
        .window_config
        .as_ref()
        .map_or(0, |c| c.window_size);

    for (condition, compiled) in entry
        .subscription
        .conditions
        .iter()
        .zip(&entry.compiled)
        .filter(|(c, _)| c.is_windowed)
    {
        let Some(value) = event.numeric_field(condition.base_field()) else {
            continue;
        };
        let Some(window) = subscription_windows.get_mut(&condition.field_name) else {
            continue;
        };

        let (fired, aggregated) = window.add(value);
        if !fired {
            continue;
        }
        let Some(aggregated) = aggregated else {
            continue;
        };

        if eval_windowed(aggregated, compiled) {
            notifications.push(PendingNotification {
                subscription_id: entry.subscription.subscription_id.clone(),
                subscriber_id: entry.subscription.subscriber_id.clone(),
                body: NotificationBody::Complex {
                    category: entry.subscription.category_label().to_string(),
                    field_name: condition.field_name.clone(),
                    aggregated_value: aggregated,
                    window_size,
                    condition_met: true,
                },
            });
        }
    }
}

/// Evaluates one non-windowed condition against an event.
///
/// Unknown fields and failed coercions yield `false`, never an error.
fn eval_condition(event: &Event, condition: &CompiledCondition) -> bool {
    let Some(field) = event.field(&condition.field_name) else {
        return false;
    };

    match &condition.target {
        Target::Number(rhs) => match field.as_f64() {
            Some(lhs) => condition.operator.compare(&lhs, rhs),
            None => false,
        },
        Target::Text(rhs) => match field {
            FieldValue::Str(lhs) => condition.operator.compare(lhs, rhs.as_str()),
            other => condition.operator.compare(other.to_string().as_str(), rhs.as_str()),
        },
        Target::Unparseable => false,
    }
}

/// Evaluates a windowed condition against the emitted aggregate.
///
/// Equality uses an absolute tolerance to absorb aggregation rounding.
fn eval_windowed(aggregated: f64, condition: &CompiledCondition) -> bool {
    let Target::Number(rhs) = &condition.target else {
        return false;
    };

    match condition.operator {
        Operator::Equal => (aggregated - rhs).abs() < WINDOW_EQ_TOLERANCE,
        Operator::NotEqual => (aggregated - rhs).abs() >= WINDOW_EQ_TOLERANCE,
        op => op.compare(&aggregated, rhs),
    }
}
