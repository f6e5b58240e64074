//! Broker dataplane.
//!
//! The broker wires the matcher into its collaborators: an ingress stream
//! of parsed events, an egress sink for notifications addressed by
//! subscriber id, a control plane for subscribe/unsubscribe/status, and a
//! heartbeat sink. One dataplane worker owns the matcher and serves both
//! the event and control channels, so matching an event is atomic with
//! respect to concurrent registry changes. Intake never blocks the caller:
//! bounded channels plus drop counters apply backpressure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::control::{ControlRequest, ControlResponse, StatusReport};
use crate::error::{ExecutionError, MerxError, MerxResult, ValidationError};
use crate::event::Event;
use crate::matcher::{MatcherStatistics, SubscriptionMatcher};
use crate::notification::Notification;
use crate::wire::{now_ms, BrokerHeartbeat, BrokerMessage};

/// Deadline for one control-plane round trip.
const CONTROL_DEADLINE: Duration = Duration::from_secs(5);

/// Broker instance configuration.
///
/// Endpoints are opaque strings handed to the transport collaborators; the
/// core never interprets them.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker identity stamped on heartbeats. Must be non-empty.
    pub broker_id: String,
    /// Where the ingress collaborator reads events from.
    pub ingress_endpoint: String,
    /// Where the egress collaborator publishes notifications.
    pub egress_endpoint: String,
    /// Where the control collaborator serves requests.
    pub control_endpoint: String,
    /// Max queued events before intake drops.
    pub event_queue_capacity: usize,
    /// Max queued control requests.
    pub control_queue_capacity: usize,
    /// Heartbeat cadence.
    pub heartbeat_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            broker_id: "broker1".to_string(),
            ingress_endpoint: String::new(),
            egress_endpoint: String::new(),
            control_endpoint: String::new(),
            event_queue_capacity: 4096,
            control_queue_capacity: 1024,
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

impl BrokerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.broker_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "broker_id".to_string(),
            });
        }
        Ok(())
    }
}

/// Egress collaborator: delivers notification envelopes addressed by
/// subscriber id (the topic on topic-prefixed transports).
pub trait EgressSink: Send + Sync {
    /// Delivers one notification message.
    ///
    /// # Errors
    ///
    /// Implementations return an error when delivery cannot be accepted;
    /// the broker drops that notification, counts it, and continues with
    /// its siblings.
    fn deliver(&self, subscriber_id: &str, message: &BrokerMessage) -> MerxResult<()>;
}

/// Heartbeat collaborator.
pub trait HeartbeatSink: Send + Sync {
    /// Receives one heartbeat. Infallible by design: a lost heartbeat is
    /// not an error the broker can act on.
    fn emit(&self, heartbeat: &BrokerHeartbeat);
}

/// Channel-backed egress for embedding and tests.
#[derive(Debug)]
pub struct ChannelEgress {
    tx: Sender<(String, BrokerMessage)>,
}

impl ChannelEgress {
    /// Creates the sink and the receiver a consumer drains.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<(String, BrokerMessage)>) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EgressSink for ChannelEgress {
    fn deliver(&self, subscriber_id: &str, message: &BrokerMessage) -> MerxResult<()> {
        self.tx
            .try_send((subscriber_id.to_string(), message.clone()))
            .map_err(|e| {
                let reason = match e {
                    TrySendError::Full(_) => "egress channel full",
                    TrySendError::Disconnected(_) => "egress channel disconnected",
                };
                MerxError::Execution(ExecutionError::Egress {
                    message: reason.to_string(),
                })
            })
    }
}

/// Channel-backed heartbeat sink for embedding and tests.
#[derive(Debug)]
pub struct ChannelHeartbeats {
    tx: Sender<BrokerHeartbeat>,
}

impl ChannelHeartbeats {
    /// Creates the sink and the receiver a consumer drains.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<BrokerHeartbeat>) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl HeartbeatSink for ChannelHeartbeats {
    fn emit(&self, heartbeat: &BrokerHeartbeat) {
        // Slow consumers lose heartbeats, never block the cadence.
        let _ = self.tx.try_send(heartbeat.clone());
    }
}

/// Heartbeat sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHeartbeats;

impl HeartbeatSink for NullHeartbeats {
    fn emit(&self, _heartbeat: &BrokerHeartbeat) {}
}

/// Broker-wide counters for observability.
///
/// Written by the dataplane worker, read by anyone; monotonically
/// non-decreasing.
#[derive(Debug, Default)]
struct Counters {
    events_processed: AtomicU64,
    events_dropped: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_dropped: AtomicU64,
    simple_subscriptions: AtomicU64,
    complex_subscriptions: AtomicU64,
}

/// Snapshot returned by [`Broker::statistics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BrokerStatistics {
    /// Broker identity.
    pub broker_id: String,
    /// Events handed to the matcher.
    pub events_processed: u64,
    /// Events dropped at intake (queue full or broker stopped).
    pub events_dropped: u64,
    /// Notifications accepted by egress.
    pub notifications_sent: u64,
    /// Notifications dropped on egress failure.
    pub notifications_dropped: u64,
    /// Seconds since start.
    pub uptime_seconds: f64,
    /// Registry counts.
    pub subscriptions: MatcherStatistics,
}

struct ControlMsg {
    request: ControlRequest,
    reply: Sender<ControlResponse>,
}

/// The broker dataplane.
///
/// `start` spawns the dataplane and heartbeat workers; `stop` (also run on
/// drop) signals both and joins them. All intake is non-blocking.
#[derive(Debug)]
pub struct Broker {
    config: BrokerConfig,
    event_tx: Sender<Event>,
    control_tx: Sender<ControlMsg>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    started_at: Instant,
}

impl Broker {
    /// Validates the configuration and starts the workers.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty `broker_id`.
    pub fn start(
        config: BrokerConfig,
        egress: Arc<dyn EgressSink>,
        heartbeats: Arc<dyn HeartbeatSink>,
    ) -> MerxResult<Self> {
        config.validate()?;

        let (event_tx, event_rx) = bounded::<Event>(config.event_queue_capacity.max(1));
        let (control_tx, control_rx) = bounded::<ControlMsg>(config.control_queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let counters = Arc::new(Counters::default());
        let started_at = Instant::now();

        let dataplane = Dataplane {
            broker_id: config.broker_id.clone(),
            counters: Arc::clone(&counters),
            egress,
            matcher: SubscriptionMatcher::new(),
            subscriber_addresses: HashMap::new(),
            started_at,
        };
        let dataplane_shutdown = shutdown_rx.clone();
        let dataplane_handle = thread::Builder::new()
            .name("merx-dataplane".to_string())
            .spawn(move || dataplane.run(&event_rx, &control_rx, &dataplane_shutdown))
            .map_err(|e| MerxError::internal(format!("failed to spawn dataplane worker: {e}")))?;

        let heartbeat_id = config.broker_id.clone();
        let heartbeat_counters = Arc::clone(&counters);
        let heartbeat_interval = config.heartbeat_interval;
        let heartbeat_handle = thread::Builder::new()
            .name("merx-heartbeat".to_string())
            .spawn(move || {
                heartbeat_loop(
                    &heartbeat_id,
                    heartbeat_interval,
                    &heartbeat_counters,
                    heartbeats.as_ref(),
                    &shutdown_rx,
                );
            })
            .map_err(|e| MerxError::internal(format!("failed to spawn heartbeat worker: {e}")))?;

        tracing::info!(broker_id = %config.broker_id, "broker started");

        Ok(Self {
            config,
            event_tx,
            control_tx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            workers: Mutex::new(vec![dataplane_handle, heartbeat_handle]),
            counters,
            started_at,
        })
    }

    /// The broker's configuration.
    #[must_use]
    pub const fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Non-blocking event intake.
    ///
    /// Events are matched in arrival order. When the queue is full or the
    /// broker has stopped, the event is dropped and counted.
    pub fn publish(&self, event: Event) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event) | TrySendError::Disconnected(event)) => {
                self.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    broker_id = %self.config.broker_id,
                    event_id = %event.event_id,
                    "dropped event at intake"
                );
            }
        }
    }

    /// Serves one control request, waiting up to the control deadline.
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` when the control queue is saturated,
    /// `Disconnected` after `stop`, and `Timeout` past the deadline.
    pub fn control(&self, request: ControlRequest) -> MerxResult<ControlResponse> {
        let (reply_tx, reply_rx) = bounded::<ControlResponse>(1);
        self.control_tx
            .try_send(ControlMsg {
                request,
                reply: reply_tx,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => MerxError::Execution(ExecutionError::QueueFull {
                    path: "control".to_string(),
                    capacity: self.config.control_queue_capacity,
                }),
                TrySendError::Disconnected(_) => {
                    MerxError::Execution(ExecutionError::Disconnected {
                        path: "control".to_string(),
                    })
                }
            })?;

        reply_rx.recv_timeout(CONTROL_DEADLINE).map_err(|err| match err {
            crossbeam_channel::RecvTimeoutError::Timeout => {
                MerxError::Execution(ExecutionError::Timeout {
                    duration_ms: CONTROL_DEADLINE.as_millis().min(u128::from(u64::MAX)) as u64,
                })
            }
            crossbeam_channel::RecvTimeoutError::Disconnected => {
                MerxError::Execution(ExecutionError::Disconnected {
                    path: "control".to_string(),
                })
            }
        })
    }

    /// Serves one raw control frame, always producing a reply frame.
    ///
    /// Malformed requests come back as error responses; the control channel
    /// stays open.
    #[must_use]
    pub fn control_frame(&self, frame: &[u8]) -> Vec<u8> {
        let response = match ControlRequest::from_bytes(frame) {
            Ok(request) => self
                .control(request)
                .unwrap_or_else(|e| ControlResponse::error(e.to_string())),
            Err(e) => {
                tracing::debug!(broker_id = %self.config.broker_id, error = %e, "rejected control frame");
                ControlResponse::error(e.to_string())
            }
        };
        response.to_bytes()
    }

    /// Broker-wide counters. Eventually consistent with the dataplane,
    /// monotonically non-decreasing.
    #[must_use]
    pub fn statistics(&self) -> BrokerStatistics {
        let simple = self.counters.simple_subscriptions.load(Ordering::Relaxed) as usize;
        let complex = self.counters.complex_subscriptions.load(Ordering::Relaxed) as usize;
        BrokerStatistics {
            broker_id: self.config.broker_id.clone(),
            events_processed: self.counters.events_processed.load(Ordering::Relaxed),
            events_dropped: self.counters.events_dropped.load(Ordering::Relaxed),
            notifications_sent: self.counters.notifications_sent.load(Ordering::Relaxed),
            notifications_dropped: self.counters.notifications_dropped.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            subscriptions: MatcherStatistics {
                simple_subscriptions: simple,
                complex_subscriptions: complex,
                total_subscriptions: simple + complex,
            },
        }
    }

    /// Signals both workers and joins them. Idempotent.
    ///
    /// The in-flight event match runs to completion; queued events and
    /// control requests are abandoned.
    pub fn stop(&self) {
        let shutdown = self
            .shutdown_tx
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        let Some(shutdown) = shutdown else {
            return;
        };
        // Closing the channel wakes every worker's select.
        drop(shutdown);

        if let Ok(mut workers) = self.workers.lock() {
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }

        tracing::info!(broker_id = %self.config.broker_id, "broker stopped");
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the dataplane worker.
struct Dataplane {
    broker_id: String,
    counters: Arc<Counters>,
    egress: Arc<dyn EgressSink>,
    matcher: SubscriptionMatcher,
    /// subscriber_id -> notification address, as provided on subscribe.
    /// Remembered for the egress collaborator; never interpreted.
    subscriber_addresses: HashMap<String, String>,
    started_at: Instant,
}

impl Dataplane {
    fn run(
        mut self,
        event_rx: &Receiver<Event>,
        control_rx: &Receiver<ControlMsg>,
        shutdown_rx: &Receiver<()>,
    ) {
        loop {
            select! {
                recv(shutdown_rx) -> _ => break,
                recv(control_rx) -> msg => {
                    match msg {
                        Ok(ControlMsg { request, reply }) => {
                            let response = self.handle_control(request);
                            let _ = reply.send(response);
                        }
                        Err(_) => break,
                    }
                }
                recv(event_rx) -> msg => {
                    match msg {
                        Ok(event) => self.handle_event(&event),
                        Err(_) => break,
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: &Event) {
        let pending = self.matcher.match_event(event);
        let processed = self.counters.events_processed.fetch_add(1, Ordering::Relaxed) + 1;
        if processed % 1000 == 0 {
            tracing::info!(
                broker_id = %self.broker_id,
                events_processed = processed,
                "event progress"
            );
        }

        if pending.is_empty() {
            return;
        }

        let now = now_ms();
        for notification in pending {
            let notification = Notification::stamp(notification, now);
            let subscriber_id = notification.subscriber_id.clone();
            let message = BrokerMessage::notification(notification, now);

            // One failed dispatch never blocks its siblings.
            match self.egress.deliver(&subscriber_id, &message) {
                Ok(()) => {
                    self.counters.notifications_sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.counters
                        .notifications_dropped
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        broker_id = %self.broker_id,
                        subscriber_id = %subscriber_id,
                        error = %e,
                        "dropped notification"
                    );
                }
            }
        }
    }

    fn handle_control(&mut self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Subscribe {
                subscription,
                address,
            } => match ControlRequest::decode_subscription(&subscription) {
                Ok(subscription) => {
                    let subscription_id = subscription.subscription_id.clone();
                    let subscriber_id = subscription.subscriber_id.clone();
                    match self.matcher.add(subscription) {
                        Ok(()) => {
                            self.subscriber_addresses.insert(subscriber_id, address);
                            self.store_registry_counts();
                            ControlResponse::success(format!("Subscription {subscription_id} added"))
                        }
                        Err(e) => {
                            tracing::debug!(
                                broker_id = %self.broker_id,
                                subscription_id = %subscription_id,
                                error = %e,
                                "rejected subscription"
                            );
                            ControlResponse::error(e.to_string())
                        }
                    }
                }
                Err(e) => ControlResponse::error(e.to_string()),
            },
            ControlRequest::Unsubscribe { subscription_id } => {
                self.matcher.remove(&subscription_id);
                self.store_registry_counts();
                ControlResponse::success(format!("Subscription {subscription_id} removed"))
            }
            ControlRequest::Status => ControlResponse::with_statistics(StatusReport {
                subscriptions: self.matcher.statistics(),
                events_processed: self.counters.events_processed.load(Ordering::Relaxed),
                notifications_sent: self.counters.notifications_sent.load(Ordering::Relaxed),
                notifications_dropped: self
                    .counters
                    .notifications_dropped
                    .load(Ordering::Relaxed),
                uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            }),
        }
    }

    fn store_registry_counts(&self) {
        let stats = self.matcher.statistics();
        self.counters
            .simple_subscriptions
            .store(stats.simple_subscriptions as u64, Ordering::Relaxed);
        self.counters
            .complex_subscriptions
            .store(stats.complex_subscriptions as u64, Ordering::Relaxed);
    }
}

fn heartbeat_loop(
    broker_id: &str,
    interval: Duration,
    counters: &Counters,
    sink: &dyn HeartbeatSink,
    shutdown_rx: &Receiver<()>,
) {
    let ticker = tick(interval.max(Duration::from_millis(1)));
    loop {
        select! {
            recv(shutdown_rx) -> _ => break,
            recv(ticker) -> _ => {
                let active = counters.simple_subscriptions.load(Ordering::Relaxed)
                    + counters.complex_subscriptions.load(Ordering::Relaxed);
                sink.emit(&BrokerHeartbeat {
                    broker_id: broker_id.to_string(),
                    status: "healthy".to_string(),
                    active_subscriptions: active,
                    processed_events: counters.events_processed.load(Ordering::Relaxed),
                });
            }
        }
    }
}
