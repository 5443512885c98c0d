//! Sampling Scheduler
//!
//! Many monitor registrations share one adaptive timer. Each tick runs in two
//! phases:
//!
//! ```text
//!   [registry lock]  dedup points ──▶ generate / queue self-generators
//!   [no lock]        deliver value-changed samples ──▶ generate-values calls
//! ```
//!
//! The timer period tracks the smallest requested interval, floored at the
//! configured granularity, unless an explicit override is active.

use crate::core::{PointId, PointRef, Status, Value, lock_unpoisoned};
use crate::dispatch::ValueDispatcher;
use crate::error::{Result, SimError};
use crate::metrics::{
    MONITORED_POINTS, SAMPLE_FAILURES, SAMPLES_DELIVERED, SAMPLING_TICKS,
};
use crate::timer::PeriodicTimer;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

// ============================================================================
// Notification sink
// ============================================================================

/// Receiver of per-tick notifications.
///
/// Called on the sampling task with no scheduler lock held, so
/// implementations may call back into the engine.
pub trait NotificationSink: Send + Sync {
    fn on_value_changed(
        &self,
        point: &PointRef,
        value: &Value,
        status: Status,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;

    /// The point produces its own values; the host should ask it to.
    fn on_generate_values(&self, point: &PointRef) -> Result<()>;
}

/// Owned notification event, as carried by [`ChannelSink`]
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    ValueChanged {
        point: PointId,
        value: Value,
        status: Status,
        timestamp: DateTime<Utc>,
    },
    GenerateValues {
        point: PointId,
    },
}

impl Notification {
    pub fn point(&self) -> &PointId {
        match self {
            Notification::ValueChanged { point, .. } | Notification::GenerateValues { point } => {
                point
            }
        }
    }
}

/// Bounded channel sink. A full channel drops the notification and counts it.
pub struct ChannelSink {
    sender: Sender<Notification>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<Notification>) {
        let (sender, receiver) = bounded(capacity);
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn send(&self, notification: Notification) -> Result<()> {
        match self.sender.try_send(notification) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SimError::Delivery("notification receiver disconnected".into()))
            }
        }
    }
}

impl NotificationSink for ChannelSink {
    fn on_value_changed(
        &self,
        point: &PointRef,
        value: &Value,
        status: Status,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.send(Notification::ValueChanged {
            point: point.id().clone(),
            value: value.clone(),
            status,
            timestamp,
        })
    }

    fn on_generate_values(&self, point: &PointRef) -> Result<()> {
        self.send(Notification::GenerateValues {
            point: point.id().clone(),
        })
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Caller-chosen identity of one monitor registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MonitorKey(pub u32);

#[derive(Clone, Debug)]
pub struct MonitorRegistration {
    pub point: PointRef,
    pub interval_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum IntervalOverride {
    Disabled,
    Period(Duration),
}

/// Outcome of one sampling tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Distinct points scanned
    pub points: usize,
    /// Value-changed notifications accepted by the sink
    pub delivered: usize,
    /// Generate-values callbacks accepted by the sink
    pub generate_requests: usize,
    /// Points whose category has no generation rule
    pub skipped: usize,
    pub failures: usize,
}

#[derive(Default)]
struct Registry {
    registrations: BTreeMap<MonitorKey, MonitorRegistration>,
    /// Deduplicated points in key order; `None` when stale
    sampling_set: Option<Vec<PointRef>>,
    interval_override: Option<IntervalOverride>,
    timer: Option<PeriodicTimer>,
    /// Set by `shutdown`; registrations are refused and no timer starts
    closed: bool,
}

impl Registry {
    fn sampling_set(&mut self) -> &[PointRef] {
        let registrations = &self.registrations;
        self.sampling_set.get_or_insert_with(|| {
            let mut seen = HashSet::new();
            let points: Vec<PointRef> = registrations
                .values()
                .filter(|r| seen.insert(r.point.id().clone()))
                .map(|r| r.point.clone())
                .collect();
            MONITORED_POINTS.set(points.len() as i64);
            points
        })
    }

    fn invalidate(&mut self) {
        self.sampling_set = None;
        self.interval_override = None;
    }
}

struct SchedulerShared {
    dispatcher: Arc<ValueDispatcher>,
    sink: Arc<dyn NotificationSink>,
    registry: Mutex<Registry>,
}

type Sample = (PointRef, Value, DateTime<Utc>);

impl SchedulerShared {
    fn tick(&self) -> TickReport {
        SAMPLING_TICKS.inc();
        let mut report = TickReport::default();
        let mut samples: Vec<Sample> = Vec::new();
        let mut generate: Vec<PointRef> = Vec::new();

        {
            let mut registry = lock_unpoisoned(&self.registry);
            let points = registry.sampling_set();
            report.points = points.len();
            let mut queued = HashSet::new();

            for point in points {
                if let Some(capable) = self_generator(point) {
                    if queued.insert(capable.id().clone()) {
                        generate.push(capable.clone());
                    }
                    continue;
                }
                match catch_unwind(AssertUnwindSafe(|| self.dispatcher.generate(point))) {
                    Ok(Some(value)) => {
                        let now = Utc::now();
                        point.set_state(value.clone(), Status::Good, now);
                        samples.push((point.clone(), value, now));
                    }
                    Ok(None) => report.skipped += 1,
                    Err(_) => {
                        report.failures += 1;
                        SAMPLE_FAILURES.inc();
                        warn!(point = %point.id(), "Value generation panicked");
                    }
                }
            }
        }

        for (point, value, timestamp) in &samples {
            let delivered = catch_unwind(AssertUnwindSafe(|| {
                self.sink
                    .on_value_changed(point, value, Status::Good, *timestamp)
            }));
            if self.record_delivery(point, delivered, "value changed", &mut report) {
                report.delivered += 1;
                SAMPLES_DELIVERED.inc();
            }
        }

        for point in &generate {
            let delivered = catch_unwind(AssertUnwindSafe(|| self.sink.on_generate_values(point)));
            if self.record_delivery(point, delivered, "generate values", &mut report) {
                report.generate_requests += 1;
            }
        }

        debug!(
            points = report.points,
            delivered = report.delivered,
            generate = report.generate_requests,
            failures = report.failures,
            "Sampling tick"
        );
        report
    }

    fn record_delivery(
        &self,
        point: &PointRef,
        outcome: std::thread::Result<Result<()>>,
        what: &'static str,
        report: &mut TickReport,
    ) -> bool {
        match outcome {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                report.failures += 1;
                SAMPLE_FAILURES.inc();
                warn!(point = %point.id(), error = %e, callback = what, "Notification failed");
                false
            }
            Err(_) => {
                report.failures += 1;
                SAMPLE_FAILURES.inc();
                warn!(point = %point.id(), callback = what, "Notification callback panicked");
                false
            }
        }
    }
}

/// The point itself, or failing that its immediate parent, when it produces
/// its own values.
fn self_generator(point: &PointRef) -> Option<&PointRef> {
    if point.is_self_generating() {
        return Some(point);
    }
    point.parent().filter(|parent| parent.is_self_generating())
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct SamplingScheduler {
    shared: Arc<SchedulerShared>,
    runtime: Handle,
    floor: Duration,
}

impl SamplingScheduler {
    pub fn new(
        dispatcher: Arc<ValueDispatcher>,
        sink: Arc<dyn NotificationSink>,
        runtime: Handle,
        floor: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                dispatcher,
                sink,
                registry: Mutex::new(Registry::default()),
            }),
            runtime,
            floor,
        }
    }

    /// Register or update `key`. A negative interval removes the key.
    /// Fails with [`SimError::OutOfService`] after shutdown.
    pub fn start_monitoring(
        &self,
        key: MonitorKey,
        interval_ms: i64,
        point: PointRef,
    ) -> Result<()> {
        let Ok(interval_ms) = u64::try_from(interval_ms) else {
            self.stop_monitoring(key);
            return Ok(());
        };
        let mut registry = lock_unpoisoned(&self.shared.registry);
        if registry.closed {
            return Err(SimError::OutOfService);
        }
        debug!(key = key.0, point = %point.id(), interval_ms, "Start monitoring");
        registry
            .registrations
            .insert(key, MonitorRegistration { point, interval_ms });
        registry.invalidate();
        self.reschedule(&mut registry);
        Ok(())
    }

    /// Remove `key`; `false` when it was not registered.
    pub fn stop_monitoring(&self, key: MonitorKey) -> bool {
        let mut registry = lock_unpoisoned(&self.shared.registry);
        if registry.registrations.remove(&key).is_none() {
            return false;
        }
        debug!(key = key.0, "Stop monitoring");
        registry.invalidate();
        self.reschedule(&mut registry);
        true
    }

    /// Override the timer period until the next registration change.
    /// Negative disables the timer.
    pub fn set_sampling_interval(&self, interval_ms: i64) -> Result<()> {
        let mut registry = lock_unpoisoned(&self.shared.registry);
        if registry.closed {
            return Err(SimError::OutOfService);
        }
        registry.interval_override = Some(match u64::try_from(interval_ms) {
            Ok(ms) => IntervalOverride::Period(Duration::from_millis(ms).max(self.floor)),
            Err(_) => IntervalOverride::Disabled,
        });
        self.reschedule(&mut registry);
        Ok(())
    }

    /// Run one sampling tick on the calling thread.
    pub fn tick(&self) -> TickReport {
        self.shared.tick()
    }

    pub fn is_timer_active(&self) -> bool {
        lock_unpoisoned(&self.shared.registry).timer.is_some()
    }

    /// Current timer period, `None` while disabled
    pub fn period(&self) -> Option<Duration> {
        lock_unpoisoned(&self.shared.registry)
            .timer
            .as_ref()
            .map(PeriodicTimer::period)
    }

    pub fn registration_count(&self) -> usize {
        lock_unpoisoned(&self.shared.registry).registrations.len()
    }

    /// Distinct points sampled per tick
    pub fn distinct_points(&self) -> usize {
        lock_unpoisoned(&self.shared.registry).sampling_set().len()
    }

    /// Drop every registration and tear down the timer for good.
    pub fn shutdown(&self) {
        let mut registry = lock_unpoisoned(&self.shared.registry);
        registry.closed = true;
        registry.registrations.clear();
        registry.invalidate();
        if registry.timer.take().is_some() {
            info!("Sampling timer stopped");
        }
        MONITORED_POINTS.set(0);
    }

    fn reschedule(&self, registry: &mut Registry) {
        let period = if registry.closed || registry.registrations.is_empty() {
            None
        } else {
            match registry.interval_override {
                Some(IntervalOverride::Disabled) => None,
                Some(IntervalOverride::Period(period)) => Some(period),
                None => registry
                    .registrations
                    .values()
                    .map(|r| Duration::from_millis(r.interval_ms).max(self.floor))
                    .min(),
            }
        };

        match period {
            None => {
                if registry.timer.take().is_some() {
                    info!("Sampling timer disabled");
                }
            }
            Some(period) => {
                if registry.timer.as_ref().map(PeriodicTimer::period) == Some(period) {
                    return;
                }
                let shared: Weak<SchedulerShared> = Arc::downgrade(&self.shared);
                // replacing drops the old timer
                registry.timer = Some(PeriodicTimer::start(
                    &self.runtime,
                    "sampling",
                    period,
                    move || {
                        if let Some(shared) = shared.upgrade() {
                            shared.tick();
                        }
                    },
                ));
                info!(period_ms = period.as_millis() as u64, "Sampling period changed");
            }
        }
    }
}
