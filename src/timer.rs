//! Periodic background timer on an injected tokio runtime

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Calls `on_tick` every `period` until stopped or dropped.
///
/// The first tick fires one full period after start. Late ticks are skipped
/// rather than bunched up.
pub struct PeriodicTimer {
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PeriodicTimer {
    pub fn start<F>(runtime: &Handle, name: &'static str, period: Duration, on_tick: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let stopped = cancel.clone();
        // interval panics on a zero period
        let tick_period = period.max(Duration::from_millis(1));

        let task = runtime.spawn(async move {
            let mut interval = interval_at(Instant::now() + tick_period, tick_period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(timer = name, period_ms = tick_period.as_millis() as u64, "Timer started");
            loop {
                tokio::select! {
                    biased;
                    _ = stopped.cancelled() => break,
                    _ = interval.tick() => on_tick(),
                }
            }
            debug!(timer = name, "Timer stopped");
        });

        Self {
            name,
            period,
            cancel,
            task,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Cancel the timer. A tick already running finishes; no new tick starts.
    pub fn stop(self) {
        // Drop does the work
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            debug!(timer = self.name, "Timer cancelled");
        }
        self.cancel.cancel();
        self.task.abort();
    }
}
