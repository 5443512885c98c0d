//! Simulation Engine
//!
//! Façade over the dispatcher, the sampling scheduler and the history
//! archive. Owns both background timers and the continuation points of
//! unfinished history reads.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         SimulationEngine                         │
//! │  ┌─────────────────┐  ┌───────────────────┐  ┌────────────────┐  │
//! │  │ ValueDispatcher │◀─│ SamplingScheduler │  │ HistoryArchive │  │
//! │  └─────────────────┘  └─────────┬─────────┘  └───────┬────────┘  │
//! │                                 ▼                    ▼           │
//! │                         NotificationSink    ContinuationPoints   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

use crate::config::SimConfig;
use crate::core::{PointId, PointRef, Status, Value, lock_unpoisoned};
use crate::dispatch::{ValueDispatcher, validate_write};
use crate::error::{Result, SimError};
use crate::history::{
    ContinuationPoints, ContinuationToken, HistoryArchive, HistoryReader, HistoryValue,
    ReadRawDetails,
};
use crate::metrics::GENERATE_REQUESTS;
use crate::scheduler::{MonitorKey, NotificationSink, SamplingScheduler, TickReport};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, info};

/// One page of a history read
#[derive(Clone, Debug, PartialEq)]
pub struct PagedRead {
    pub values: Vec<HistoryValue>,
    /// Token to resume the read; `None` once it is complete
    pub continuation: Option<ContinuationToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    ShutDown,
}

pub struct SimulationEngine {
    config: SimConfig,
    dispatcher: Arc<ValueDispatcher>,
    scheduler: SamplingScheduler,
    archive: HistoryArchive,
    continuations: Mutex<ContinuationPoints>,
    shut_down: AtomicBool,
}

impl SimulationEngine {
    /// Build an engine on the current tokio runtime.
    ///
    /// Fails with [`SimError::OutOfService`] outside a runtime.
    pub fn new(config: SimConfig, sink: Arc<dyn NotificationSink>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| SimError::OutOfService)?;
        Self::with_runtime(config, sink, runtime)
    }

    pub fn with_runtime(
        config: SimConfig,
        sink: Arc<dyn NotificationSink>,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;
        let dispatcher = Arc::new(ValueDispatcher::from_seed(config.seed));
        let scheduler = SamplingScheduler::new(
            dispatcher.clone(),
            sink,
            runtime.clone(),
            config.sampling.min_interval(),
        );
        let archive = HistoryArchive::new(config.history.clone(), runtime);
        let continuations = ContinuationPoints::new(config.history.max_continuation_points);

        info!(
            seed = ?config.seed,
            min_interval_ms = config.sampling.min_interval_ms,
            "Simulation engine started"
        );

        Ok(Self {
            config,
            dispatcher,
            scheduler,
            archive,
            continuations: Mutex::new(continuations),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        if self.shut_down.load(Ordering::Acquire) {
            EngineState::ShutDown
        } else {
            EngineState::Running
        }
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state() {
            EngineState::Running => Ok(()),
            EngineState::ShutDown => Err(SimError::OutOfService),
        }
    }

    // --- Values ---

    /// Fresh value for `point`; `Ok(None)` when its category has no
    /// generation rule.
    pub fn generate(&self, point: &PointRef) -> Result<Option<Value>> {
        self.ensure_running()?;
        GENERATE_REQUESTS.inc();
        Ok(self.dispatcher.generate(point))
    }

    /// Validate `value` against the point's category and store it as the
    /// point's current value.
    pub fn write_value(&self, point: &PointRef, value: Value) -> Result<()> {
        self.ensure_running()?;
        let category = point
            .category()
            .ok_or(SimError::UnknownCategory(point.tag()))?;
        validate_write(point.id(), category, &value)?;
        point.set_state(value, Status::Good, Utc::now());
        debug!(point = %point.id(), "Value written");
        Ok(())
    }

    // --- Sampling ---

    pub fn start_monitoring(&self, key: MonitorKey, interval_ms: i64, point: PointRef) -> Result<()> {
        self.ensure_running()?;
        self.scheduler.start_monitoring(key, interval_ms, point)
    }

    pub fn stop_monitoring(&self, key: MonitorKey) -> Result<bool> {
        self.ensure_running()?;
        Ok(self.scheduler.stop_monitoring(key))
    }

    pub fn set_sampling_interval(&self, interval_ms: i64) -> Result<()> {
        self.ensure_running()?;
        self.scheduler.set_sampling_interval(interval_ms)
    }

    /// Drive one sampling tick synchronously.
    pub fn tick(&self) -> Result<TickReport> {
        self.ensure_running()?;
        Ok(self.scheduler.tick())
    }

    pub fn scheduler(&self) -> &SamplingScheduler {
        &self.scheduler
    }

    // --- History ---

    /// Start archiving `point`. Only single-valued scalar categories can be
    /// historized; enabling again re-seeds the record.
    pub fn enable_history(&self, point: &PointRef) -> Result<()> {
        self.ensure_running()?;
        let category = point
            .category()
            .ok_or(SimError::UnknownCategory(point.tag()))?;
        let data_type = category
            .element_type()
            .filter(|_| category.is_scalar_rank())
            .ok_or_else(|| SimError::NotHistorizable(point.id().clone()))?;
        self.archive.create_record(point.id(), data_type)
    }

    pub fn set_historizing(&self, point: &PointRef, historizing: bool) -> Result<()> {
        self.ensure_running()?;
        self.archive.set_historizing(point.id(), historizing)
    }

    pub fn get_history_reader(&self, point: &PointRef) -> Result<Option<HistoryReader>> {
        self.ensure_running()?;
        Ok(self.archive.get_reader(point.id()))
    }

    pub fn archive(&self) -> &HistoryArchive {
        &self.archive
    }

    /// Read one page of raw history, resuming from `token` when given.
    ///
    /// A token is consumed by the call, whatever the outcome. Unknown,
    /// expired or foreign tokens fail with [`SimError::ContinuationInvalid`].
    pub fn begin_paged_read(
        &self,
        point_id: &PointId,
        details: &ReadRawDetails,
        token: Option<ContinuationToken>,
    ) -> Result<PagedRead> {
        self.ensure_running()?;
        let cursor = match token {
            Some(token) => Some(
                lock_unpoisoned(&self.continuations)
                    .take(token)
                    .ok_or(SimError::ContinuationInvalid)?,
            ),
            None => None,
        };

        let page = self.archive.read_page(point_id, details, cursor)?;
        let continuation = page
            .cursor
            .map(|cursor| lock_unpoisoned(&self.continuations).store(cursor));

        Ok(PagedRead {
            values: page.values,
            continuation,
        })
    }

    /// Abandon an unfinished read.
    pub fn release_read(&self, token: ContinuationToken) -> Result<()> {
        self.ensure_running()?;
        if lock_unpoisoned(&self.continuations).release(token) {
            Ok(())
        } else {
            Err(SimError::ContinuationInvalid)
        }
    }

    // --- Lifecycle ---

    /// Stop both timers. Every later call fails with
    /// [`SimError::OutOfService`]; the scheduler and the archive refuse work
    /// that raced past the state check. Safe to call again.
    pub fn shutdown(&self) {
        let first = !self.shut_down.swap(true, Ordering::AcqRel);
        self.scheduler.shutdown();
        self.archive.shutdown();
        lock_unpoisoned(&self.continuations).clear();
        if first {
            info!("Simulation engine shut down");
        }
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Point, ScalarType};
    use crate::dispatch::{Category, CompositeKind};
    use crate::scheduler::ChannelSink;
    use std::time::Duration;

    fn engine() -> SimulationEngine {
        let (sink, _receiver) = ChannelSink::bounded(16);
        let config = SimConfig {
            seed: Some(7),
            ..Default::default()
        };
        SimulationEngine::new(config, Arc::new(sink)).unwrap()
    }

    #[test]
    fn test_needs_a_runtime() {
        let (sink, _receiver) = ChannelSink::bounded(1);
        let result = SimulationEngine::new(SimConfig::default(), Arc::new(sink));
        assert!(matches!(result, Err(SimError::OutOfService)));
    }

    #[tokio::test]
    async fn test_generate_unknown_is_none() {
        let engine = engine();
        let point = Point::new("weird", 12).into_ref();
        assert_eq!(engine.generate(&point).unwrap(), None);
    }

    #[tokio::test]
    async fn test_only_scalar_rank_historizes() {
        let engine = engine();
        let array = Point::new("arr", Category::Array(ScalarType::Int32).tag()).into_ref();
        assert!(matches!(
            engine.enable_history(&array),
            Err(SimError::NotHistorizable(_))
        ));
        let vector = Point::new("vec", Category::Composite(CompositeKind::Vector).tag()).into_ref();
        assert!(matches!(
            engine.enable_history(&vector),
            Err(SimError::NotHistorizable(_))
        ));
        let unknown = Point::new("unknown", 3).into_ref();
        assert!(matches!(
            engine.enable_history(&unknown),
            Err(SimError::UnknownCategory(3))
        ));

        let analog = Point::new("an", Category::AnalogScalar(ScalarType::Int32).tag()).into_ref();
        engine.enable_history(&analog).unwrap();
        assert_eq!(engine.get_history_reader(&analog).unwrap().unwrap().len(), 1001);
    }

    #[tokio::test]
    async fn test_write_value_validates() {
        let engine = engine();
        let point = Point::new("a", Category::AnalogScalar(ScalarType::Double).tag()).into_ref();
        assert!(matches!(
            engine.write_value(&point, Value::Double(100.5)),
            Err(SimError::OutOfRange { .. })
        ));
        engine.write_value(&point, Value::Double(-42.0)).unwrap();
        let state = point.state();
        assert_eq!(state.value, Some(Value::Double(-42.0)));
        assert_eq!(state.status, Status::Good);
    }

    #[tokio::test]
    async fn test_release_read_frees_token() {
        let engine = engine();
        let point = Point::new("h", Category::Scalar(ScalarType::Int32).tag()).into_ref();
        engine.enable_history(&point).unwrap();
        let details = ReadRawDetails {
            max_values: Some(10),
            ..Default::default()
        };
        let page = engine.begin_paged_read(point.id(), &details, None).unwrap();
        let token = page.continuation.unwrap();
        engine.release_read(token).unwrap();
        assert!(matches!(
            engine.release_read(token),
            Err(SimError::ContinuationInvalid)
        ));
        assert!(matches!(
            engine.begin_paged_read(point.id(), &details, Some(token)),
            Err(SimError::ContinuationInvalid)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_is_terminal() {
        let engine = engine();
        let point = Point::new("s", Category::Scalar(ScalarType::Boolean).tag()).into_ref();
        engine.start_monitoring(MonitorKey(1), 100, point.clone()).unwrap();
        engine.enable_history(&point).unwrap();
        assert!(engine.scheduler().is_timer_active());
        assert!(engine.archive().is_timer_active());

        engine.shutdown();
        assert_eq!(engine.state(), EngineState::ShutDown);
        assert!(!engine.scheduler().is_timer_active());
        assert!(!engine.archive().is_timer_active());
        assert!(matches!(engine.generate(&point), Err(SimError::OutOfService)));
        assert!(matches!(engine.tick(), Err(SimError::OutOfService)));
        assert!(matches!(
            engine.stop_monitoring(MonitorKey(1)),
            Err(SimError::OutOfService)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_racing_shutdown_cannot_restart_timers() {
        let engine = engine();
        let point = Point::new("r", Category::Scalar(ScalarType::Int32).tag()).into_ref();
        engine.shutdown();

        // a caller that passed the state check before shutdown lands here
        assert!(matches!(
            engine.scheduler().start_monitoring(MonitorKey(1), 100, point.clone()),
            Err(SimError::OutOfService)
        ));
        assert!(matches!(
            engine.archive().create_record(point.id(), ScalarType::Int32),
            Err(SimError::OutOfService)
        ));
        engine.shutdown();
        assert!(!engine.scheduler().is_timer_active());
        assert!(!engine.archive().is_timer_active());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(point.state().value.is_none());
    }
}
