//! # via-pointsim - Synthetic Data-Point Simulator
//!
//! Manufactures plausible, correctly typed values for a large catalogue of
//! data points, samples them on one adaptive timer and keeps a bounded,
//! pageable history per archived point.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          via-pointsim                               │
//! │                                                                     │
//! │   ┌─────────────────────────────────────────────────────────────┐   │
//! │   │                    SimulationEngine                         │   │
//! │   │                                                             │   │
//! │   │  ┌───────────────┐  ┌───────────────┐  ┌────────────────┐   │   │
//! │   │  │   Dispatcher  │◀─│   Scheduler   │  │ HistoryArchive │   │   │
//! │   │  │ (categories)  │  │ (shared timer)│  │ (append timer) │   │   │
//! │   │  └───────┬───────┘  └───────┬───────┘  └────────┬───────┘   │   │
//! │   │          ▼                  ▼                   ▼           │   │
//! │   │  RandomValueGenerator  NotificationSink  ContinuationPoints │   │
//! │   └─────────────────────────────────────────────────────────────┘   │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Design Principles
//!
//! 1. **Tag-driven generation** - A point's category tag alone decides the
//!    shape of its values. Unknown tags produce nothing.
//!
//! 2. **One timer per concern** - All monitored points share one sampling
//!    timer whose period follows the fastest subscriber; all archived points
//!    share one append timer.
//!
//! 3. **Lock, then notify** - Ticks scan the registry under its lock and
//!    deliver notifications after releasing it, so callbacks may re-enter.
//!
//! 4. **Cursors are values** - History reads hand back a cursor; the engine
//!    parks it behind an opaque continuation token between calls.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use via_pointsim::{
//!     Category, ChannelSink, MonitorKey, Point, ReadRawDetails, ScalarType, SimConfig,
//!     SimulationEngine,
//! };
//!
//! # async fn run() -> via_pointsim::Result<()> {
//! let (sink, notifications) = ChannelSink::bounded(1024);
//! let engine = SimulationEngine::new(SimConfig::default(), Arc::new(sink))?;
//!
//! let point = Point::new("Scalar_Int32", Category::Scalar(ScalarType::Int32).tag()).into_ref();
//! engine.start_monitoring(MonitorKey(1), 250, point.clone())?;
//! engine.enable_history(&point)?;
//!
//! let page = engine.begin_paged_read(point.id(), &ReadRawDetails::default(), None)?;
//! assert_eq!(page.values.len(), 1000);
//! # let _ = notifications;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod generator;
pub mod history;
pub mod metrics;
pub mod scheduler;
pub mod timer;

pub use config::{HistoryConfig, SamplingConfig, SimConfig};
pub use crate::core::{Point, PointId, PointRef, PointState, ScalarType, Status, Value};
pub use dispatch::{Category, CompositeKind, EuRange, ValueDispatcher, validate_write};
pub use engine::{EngineState, PagedRead, SimulationEngine};
pub use error::{Result, SimError};
pub use generator::RandomValueGenerator;
pub use history::{
    ContinuationPoints, ContinuationToken, HistoryArchive, HistoryCursor, HistoryEntry,
    HistoryPage, HistoryReader, HistoryValue, ReadRawDetails, TimestampsToReturn,
};
pub use scheduler::{
    ChannelSink, MonitorKey, MonitorRegistration, Notification, NotificationSink,
    SamplingScheduler, TickReport,
};
