//! History Archive
//!
//! One bounded, append-only record per archived point. Records are seeded on
//! creation and grown by a single shared append timer:
//!
//! ```text
//!   create_record ──▶ seed (1001 entries, 10 s apart, ending now)
//!   append timer  ──▶ +1 entry per historizing record, until the cap
//!   read_page     ──▶ page + cursor ──▶ read_page ... ──▶ complete
//! ```
//!
//! Every access goes through one archive-wide lock. Readers get copies.

mod continuation;
pub(crate) mod read;

pub use continuation::{ContinuationPoints, ContinuationToken};
pub use read::{HistoryCursor, HistoryPage, HistoryValue, ReadRawDetails, TimestampsToReturn};

use crate::config::HistoryConfig;
use crate::core::{PointId, ScalarType, Value, lock_unpoisoned};
use crate::error::{Result, SimError};
use crate::metrics::{HISTORY_APPENDS, HISTORY_PAGES};
use crate::timer::PeriodicTimer;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryEntry {
    /// `None` for points whose type has no simulated history value
    pub value: Option<Value>,
    pub source_timestamp: DateTime<Utc>,
    pub server_timestamp: DateTime<Utc>,
    pub is_modified: bool,
}

#[derive(Clone, Debug)]
pub struct HistoryRecord {
    pub data_type: ScalarType,
    pub historizing: bool,
    pub entries: Vec<HistoryEntry>,
}

impl HistoryRecord {
    /// Back-dated seed ending at `now`. Fails when the span or the offsets
    /// leave the timestamp range.
    fn seeded(data_type: ScalarType, config: &HistoryConfig, now: DateTime<Utc>) -> Result<Self> {
        let count = config.seed_entries;
        let out_of_range =
            || SimError::Config("history seed leaves the timestamp range".to_string());
        let spacing = i64::try_from(config.seed_spacing_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .ok_or_else(out_of_range)?;
        let server_offset =
            TimeDelta::try_milliseconds(config.seed_server_offset_ms).ok_or_else(out_of_range)?;

        let entries = (0..=count)
            .map(|i| {
                let back = i32::try_from(count - i)
                    .ok()
                    .and_then(|steps| spacing.checked_mul(steps))
                    .ok_or_else(out_of_range)?;
                let source_timestamp = now.checked_sub_signed(back).ok_or_else(out_of_range)?;
                let server_timestamp = source_timestamp
                    .checked_add_signed(server_offset)
                    .ok_or_else(out_of_range)?;
                Ok(HistoryEntry {
                    value: history_value(data_type, count as i64 - i as i64),
                    source_timestamp,
                    server_timestamp,
                    is_modified: false,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            data_type,
            historizing: true,
            entries,
        })
    }

    fn append(&mut self, config: &HistoryConfig, now: DateTime<Utc>) -> bool {
        if !self.historizing || self.entries.len() >= config.max_entries {
            return false;
        }
        let next = self
            .entries
            .last()
            .and_then(|e| e.value.as_ref())
            .and_then(Value::as_i64)
            .map_or(0, |previous| previous + 1);
        let Some(server_timestamp) = TimeDelta::try_milliseconds(config.append_server_offset_ms)
            .and_then(|offset| now.checked_sub_signed(offset))
        else {
            warn!(
                offset_ms = config.append_server_offset_ms,
                "History append offset out of range"
            );
            return false;
        };
        self.entries.push(HistoryEntry {
            value: history_value(self.data_type, next),
            source_timestamp: now,
            server_timestamp,
            is_modified: false,
        });
        true
    }
}

fn history_value(data_type: ScalarType, raw: i64) -> Option<Value> {
    if data_type.is_history_integer() {
        Value::integer(data_type, raw)
    } else {
        None
    }
}

/// Immutable copy of one record's entries
#[derive(Clone, Debug)]
pub struct HistoryReader {
    point_id: PointId,
    data_type: ScalarType,
    entries: Arc<[HistoryEntry]>,
}

impl HistoryReader {
    pub fn point_id(&self) -> &PointId {
        &self.point_id
    }

    pub fn data_type(&self) -> ScalarType {
        self.data_type
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Default)]
struct ArchiveState {
    records: HashMap<PointId, HistoryRecord>,
    timer: Option<PeriodicTimer>,
    /// Set by `shutdown`; no record is created and no timer starts afterwards
    closed: bool,
}

struct ArchiveShared {
    config: HistoryConfig,
    state: Mutex<ArchiveState>,
}

impl ArchiveShared {
    fn append_tick(&self) -> usize {
        let now = Utc::now();
        let mut state = lock_unpoisoned(&self.state);
        let appended = state
            .records
            .values_mut()
            .map(|record| record.append(&self.config, now))
            .filter(|&grew| grew)
            .count();
        HISTORY_APPENDS.inc_by(appended as u64);
        debug!(appended, records = state.records.len(), "History append tick");
        appended
    }
}

pub struct HistoryArchive {
    shared: Arc<ArchiveShared>,
    runtime: Handle,
}

impl HistoryArchive {
    pub fn new(config: HistoryConfig, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(ArchiveShared {
                config,
                state: Mutex::new(ArchiveState::default()),
            }),
            runtime,
        }
    }

    /// Seed (or re-seed) the record of `point_id` and make sure the append
    /// timer runs. Fails with [`SimError::OutOfService`] after shutdown.
    pub fn create_record(&self, point_id: &PointId, data_type: ScalarType) -> Result<()> {
        let record = HistoryRecord::seeded(data_type, &self.shared.config, Utc::now())?;
        let mut state = lock_unpoisoned(&self.shared.state);
        if state.closed {
            return Err(SimError::OutOfService);
        }
        let replaced = state.records.insert(point_id.clone(), record).is_some();
        debug!(point = %point_id, ?data_type, replaced, "History record created");

        if state.timer.is_none() {
            let shared = Arc::downgrade(&self.shared);
            let period = self.shared.config.append_interval();
            state.timer = Some(PeriodicTimer::start(
                &self.runtime,
                "history",
                period,
                move || {
                    if let Some(shared) = shared.upgrade() {
                        shared.append_tick();
                    }
                },
            ));
            info!(period_ms = period.as_millis() as u64, "History append timer started");
        }
        Ok(())
    }

    /// Append one entry to every historizing record below the cap.
    /// Returns how many records grew.
    pub fn append_tick(&self) -> usize {
        self.shared.append_tick()
    }

    pub fn set_historizing(&self, point_id: &PointId, historizing: bool) -> Result<()> {
        let mut state = lock_unpoisoned(&self.shared.state);
        let record = state
            .records
            .get_mut(point_id)
            .ok_or_else(|| SimError::NoHistory(point_id.clone()))?;
        record.historizing = historizing;
        Ok(())
    }

    pub fn record_len(&self, point_id: &PointId) -> Option<usize> {
        lock_unpoisoned(&self.shared.state)
            .records
            .get(point_id)
            .map(|r| r.entries.len())
    }

    pub fn get_reader(&self, point_id: &PointId) -> Option<HistoryReader> {
        let state = lock_unpoisoned(&self.shared.state);
        let record = state.records.get(point_id)?;
        Some(HistoryReader {
            point_id: point_id.clone(),
            data_type: record.data_type,
            entries: record.entries.as_slice().into(),
        })
    }

    /// Serve one page. Without a cursor a new read starts; a cursor from a
    /// different point is rejected.
    pub fn read_page(
        &self,
        point_id: &PointId,
        details: &ReadRawDetails,
        cursor: Option<HistoryCursor>,
    ) -> Result<HistoryPage> {
        if cursor.as_ref().is_some_and(|c| c.point_id() != point_id) {
            return Err(SimError::ContinuationInvalid);
        }
        let state = lock_unpoisoned(&self.shared.state);
        let record = state
            .records
            .get(point_id)
            .ok_or_else(|| SimError::NoHistory(point_id.clone()))?;
        let cursor =
            cursor.unwrap_or_else(|| read::fresh_cursor(point_id, details, &record.entries));
        let page = read::read_page(&record.entries, cursor, self.shared.config.max_page_size);
        HISTORY_PAGES.inc();
        Ok(page)
    }

    pub fn is_timer_active(&self) -> bool {
        lock_unpoisoned(&self.shared.state).timer.is_some()
    }

    /// Stop the append timer for good; records stay readable.
    pub fn shutdown(&self) {
        let mut state = lock_unpoisoned(&self.shared.state);
        state.closed = true;
        if state.timer.take().is_some() {
            info!("History append timer stopped");
        }
    }
}
