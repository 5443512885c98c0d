//! Raw history reads and resumable cursors

use super::HistoryEntry;
use crate::core::{PointId, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which timestamps a read returns
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampsToReturn {
    Source,
    Server,
    #[default]
    Both,
    Neither,
}

/// Parameters of a raw read.
///
/// Bounds are inclusive and apply to the source timestamp. When both are
/// given and `start` is after `end`, values come back newest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadRawDetails {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Per-page limit; `None` or 0 means the archive's page limit
    pub max_values: Option<usize>,
    pub timestamps: TimestampsToReturn,
}

impl ReadRawDetails {
    pub fn is_reverse(&self) -> bool {
        matches!((self.start, self.end), (Some(start), Some(end)) if start > end)
    }

    fn bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        if self.is_reverse() {
            (self.end, self.start)
        } else {
            (self.start, self.end)
        }
    }

    fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        let (low, high) = self.bounds();
        low.is_none_or(|low| timestamp >= low) && high.is_none_or(|high| timestamp <= high)
    }

    fn page_size(&self, limit: usize) -> usize {
        match self.max_values {
            Some(n) if n > 0 => n.min(limit),
            _ => limit,
        }
    }
}

/// One value of a history page
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryValue {
    pub value: Option<Value>,
    pub source_timestamp: Option<DateTime<Utc>>,
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl HistoryValue {
    fn project(entry: &HistoryEntry, timestamps: TimestampsToReturn) -> Self {
        let (source, server) = match timestamps {
            TimestampsToReturn::Source => (true, false),
            TimestampsToReturn::Server => (false, true),
            TimestampsToReturn::Both => (true, true),
            TimestampsToReturn::Neither => (false, false),
        };
        Self {
            value: entry.value.clone(),
            source_timestamp: source.then_some(entry.source_timestamp),
            server_timestamp: server.then_some(entry.server_timestamp),
        }
    }
}

/// Position of an unfinished read, owned by the caller between pages.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryCursor {
    point_id: PointId,
    details: ReadRawDetails,
    /// Next entry index going forward, or exclusive upper index going
    /// backward
    position: usize,
}

impl HistoryCursor {
    pub fn point_id(&self) -> &PointId {
        &self.point_id
    }

    pub fn details(&self) -> &ReadRawDetails {
        &self.details
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistoryPage {
    pub values: Vec<HistoryValue>,
    /// `None` when the read is complete
    pub cursor: Option<HistoryCursor>,
}

impl HistoryPage {
    pub fn is_complete(&self) -> bool {
        self.cursor.is_none()
    }
}

pub(crate) fn fresh_cursor(
    point_id: &PointId,
    details: &ReadRawDetails,
    entries: &[HistoryEntry],
) -> HistoryCursor {
    HistoryCursor {
        point_id: point_id.clone(),
        details: details.clone(),
        position: if details.is_reverse() { entries.len() } else { 0 },
    }
}

/// Serve one page starting at `cursor`.
pub(crate) fn read_page(entries: &[HistoryEntry], mut cursor: HistoryCursor, limit: usize) -> HistoryPage {
    let details = &cursor.details;
    let page_size = details.page_size(limit);
    let mut values = Vec::with_capacity(page_size.min(entries.len()));
    let mut position = cursor.position.min(entries.len());

    let more = if details.is_reverse() {
        while position > 0 && values.len() < page_size {
            let entry = &entries[position - 1];
            if details.contains(entry.source_timestamp) {
                values.push(HistoryValue::project(entry, details.timestamps));
            }
            position -= 1;
        }
        entries[..position]
            .iter()
            .any(|e| details.contains(e.source_timestamp))
    } else {
        while position < entries.len() && values.len() < page_size {
            let entry = &entries[position];
            if details.contains(entry.source_timestamp) {
                values.push(HistoryValue::project(entry, details.timestamps));
            }
            position += 1;
        }
        entries[position..]
            .iter()
            .any(|e| details.contains(e.source_timestamp))
    };

    cursor.position = position;
    HistoryPage {
        values,
        cursor: more.then_some(cursor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn entries(n: usize) -> (DateTime<Utc>, Vec<HistoryEntry>) {
        let base = Utc::now();
        let entries = (0..n)
            .map(|i| HistoryEntry {
                value: Some(Value::Int32(i as i32)),
                source_timestamp: base + TimeDelta::seconds(i as i64),
                server_timestamp: base + TimeDelta::seconds(i as i64) + TimeDelta::milliseconds(5),
                is_modified: false,
            })
            .collect();
        (base, entries)
    }

    fn ints(page: &HistoryPage) -> Vec<i64> {
        page.values
            .iter()
            .map(|v| v.value.as_ref().and_then(Value::as_i64).unwrap())
            .collect()
    }

    #[test]
    fn test_forward_pages_resume() {
        let (_, entries) = entries(25);
        let id = PointId::new("p");
        let details = ReadRawDetails {
            max_values: Some(10),
            ..Default::default()
        };
        let first = read_page(&entries, fresh_cursor(&id, &details, &entries), 1000);
        assert_eq!(ints(&first), (0..10).collect::<Vec<_>>());
        let second = read_page(&entries, first.cursor.unwrap(), 1000);
        assert_eq!(ints(&second), (10..20).collect::<Vec<_>>());
        let third = read_page(&entries, second.cursor.unwrap(), 1000);
        assert_eq!(ints(&third), (20..25).collect::<Vec<_>>());
        assert!(third.is_complete());
    }

    #[test]
    fn test_exact_fit_completes() {
        let (_, entries) = entries(10);
        let id = PointId::new("p");
        let details = ReadRawDetails {
            max_values: Some(10),
            ..Default::default()
        };
        let page = read_page(&entries, fresh_cursor(&id, &details, &entries), 1000);
        assert_eq!(page.values.len(), 10);
        assert!(page.is_complete());
    }

    #[test]
    fn test_reverse_range_newest_first() {
        let (base, entries) = entries(30);
        let id = PointId::new("p");
        let details = ReadRawDetails {
            start: Some(base + TimeDelta::seconds(20)),
            end: Some(base + TimeDelta::seconds(5)),
            max_values: Some(4),
            timestamps: TimestampsToReturn::Server,
        };
        let mut cursor = Some(fresh_cursor(&id, &details, &entries));
        let mut seen = Vec::new();
        while let Some(c) = cursor {
            let page = read_page(&entries, c, 1000);
            assert!(page.values.iter().all(|v| v.source_timestamp.is_none()));
            assert!(page.values.iter().all(|v| v.server_timestamp.is_some()));
            seen.extend(ints(&page));
            cursor = page.cursor;
        }
        assert_eq!(seen, (5..=20).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_page_limit_caps_request() {
        let (_, entries) = entries(50);
        let id = PointId::new("p");
        let details = ReadRawDetails {
            max_values: Some(500),
            ..Default::default()
        };
        let page = read_page(&entries, fresh_cursor(&id, &details, &entries), 20);
        assert_eq!(page.values.len(), 20);
        assert!(!page.is_complete());
    }
}
