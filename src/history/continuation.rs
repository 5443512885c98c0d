//! Continuation points: opaque tokens for unfinished history reads

use super::HistoryCursor;
use crate::error::SimError;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use xxhash_rust::xxh3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContinuationToken(u128);

impl ContinuationToken {
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for ContinuationToken {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u128::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| SimError::ContinuationInvalid)
    }
}

/// Bounded token → cursor map; the oldest cursor is evicted when full.
pub struct ContinuationPoints {
    capacity: usize,
    salt: u64,
    sequence: u64,
    cursors: VecDeque<(ContinuationToken, HistoryCursor)>,
}

impl ContinuationPoints {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            salt: rand::random(),
            sequence: 0,
            cursors: VecDeque::new(),
        }
    }

    /// Park `cursor` and mint its token.
    pub fn store(&mut self, cursor: HistoryCursor) -> ContinuationToken {
        self.sequence += 1;
        let mut key = cursor.point_id().as_str().as_bytes().to_vec();
        key.extend_from_slice(&self.sequence.to_le_bytes());
        let token = ContinuationToken(xxh3::xxh3_128_with_seed(&key, self.salt));

        if self.cursors.len() >= self.capacity {
            if let Some((evicted, _)) = self.cursors.pop_front() {
                debug!(token = %evicted, "Continuation point evicted");
            }
        }
        self.cursors.push_back((token, cursor));
        token
    }

    /// Remove and return the cursor parked under `token`.
    pub fn take(&mut self, token: ContinuationToken) -> Option<HistoryCursor> {
        let index = self.cursors.iter().position(|(t, _)| *t == token)?;
        self.cursors.remove(index).map(|(_, cursor)| cursor)
    }

    pub fn release(&mut self, token: ContinuationToken) -> bool {
        self.take(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    pub fn clear(&mut self) {
        self.cursors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PointId;
    use crate::history::read::fresh_cursor;
    use crate::history::ReadRawDetails;

    fn cursor(id: &str) -> HistoryCursor {
        fresh_cursor(&PointId::new(id), &ReadRawDetails::default(), &[])
    }

    #[test]
    fn test_take_is_single_use() {
        let mut points = ContinuationPoints::new(4);
        let token = points.store(cursor("a"));
        assert_eq!(points.take(token).unwrap().point_id().as_str(), "a");
        assert!(points.take(token).is_none());
    }

    #[test]
    fn test_oldest_evicted_when_full() {
        let mut points = ContinuationPoints::new(2);
        let first = points.store(cursor("a"));
        let second = points.store(cursor("a"));
        let third = points.store(cursor("b"));
        assert_ne!(first, second);
        assert_eq!(points.len(), 2);
        assert!(!points.release(first));
        assert!(points.release(second));
        assert!(points.release(third));
        assert!(points.is_empty());
    }

    #[test]
    fn test_token_text_round_trip() {
        let mut points = ContinuationPoints::new(1);
        let token = points.store(cursor("a"));
        assert_eq!(token.to_string().parse::<ContinuationToken>().unwrap(), token);
        assert_eq!(ContinuationToken::from_bytes(token.to_bytes()), token);
        assert!("not-hex".parse::<ContinuationToken>().is_err());
    }
}
