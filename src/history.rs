// Best time and rolling history of completed trials

use serde::{Deserialize, Serialize};

/// Number of completed trials kept in the history view
pub const HISTORY_SIZE: usize = 5;

/// One completed trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub time_ms: u64,
    pub miss: u32,
}

/// Rolling history, newest first
#[derive(Debug, Clone)]
pub struct HistoryTracker {
    records: Vec<HistoryRecord>,
    capacity: usize,
}

impl Default for HistoryTracker {
    fn default() -> Self {
        Self::new(HISTORY_SIZE)
    }
}

impl HistoryTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the front, dropping the oldest beyond capacity
    pub fn push(&mut self, record: HistoryRecord) {
        self.records.insert(0, record);
        self.records.truncate(self.capacity);
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    /// Fastest record over the history plus `current`
    ///
    /// Ties keep the earliest found, with `current` checked first.
    pub fn best(&self, current: Option<HistoryRecord>) -> Option<HistoryRecord> {
        current
            .into_iter()
            .chain(self.records.iter().copied())
            .fold(None, |best: Option<HistoryRecord>, r| match best {
                Some(b) if b.time_ms <= r.time_ms => Some(b),
                _ => Some(r),
            })
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(time_ms: u64, miss: u32) -> HistoryRecord {
        HistoryRecord { time_ms, miss }
    }

    #[test]
    fn test_history_is_newest_first_and_capped() {
        let mut history = HistoryTracker::default();
        for i in 1..=7 {
            history.push(rec(i * 1000, 0));
        }
        let times: Vec<u64> = history.records().iter().map(|r| r.time_ms).collect();
        assert_eq!(times, vec![7000, 6000, 5000, 4000, 3000]);
    }

    #[test]
    fn test_best_includes_current_trial() {
        let mut history = HistoryTracker::default();
        history.push(rec(9_000, 1));
        history.push(rec(7_500, 0));

        assert_eq!(history.best(None), Some(rec(7_500, 0)));
        assert_eq!(history.best(Some(rec(6_000, 2))), Some(rec(6_000, 2)));
    }

    #[test]
    fn test_best_ties_keep_first_found() {
        let mut history = HistoryTracker::default();
        history.push(rec(8_000, 3));
        history.push(rec(8_000, 1));
        assert_eq!(history.best(None), Some(rec(8_000, 1)));
        assert_eq!(history.best(Some(rec(8_000, 0))), Some(rec(8_000, 0)));
    }

    #[test]
    fn test_best_of_empty_is_none() {
        let history = HistoryTracker::new(0);
        assert_eq!(history.best(None), None);
    }
}
