//! Activity window data structures

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Number of daily entries retained
pub const DEFAULT_WINDOW_SIZE: usize = 7;

/// Count recorded for one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityHistoryEntry {
    /// Calendar day, serialized as `YYYY-MM-DD`
    pub date: NaiveDate,
    pub count: u64,
}

impl ActivityHistoryEntry {
    pub fn new(date: NaiveDate, count: u64) -> Self {
        Self { date, count }
    }
}

/// Newest-first sequence of daily entries, unique by date.
///
/// Serializes transparently as a JSON array so stored windows stay
/// readable by anything that understands the plain entry list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityWindow {
    entries: Vec<ActivityHistoryEntry>,
}

impl ActivityWindow {
    /// Build a window from arbitrary entries, restoring the ordering and
    /// uniqueness invariants. On duplicate dates the first occurrence wins.
    pub fn from_entries(mut entries: Vec<ActivityHistoryEntry>) -> Self {
        // Stable sort keeps the first occurrence of each date in front
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        entries.dedup_by_key(|entry| entry.date);
        Self { entries }
    }

    pub fn entries(&self) -> &[ActivityHistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry exists for `date`
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.entries.iter().any(|entry| entry.date == date)
    }

    /// Most recent entry dated strictly before `date`
    pub fn latest_before(&self, date: NaiveDate) -> Option<&ActivityHistoryEntry> {
        self.entries.iter().find(|entry| entry.date < date)
    }

    /// Insert an entry, keeping newest-first order. Returns `false` if the
    /// day is already recorded.
    pub fn record(&mut self, entry: ActivityHistoryEntry) -> bool {
        if self.contains(entry.date) {
            return false;
        }
        let position = self
            .entries
            .iter()
            .position(|existing| existing.date < entry.date)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
        true
    }

    /// Drop everything beyond the `size` newest entries
    pub fn truncate(&mut self, size: usize) {
        self.entries.truncate(size);
    }
}
