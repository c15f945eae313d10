//! Activity Tracker
//!
//! Records one count per calendar day and reports how far the current count
//! has moved since the most recent day before yesterday.

use super::types::{ActivityHistoryEntry, ActivityWindow, DEFAULT_WINDOW_SIZE};
use crate::store::{read_json, write_json, KeyValueStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Storage key used by the devices dashboard
pub const DEFAULT_HISTORY_KEY: &str = "dailyDeviceActivityCount";

/// Maintains the rolling activity window in a key/value store
pub struct ActivityTracker {
    store: Arc<dyn KeyValueStore>,
    key: String,
    window_size: usize,
}

impl ActivityTracker {
    /// Create a tracker with the default key and a 7 day window
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_options(store, DEFAULT_HISTORY_KEY, DEFAULT_WINDOW_SIZE)
    }

    /// Create a tracker with a custom key and window size
    pub fn with_options(
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        window_size: usize,
    ) -> Self {
        debug_assert!(window_size > 0, "activity window must hold at least one day");
        Self {
            store,
            key: key.into(),
            window_size: window_size.max(1),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Record today's count (once per day) and return the delta against the
    /// most recent entry dated before yesterday, or against zero when there
    /// is none.
    ///
    /// Never fails: unreadable history is reset to an empty window and write
    /// failures are logged.
    pub fn record_and_diff(&self, current_count: u64, now: DateTime<Utc>) -> i64 {
        debug_assert!(
            i64::try_from(current_count).is_ok(),
            "activity count {current_count} does not fit a signed delta"
        );
        let today = now.date_naive();
        let yesterday = (now - Duration::days(1)).date_naive();

        let mut window = self.load();

        let previous_count = window
            .latest_before(yesterday)
            .map(|entry| entry.count)
            .unwrap_or(0);

        if window.record(ActivityHistoryEntry::new(today, current_count)) {
            tracing::debug!(key = %self.key, %today, count = current_count, "Recorded daily activity");
        }

        window.truncate(self.window_size);
        if let Err(e) = write_json(self.store.as_ref(), &self.key, &window) {
            tracing::warn!(key = %self.key, error = %e, "Failed to persist activity history");
        }

        count_delta(current_count, previous_count)
    }

    /// Current window as stored, normalized
    pub fn history(&self) -> ActivityWindow {
        match read_json::<Vec<ActivityHistoryEntry>>(self.store.as_ref(), &self.key) {
            Ok(entries) => ActivityWindow::from_entries(entries.unwrap_or_default()),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Unreadable activity history");
                ActivityWindow::default()
            }
        }
    }

    fn load(&self) -> ActivityWindow {
        match read_json::<Vec<ActivityHistoryEntry>>(self.store.as_ref(), &self.key) {
            Ok(entries) => ActivityWindow::from_entries(entries.unwrap_or_default()),
            Err(StoreError::Decode { error, .. }) => {
                tracing::warn!(key = %self.key, %error, "Resetting corrupt activity history");
                let empty = ActivityWindow::default();
                if let Err(e) = write_json(self.store.as_ref(), &self.key, &empty) {
                    tracing::warn!(key = %self.key, error = %e, "Failed to reset activity history");
                }
                empty
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to read activity history");
                ActivityWindow::default()
            }
        }
    }
}

/// `current - previous`, with counts above `i64::MAX` clamped to it
fn count_delta(current: u64, previous: u64) -> i64 {
    let current = i64::try_from(current).unwrap_or(i64::MAX);
    let previous = i64::try_from(previous).unwrap_or(i64::MAX);
    current - previous
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{NaiveDate, TimeZone};

    fn create_tracker() -> (ActivityTracker, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (ActivityTracker::new(store.clone()), store)
    }

    fn noon(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed(store: &MemoryStore, entries: &[ActivityHistoryEntry]) {
        write_json(store, DEFAULT_HISTORY_KEY, entries).unwrap();
    }

    #[test]
    fn test_empty_window_bootstrap() {
        let (tracker, _store) = create_tracker();

        let delta = tracker.record_and_diff(10, noon(2024, 5, 10));

        assert_eq!(delta, 10);
        let history = tracker.history();
        assert_eq!(
            history.entries(),
            &[ActivityHistoryEntry::new(date(2024, 5, 10), 10)]
        );
    }

    #[test]
    fn test_delta_against_day_before_yesterday() {
        let (tracker, store) = create_tracker();
        seed(&store, &[ActivityHistoryEntry::new(date(2024, 5, 8), 50)]);

        let delta = tracker.record_and_diff(70, noon(2024, 5, 10));

        assert_eq!(delta, 20);
        assert_eq!(
            tracker.history().entries(),
            &[
                ActivityHistoryEntry::new(date(2024, 5, 10), 70),
                ActivityHistoryEntry::new(date(2024, 5, 8), 50),
            ]
        );
    }

    #[test]
    fn test_yesterday_entry_is_not_a_baseline() {
        let (tracker, store) = create_tracker();
        seed(
            &store,
            &[
                ActivityHistoryEntry::new(date(2024, 5, 9), 65),
                ActivityHistoryEntry::new(date(2024, 5, 7), 40),
                ActivityHistoryEntry::new(date(2024, 5, 6), 30),
            ],
        );

        // Baseline is the newest entry strictly before 2024-05-09
        assert_eq!(tracker.record_and_diff(70, noon(2024, 5, 10)), 30);
    }

    #[test]
    fn test_same_day_calls_are_idempotent() {
        let (tracker, store) = create_tracker();
        seed(&store, &[ActivityHistoryEntry::new(date(2024, 5, 8), 50)]);
        let now = noon(2024, 5, 10);

        assert_eq!(tracker.record_and_diff(70, now), 20);
        let after_first = store.get(DEFAULT_HISTORY_KEY).unwrap();

        assert_eq!(tracker.record_and_diff(90, now + Duration::hours(3)), 40);
        assert_eq!(tracker.record_and_diff(55, now + Duration::hours(6)), 5);

        assert_eq!(store.get(DEFAULT_HISTORY_KEY).unwrap(), after_first);
        assert_eq!(tracker.history().len(), 2);
    }

    #[test]
    fn test_window_never_exceeds_seven_days() {
        let (tracker, _store) = create_tracker();
        let start = noon(2024, 1, 1);

        for day in 0..20 {
            tracker.record_and_diff(day as u64, start + Duration::days(day));
            assert!(tracker.history().len() <= DEFAULT_WINDOW_SIZE);
        }

        let history = tracker.history();
        assert_eq!(history.len(), DEFAULT_WINDOW_SIZE);
        assert_eq!(history.entries()[0].date, date(2024, 1, 20));
        assert_eq!(history.entries()[6].date, date(2024, 1, 14));
    }

    #[test]
    fn test_oversized_stored_window_is_truncated() {
        let (tracker, store) = create_tracker();
        let entries: Vec<_> = (1..=9)
            .map(|d| ActivityHistoryEntry::new(date(2024, 2, d), d as u64))
            .collect();
        seed(&store, &entries);

        // Already recorded today, still truncated on write
        tracker.record_and_diff(9, noon(2024, 2, 9));
        assert_eq!(tracker.history().len(), DEFAULT_WINDOW_SIZE);
    }

    #[test]
    fn test_corrupt_storage_self_heals() {
        let (tracker, store) = create_tracker();
        store.set(DEFAULT_HISTORY_KEY, "[{\"date\": \"2024-").unwrap();

        let delta = tracker.record_and_diff(12, noon(2024, 5, 10));

        assert_eq!(delta, 12);
        let raw = store.get(DEFAULT_HISTORY_KEY).unwrap().unwrap();
        assert_eq!(raw, r#"[{"date":"2024-05-10","count":12}]"#);
    }

    #[test]
    fn test_negative_delta() {
        let (tracker, store) = create_tracker();
        seed(&store, &[ActivityHistoryEntry::new(date(2024, 5, 1), 100)]);

        assert_eq!(tracker.record_and_diff(40, noon(2024, 5, 10)), -60);
    }

    #[test]
    fn test_count_delta_clamps_huge_counts() {
        assert_eq!(count_delta(70, 50), 20);
        assert_eq!(count_delta(u64::MAX, 0), i64::MAX);
        assert_eq!(count_delta(0, u64::MAX), -i64::MAX);
        assert_eq!(count_delta(u64::MAX, u64::MAX), 0);
    }

    #[test]
    fn test_huge_stored_baseline_does_not_wrap() {
        let (tracker, store) = create_tracker();
        seed(&store, &[ActivityHistoryEntry::new(date(2024, 5, 1), u64::MAX)]);

        assert_eq!(tracker.record_and_diff(10, noon(2024, 5, 10)), 10 - i64::MAX);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "does not fit a signed delta"))]
    fn test_count_above_signed_range() {
        let (tracker, _store) = create_tracker();

        assert_eq!(tracker.record_and_diff(u64::MAX, noon(2024, 5, 10)), i64::MAX);
    }

    #[test]
    fn test_custom_window_size() {
        let store = Arc::new(MemoryStore::new());
        let tracker = ActivityTracker::with_options(store, "history", 2);

        for day in 1..=4 {
            tracker.record_and_diff(day, noon(2024, 6, day as u32));
        }
        assert_eq!(tracker.history().len(), 2);
    }
}
