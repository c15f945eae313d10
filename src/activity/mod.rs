//! Activity History
//!
//! Rolling daily snapshots of a tracked count (active devices, by default)
//! used to show a day-over-day delta on the devices dashboard.
//!
//! - **types**: [`ActivityHistoryEntry`] and the [`ActivityWindow`] invariants
//! - **tracker**: [`ActivityTracker`], the read-modify-write cycle against a
//!   [`KeyValueStore`](crate::store::KeyValueStore)

pub mod tracker;
pub mod types;

pub use tracker::ActivityTracker;
pub use types::{ActivityHistoryEntry, ActivityWindow, DEFAULT_WINDOW_SIZE};
