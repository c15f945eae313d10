//! Refresh Scheduling
//!
//! Polling and retry orchestration for dashboard views:
//!
//! - **refresh**: [`RefreshScheduler`], one recurring batch per view with
//!   keyed retries and generation-guarded completions
//! - **retry**: per-key retry timer bookkeeping
//! - **notify**: the [`Notifier`] seam for user-facing failure notices

pub mod notify;
pub mod refresh;
mod retry;

pub use notify::{LogNotifier, Notice, NoticeBoard, Notifier};
pub use refresh::{
    operation, BatchOutcome, FetchBatch, FetchFuture, LoadState, PollConfig, RefreshScheduler,
    StopHandle,
};
