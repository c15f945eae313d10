//! Dashboard Views
//!
//! Headless counterparts of the console's dashboard widgets. Each view
//! owns a [`RefreshScheduler`](crate::scheduler::RefreshScheduler) while
//! mounted and exposes a summary for the render layer.
//!
//! - **deployments**: pending / in progress / finished-since-cutoff counts
//! - **devices**: accepted, pending and active counts with the daily delta
//! - **report**: one deployment refreshed until it finishes

pub mod deployments;
pub mod devices;
pub mod report;

pub use deployments::{DeploymentsDashboard, DeploymentsSummary};
pub use devices::{DevicesDashboard, DevicesSummary};
pub use report::{DeploymentReport, ReportSnapshot};

use std::time::Duration;
use thiserror::Error;

/// Errors from mounting or driving a view
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DashboardError {
    #[error("{0} is already mounted")]
    AlreadyMounted(&'static str),
}

/// Result type alias for dashboard operations
pub type DashboardResult<T> = Result<T, DashboardError>;

/// Refresh timing of one view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOptions {
    pub interval: Duration,
    pub retry_delay: Option<Duration>,
}

impl RefreshOptions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            retry_delay: None,
        }
    }

    /// Set the retry delay (builder pattern)
    pub fn retry_delay(mut self, delay: Option<Duration>) -> Self {
        self.retry_delay = delay;
        self
    }
}
