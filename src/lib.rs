//! # FleetPulse
//!
//! Refresh engine behind a device-fleet update console: keeps dashboard
//! counts in sync with the server by polling, and tracks what changed
//! since the user last looked.
//!
//! ## Features
//!
//! - **Polling with keyed retries**: one recurring fetch batch per view, at
//!   most one pending retry per failure cause, clean teardown
//! - **Daily activity deltas**: a 7 day rolling history of active devices
//! - **Session cutoffs**: "new since last visit" that stays stable for a
//!   whole session
//!
//! ## Modules
//!
//! - [`scheduler`]: refresh scheduling, retries and failure notices
//! - [`activity`]: rolling activity history
//! - [`cutoff`]: session cutoff establishment
//! - [`store`]: key/value persistence
//! - [`fleet`]: fetch collaborator, application state and a simulated backend
//! - [`dashboard`]: deployments, devices and deployment report views
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleetpulse::dashboard::{DeploymentsDashboard, RefreshOptions};
//! use fleetpulse::{CutoffEstablisher, FleetActions, FleetStore, LogNotifier, MemoryStore, SimulatedFleet};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let now = chrono::Utc::now();
//!     let api = Arc::new(SimulatedFleet::seeded(now).await);
//!     let actions = FleetActions::new(api, Arc::new(FleetStore::new()));
//!     let cutoff = CutoffEstablisher::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()));
//!
//!     let mut dashboard = DeploymentsDashboard::new(
//!         actions,
//!         &cutoff,
//!         Arc::new(LogNotifier),
//!         RefreshOptions::new(Duration::from_secs(30)),
//!         now,
//!     );
//!     dashboard.mount().unwrap();
//!     dashboard.scheduler().unwrap().wait_until_loaded().await;
//!
//!     println!("{:?}", dashboard.summary().await);
//!     dashboard.unmount();
//! }
//! ```

pub mod activity;
pub mod config;
pub mod cutoff;
pub mod dashboard;
pub mod fleet;
pub mod logging;
pub mod scheduler;
pub mod store;

// Re-export top-level types for convenience
pub use activity::{ActivityHistoryEntry, ActivityTracker, ActivityWindow};

pub use cutoff::{CutoffEstablisher, SessionMarker};

pub use scheduler::{
    BatchOutcome, FetchBatch, FetchFuture, LoadState, LogNotifier, Notice, NoticeBoard, Notifier,
    PollConfig, RefreshScheduler, StopHandle,
};

pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError, StoreResult};

pub use fleet::{
    Deployment, DeploymentStats, DeploymentStatus, Device, DeviceStatus, FetchError,
    FetchResult, FleetActions, FleetApi, FleetStore, SimulatedFleet,
};

pub use dashboard::{
    DashboardError, DeploymentReport, DeploymentsDashboard, DeploymentsSummary,
    DevicesDashboard, DevicesSummary, RefreshOptions, ReportSnapshot,
};

pub use config::{Config, ConfigError, LoggingConfig};
