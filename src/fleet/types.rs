//! Fleet domain types
//!
//! The subset of the update platform's data the dashboards read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Scheduled,
    InProgress,
    Finished,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 4] = [
        DeploymentStatus::Pending,
        DeploymentStatus::Scheduled,
        DeploymentStatus::InProgress,
        DeploymentStatus::Finished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Scheduled => "scheduled",
            DeploymentStatus::InProgress => "inprogress",
            DeploymentStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization / connectivity state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Accepted,
    Pending,
    Preauthorized,
    Rejected,
    /// Accepted and checked in recently
    Active,
    /// Accepted but silent for longer than the inactivity threshold
    Inactive,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Accepted => "accepted",
            DeviceStatus::Pending => "pending",
            DeviceStatus::Preauthorized => "preauthorized",
            DeviceStatus::Rejected => "rejected",
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-device progress counters of a deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStats {
    pub pending: u64,
    pub downloading: u64,
    pub installing: u64,
    pub rebooting: u64,
    pub success: u64,
    pub failure: u64,
    pub aborted: u64,
}

impl DeploymentStats {
    /// Devices that have not reached a terminal state
    pub fn in_progress(&self) -> u64 {
        self.pending + self.downloading + self.installing + self.rebooting
    }

    pub fn total(&self) -> u64 {
        self.in_progress() + self.success + self.failure + self.aborted
    }
}

/// A deployment of one artifact to a set of devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub name: String,
    pub artifact_name: String,
    pub status: DeploymentStatus,
    pub created: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub stats: DeploymentStats,
}

impl Deployment {
    pub fn new(id: impl Into<String>, artifact_name: impl Into<String>, created: DateTime<Utc>) -> Self {
        let artifact_name = artifact_name.into();
        Self {
            id: id.into(),
            name: artifact_name.clone(),
            artifact_name,
            status: DeploymentStatus::Pending,
            created,
            finished: None,
            stats: DeploymentStats::default(),
        }
    }

    /// Set the status (builder pattern)
    pub fn status(mut self, status: DeploymentStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the progress counters (builder pattern)
    pub fn stats(mut self, stats: DeploymentStats) -> Self {
        self.stats = stats;
        self
    }

    /// Mark finished at `at` (builder pattern)
    pub fn finished_at(mut self, at: DateTime<Utc>) -> Self {
        self.status = DeploymentStatus::Finished;
        self.finished = Some(at);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some() || self.status == DeploymentStatus::Finished
    }
}

/// A device known to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub status: DeviceStatus,
    pub updated_ts: DateTime<Utc>,
}

impl Device {
    pub fn new(id: impl Into<String>, status: DeviceStatus, updated_ts: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            status,
            updated_ts,
        }
    }
}

/// One page of deployments plus the server-side total
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentPage {
    pub deployments: Vec<Deployment>,
    pub total: u64,
}

/// One page of devices plus the server-side total
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevicePage {
    pub devices: Vec<Device>,
    pub total: u64,
}
