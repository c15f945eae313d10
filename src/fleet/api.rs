//! Fetch collaborator
//!
//! The backend seen from the dashboards: paged, idempotent reads keyed by
//! entity kind and status. Transport is out of scope; implementations
//! decide how requests reach the server.

use super::error::FetchResult;
use super::types::{Deployment, DeploymentPage, DevicePage, DeploymentStatus, DeviceStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read access to the update platform
#[async_trait]
pub trait FleetApi: Send + Sync {
    /// Deployments in `status`. `since` restricts finished deployments to
    /// those created after the given instant.
    async fn deployments_by_status(
        &self,
        status: DeploymentStatus,
        page: u32,
        per_page: u32,
        since: Option<DateTime<Utc>>,
    ) -> FetchResult<DeploymentPage>;

    /// Devices in `status`
    async fn devices_by_status(
        &self,
        status: DeviceStatus,
        page: u32,
        per_page: u32,
    ) -> FetchResult<DevicePage>;

    /// A single deployment with fresh stats
    async fn single_deployment(&self, id: &str) -> FetchResult<Deployment>;

    /// Number of devices in `status`
    async fn device_count(&self, status: DeviceStatus) -> FetchResult<u64> {
        Ok(self.devices_by_status(status, 1, 1).await?.total)
    }
}
