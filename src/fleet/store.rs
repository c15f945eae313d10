//! Application state store
//!
//! Central state the dashboards render from. Fetch actions write into it;
//! views only read. All mutations are whole-value replacements so repeated
//! fetches are idempotent.

use super::api::FleetApi;
use super::error::FetchResult;
use super::types::{Deployment, DeploymentStatus, Device, DeviceStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Accepted device count above which the devices dashboard stops polling
pub const DEFAULT_DEPLOYMENT_DEVICE_LIMIT: u64 = 5000;

/// Page size used when walking every device in a status
const DEVICE_PAGE_SIZE: u32 = 500;

#[derive(Debug, Default)]
struct FleetState {
    deployment_totals: HashMap<DeploymentStatus, u64>,
    device_totals: HashMap<DeviceStatus, u64>,
    devices: HashMap<DeviceStatus, Vec<Device>>,
    deployments: HashMap<String, Deployment>,
}

/// Shared, read-mostly application state
#[derive(Debug)]
pub struct FleetStore {
    state: RwLock<FleetState>,
    deployment_device_limit: u64,
}

impl FleetStore {
    pub fn new() -> Self {
        Self::with_device_limit(DEFAULT_DEPLOYMENT_DEVICE_LIMIT)
    }

    pub fn with_device_limit(deployment_device_limit: u64) -> Self {
        Self {
            state: RwLock::new(FleetState::default()),
            deployment_device_limit,
        }
    }

    pub fn deployment_device_limit(&self) -> u64 {
        self.deployment_device_limit
    }

    pub async fn set_deployment_total(&self, status: DeploymentStatus, total: u64) {
        self.state.write().await.deployment_totals.insert(status, total);
    }

    /// Total deployments in `status`, zero until first fetched
    pub async fn deployment_total(&self, status: DeploymentStatus) -> u64 {
        self.state
            .read()
            .await
            .deployment_totals
            .get(&status)
            .copied()
            .unwrap_or(0)
    }

    pub async fn set_device_total(&self, status: DeviceStatus, total: u64) {
        self.state.write().await.device_totals.insert(status, total);
    }

    /// Total devices in `status`, zero until first fetched
    pub async fn device_total(&self, status: DeviceStatus) -> u64 {
        self.state
            .read()
            .await
            .device_totals
            .get(&status)
            .copied()
            .unwrap_or(0)
    }

    /// Replace the device list for `status` (and its total)
    pub async fn set_devices(&self, status: DeviceStatus, devices: Vec<Device>) {
        let mut state = self.state.write().await;
        state.device_totals.insert(status, devices.len() as u64);
        state.devices.insert(status, devices);
    }

    pub async fn devices(&self, status: DeviceStatus) -> Vec<Device> {
        self.state
            .read()
            .await
            .devices
            .get(&status)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn upsert_deployment(&self, deployment: Deployment) {
        self.state
            .write()
            .await
            .deployments
            .insert(deployment.id.clone(), deployment);
    }

    pub async fn deployment(&self, id: &str) -> Option<Deployment> {
        self.state.read().await.deployments.get(id).cloned()
    }
}

impl Default for FleetStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch-then-store operations used by the dashboards.
///
/// Each action is idempotent: it reads from the API and overwrites the
/// corresponding slice of [`FleetStore`].
#[derive(Clone)]
pub struct FleetActions {
    api: Arc<dyn FleetApi>,
    store: Arc<FleetStore>,
}

impl FleetActions {
    pub fn new(api: Arc<dyn FleetApi>, store: Arc<FleetStore>) -> Self {
        Self { api, store }
    }

    pub fn store(&self) -> &Arc<FleetStore> {
        &self.store
    }

    /// Fetch one page of deployments and record the status total
    pub async fn get_deployments_by_status(
        &self,
        status: DeploymentStatus,
        page: u32,
        per_page: u32,
        since: Option<DateTime<Utc>>,
    ) -> FetchResult<()> {
        let result = self
            .api
            .deployments_by_status(status, page, per_page, since)
            .await?;

        for deployment in result.deployments {
            self.store.upsert_deployment(deployment).await;
        }
        self.store.set_deployment_total(status, result.total).await;
        Ok(())
    }

    /// Walk every page of devices in `status`
    pub async fn get_all_devices_by_status(&self, status: DeviceStatus) -> FetchResult<()> {
        let mut devices = Vec::new();
        let mut page = 1;

        loop {
            let result = self
                .api
                .devices_by_status(status, page, DEVICE_PAGE_SIZE)
                .await?;
            let fetched = result.devices.len();
            devices.extend(result.devices);

            if fetched < DEVICE_PAGE_SIZE as usize || devices.len() as u64 >= result.total {
                break;
            }
            page += 1;
        }

        tracing::debug!(%status, count = devices.len(), "Fetched devices");
        self.store.set_devices(status, devices).await;
        Ok(())
    }

    /// Fetch only the number of devices in `status`
    pub async fn get_device_count(&self, status: DeviceStatus) -> FetchResult<()> {
        let total = self.api.device_count(status).await?;
        self.store.set_device_total(status, total).await;
        Ok(())
    }

    /// Refresh a single deployment
    pub async fn get_single_deployment(&self, id: &str) -> FetchResult<()> {
        let deployment = self.api.single_deployment(id).await?;
        self.store.upsert_deployment(deployment).await;
        Ok(())
    }
}
