//! In-process fleet backend
//!
//! Implements [`FleetApi`] over in-memory data. Drives the `watch` command
//! and the tests, and can inject failures and latency so retry behavior is
//! observable without a server.

use super::api::FleetApi;
use super::error::{FetchError, FetchResult};
use super::types::{
    Deployment, DeploymentPage, DeploymentStats, DeploymentStatus, Device, DevicePage,
    DeviceStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

/// Devices silent for longer than this are reported as inactive
const INACTIVITY_THRESHOLD_HOURS: i64 = 24;

#[derive(Debug, Default)]
struct SimState {
    deployments: Vec<Deployment>,
    devices: Vec<Device>,
    unavailable: bool,
    /// Fail every n-th request
    fail_every: Option<u64>,
    latency: Option<std::time::Duration>,
    requests: u64,
}

/// Simulated update platform
#[derive(Debug, Default)]
pub struct SimulatedFleet {
    state: RwLock<SimState>,
}

impl SimulatedFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small fleet with deployments in every state
    pub async fn seeded(now: DateTime<Utc>) -> Self {
        let fleet = Self::new();

        for i in 0..24 {
            let seen = now - Duration::hours(i * 3);
            fleet
                .add_device(Device::new(format!("device-{i:03}"), DeviceStatus::Accepted, seen))
                .await;
        }
        for i in 0..3 {
            fleet
                .add_device(Device::new(format!("pending-{i:03}"), DeviceStatus::Pending, now))
                .await;
        }

        fleet
            .add_deployment(
                Deployment::new("dep-rollout", "release-2.1", now - Duration::hours(1))
                    .status(DeploymentStatus::InProgress)
                    .stats(DeploymentStats {
                        pending: 6,
                        downloading: 2,
                        ..DeploymentStats::default()
                    }),
            )
            .await;
        fleet
            .add_deployment(
                Deployment::new("dep-queued", "release-2.2", now).stats(DeploymentStats {
                    pending: 4,
                    ..DeploymentStats::default()
                }),
            )
            .await;
        fleet
            .add_deployment(
                Deployment::new("dep-nightly", "release-2.2", now + Duration::hours(8))
                    .status(DeploymentStatus::Scheduled),
            )
            .await;
        fleet
            .add_deployment(
                Deployment::new("dep-done", "release-2.0", now - Duration::days(2))
                    .finished_at(now - Duration::days(1)),
            )
            .await;

        fleet
    }

    pub async fn add_deployment(&self, deployment: Deployment) {
        self.state.write().await.deployments.push(deployment);
    }

    pub async fn add_device(&self, device: Device) {
        self.state.write().await.devices.push(device);
    }

    /// Make every request fail with [`FetchError::Unavailable`]
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Fail every `n`-th request (`None` disables)
    pub async fn set_fail_every(&self, n: Option<u64>) {
        self.state.write().await.fail_every = n.filter(|n| *n > 0);
    }

    /// Delay every response
    pub async fn set_latency(&self, latency: Option<std::time::Duration>) {
        self.state.write().await.latency = latency;
    }

    /// Number of requests served (including failed ones)
    pub async fn requests(&self) -> u64 {
        self.state.read().await.requests
    }

    /// Move every unfinished deployment one device further along
    pub async fn advance(&self, now: DateTime<Utc>) {
        let mut state = self.state.write().await;
        for deployment in state.deployments.iter_mut() {
            match deployment.status {
                DeploymentStatus::Pending if deployment.stats.pending > 0 => {
                    deployment.status = DeploymentStatus::InProgress;
                }
                DeploymentStatus::InProgress => {
                    let stats = &mut deployment.stats;
                    if stats.rebooting > 0 {
                        stats.rebooting -= 1;
                        stats.success += 1;
                    } else if stats.installing > 0 {
                        stats.installing -= 1;
                        stats.rebooting += 1;
                    } else if stats.downloading > 0 {
                        stats.downloading -= 1;
                        stats.installing += 1;
                    } else if stats.pending > 0 {
                        stats.pending -= 1;
                        stats.downloading += 1;
                    }

                    if stats.in_progress() == 0 {
                        deployment.status = DeploymentStatus::Finished;
                        deployment.finished = Some(now);
                    }
                }
                _ => {}
            }
        }
    }

    async fn begin_request(&self) -> FetchResult<()> {
        let latency = {
            let mut state = self.state.write().await;
            state.requests += 1;

            if state.unavailable {
                return Err(FetchError::Unavailable);
            }
            if let Some(n) = state.fail_every {
                if state.requests % n == 0 {
                    return Err(FetchError::Api {
                        status: 500,
                        message: "injected failure".to_string(),
                    });
                }
            }
            state.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

fn paginate<T: Clone>(items: &[T], page: u32, per_page: u32) -> Vec<T> {
    let skip = (page.max(1) as usize - 1) * per_page as usize;
    items.iter().skip(skip).take(per_page as usize).cloned().collect()
}

fn device_matches(device: &Device, status: DeviceStatus, now: DateTime<Utc>) -> bool {
    let active = now - device.updated_ts < Duration::hours(INACTIVITY_THRESHOLD_HOURS);
    match status {
        DeviceStatus::Active => device.status == DeviceStatus::Accepted && active,
        DeviceStatus::Inactive => device.status == DeviceStatus::Accepted && !active,
        other => device.status == other,
    }
}

#[async_trait]
impl FleetApi for SimulatedFleet {
    async fn deployments_by_status(
        &self,
        status: DeploymentStatus,
        page: u32,
        per_page: u32,
        since: Option<DateTime<Utc>>,
    ) -> FetchResult<DeploymentPage> {
        self.begin_request().await?;

        let state = self.state.read().await;
        let matching: Vec<Deployment> = state
            .deployments
            .iter()
            .filter(|d| d.status == status)
            .filter(|d| match since {
                Some(since) => d.created >= since,
                None => true,
            })
            .cloned()
            .collect();

        Ok(DeploymentPage {
            total: matching.len() as u64,
            deployments: paginate(&matching, page, per_page),
        })
    }

    async fn devices_by_status(
        &self,
        status: DeviceStatus,
        page: u32,
        per_page: u32,
    ) -> FetchResult<DevicePage> {
        self.begin_request().await?;

        let now = Utc::now();
        let state = self.state.read().await;
        let matching: Vec<Device> = state
            .devices
            .iter()
            .filter(|d| device_matches(d, status, now))
            .cloned()
            .collect();

        Ok(DevicePage {
            total: matching.len() as u64,
            devices: paginate(&matching, page, per_page),
        })
    }

    async fn single_deployment(&self, id: &str) -> FetchResult<Deployment> {
        self.begin_request().await?;

        let state = self.state.read().await;
        state
            .deployments
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_since_filters_finished() {
        let now = Utc::now();
        let fleet = SimulatedFleet::new();
        fleet
            .add_deployment(Deployment::new("old", "r", now - Duration::days(3)).finished_at(now))
            .await;
        fleet
            .add_deployment(Deployment::new("new", "r", now).finished_at(now))
            .await;

        let all = fleet
            .deployments_by_status(DeploymentStatus::Finished, 1, 10, None)
            .await
            .unwrap();
        let recent = fleet
            .deployments_by_status(
                DeploymentStatus::Finished,
                1,
                10,
                Some(now - Duration::hours(1)),
            )
            .await
            .unwrap();

        assert_eq!(all.total, 2);
        assert_eq!(recent.total, 1);
        assert_eq!(recent.deployments[0].id, "new");
    }

    #[tokio::test]
    async fn test_active_and_inactive_devices() {
        let now = Utc::now();
        let fleet = SimulatedFleet::new();
        fleet
            .add_device(Device::new("fresh", DeviceStatus::Accepted, now))
            .await;
        fleet
            .add_device(Device::new("stale", DeviceStatus::Accepted, now - Duration::days(3)))
            .await;

        assert_eq!(fleet.device_count(DeviceStatus::Active).await.unwrap(), 1);
        assert_eq!(fleet.device_count(DeviceStatus::Inactive).await.unwrap(), 1);
        assert_eq!(fleet.device_count(DeviceStatus::Accepted).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fail_every() {
        let fleet = SimulatedFleet::new();
        fleet.set_fail_every(Some(2)).await;

        assert!(fleet.device_count(DeviceStatus::Pending).await.is_ok());
        assert!(fleet.device_count(DeviceStatus::Pending).await.is_err());
        assert!(fleet.device_count(DeviceStatus::Pending).await.is_ok());
        assert_eq!(fleet.requests().await, 3);
    }

    #[tokio::test]
    async fn test_advance_finishes_deployment() {
        let now = Utc::now();
        let fleet = SimulatedFleet::new();
        fleet
            .add_deployment(
                Deployment::new("d", "r", now)
                    .status(DeploymentStatus::InProgress)
                    .stats(DeploymentStats {
                        pending: 1,
                        ..DeploymentStats::default()
                    }),
            )
            .await;

        for _ in 0..4 {
            fleet.advance(now).await;
        }

        let deployment = fleet.single_deployment("d").await.unwrap();
        assert!(deployment.is_finished());
        assert_eq!(deployment.stats.success, 1);
    }

    #[tokio::test]
    async fn test_unknown_deployment() {
        let fleet = SimulatedFleet::new();
        assert_eq!(
            fleet.single_deployment("missing").await,
            Err(FetchError::NotFound("missing".to_string()))
        );
    }
}
