//! Devices dashboard
//!
//! Refreshes device counts and records the active count once a day to show
//! how the fleet moved since the day before yesterday. Large fleets (more
//! accepted devices than the deployment device limit) are not refreshed at
//! all, the listing is too expensive to repeat.

use super::{DashboardError, DashboardResult, RefreshOptions};
use crate::activity::ActivityTracker;
use crate::fleet::{DeviceStatus, FleetActions};
use crate::scheduler::{
    operation, FetchBatch, FetchFuture, Notifier, PollConfig, RefreshScheduler,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default refresh period
pub const REFRESH_DEVICES_INTERVAL: Duration = Duration::from_secs(30);

const RETRY_KEY: &str = "devices";
const FAILURE_MESSAGE: &str = "Couldn't load devices.";

/// What the devices widgets render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicesSummary {
    pub accepted: u64,
    pub pending: u64,
    pub active: u64,
    pub inactive: u64,
    /// Change in active devices since the day before yesterday
    pub delta_activity: i64,
    /// Nothing accepted or pending yet, show the "connect a device" hint
    pub no_devices: bool,
    pub loading: bool,
}

pub struct DevicesDashboard {
    actions: FleetActions,
    tracker: Arc<ActivityTracker>,
    notifier: Arc<dyn Notifier>,
    options: RefreshOptions,
    delta: Arc<AtomicI64>,
    clock: fn() -> DateTime<Utc>,
    scheduler: Option<RefreshScheduler>,
}

impl DevicesDashboard {
    pub fn new(
        actions: FleetActions,
        tracker: Arc<ActivityTracker>,
        notifier: Arc<dyn Notifier>,
        options: RefreshOptions,
    ) -> Self {
        Self {
            actions,
            tracker,
            notifier,
            options,
            delta: Arc::new(AtomicI64::new(0)),
            clock: Utc::now,
            scheduler: None,
        }
    }

    /// Set the time source used to date activity records (builder pattern)
    pub fn clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Start polling
    pub fn mount(&mut self) -> DashboardResult<()> {
        if self.scheduler.is_some() {
            return Err(DashboardError::AlreadyMounted("devices dashboard"));
        }

        let mut config = PollConfig::new("devices", self.options.interval)
            .retry_key(RETRY_KEY)
            .failure_message(FAILURE_MESSAGE);
        if let Some(delay) = self.options.retry_delay {
            config = config.retry_delay(delay);
        }

        tracing::info!("Mounting devices dashboard");
        self.scheduler = Some(RefreshScheduler::start_polling(
            config,
            devices_batch(
                self.actions.clone(),
                Arc::clone(&self.tracker),
                Arc::clone(&self.delta),
                self.clock,
            ),
            Arc::clone(&self.notifier),
        ));
        Ok(())
    }

    pub fn unmount(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop_polling();
            tracing::info!("Unmounted devices dashboard");
        }
    }

    /// Refresh outside the regular schedule
    pub fn refresh_now(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.refresh_now();
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn scheduler(&self) -> Option<&RefreshScheduler> {
        self.scheduler.as_ref()
    }

    pub fn delta_activity(&self) -> i64 {
        self.delta.load(Ordering::SeqCst)
    }

    pub fn loading(&self) -> bool {
        self.scheduler.as_ref().map(|s| s.loading()).unwrap_or(true)
    }

    pub async fn summary(&self) -> DevicesSummary {
        let store = self.actions.store();
        let accepted = store.device_total(DeviceStatus::Accepted).await;
        let pending = store.device_total(DeviceStatus::Pending).await;

        DevicesSummary {
            accepted,
            pending,
            active: store.device_total(DeviceStatus::Active).await,
            inactive: store.device_total(DeviceStatus::Inactive).await,
            delta_activity: self.delta_activity(),
            no_devices: accepted + pending == 0,
            loading: self.loading(),
        }
    }
}

async fn over_device_limit(actions: &FleetActions) -> bool {
    let store = actions.store();
    store.device_total(DeviceStatus::Accepted).await > store.deployment_device_limit()
}

fn devices_batch(
    actions: FleetActions,
    tracker: Arc<ActivityTracker>,
    delta: Arc<AtomicI64>,
    clock: fn() -> DateTime<Utc>,
) -> impl FetchBatch {
    move || -> Vec<FetchFuture> {
        let accepted = {
            let actions = actions.clone();
            operation(async move {
                if over_device_limit(&actions).await {
                    tracing::debug!("Accepted devices above deployment limit, not refreshing");
                    return Ok(());
                }
                actions.get_all_devices_by_status(DeviceStatus::Accepted).await
            })
        };

        let counts = [DeviceStatus::Pending, DeviceStatus::Inactive]
            .into_iter()
            .map(|status| {
                let actions = actions.clone();
                operation(async move {
                    if over_device_limit(&actions).await {
                        return Ok(());
                    }
                    actions.get_device_count(status).await
                })
            });

        let active = {
            let actions = actions.clone();
            let tracker = Arc::clone(&tracker);
            let delta = Arc::clone(&delta);
            operation(async move {
                if over_device_limit(&actions).await {
                    return Ok(());
                }
                actions.get_device_count(DeviceStatus::Active).await?;

                let active = actions.store().device_total(DeviceStatus::Active).await;
                let change = tracker.record_and_diff(active, clock());
                delta.store(change, Ordering::SeqCst);
                Ok(())
            })
        };

        std::iter::once(accepted)
            .chain(counts)
            .chain(std::iter::once(active))
            .collect()
    }
}
