//! Deployments dashboard
//!
//! Polls one request per deployment status. Finished deployments are only
//! counted from the session cutoff onwards, so the widget reads as "new
//! since your last visit".

use super::{DashboardError, DashboardResult, RefreshOptions};
use crate::cutoff::CutoffEstablisher;
use crate::fleet::{DeploymentStatus, FleetActions, FleetStore};
use crate::scheduler::{
    operation, FetchBatch, FetchFuture, Notifier, PollConfig, RefreshScheduler,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Default refresh period
pub const REFRESH_DEPLOYMENTS_INTERVAL: Duration = Duration::from_secs(30);

const RETRY_KEY: &str = "deployments";
const FAILURE_MESSAGE: &str = "Couldn't load deployments.";

/// What the deployments widget renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentsSummary {
    pub pending: u64,
    pub in_progress: u64,
    /// Finished since `cutoff`
    pub finished: u64,
    pub cutoff: DateTime<Utc>,
    pub loading: bool,
}

pub struct DeploymentsDashboard {
    actions: FleetActions,
    notifier: Arc<dyn Notifier>,
    options: RefreshOptions,
    cutoff: DateTime<Utc>,
    scheduler: Option<RefreshScheduler>,
}

impl DeploymentsDashboard {
    /// Create the view, pinning the session cutoff at `now`
    pub fn new(
        actions: FleetActions,
        cutoff: &CutoffEstablisher,
        notifier: Arc<dyn Notifier>,
        options: RefreshOptions,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            actions,
            notifier,
            options,
            cutoff: cutoff.establish_cutoff(now),
            scheduler: None,
        }
    }

    /// Start polling
    pub fn mount(&mut self) -> DashboardResult<()> {
        if self.scheduler.is_some() {
            return Err(DashboardError::AlreadyMounted("deployments dashboard"));
        }

        let mut config = PollConfig::new("deployments", self.options.interval)
            .retry_key(RETRY_KEY)
            .failure_message(FAILURE_MESSAGE);
        if let Some(delay) = self.options.retry_delay {
            config = config.retry_delay(delay);
        }

        tracing::info!(cutoff = %self.cutoff, "Mounting deployments dashboard");
        self.scheduler = Some(RefreshScheduler::start_polling(
            config,
            deployments_batch(self.actions.clone(), self.cutoff),
            Arc::clone(&self.notifier),
        ));
        Ok(())
    }

    /// Stop polling and drop pending retries
    pub fn unmount(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop_polling();
            tracing::info!("Unmounted deployments dashboard");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    pub fn scheduler(&self) -> Option<&RefreshScheduler> {
        self.scheduler.as_ref()
    }

    /// True until the first successful refresh (and while unmounted)
    pub fn loading(&self) -> bool {
        self.scheduler.as_ref().map(|s| s.loading()).unwrap_or(true)
    }

    pub async fn summary(&self) -> DeploymentsSummary {
        let store: &FleetStore = self.actions.store();
        DeploymentsSummary {
            pending: store.deployment_total(DeploymentStatus::Pending).await,
            in_progress: store.deployment_total(DeploymentStatus::InProgress).await,
            finished: store.deployment_total(DeploymentStatus::Finished).await,
            cutoff: self.cutoff,
            loading: self.loading(),
        }
    }
}

/// Cutoff at whole-second precision, rounded to nearest
fn rounded_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    let seconds = (at.timestamp_millis() + 500).div_euclid(1000);
    DateTime::from_timestamp(seconds, 0).unwrap_or(at)
}

/// One request per status. Scheduled deployments are left out: older
/// backends reject that status and it would keep the dashboard loading.
fn deployments_batch(actions: FleetActions, cutoff: DateTime<Utc>) -> impl FetchBatch {
    let since = rounded_to_seconds(cutoff);
    move || -> Vec<FetchFuture> {
        DeploymentStatus::ALL
            .into_iter()
            .filter(|status| *status != DeploymentStatus::Scheduled)
            .map(|status| {
                let actions = actions.clone();
                let since = (status == DeploymentStatus::Finished).then_some(since);
                operation(async move {
                    actions
                        .get_deployments_by_status(status, 1, 1, since)
                        .await
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{
        Deployment, DeploymentPage, DevicePage, DeviceStatus, FetchResult, FleetApi,
        SimulatedFleet,
    };
    use crate::scheduler::NoticeBoard;
    use crate::store::{write_json, MemoryStore};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Mutex;

    type Call = (DeploymentStatus, u32, u32, Option<DateTime<Utc>>);

    /// Records deployment queries before delegating
    struct RecordingApi {
        inner: SimulatedFleet,
        calls: Mutex<Vec<Call>>,
    }

    #[async_trait]
    impl FleetApi for RecordingApi {
        async fn deployments_by_status(
            &self,
            status: DeploymentStatus,
            page: u32,
            per_page: u32,
            since: Option<DateTime<Utc>>,
        ) -> FetchResult<DeploymentPage> {
            self.calls.lock().unwrap().push((status, page, per_page, since));
            self.inner
                .deployments_by_status(status, page, per_page, since)
                .await
        }

        async fn devices_by_status(
            &self,
            status: DeviceStatus,
            page: u32,
            per_page: u32,
        ) -> FetchResult<DevicePage> {
            self.inner.devices_by_status(status, page, per_page).await
        }

        async fn single_deployment(&self, id: &str) -> FetchResult<Deployment> {
            self.inner.single_deployment(id).await
        }
    }

    fn cutoff_establisher(previous: Option<DateTime<Utc>>) -> CutoffEstablisher {
        let durable = Arc::new(MemoryStore::new());
        if let Some(previous) = previous {
            write_json(&*durable, crate::cutoff::DEFAULT_CUTOFF_KEY, &previous).unwrap();
        }
        CutoffEstablisher::new(durable, Arc::new(MemoryStore::new()))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[test]
    fn test_rounded_to_seconds() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap();
        assert_eq!(rounded_to_seconds(base + ChronoDuration::milliseconds(499)), base);
        assert_eq!(
            rounded_to_seconds(base + ChronoDuration::milliseconds(500)),
            base + ChronoDuration::seconds(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_skips_scheduled_and_limits_finished() {
        let now = Utc::now();
        let previous = Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap()
            + ChronoDuration::milliseconds(700);
        let api = Arc::new(RecordingApi {
            inner: SimulatedFleet::new(),
            calls: Mutex::new(Vec::new()),
        });
        let actions = FleetActions::new(api.clone(), Arc::new(FleetStore::new()));
        let mut dashboard = DeploymentsDashboard::new(
            actions,
            &cutoff_establisher(Some(previous)),
            Arc::new(NoticeBoard::new()),
            RefreshOptions::new(REFRESH_DEPLOYMENTS_INTERVAL),
            now,
        );
        assert_eq!(dashboard.cutoff(), previous);

        dashboard.mount().unwrap();
        settle().await;

        let calls = api.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(status, ..)| *status != DeploymentStatus::Scheduled));
        for (status, page, per_page, since) in calls {
            assert_eq!((page, per_page), (1, 1));
            if status == DeploymentStatus::Finished {
                assert_eq!(since, Some(rounded_to_seconds(previous)));
            } else {
                assert!(since.is_none());
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_after_load() {
        let now = Utc::now();
        let fleet = SimulatedFleet::seeded(now).await;
        let actions = FleetActions::new(Arc::new(fleet), Arc::new(FleetStore::new()));
        let mut dashboard = DeploymentsDashboard::new(
            actions,
            &cutoff_establisher(Some(now - ChronoDuration::days(7))),
            Arc::new(NoticeBoard::new()),
            RefreshOptions::new(REFRESH_DEPLOYMENTS_INTERVAL),
            now,
        );
        assert!(dashboard.loading());

        dashboard.mount().unwrap();
        dashboard.scheduler().unwrap().wait_until_loaded().await;

        let summary = dashboard.summary().await;
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.in_progress, 1);
        assert_eq!(summary.finished, 1);
        assert!(!summary.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_shows_notice_until_unmount() {
        let fleet = SimulatedFleet::new();
        fleet.set_unavailable(true).await;
        let board = Arc::new(NoticeBoard::new());
        let actions = FleetActions::new(Arc::new(fleet), Arc::new(FleetStore::new()));
        let mut dashboard = DeploymentsDashboard::new(
            actions,
            &cutoff_establisher(None),
            board.clone(),
            RefreshOptions::new(REFRESH_DEPLOYMENTS_INTERVAL),
            Utc::now(),
        );

        dashboard.mount().unwrap();
        assert_eq!(
            dashboard.mount(),
            Err(DashboardError::AlreadyMounted("deployments dashboard"))
        );
        settle().await;

        assert!(dashboard.loading());
        let notice = board.current().unwrap();
        assert!(notice.message.starts_with("Couldn't load deployments."));
        assert_eq!(
            dashboard.scheduler().unwrap().pending_retry_keys(),
            vec!["deployments".to_string()]
        );

        dashboard.unmount();
        dashboard.unmount();
        assert!(!dashboard.is_mounted());
        assert!(board.current().is_none());
    }
}
