//! Deployment report
//!
//! Follows a single deployment while it rolls out. Past deployments are
//! fetched once; live ones are refreshed until no device is left in a
//! non-terminal state, at which point polling stops by itself.

use super::{DashboardError, DashboardResult, RefreshOptions};
use crate::fleet::{Deployment, FleetActions};
use crate::scheduler::{
    operation, FetchBatch, FetchFuture, Notifier, PollConfig, RefreshScheduler, StopHandle,
};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Default refresh period while a deployment is running
pub const REFRESH_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// What the report renders
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSnapshot {
    pub deployment: Option<Deployment>,
    pub polling: bool,
}

pub struct DeploymentReport {
    actions: FleetActions,
    deployment_id: String,
    notifier: Arc<dyn Notifier>,
    options: RefreshOptions,
    past: bool,
    scheduler: Option<RefreshScheduler>,
}

impl DeploymentReport {
    pub fn new(
        actions: FleetActions,
        deployment_id: impl Into<String>,
        notifier: Arc<dyn Notifier>,
        options: RefreshOptions,
    ) -> Self {
        Self {
            actions,
            deployment_id: deployment_id.into(),
            notifier,
            options,
            past: false,
            scheduler: None,
        }
    }

    /// Opened from the past deployments list: fetch once, never poll
    pub fn past(mut self, past: bool) -> Self {
        self.past = past;
        self
    }

    /// Fetch the deployment and, if it is still running, keep refreshing it
    pub async fn mount(&mut self) -> DashboardResult<()> {
        if self.scheduler.is_some() {
            return Err(DashboardError::AlreadyMounted("deployment report"));
        }

        let known_finished = self
            .actions
            .store()
            .deployment(&self.deployment_id)
            .await
            .map(|d| d.is_finished())
            .unwrap_or(false);

        if self.past || known_finished {
            if let Err(e) = self.actions.get_single_deployment(&self.deployment_id).await {
                tracing::warn!(deployment = %self.deployment_id, error = %e, "Failed to load report");
                self.notifier.notify(
                    &format!("Couldn't load deployment {}. {}", self.deployment_id, e),
                    0,
                );
            }
            return Ok(());
        }

        let mut config = PollConfig::new(
            format!("report:{}", self.deployment_id),
            self.options.interval,
        )
        .retry_key(format!("deployment:{}", self.deployment_id))
        .failure_message(format!("Couldn't load deployment {}.", self.deployment_id));
        if let Some(delay) = self.options.retry_delay {
            config = config.retry_delay(delay);
        }

        let stop = Arc::new(OnceLock::new());
        let scheduler = RefreshScheduler::start_polling(
            config,
            report_batch(
                self.actions.clone(),
                self.deployment_id.clone(),
                Arc::clone(&stop),
            ),
            Arc::clone(&self.notifier),
        );
        let _ = stop.set(scheduler.stop_handle());
        self.scheduler = Some(scheduler);

        tracing::info!(deployment = %self.deployment_id, "Following deployment");
        Ok(())
    }

    pub fn unmount(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop_polling();
        }
    }

    pub fn scheduler(&self) -> Option<&RefreshScheduler> {
        self.scheduler.as_ref()
    }

    /// Whether the report is still refreshing
    pub fn is_polling(&self) -> bool {
        self.scheduler
            .as_ref()
            .map(|s| s.is_running())
            .unwrap_or(false)
    }

    pub async fn snapshot(&self) -> ReportSnapshot {
        ReportSnapshot {
            deployment: self.actions.store().deployment(&self.deployment_id).await,
            polling: self.is_polling(),
        }
    }
}

/// A deployment is done once it is marked finished or every device has
/// reached a terminal state. Fresh deployments with no stats yet are not.
fn rollout_complete(deployment: &Deployment) -> bool {
    deployment.is_finished()
        || (deployment.stats.total() > 0 && deployment.stats.in_progress() == 0)
}

fn report_batch(
    actions: FleetActions,
    deployment_id: String,
    stop: Arc<OnceLock<StopHandle>>,
) -> impl FetchBatch {
    move || -> Vec<FetchFuture> {
        let actions = actions.clone();
        let deployment_id = deployment_id.clone();
        let stop = Arc::clone(&stop);
        vec![operation(async move {
            actions.get_single_deployment(&deployment_id).await?;

            let complete = actions
                .store()
                .deployment(&deployment_id)
                .await
                .map(|d| rollout_complete(&d))
                .unwrap_or(false);
            if complete {
                tracing::info!(deployment = %deployment_id, "Deployment complete, stopping refresh");
                if let Some(handle) = stop.get() {
                    handle.stop();
                }
            }
            Ok(())
        })]
    }
}
