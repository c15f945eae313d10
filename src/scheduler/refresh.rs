//! Refresh Scheduler
//!
//! Keeps a view's data fresh by running a batch of fetch operations right
//! away and then on a fixed interval.
//!
//! # Lifecycle
//!
//! ```text
//! start_polling ─► batch ─► success ─► loading = false
//!      │             │
//!      │             └────► failure ─► retry timer (one per key) ─► batch
//!      └─► every interval ─► batch (skipped while one is in flight)
//!
//! stop_polling / drop ─► ticker + retry timers cancelled, generation bumped
//! ```
//!
//! Every batch and retry carries the generation it was started under.
//! Stopping bumps the generation, so completions of fetches that were
//! already in flight are discarded instead of touching a torn-down view.
//! A [`StopHandle`] used from inside a batch is the exception: the stop
//! waits until that batch's outcome has been recorded.

use super::notify::Notifier;
use super::retry::RetryTimers;
use crate::fleet::{FetchError, FetchResult};
use futures_util::future::{join_all, BoxFuture};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// One fetch operation of a batch
pub type FetchFuture = BoxFuture<'static, FetchResult<()>>;

/// Box a fetch future as a batch operation
pub fn operation<F>(future: F) -> FetchFuture
where
    F: Future<Output = FetchResult<()>> + Send + 'static,
{
    Box::pin(future)
}

/// Produces the operations of one refresh batch.
///
/// Called once per batch; the operations run concurrently and the batch
/// completes when all of them have settled.
pub trait FetchBatch: Send + Sync + 'static {
    fn operations(&self) -> Vec<FetchFuture>;
}

impl<F> FetchBatch for F
where
    F: Fn() -> Vec<FetchFuture> + Send + Sync + 'static,
{
    fn operations(&self) -> Vec<FetchFuture> {
        self()
    }
}

/// Polling parameters for one view
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Name used in logs
    pub name: String,
    /// Time between batches
    pub interval: Duration,
    /// Delay before retrying a failed batch (defaults to `interval`)
    pub retry_delay: Option<Duration>,
    /// Retry key for failures that do not name their own cause
    pub retry_key: String,
    /// Prefix of the notice shown on failure
    pub failure_message: String,
}

impl PollConfig {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        let name = name.into();
        Self {
            retry_key: name.clone(),
            failure_message: format!("Couldn't load {}.", name),
            name,
            interval,
            retry_delay: None,
        }
    }

    /// Set the retry delay (builder pattern)
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Set the default retry key (builder pattern)
    pub fn retry_key(mut self, key: impl Into<String>) -> Self {
        self.retry_key = key.into();
        self
    }

    /// Set the failure notice prefix (builder pattern)
    pub fn failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }

    fn effective_interval(&self) -> Duration {
        debug_assert!(!self.interval.is_zero(), "polling interval must be positive");
        self.interval.max(Duration::from_millis(1))
    }

    fn effective_retry_delay(&self) -> Duration {
        self.retry_delay
            .unwrap_or(self.interval)
            .max(Duration::from_millis(1))
    }
}

/// Result of the most recent completed batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Succeeded,
    Failed { retry_key: String, error: FetchError },
}

/// Whether a scheduler ever delivered data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// No batch has fully succeeded yet
    Loading,
    /// A batch fully succeeded
    Loaded,
    /// Stopped before any batch fully succeeded
    Stopped,
}

#[derive(Debug)]
struct CycleState {
    generation: u64,
    ticker: Option<JoinHandle<()>>,
    retries: RetryTimers,
    in_flight: bool,
    /// Stop once the batch in flight has settled
    stop_requested: bool,
    loading: bool,
    batches_started: u64,
    batches_completed: u64,
    batches_skipped: u64,
    consecutive_failures: u32,
    last_outcome: Option<BatchOutcome>,
}

struct SchedulerInner {
    config: PollConfig,
    batch: Box<dyn FetchBatch>,
    notifier: Arc<dyn Notifier>,
    cycle: Mutex<CycleState>,
    load_state: watch::Sender<LoadState>,
}

/// Periodic refresh of one view. Stops when dropped.
pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
}

/// Stops a scheduler from inside its own batch without keeping it alive
#[derive(Clone)]
pub struct StopHandle {
    inner: Weak<SchedulerInner>,
}

impl StopHandle {
    /// Stop polling. While a batch is in flight the stop takes effect once
    /// that batch has settled, so its outcome is still recorded.
    pub fn stop(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.request_stop();
        }
    }
}

impl RefreshScheduler {
    /// Run `batch` now and every `config.interval` until stopped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_polling(
        config: PollConfig,
        batch: impl FetchBatch,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (load_state, _) = watch::channel(LoadState::Loading);
        let inner = Arc::new(SchedulerInner {
            config,
            batch: Box::new(batch),
            notifier,
            cycle: Mutex::new(CycleState {
                generation: 0,
                ticker: None,
                retries: RetryTimers::default(),
                in_flight: false,
                stop_requested: false,
                loading: true,
                batches_started: 0,
                batches_completed: 0,
                batches_skipped: 0,
                consecutive_failures: 0,
                last_outcome: None,
            }),
            load_state,
        });

        let period = inner.config.effective_interval();
        tracing::debug!(
            scheduler = %inner.config.name,
            interval_ms = period.as_millis() as u64,
            "Starting refresh polling"
        );

        let ticker = tokio::spawn({
            let inner = Arc::clone(&inner);
            async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                // First tick completes immediately
                loop {
                    interval.tick().await;
                    tokio::spawn(Arc::clone(&inner).run_batch(0));
                }
            }
        });
        {
            let mut cycle = inner.cycle();
            cycle.ticker = Some(ticker);
        }

        Self { inner }
    }

    /// Cancel the ticker and every pending retry. Idempotent.
    pub fn stop_polling(&self) {
        self.inner.stop();
    }

    /// Run a batch outside the regular schedule (skipped if one is in flight)
    pub fn refresh_now(&self) {
        let generation = {
            let cycle = self.inner.cycle();
            if cycle.ticker.is_none() {
                return;
            }
            cycle.generation
        };
        tokio::spawn(Arc::clone(&self.inner).run_batch(generation));
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn is_running(&self) -> bool {
        self.inner.cycle().ticker.is_some()
    }

    /// True until the first fully successful batch
    pub fn loading(&self) -> bool {
        self.inner.cycle().loading
    }

    pub fn load_state(&self) -> LoadState {
        *self.inner.load_state.borrow()
    }

    /// Wait for the first fully successful batch. Returns `false` if the
    /// scheduler was stopped before any batch succeeded.
    pub async fn wait_until_loaded(&self) -> bool {
        let mut state = self.inner.load_state.subscribe();
        let loaded = match state.wait_for(|state| *state != LoadState::Loading).await {
            Ok(state) => *state == LoadState::Loaded,
            Err(_) => false,
        };
        loaded
    }

    pub fn pending_retries(&self) -> usize {
        self.inner.cycle().retries.pending()
    }

    pub fn pending_retry_keys(&self) -> Vec<String> {
        self.inner.cycle().retries.pending_keys()
    }

    pub fn batches_started(&self) -> u64 {
        self.inner.cycle().batches_started
    }

    pub fn batches_completed(&self) -> u64 {
        self.inner.cycle().batches_completed
    }

    /// Ticks or retries dropped because a batch was still running
    pub fn batches_skipped(&self) -> u64 {
        self.inner.cycle().batches_skipped
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.cycle().consecutive_failures
    }

    pub fn last_outcome(&self) -> Option<BatchOutcome> {
        self.inner.cycle().last_outcome.clone()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl SchedulerInner {
    fn cycle(&self) -> MutexGuard<'_, CycleState> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self) {
        let (ticker, cancelled) = {
            let mut cycle = self.cycle();
            if cycle.ticker.is_none() {
                return;
            }
            cycle.generation += 1;
            cycle.in_flight = false;
            cycle.stop_requested = false;
            (cycle.ticker.take(), cycle.retries.clear_all())
        };

        self.load_state.send_if_modified(|state| {
            if *state == LoadState::Loading {
                *state = LoadState::Stopped;
                true
            } else {
                false
            }
        });

        if let Some(ticker) = ticker {
            ticker.abort();
        }
        if cancelled > 0 {
            self.notifier.clear();
        }

        tracing::debug!(
            scheduler = %self.config.name,
            cancelled_retries = cancelled,
            "Stopped refresh polling"
        );
    }

    /// Stop now, or after the batch in flight if there is one
    fn request_stop(&self) {
        {
            let mut cycle = self.cycle();
            if cycle.ticker.is_none() {
                return;
            }
            if cycle.in_flight {
                cycle.stop_requested = true;
                return;
            }
        }
        self.stop();
    }

    /// Boxed so the retry path can spawn it from inside itself
    fn run_batch(self: Arc<Self>, generation: u64) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            {
                let mut cycle = self.cycle();
                if cycle.generation != generation {
                    return;
                }
                if cycle.in_flight {
                    cycle.batches_skipped += 1;
                    tracing::debug!(scheduler = %self.config.name, "Batch still in flight, skipping");
                    return;
                }
                cycle.in_flight = true;
                cycle.batches_started += 1;
            }

            let operations = self.batch.operations();
            let count = operations.len();
            let results = join_all(operations).await;
            let failure = results.into_iter().find_map(Result::err);

            tracing::trace!(
                scheduler = %self.config.name,
                operations = count,
                failed = failure.is_some(),
                "Batch settled"
            );
            self.complete_batch(generation, failure);
        })
    }

    fn complete_batch(self: &Arc<Self>, generation: u64, failure: Option<FetchError>) {
        let mut cycle = self.cycle();
        if cycle.generation != generation {
            tracing::debug!(scheduler = %self.config.name, "Discarding batch from stopped cycle");
            return;
        }
        cycle.batches_completed += 1;

        // A stop requested from inside this batch applies after its outcome
        let stop_requested = std::mem::take(&mut cycle.stop_requested);
        cycle.in_flight = stop_requested;

        match failure {
            None => self.record_success(cycle),
            Some(error) => self.record_failure(cycle, generation, error, stop_requested),
        }

        if stop_requested {
            tracing::debug!(scheduler = %self.config.name, "Stop requested by batch");
            self.stop();
        }
    }

    fn record_success(&self, mut cycle: MutexGuard<'_, CycleState>) {
        let recovered = cycle.consecutive_failures > 0;
        cycle.consecutive_failures = 0;
        cycle.last_outcome = Some(BatchOutcome::Succeeded);
        let cancelled = cycle.retries.clear_all();
        if cycle.loading {
            cycle.loading = false;
            self.load_state.send_replace(LoadState::Loaded);
            tracing::info!(scheduler = %self.config.name, "Initial data loaded");
        }
        drop(cycle);

        if recovered || cancelled > 0 {
            self.notifier.clear();
        }
    }

    fn record_failure(
        self: &Arc<Self>,
        mut cycle: MutexGuard<'_, CycleState>,
        generation: u64,
        error: FetchError,
        stopping: bool,
    ) {
        cycle.consecutive_failures += 1;
        let retry_key = error
            .retry_key()
            .unwrap_or(self.config.retry_key.as_str())
            .to_string();
        tracing::warn!(
            scheduler = %self.config.name,
            retry_key = %retry_key,
            failures = cycle.consecutive_failures,
            error = %error,
            "Refresh batch failed"
        );
        cycle.last_outcome = Some(BatchOutcome::Failed {
            retry_key: retry_key.clone(),
            error: error.clone(),
        });

        if stopping {
            return;
        }
        if cycle.retries.is_pending(&retry_key) {
            tracing::debug!(scheduler = %self.config.name, retry_key = %retry_key, "Retry already pending");
            return;
        }

        let delay = self.config.effective_retry_delay();
        let timer = tokio::spawn({
            let inner = Arc::clone(self);
            let retry_key = retry_key.clone();
            async move {
                tokio::time::sleep(delay).await;
                {
                    let mut cycle = inner.cycle();
                    if cycle.generation != generation {
                        return;
                    }
                    cycle.retries.release(&retry_key);
                }
                tracing::debug!(scheduler = %inner.config.name, retry_key = %retry_key, "Retrying");
                tokio::spawn(Arc::clone(&inner).run_batch(generation));
            }
        });
        cycle.retries.arm(retry_key, timer);
        drop(cycle);

        let message = format!("{} {}", self.config.failure_message, error.root());
        self.notifier.notify(&message, delay.as_millis() as u64);
    }
}
