//! services/generator/src/orchestrator/auto_retry.rs
//!
//! Background continuation of under-generated series.
//!
//! A watcher is started per series. While the series has fewer days than it
//! should, no job is running for it and the client reports connectivity, the
//! watcher runs a continuation. Retriable failures back off linearly up to a
//! cap; after that, or after a non-retriable failure, the watcher waits for the
//! day count to change or for a manual retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devotional_core::JobError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::orchestrator::controller::GenerationService;

pub const MAX_AUTO_ATTEMPTS: u32 = 3;
pub const MAX_AUTO_DELAY: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

//=========================================================================================
// Driver Port
//=========================================================================================

/// How far along a series is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesProgress {
    pub generated: u32,
    pub total: u32,
}

/// What the scheduler needs from the job controller.
#[async_trait]
pub trait ContinuationDriver: Send + Sync {
    async fn progress(&self, series_id: Uuid) -> Result<SeriesProgress, JobError>;

    fn is_active(&self, series_id: Uuid) -> bool;

    async fn continue_series(&self, series_id: Uuid, requested_total: Option<u32>) -> Result<(), JobError>;
}

#[async_trait]
impl ContinuationDriver for GenerationService {
    async fn progress(&self, series_id: Uuid) -> Result<SeriesProgress, JobError> {
        let series = self.series(series_id).await?;
        Ok(SeriesProgress {
            generated: series.generated_days(),
            total: series.total_days,
        })
    }

    fn is_active(&self, series_id: Uuid) -> bool {
        GenerationService::is_active(self, series_id)
    }

    async fn continue_series(&self, series_id: Uuid, requested_total: Option<u32>) -> Result<(), JobError> {
        GenerationService::continue_series(self, series_id, requested_total).await.map(|_| ())
    }
}

//=========================================================================================
// Policy and Observable State
//=========================================================================================

#[derive(Debug, Clone)]
pub struct AutoRetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
    /// How often a halted or blocked watcher re-reads the series.
    pub poll_interval: Duration,
    /// End-to-end deadline for one background continuation.
    pub job_timeout: Duration,
}

impl AutoRetryPolicy {
    pub fn new(base_delay: Duration, job_timeout: Duration) -> Self {
        Self {
            base_delay,
            max_delay: MAX_AUTO_DELAY,
            max_attempts: MAX_AUTO_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout,
        }
    }

    /// Delay before the next attempt after `attempts` consecutive failures.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        self.base_delay.saturating_mul(attempts).min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoRetryPhase {
    Idle,
    /// A job started elsewhere is running for the series.
    WaitingForJob,
    WaitingForConnection,
    Running,
    /// Backing off before the next attempt.
    Scheduled,
    /// The attempt cap was reached.
    Exhausted,
    /// A non-retriable failure; manual retry only.
    Stopped,
    Complete,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoRetryState {
    pub series_id: Uuid,
    pub phase: AutoRetryPhase,
    pub attempts: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub waiting_for_connection: bool,
    pub last_error: Option<String>,
}

impl AutoRetryState {
    fn new(series_id: Uuid) -> Self {
        Self {
            series_id,
            phase: AutoRetryPhase::Idle,
            attempts: 0,
            next_attempt_at: None,
            waiting_for_connection: false,
            last_error: None,
        }
    }

    /// No further work will happen for this watcher.
    pub fn is_finished(&self) -> bool {
        matches!(self.phase, AutoRetryPhase::Complete | AutoRetryPhase::Cancelled)
    }
}

//=========================================================================================
// Handle
//=========================================================================================

/// Owns one watcher. Dropping the handle cancels it.
pub struct AutoRetryHandle {
    state: watch::Receiver<AutoRetryState>,
    manual: Arc<Notify>,
    token: CancellationToken,
}

impl AutoRetryHandle {
    pub fn state(&self) -> AutoRetryState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AutoRetryState> {
        self.state.clone()
    }

    /// Resets the attempt counter and attempts immediately, regardless of the
    /// previous failure or the connectivity signal.
    pub fn retry_now(&self) {
        self.manual.notify_one();
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Drop for AutoRetryHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

//=========================================================================================
// Scheduler
//=========================================================================================

#[derive(Clone)]
pub struct AutoRetryScheduler {
    driver: Arc<dyn ContinuationDriver>,
    connectivity: watch::Receiver<bool>,
    policy: AutoRetryPolicy,
}

enum Wake {
    Elapsed,
    Manual,
    Connectivity,
    Cancelled,
}

impl AutoRetryScheduler {
    pub fn new(driver: Arc<dyn ContinuationDriver>, connectivity: watch::Receiver<bool>, policy: AutoRetryPolicy) -> Self {
        Self {
            driver,
            connectivity,
            policy,
        }
    }

    /// Starts a watcher that keeps `series_id` generated up to the larger of
    /// its declared total and `requested_total`.
    pub fn watch(&self, series_id: Uuid, requested_total: Option<u32>) -> AutoRetryHandle {
        let (state_tx, state_rx) = watch::channel(AutoRetryState::new(series_id));
        let manual = Arc::new(Notify::new());
        let token = CancellationToken::new();

        let watcher = Watcher {
            driver: Arc::clone(&self.driver),
            connectivity: self.connectivity.clone(),
            policy: self.policy.clone(),
            series_id,
            requested_total,
            state: state_tx,
            manual: Arc::clone(&manual),
            token: token.clone(),
        };
        tokio::spawn(watcher.run());

        AutoRetryHandle {
            state: state_rx,
            manual,
            token,
        }
    }
}

struct Watcher {
    driver: Arc<dyn ContinuationDriver>,
    connectivity: watch::Receiver<bool>,
    policy: AutoRetryPolicy,
    series_id: Uuid,
    requested_total: Option<u32>,
    state: watch::Sender<AutoRetryState>,
    manual: Arc<Notify>,
    token: CancellationToken,
}

impl Watcher {
    async fn run(mut self) {
        let series_id = self.series_id;
        let mut attempts = 0u32;
        // Day count after the most recent failure, and whether that failure
        // halted automatic retries.
        let mut checkpoint: Option<u32> = None;
        let mut halted = false;
        let mut forced = false;

        debug!(series_id = %series_id, "Auto-retry watcher started");

        loop {
            if self.token.is_cancelled() {
                break;
            }

            let progress = match self.driver.progress(series_id).await {
                Ok(progress) => progress,
                Err(err) => {
                    warn!(series_id = %series_id, error = %err, "Auto-retry could not read series");
                    self.publish(AutoRetryPhase::Stopped, attempts, None, Some(err.to_string()));
                    match self.pause(Some(self.policy.poll_interval), false).await {
                        Wake::Cancelled => break,
                        _ => continue,
                    }
                }
            };

            let target = progress.total.max(self.requested_total.unwrap_or(0));
            if progress.generated >= target {
                info!(series_id = %series_id, generated = progress.generated, "Series fully generated");
                self.publish(AutoRetryPhase::Complete, 0, None, None);
                return;
            }

            if checkpoint.is_some_and(|count| count != progress.generated) {
                attempts = 0;
                halted = false;
                checkpoint = None;
            }

            if halted && !forced {
                match self.pause(Some(self.policy.poll_interval), false).await {
                    Wake::Cancelled => break,
                    Wake::Manual => {
                        (attempts, halted, checkpoint, forced) = (0, false, None, true);
                    }
                    _ => {}
                }
                continue;
            }

            if self.driver.is_active(series_id) {
                self.publish(AutoRetryPhase::WaitingForJob, attempts, None, None);
                match self.pause(Some(self.policy.poll_interval), false).await {
                    Wake::Cancelled => break,
                    Wake::Manual => {
                        (attempts, halted, checkpoint, forced) = (0, false, None, true);
                    }
                    _ => {}
                }
                continue;
            }

            if !forced && !*self.connectivity.borrow_and_update() {
                self.publish(AutoRetryPhase::WaitingForConnection, attempts, None, None);
                match self.pause(None, true).await {
                    Wake::Cancelled => break,
                    Wake::Manual => {
                        (attempts, halted, checkpoint, forced) = (0, false, None, true);
                    }
                    _ => {}
                }
                continue;
            }
            forced = false;

            self.publish(AutoRetryPhase::Running, attempts, None, None);
            info!(series_id = %series_id, generated = progress.generated, target, attempts, "Starting background continuation");
            let deadline = self.policy.job_timeout;
            let outcome = tokio::select! {
                _ = self.token.cancelled() => break,
                outcome = tokio::time::timeout(deadline, self.driver.continue_series(series_id, self.requested_total)) => {
                    outcome.unwrap_or_else(|_| {
                        Err(JobError::Connectivity(format!("continuation timed out after {:?}", deadline)))
                    })
                }
            };

            let err = match outcome {
                Ok(()) => {
                    attempts = 0;
                    checkpoint = None;
                    continue;
                }
                Err(err) => err,
            };

            checkpoint = Some(match self.driver.progress(series_id).await {
                Ok(after) => after.generated,
                Err(_) => progress.generated,
            });

            if !err.is_retriable() {
                warn!(series_id = %series_id, kind = err.kind(), error = %err, "Background continuation failed, manual retry required");
                halted = true;
                self.publish(AutoRetryPhase::Stopped, attempts, None, Some(err.to_string()));
                continue;
            }

            attempts += 1;
            if attempts >= self.policy.max_attempts {
                warn!(series_id = %series_id, attempts, error = %err, "Auto-retry cap reached");
                halted = true;
                self.publish(AutoRetryPhase::Exhausted, attempts, None, Some(err.to_string()));
                continue;
            }

            let delay = self.policy.delay_for(attempts);
            let next_attempt_at = chrono::Duration::from_std(delay).ok().map(|d| Utc::now() + d);
            warn!(
                series_id = %series_id,
                attempts,
                delay_secs = delay.as_secs(),
                error = %err,
                "Background continuation failed, scheduling retry"
            );
            self.publish(AutoRetryPhase::Scheduled, attempts, next_attempt_at, Some(err.to_string()));
            match self.pause(Some(delay), true).await {
                Wake::Cancelled => break,
                Wake::Manual => {
                    (attempts, halted, checkpoint, forced) = (0, false, None, true);
                }
                Wake::Elapsed | Wake::Connectivity => {}
            }
        }

        debug!(series_id = %series_id, "Auto-retry watcher cancelled");
        self.state.send_modify(|state| {
            state.phase = AutoRetryPhase::Cancelled;
            state.next_attempt_at = None;
            state.waiting_for_connection = false;
        });
    }

    fn publish(
        &self,
        phase: AutoRetryPhase,
        attempts: u32,
        next_attempt_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
    ) {
        self.state.send_modify(|state| {
            state.phase = phase;
            state.attempts = attempts;
            state.next_attempt_at = next_attempt_at;
            state.waiting_for_connection = phase == AutoRetryPhase::WaitingForConnection;
            if last_error.is_some() || phase == AutoRetryPhase::Complete {
                state.last_error = last_error;
            }
        });
    }

    /// Waits for the delay (if any), a manual retry, a connectivity change
    /// (when `on_connectivity`), or cancellation.
    async fn pause(&mut self, delay: Option<Duration>, on_connectivity: bool) -> Wake {
        let sleep = async {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };
        let connectivity = &mut self.connectivity;
        let changed = async move {
            if !on_connectivity || connectivity.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = self.token.cancelled() => Wake::Cancelled,
            _ = self.manual.notified() => Wake::Manual,
            _ = sleep => Wake::Elapsed,
            _ = changed => Wake::Connectivity,
        }
    }
}
