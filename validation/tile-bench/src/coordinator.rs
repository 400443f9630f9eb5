//! Batch dispatch: drives every logical request of one workload through the pool.
//!
//! Dispatch is sequential and bounded only by pool availability: each iteration
//! borrows a client (waiting while all are lent out), asks the workload for the
//! next request and spawns it. Tasks count transport failures in a shared atomic
//! and fire a cancellation token when the threshold is crossed or a fatal status
//! shows up; the dispatch loop then stops issuing, in-flight tasks drain and the
//! batch returns an abort error instead of a report.
//!
//! The threshold check at dispatch time reads a counter that in-flight tasks may
//! still bump, so a batch can overshoot the threshold slightly before stopping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{BenchConfig, UnexpectedStatusPolicy};
use crate::error::{BenchError, Result};
use crate::executor::{Outcome, ResilientExecutor};
use crate::pool::ClientPool;
use crate::report::RunReport;
use crate::transport::Transport;
use crate::workload::Workload;

/// Per-batch sizing derived from the configuration and the workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub total_requests: u64,
    pub failure_threshold: u64,
    /// Cooldown before a client is handed back
    pub release_delay: Duration,
}

impl BatchPlan {
    pub fn for_workload(config: &BenchConfig, workload: &dyn Workload) -> Self {
        Self {
            total_requests: config.total_requests(workload.expansion()),
            failure_threshold: config.failure_threshold(),
            release_delay: Duration::ZERO,
        }
    }

    pub fn with_release_delay(mut self, release_delay: Duration) -> Self {
        self.release_delay = release_delay;
        self
    }
}

/// Lifecycle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Initializing,
    Dispatching,
    Draining,
    Completed,
    Aborted,
}

/// First fatal response seen by any task.
#[derive(Debug, Clone)]
struct FatalStatus {
    status: u16,
    body: String,
}

/// State shared between the dispatch loop and its tasks.
struct Shared {
    failures: AtomicU64,
    failure_threshold: u64,
    fatal: OnceLock<FatalStatus>,
    cancel: CancellationToken,
}

impl Shared {
    fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures > self.failure_threshold && !self.cancel.is_cancelled() {
            error!(
                failures = failures,
                threshold = self.failure_threshold,
                "Failure threshold exceeded, cancelling dispatch"
            );
            self.cancel.cancel();
        }
    }

    fn record_fatal(&self, status: u16, body: String) {
        error!(status = status, body = %body, "Unexpected response status");
        // Only the first fatal response is reported
        let _ = self.fatal.set(FatalStatus { status, body });
        self.cancel.cancel();
    }

    fn threshold_exceeded(&self) -> bool {
        self.failures.load(Ordering::Acquire) > self.failure_threshold
    }
}

/// Runs batches of logical requests with a shared executor configuration.
#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    executor: Arc<ResilientExecutor>,
    unexpected_status: UnexpectedStatusPolicy,
}

impl BatchCoordinator {
    pub fn new(executor: ResilientExecutor, unexpected_status: UnexpectedStatusPolicy) -> Self {
        Self {
            executor: Arc::new(executor),
            unexpected_status,
        }
    }

    pub fn from_config(config: &BenchConfig) -> Self {
        Self::new(
            ResilientExecutor::new(config.retry_policy(), config.expected_status()),
            config.unexpected_status,
        )
    }

    /// Run one batch against a freshly populated pool.
    ///
    /// Returns the report once every dispatched request has finished, or an abort
    /// error if the failure threshold was exceeded or a fatal status was seen.
    #[instrument(skip_all, fields(workload = workload.name(), pool_size = pool.capacity()))]
    pub async fn run<C: Transport>(
        &self,
        plan: &BatchPlan,
        workload: &dyn Workload,
        pool: Arc<ClientPool<C>>,
    ) -> Result<RunReport> {
        let mut state = BatchState::Initializing;
        let shared = Arc::new(Shared {
            failures: AtomicU64::new(0),
            failure_threshold: plan.failure_threshold,
            fatal: OnceLock::new(),
            cancel: CancellationToken::new(),
        });
        let mut tasks = JoinSet::new();
        let mut dispatched = 0u64;

        info!(
            total_requests = plan.total_requests,
            failure_threshold = plan.failure_threshold,
            "Starting batch"
        );
        let start = Instant::now();
        transition(&mut state, BatchState::Dispatching);

        for index in 0..plan.total_requests {
            reap_finished(&mut tasks, &shared);
            if shared.threshold_exceeded() {
                shared.cancel.cancel();
            }
            if shared.cancel.is_cancelled() {
                break;
            }

            // Waiting on the pool is what bounds concurrency
            let client = tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => break,
                client = pool.acquire() => client?,
            };

            let request = workload.request(index);
            let executor = Arc::clone(&self.executor);
            let shared_task = Arc::clone(&shared);
            let policy = self.unexpected_status;
            let release_delay = plan.release_delay;

            tasks.spawn(async move {
                match executor.execute(&*client, &request).await {
                    Outcome::Success { .. } => {}
                    Outcome::TransportExhausted { attempts, error } => {
                        warn!(
                            url = %request.url,
                            attempts = attempts,
                            error = %error,
                            "Request failed after retries"
                        );
                        shared_task.record_failure();
                    }
                    Outcome::UnexpectedStatus { status, body } => match policy {
                        UnexpectedStatusPolicy::Fatal => shared_task.record_fatal(status, body),
                        UnexpectedStatusPolicy::Count => {
                            warn!(
                                url = %request.url,
                                status = status,
                                "Unexpected status counted as failure"
                            );
                            shared_task.record_failure();
                        }
                    },
                }

                if !release_delay.is_zero() {
                    tokio::time::sleep(release_delay).await;
                }
                drop(client);
            });
            dispatched += 1;
        }

        transition(&mut state, BatchState::Draining);
        while let Some(joined) = tasks.join_next().await {
            settle(joined, &shared);
        }

        let elapsed = start.elapsed();
        let failures = shared.failures.load(Ordering::Acquire);

        if let Some(fatal) = shared.fatal.get() {
            transition(&mut state, BatchState::Aborted);
            return Err(BenchError::UnexpectedStatus {
                status: fatal.status,
                body: fatal.body.clone(),
            });
        }
        if failures > plan.failure_threshold {
            transition(&mut state, BatchState::Aborted);
            return Err(BenchError::ThresholdExceeded {
                failures,
                threshold: plan.failure_threshold,
                dispatched,
            });
        }

        transition(&mut state, BatchState::Completed);
        let report = RunReport::new(
            workload.name(),
            pool.capacity(),
            plan.total_requests,
            elapsed,
            failures,
        );
        info!(
            total_ms = report.total_duration.as_millis() as u64,
            failures = failures,
            "Batch complete"
        );
        Ok(report)
    }
}

/// Collect tasks that already finished so the set only holds in-flight requests.
fn reap_finished(tasks: &mut JoinSet<()>, shared: &Shared) -> usize {
    let mut reaped = 0;
    while let Some(joined) = tasks.try_join_next() {
        settle(joined, shared);
        reaped += 1;
    }
    reaped
}

fn settle(joined: std::result::Result<(), JoinError>, shared: &Shared) {
    if let Err(e) = joined {
        // The pool guard has already returned the client
        error!(error = %e, "Request task panicked");
        shared.record_failure();
    }
}

fn transition(state: &mut BatchState, next: BatchState) {
    debug!(from = ?*state, to = ?next, "Batch state change");
    *state = next;
}
