//! Long-running anchoring job.
//!
//! A [`Job`] validates its [`Anchor`] once, seeds the last committed height from the contract,
//! optionally tunes its polling interval from the observed source block time, and then polls
//! until its iteration budget is spent. Progress is reported through the [`JobHandle`] returned
//! by [`Job::execute`].

mod state;

pub use state::{decide, poll_step, JobPhase, JobState, PollDecision};

use crate::anchor::{Anchor, CommitResult, DEFAULT_CONFIRMATION_DEPTH, DEFAULT_REQUEST_TIMEOUT};
use crate::block_time::{estimate_block_time, BlockTimeInfo};
use crate::client::ChainClient;
use crate::error::{AnchorError, AnchorResult};
use crate::metrics::ANCHOR_METRICS;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

pub const DEFAULT_ITERATIONS: u32 = 10;
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_COLLATE_FACTOR: u32 = 5;
pub const DEFAULT_MIN_POLLING_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SAMPLE_SIZE: u64 = DEFAULT_CONFIRMATION_DEPTH * 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    /// Iteration budget used when `execute` is not given one.
    pub iterations: u32,
    /// Used as is unless `tune_polling_interval` is set.
    pub polling_interval: Duration,
    pub tune_polling_interval: bool,
    pub min_polling_interval: Duration,
    pub collate_factor: u32,
    /// Estimator window. `None` samples twice the anchor's confirmation depth.
    pub sample_size: Option<u64>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            tune_polling_interval: false,
            min_polling_interval: DEFAULT_MIN_POLLING_INTERVAL,
            collate_factor: DEFAULT_COLLATE_FACTOR,
            sample_size: None,
        }
    }
}

/// `collate_factor * max(average_block_time, min_interval)`
pub fn tuned_polling_interval(average_block_time: Duration, min_interval: Duration, collate_factor: u32) -> Duration {
    average_block_time.max(min_interval).saturating_mul(collate_factor)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    StateRootAvailable(CommitResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSummary {
    pub last_committed_height: u64,
    pub commits: u32,
    pub polling_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(JobSummary),
    Cancelled(JobSummary),
}

pub struct Job {
    anchor: Arc<Anchor>,
    config: JobConfig,
    running: Arc<AtomicBool>,
}

impl Job {
    pub fn new(anchor: Arc<Anchor>, config: JobConfig) -> Self {
        Self { anchor, config, running: Arc::new(AtomicBool::new(false)) }
    }

    pub fn anchor(&self) -> &Arc<Anchor> {
        &self.anchor
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts a run in the background and returns its handle right away.
    ///
    /// `None` falls back to the configured budget and collate factor. An explicit zero for either
    /// is rejected with [`AnchorError::Config`] rather than replaced by the default.
    ///
    /// Fails with [`AnchorError::AlreadyRunning`] while a previous run of this job is in flight.
    /// Must be called from within a tokio runtime.
    pub fn execute(&self, iterations: Option<u32>, collate_factor: Option<u32>) -> AnchorResult<JobHandle> {
        let iterations = iterations.unwrap_or(self.config.iterations);
        let collate_factor = collate_factor.unwrap_or(self.config.collate_factor);
        if iterations == 0 {
            return Err(AnchorError::Config("Iteration budget must be at least 1".into()));
        }
        if collate_factor == 0 {
            return Err(AnchorError::Config("Collate factor must be at least 1".into()));
        }

        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(AnchorError::AlreadyRunning);
        }
        let guard = RunningGuard(Arc::clone(&self.running));

        let initial = JobState::new(iterations, self.config.polling_interval);
        let (events_tx, events) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(initial.clone());
        let cancel = CancellationToken::new();

        let run = JobRun {
            anchor: Arc::clone(&self.anchor),
            config: self.config.clone(),
            initial,
            collate_factor,
            events: events_tx,
            state: state_tx,
            cancel: cancel.clone(),
        };
        tracing::info!("⚓ Starting anchoring job for {iterations} iteration(s)");
        let task = tokio::spawn(async move {
            let _guard = guard;
            run.drive().await
        });

        let cancel_on_drop = cancel.clone().drop_guard();
        Ok(JobHandle { events, state, cancel, cancel_on_drop, task })
    }

    /// Average block time of any chain, independently of a job instance.
    ///
    /// Defaults to a window of [`DEFAULT_SAMPLE_SIZE`] blocks below [`DEFAULT_CONFIRMATION_DEPTH`].
    pub async fn source_average_block_generation_time(
        client: &dyn ChainClient,
        sample_size: Option<u64>,
        confirmation_depth: Option<u64>,
    ) -> AnchorResult<BlockTimeInfo> {
        estimate_block_time(
            client,
            sample_size.unwrap_or(DEFAULT_SAMPLE_SIZE),
            confirmation_depth.unwrap_or(DEFAULT_CONFIRMATION_DEPTH),
            DEFAULT_REQUEST_TIMEOUT,
        )
        .await
    }
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle on one job run.
///
/// The event channel closes once the run reached a terminal state. Dropping the handle cancels
/// the run.
#[derive(Debug)]
pub struct JobHandle {
    events: mpsc::UnboundedReceiver<JobEvent>,
    state: watch::Receiver<JobState>,
    cancel: CancellationToken,
    cancel_on_drop: DropGuard,
    task: JoinHandle<AnchorResult<JobOutcome>>,
}

impl JobHandle {
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.events.recv().await
    }

    /// Latest state snapshot.
    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }

    /// Stops the run at its next network call or inter-poll delay.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the run to end. Dropping this future before then cancels the run.
    pub async fn join(self) -> AnchorResult<JobOutcome> {
        let JobHandle { task, cancel_on_drop, .. } = self;
        let outcome = task.await.map_err(|e| AnchorError::Aborted(e.to_string()));
        let _ = cancel_on_drop.disarm();
        outcome?
    }
}

struct JobRun {
    anchor: Arc<Anchor>,
    config: JobConfig,
    initial: JobState,
    collate_factor: u32,
    events: mpsc::UnboundedSender<JobEvent>,
    state: watch::Sender<JobState>,
    cancel: CancellationToken,
}

impl JobRun {
    async fn drive(self) -> AnchorResult<JobOutcome> {
        match self.run().await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.state.send_modify(|state| *state = state.clone().with_phase(JobPhase::Failed));
                ANCHOR_METRICS.record_failure(err.kind());
                tracing::error!(error = %err, "⚓ Anchoring job failed");
                Err(err)
            }
        }
    }

    fn publish(&self, state: &JobState) {
        self.state.send_replace(state.clone());
    }

    /// `Ok(None)` when the run got cancelled before `fut` resolved.
    async fn until_cancelled<T>(&self, fut: impl Future<Output = AnchorResult<T>>) -> AnchorResult<Option<T>> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(None),
            res = fut => res.map(Some),
        }
    }

    fn summary(&self, state: &JobState) -> JobSummary {
        JobSummary {
            last_committed_height: state.last_committed_height,
            commits: self.initial.remaining_iterations - state.remaining_iterations,
            polling_interval: state.polling_interval,
        }
    }

    fn cancelled(&self, state: JobState) -> JobOutcome {
        let state = state.with_phase(JobPhase::Cancelled);
        self.publish(&state);
        tracing::info!(last_committed_height = state.last_committed_height, "⚓ Anchoring job cancelled");
        JobOutcome::Cancelled(self.summary(&state))
    }

    async fn estimate(&self) -> AnchorResult<BlockTimeInfo> {
        match self.config.sample_size {
            Some(sample_size) => self.anchor.estimate_source_block_time(sample_size).await,
            None => self.anchor.get_average_source_block_time().await,
        }
    }

    async fn run(&self) -> AnchorResult<JobOutcome> {
        let mut state = self.initial.clone().with_phase(JobPhase::Validating);
        self.publish(&state);
        if self.until_cancelled(self.anchor.validate()).await?.is_none() {
            return Ok(self.cancelled(state));
        }

        let Some(latest) = self.until_cancelled(self.anchor.get_latest_committed_height()).await? else {
            return Ok(self.cancelled(state));
        };
        state.last_committed_height = latest;
        tracing::info!("⚓ Latest anchored block is #{latest}");

        if self.config.tune_polling_interval {
            state = state.with_phase(JobPhase::Estimating);
            self.publish(&state);
            let Some(info) = self.until_cancelled(self.estimate()).await? else {
                return Ok(self.cancelled(state));
            };
            state.polling_interval = tuned_polling_interval(
                info.average_block_duration(),
                self.config.min_polling_interval,
                self.collate_factor,
            );
            tracing::info!(
                average_block_time = info.average_block_time,
                collate_factor = self.collate_factor,
                "⚓ Polling every {:?}",
                state.polling_interval
            );
        }

        state = state.with_phase(JobPhase::Polling);
        self.publish(&state);

        loop {
            let step = poll_step(&self.anchor, state.clone(), |committing| self.publish(committing));
            let Some((next, result)) = self.until_cancelled(step).await? else {
                return Ok(self.cancelled(state));
            };
            state = next;
            self.publish(&state);

            if let Some(result) = result {
                // Only fails once the handle got joined, events are then of no use.
                let _ = self.events.send(JobEvent::StateRootAvailable(result));
            }

            if state.is_exhausted() {
                break;
            }
            tracing::debug!(
                remaining_iterations = state.remaining_iterations,
                "Next poll in {:?}",
                state.polling_interval
            );

            let delay = async {
                tokio::time::sleep(state.polling_interval).await;
                Ok(())
            };
            if self.until_cancelled(delay).await?.is_none() {
                return Ok(self.cancelled(state));
            }
        }

        let state = state.with_phase(JobPhase::Done);
        self.publish(&state);
        tracing::info!("⚓ Anchoring job done, last anchored block is #{}", state.last_committed_height);
        Ok(JobOutcome::Completed(self.summary(&state)))
    }
}
