//! Explicit state of one job execution, threaded through every poll step.

use crate::anchor::{Anchor, CommitResult};
use crate::client::BlockHeader;
use crate::error::AnchorResult;
use crate::metrics::ANCHOR_METRICS;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Validating,
    Estimating,
    Polling,
    Committing,
    Done,
    Failed,
    Cancelled,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// Created fresh by every `execute()` and dropped once the run resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobState {
    pub phase: JobPhase,
    /// Never decreases during a run.
    pub last_committed_height: u64,
    /// Only decremented by a successful commit.
    pub remaining_iterations: u32,
    pub polling_interval: Duration,
    pub running: bool,
}

impl JobState {
    pub fn new(iterations: u32, polling_interval: Duration) -> Self {
        Self {
            phase: JobPhase::Idle,
            last_committed_height: 0,
            remaining_iterations: iterations,
            polling_interval,
            running: true,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_iterations == 0
    }

    pub fn with_phase(mut self, phase: JobPhase) -> Self {
        self.phase = phase;
        if phase.is_terminal() {
            self.running = false;
        }
        self
    }

    fn record_commit(mut self, height: u64) -> Self {
        self.last_committed_height = self.last_committed_height.max(height);
        self.remaining_iterations = self.remaining_iterations.saturating_sub(1);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    Commit(BlockHeader),
    /// Already anchored, or the chain has not advanced past the last commit.
    Skip,
}

/// Strictly greater heights only, so a height is never anchored twice.
pub fn decide(state: &JobState, candidate: Option<BlockHeader>) -> PollDecision {
    match candidate {
        Some(block) if block.height > state.last_committed_height => PollDecision::Commit(block),
        _ => PollDecision::Skip,
    }
}

/// One poll: fetch the committable block and commit it if it is new.
///
/// `observe` is called with the intermediate `Committing` state before the submission starts.
pub async fn poll_step(
    anchor: &Anchor,
    state: JobState,
    observe: impl Fn(&JobState),
) -> AnchorResult<(JobState, Option<CommitResult>)> {
    let candidate = anchor.get_committable_block().await?;

    match decide(&state, candidate) {
        PollDecision::Skip => {
            tracing::debug!(
                candidate = candidate.map(|block| block.height),
                last_committed_height = state.last_committed_height,
                "Nothing new to anchor"
            );
            ANCHOR_METRICS.record_skip();
            Ok((state, None))
        }
        PollDecision::Commit(block) => {
            let committing = state.with_phase(JobPhase::Committing);
            observe(&committing);

            let result = anchor.anchor_state_root(&block, None).await?;
            let state = committing.record_commit(result.committed_height).with_phase(JobPhase::Polling);
            Ok((state, Some(result)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::tests::{contract_mock, header, receipt, test_anchor};
    use crate::client::{MockAnchorContract, MockChainClient};
    use rstest::rstest;
    use std::sync::Mutex;

    fn polling_state(last_committed_height: u64, remaining_iterations: u32) -> JobState {
        JobState { last_committed_height, remaining_iterations, ..JobState::new(0, Duration::from_secs(1)) }
            .with_phase(JobPhase::Polling)
    }

    #[rstest]
    #[case::newer(Some(51), true)]
    #[case::equal(Some(50), false)]
    #[case::older(Some(49), false)]
    #[case::not_available(None, false)]
    fn only_newer_blocks_are_committed(#[case] candidate: Option<u64>, #[case] commit: bool) {
        let decision = decide(&polling_state(50, 3), candidate.map(header));
        assert_eq!(matches!(decision, PollDecision::Commit(_)), commit);
    }

    #[rstest]
    #[case::done(JobPhase::Done)]
    #[case::failed(JobPhase::Failed)]
    #[case::cancelled(JobPhase::Cancelled)]
    fn terminal_phases_stop_running(#[case] phase: JobPhase) {
        let state = polling_state(0, 1).with_phase(phase);
        assert!(!state.running);
    }

    #[tokio::test]
    async fn equal_height_is_skipped_without_submission() {
        let mut source = MockChainClient::new();
        source.expect_current_height().returning(|| Ok(74));
        source.expect_get_block().returning(|h| Ok(Some(header(h))));
        let mut contract: MockAnchorContract = contract_mock();
        contract.expect_submit_state_root().never();

        let anchor = test_anchor(source, contract, 24);
        let before = polling_state(50, 3);
        let (after, result) = poll_step(&anchor, before.clone(), |_| panic!("no commit expected")).await.unwrap();

        assert_eq!(result, None);
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn commit_advances_height_and_consumes_an_iteration() {
        let mut source = MockChainClient::new();
        source.expect_current_height().returning(|| Ok(75));
        source.expect_get_block().returning(|h| Ok(Some(header(h))));
        let mut contract = contract_mock();
        contract.expect_submit_state_root().times(1).returning(|_, _, _| Ok(receipt(true).transaction_hash));
        contract.expect_transaction_receipt().returning(|_| Ok(Some(receipt(true))));

        let anchor = test_anchor(source, contract, 24);
        let observed = Mutex::new(Vec::new());
        let (after, result) =
            poll_step(&anchor, polling_state(50, 3), |state| observed.lock().unwrap().push(state.phase)).await.unwrap();

        assert_eq!(result.map(|r| r.committed_height), Some(51));
        assert_eq!(after.last_committed_height, 51);
        assert_eq!(after.remaining_iterations, 2);
        assert_eq!(after.phase, JobPhase::Polling);
        assert_eq!(*observed.lock().unwrap(), vec![JobPhase::Committing]);
    }
}
