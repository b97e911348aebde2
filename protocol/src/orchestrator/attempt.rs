//! Bounded attempt state machine for direct ledger payments.
//!
//! ```text
//! Idle -> LoadingAccount -> Building -> Signed -> Submitting -> Confirmed
//!              ^                                      |
//!              +-------- RetryableFailure <-----------+
//!                                                     +-> FatalFailure
//! ```
//!
//! Any non-terminal state may go straight to `FatalFailure`. The retry
//! decision is a pure function of the submit error and the attempt count,
//! see [`classify`].

use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::EngineConfig;
use crate::network::SubmitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    Idle,
    LoadingAccount,
    Building,
    Signed,
    Submitting,
    Confirmed,
    RetryableFailure,
    FatalFailure,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptState::Confirmed | AttemptState::FatalFailure)
    }

    fn can_move_to(self, next: AttemptState) -> bool {
        use AttemptState::*;
        if next == FatalFailure {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Idle, LoadingAccount)
                | (LoadingAccount, Building)
                | (Building, Signed)
                | (Signed, Submitting)
                | (Submitting, Confirmed)
                | (Submitting, RetryableFailure)
                | (RetryableFailure, LoadingAccount)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal attempt transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: AttemptState,
    pub to: AttemptState,
}

/// What to do after a failed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then rebuild from a fresh account load.
    Backoff(Duration),
    /// Reload and re-run the balance checks; retry only if they pass and an
    /// attempt remains.
    ReloadAndRecheck,
    /// The ledger may have applied it; look the hash up before deciding.
    PollForHash,
    /// Attempts used up on a retryable cause.
    Exhausted,
    Fatal,
}

/// Classify a submit error for attempt number `attempt` (1-based).
pub fn classify(error: &SubmitError, attempt: u32, config: &EngineConfig) -> RetryDecision {
    let attempts_left = attempt < config.max_submit_attempts;
    match error {
        SubmitError::BadSequence if attempts_left => {
            RetryDecision::Backoff(config.submit_backoff(attempt))
        }
        SubmitError::BadSequence => RetryDecision::Exhausted,
        SubmitError::Underfunded => RetryDecision::ReloadAndRecheck,
        SubmitError::Timeout => RetryDecision::PollForHash,
        SubmitError::Rejected(_) | SubmitError::Network(_) => RetryDecision::Fatal,
    }
}

/// Progress of one payment through its attempts.
#[derive(Debug, Clone)]
pub struct PaymentAttempt {
    state: AttemptState,
    attempt: u32,
    max_attempts: u32,
    last_error: Option<SubmitError>,
    trace: Vec<AttemptState>,
}

impl PaymentAttempt {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: AttemptState::Idle,
            attempt: 0,
            max_attempts: max_attempts.max(1),
            last_error: None,
            trace: vec![AttemptState::Idle],
        }
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// 1-based number of the attempt in progress; 0 before the first.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether another `LoadingAccount` transition is allowed.
    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    pub fn last_error(&self) -> Option<&SubmitError> {
        self.last_error.as_ref()
    }

    /// Every state visited, in order.
    pub fn trace(&self) -> &[AttemptState] {
        &self.trace
    }

    pub fn advance(&mut self, next: AttemptState) -> Result<(), TransitionError> {
        if !self.state.can_move_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        if next == AttemptState::LoadingAccount {
            if self.attempt >= self.max_attempts {
                return Err(TransitionError {
                    from: self.state,
                    to: next,
                });
            }
            self.attempt += 1;
        }
        debug!(from = ?self.state, to = ?next, attempt = self.attempt, "attempt transition");
        self.state = next;
        self.trace.push(next);
        Ok(())
    }

    /// Record a retryable submit failure.
    pub fn fail_retryable(&mut self, error: SubmitError) -> Result<(), TransitionError> {
        self.advance(AttemptState::RetryableFailure)?;
        self.last_error = Some(error);
        Ok(())
    }

    /// Move to `FatalFailure` from wherever the attempt is.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            debug!(from = ?self.state, attempt = self.attempt, "attempt failed");
            self.state = AttemptState::FatalFailure;
            self.trace.push(AttemptState::FatalFailure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AttemptState::*;

    fn happy_path(a: &mut PaymentAttempt) {
        for s in [LoadingAccount, Building, Signed, Submitting] {
            a.advance(s).unwrap();
        }
    }

    #[test]
    fn happy_path_confirms() {
        let mut a = PaymentAttempt::new(3);
        happy_path(&mut a);
        a.advance(Confirmed).unwrap();
        assert_eq!(a.attempt(), 1);
        assert_eq!(a.trace(), &[Idle, LoadingAccount, Building, Signed, Submitting, Confirmed]);
    }

    #[test]
    fn cannot_skip_signing() {
        let mut a = PaymentAttempt::new(3);
        a.advance(LoadingAccount).unwrap();
        a.advance(Building).unwrap();
        assert_eq!(
            a.advance(Submitting).unwrap_err(),
            TransitionError { from: Building, to: Submitting }
        );
    }

    #[test]
    fn attempt_bound_enforced() {
        let mut a = PaymentAttempt::new(2);
        happy_path(&mut a);
        a.fail_retryable(SubmitError::BadSequence).unwrap();
        happy_path(&mut a);
        a.fail_retryable(SubmitError::BadSequence).unwrap();
        assert_eq!(a.attempt(), 2);
        assert!(!a.has_attempts_left());
        assert!(a.advance(LoadingAccount).is_err());
        assert_eq!(a.last_error(), Some(&SubmitError::BadSequence));
    }

    #[test]
    fn terminal_states_are_final() {
        let mut a = PaymentAttempt::new(3);
        a.advance(LoadingAccount).unwrap();
        a.fail();
        assert_eq!(a.state(), FatalFailure);
        assert!(a.advance(LoadingAccount).is_err());
        a.fail();
        assert_eq!(a.trace().iter().filter(|s| **s == FatalFailure).count(), 1);
    }

    #[test]
    fn bad_sequence_backs_off_exponentially_then_exhausts() {
        let cfg = EngineConfig::default();
        assert_eq!(
            classify(&SubmitError::BadSequence, 1, &cfg),
            RetryDecision::Backoff(Duration::from_secs(1))
        );
        assert_eq!(
            classify(&SubmitError::BadSequence, 2, &cfg),
            RetryDecision::Backoff(Duration::from_secs(2))
        );
        assert_eq!(classify(&SubmitError::BadSequence, 3, &cfg), RetryDecision::Exhausted);
    }

    #[test]
    fn other_classes() {
        let cfg = EngineConfig::default();
        assert_eq!(classify(&SubmitError::Underfunded, 1, &cfg), RetryDecision::ReloadAndRecheck);
        // Last attempt still reloads; the caller decides between a real
        // shortfall and exhaustion.
        assert_eq!(classify(&SubmitError::Underfunded, 3, &cfg), RetryDecision::ReloadAndRecheck);
        assert_eq!(classify(&SubmitError::Timeout, 3, &cfg), RetryDecision::PollForHash);
        assert_eq!(classify(&SubmitError::Rejected("op_no_trust".into()), 1, &cfg), RetryDecision::Fatal);
        assert_eq!(classify(&SubmitError::Network("down".into()), 1, &cfg), RetryDecision::Fatal);
    }
}
