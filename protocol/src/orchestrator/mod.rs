//! # Orchestrators
//!
//! Two ways to move value, each a bounded, explicitly sequenced flow:
//!
//! ```text
//! attempt.rs - attempt state machine + retry classification
//! direct.rs  - direct-ledger payment with a locally recovered key
//! vaulted.rs - authenticator-gated execution against a remote contract
//! ```
//!
//! Both report a [`SubmissionOutcome`]. `Submitted` means the network
//! accepted the request but confirmation did not arrive in the poll
//! window; it is never reported as `Confirmed`.

use serde::{Deserialize, Serialize};

pub mod attempt;
pub mod direct;
pub mod vaulted;

pub use attempt::{classify, AttemptState, PaymentAttempt, RetryDecision, TransitionError};
pub use direct::DirectPaymentOrchestrator;
pub use vaulted::{ExecutionServices, VaultedExecutionOrchestrator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "hash", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Confirmed(String),
    Submitted(String),
}

impl SubmissionOutcome {
    pub fn hash(&self) -> &str {
        match self {
            SubmissionOutcome::Confirmed(h) | SubmissionOutcome::Submitted(h) => h,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, SubmissionOutcome::Confirmed(_))
    }
}
