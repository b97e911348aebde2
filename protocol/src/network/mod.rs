//! # Network Module
//!
//! Capabilities the engine consumes. Nothing here opens a socket: the
//! host supplies implementations, the engine classifies and sequences the
//! calls.
//!
//! ```text
//! ledger.rs    - LedgerClient: account loads, submission, history
//! execution.rs - ExecutionEndpoint, ExecutionRpc, ProofService
//! ```
//!
//! Every method is async and every implementation must be `Send + Sync`,
//! because independent accounts run their flows concurrently against the
//! same collaborators.

pub mod execution;
pub mod ledger;

pub use execution::{
    ExecutionEndpoint, ExecutionError, ExecutionRequest, ExecutionResponse, ExecutionRpc,
    ExecutionStatus, ProofArtifact, ProofService,
};
pub use ledger::{LedgerClient, LedgerError, LedgerTxStatus, SubmitError};
