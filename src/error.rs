//! Run-level errors.
//!
//! Only conditions that stop a run before or outside the per-item pipeline
//! end up here. Per-item failures are result values
//! ([`SubmissionOutcome`](crate::SubmissionOutcome),
//! [`ConfirmationResult`](crate::ConfirmationResult)).

use crate::{
    abi::AbiError,
    chain::RpcError,
    proof::ProofError,
    report::SinkError,
    KeyError,
};

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error(transparent)]
    Abi(#[from] AbiError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// The identity pool cannot provide the sender (and receiver) a run needs.
    #[error("need at least {needed} identities, have {available}")]
    NoIdentity { needed: usize, available: usize },
    #[error("invalid configuration: {0}")]
    Config(String),
}
