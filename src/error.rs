use thiserror::Error;

use crate::chain::ChainError;
use crate::gateway::GatewayError;

/// Failure taxonomy for every public operation. Each caller-facing call
/// resolves to a definite result or exactly one of these; there is no
/// "maybe it worked" outcome.
#[derive(Error, Debug)]
pub enum WalletError {
    /// Bad input; never reaches the network and never touches the ledger.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Broadcast rejected by the network layer; no pending record exists.
    #[error("submission failed: {0}")]
    Submission(#[source] ChainError),

    /// The network accepted the transfer but finalization failed or
    /// reverted. Recorded in the ledger as a terminal failure.
    #[error("confirmation failed: {0}")]
    Confirmation(#[source] ChainError),

    /// A bounded wait exceeded its wall-clock budget.
    #[error("timed out after {waited_ms}ms")]
    Timeout { waited_ms: u64 },

    /// Payment-gateway transport or protocol failure.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The operation cannot be expressed on this network, e.g. speeding up
    /// a transfer on a fee-abstracted chain.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("not found: {0}")]
    NotFound(String),
}
