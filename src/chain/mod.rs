//! Chain client facade: the crate's only view of the node RPC boundary.
//! The tracker depends on the [`ChainClient`] trait so confirmation logic
//! can be exercised against a scripted chain in tests.

mod rpc;

pub use rpc::RpcChainClient;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("broadcast rejected: {0}")]
    Rejected(String),

    #[error("unknown transfer: {0}")]
    NotFound(String),

    #[error("invalid node response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Parameters for a transfer broadcast. `fee_level` and `nonce` are only
/// set for replacement transfers (speed-up); the node fills them otherwise.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferParams {
    pub sender: String,
    pub recipient: String,
    pub amount: BigDecimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_level: Option<BigDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
}

/// Terminal acknowledgment that a transfer is durably included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationOutcome {
    pub status: ReceiptStatus,
    pub block_number: u64,
    pub fee_paid: BigDecimal,
    #[serde(default)]
    pub confirmations: u32,
}

/// Node's view of an already-broadcast transfer, used to build replacements.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub hash: String,
    pub sender: String,
    pub recipient: String,
    pub amount: BigDecimal,
    #[serde(default)]
    pub payload: Option<String>,
    /// Absent on feeless / fee-abstracted networks.
    #[serde(default)]
    pub fee_level: Option<BigDecimal>,
    pub nonce: u64,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Broadcasts a transfer and returns the network-assigned hash.
    async fn broadcast_transfer(&self, params: &TransferParams) -> Result<String, ChainError>;

    /// Blocks until the transfer has `confirmations` confirmations or the
    /// node reports a terminal failure.
    async fn await_confirmations(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<ConfirmationOutcome, ChainError>;

    /// Units of work the transfer would consume.
    async fn estimate_cost(
        &self,
        sender: &str,
        recipient: &str,
        amount: &BigDecimal,
        payload: Option<&str>,
    ) -> Result<BigDecimal, ChainError>;

    /// Current fee rate; `Ok(None)` on networks with no discoverable fee.
    async fn current_fee_level(&self) -> Result<Option<BigDecimal>, ChainError>;

    async fn get_transfer(&self, hash: &str) -> Result<TransferSummary, ChainError>;

    /// Receipt if the transfer has landed, `None` while still in flight.
    async fn get_receipt(&self, hash: &str) -> Result<Option<ConfirmationOutcome>, ChainError>;
}
