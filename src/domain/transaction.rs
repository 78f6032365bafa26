//! Transaction domain entity.
//! Framework-agnostic representation of an on-chain value transfer.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Send,
    Receive,
    Swap,
    Approve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Completed,
    Failed,
}

impl TxStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TxStatus::Pending)
    }
}

/// Domain entity representing a tracked transfer. Owned exclusively by the
/// ledger store; other components mutate it through patches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    /// Hash assigned by the network once the broadcast is accepted.
    pub external_hash: Option<String>,
    pub kind: TxKind,
    pub amount: BigDecimal,
    pub asset_symbol: String,
    pub chain_id: u64,
    pub sender: String,
    pub recipient: String,
    pub status: TxStatus,
    pub submitted_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub block_height: Option<u64>,
    pub fee_paid: Option<BigDecimal>,
    pub confirmation_count: Option<u32>,
}

impl TransactionRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        external_hash: String,
        kind: TxKind,
        amount: BigDecimal,
        asset_symbol: String,
        chain_id: u64,
        sender: String,
        recipient: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_hash: Some(external_hash),
            kind,
            amount,
            asset_symbol,
            chain_id,
            sender,
            recipient,
            status: TxStatus::Pending,
            submitted_at: Utc::now(),
            confirmed_at: None,
            block_height: None,
            fee_paid: None,
            confirmation_count: None,
        }
    }

    /// True when `key` is this record's external hash, or its local id for
    /// records whose hash is not yet known.
    pub fn matches_key(&self, key: &str) -> bool {
        self.external_hash.as_deref() == Some(key) || self.id.to_string() == key
    }
}

/// Partial update applied through the ledger store. Fields left `None` are
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    pub status: Option<TxStatus>,
    pub external_hash: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub block_height: Option<u64>,
    pub fee_paid: Option<BigDecimal>,
    pub confirmation_count: Option<u32>,
}

impl TransactionPatch {
    pub fn completed(block_height: u64, fee_paid: BigDecimal, confirmations: u32) -> Self {
        Self {
            status: Some(TxStatus::Completed),
            confirmed_at: Some(Utc::now()),
            block_height: Some(block_height),
            fee_paid: Some(fee_paid),
            confirmation_count: Some(confirmations),
            ..Self::default()
        }
    }

    pub fn failed() -> Self {
        Self {
            status: Some(TxStatus::Failed),
            ..Self::default()
        }
    }
}
