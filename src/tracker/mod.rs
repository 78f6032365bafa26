//! Transaction tracker: submission, background confirmation, reconciliation.
//!
//! `submit` returns as soon as the broadcast is acknowledged; the
//! confirmation wait runs as a spawned task that patches the ledger when it
//! resolves. The task handle is returned to the caller so the wait can be
//! cancelled, in which case the ledger record is left untouched.

use bigdecimal::BigDecimal;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::chain::{ChainClient, ChainError, ConfirmationOutcome, ReceiptStatus, TransferParams};
use crate::domain::{TransactionPatch, TransactionRecord, TxKind, TxStatus};
use crate::error::WalletError;
use crate::ledger::{LedgerEvent, LedgerStore};
use crate::validation;

pub const DEFAULT_SPEED_UP_MULTIPLIER: f64 = 1.2;

/// Handle to a spawned background wait. Cancelling aborts the wait without
/// touching the ledger.
#[derive(Debug)]
pub struct TaskHandle {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

impl TaskHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the task to finish (normally or via cancellation).
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// What `submit` hands back: the ledger id, the network hash, and the
/// in-flight confirmation wait.
#[derive(Debug)]
pub struct Submission {
    pub id: Uuid,
    pub hash: String,
    pub confirmation: TaskHandle,
}

#[derive(Debug, Clone)]
pub struct SubmitParams {
    pub sender: String,
    pub recipient: String,
    pub amount: String,
    pub asset_symbol: String,
    pub kind: TxKind,
    pub payload: Option<String>,
    /// Balance ceiling for validation, when the caller knows it.
    pub balance: Option<BigDecimal>,
}

#[derive(Debug, Clone)]
pub struct CostEstimate {
    pub estimate: BigDecimal,
    pub fee: BigDecimal,
    pub total_cost: BigDecimal,
}

pub struct TransactionTracker {
    chain: Arc<dyn ChainClient>,
    ledger: LedgerStore,
    confirmations: u32,
}

impl TransactionTracker {
    pub fn new(chain: Arc<dyn ChainClient>, ledger: LedgerStore, confirmations: u32) -> Self {
        Self {
            chain,
            ledger,
            confirmations: confirmations.max(1),
        }
    }

    fn validate(params: &SubmitParams) -> Result<BigDecimal, WalletError> {
        if let Some(reason) = validation::validate_address(&params.recipient).err() {
            return Err(WalletError::Validation(reason));
        }
        if let Some(reason) = validation::validate_address(&params.sender).err() {
            return Err(WalletError::Validation(reason));
        }
        if let Some(reason) =
            validation::validate_amount(&params.amount, params.balance.as_ref()).err()
        {
            return Err(WalletError::Validation(reason));
        }
        if let Some(payload) = params.payload.as_deref() {
            if let Some(reason) = validation::validate_payload(payload).err() {
                return Err(WalletError::Validation(reason));
            }
        }

        // validate_amount accepted it, so this parse cannot fail.
        BigDecimal::from_str(params.amount.trim())
            .map_err(|e| WalletError::Validation(e.to_string()))
    }

    /// Validates, broadcasts, registers a pending ledger record and spawns
    /// the confirmation wait. Returns synchronously once the broadcast is
    /// acknowledged; broadcast failures write no ledger record.
    pub async fn submit(
        &self,
        params: SubmitParams,
        chain_id: u64,
    ) -> Result<Submission, WalletError> {
        let amount = Self::validate(&params)?;

        let transfer = TransferParams {
            sender: params.sender.clone(),
            recipient: params.recipient.clone(),
            amount: amount.clone(),
            payload: params.payload.clone(),
            fee_level: None,
            nonce: None,
        };

        let hash = self
            .chain
            .broadcast_transfer(&transfer)
            .await
            .map_err(WalletError::Submission)?;

        let record = TransactionRecord::pending(
            hash.clone(),
            params.kind,
            amount,
            params.asset_symbol,
            chain_id,
            params.sender,
            params.recipient,
        );
        let id = record.id;
        self.ledger.insert_transaction(record).await;

        let confirmation = self.spawn_confirmation_wait(hash.clone());
        debug!(%id, %hash, "transfer submitted, confirmation wait running");

        Ok(Submission {
            id,
            hash,
            confirmation,
        })
    }

    fn spawn_confirmation_wait(&self, hash: String) -> TaskHandle {
        let chain = Arc::clone(&self.chain);
        let ledger = self.ledger.clone();
        let confirmations = self.confirmations;
        let token = CancellationToken::new();
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = task_token.cancelled() => {
                    debug!(%hash, "confirmation wait cancelled, record left as-is");
                    return;
                }
                outcome = chain.await_confirmations(&hash, confirmations) => outcome,
            };

            let patch = match outcome {
                Ok(receipt) if receipt.status == ReceiptStatus::Success => {
                    TransactionPatch::completed(
                        receipt.block_number,
                        receipt.fee_paid,
                        receipt.confirmations.max(confirmations),
                    )
                }
                Ok(_) => {
                    debug!(%hash, "transfer reverted");
                    TransactionPatch::failed()
                }
                Err(e) => {
                    warn!(%hash, "confirmation wait failed: {e}");
                    TransactionPatch::failed()
                }
            };

            ledger.patch_transaction(&hash, patch).await;
        });

        TaskHandle { handle, token }
    }

    /// Foreground confirmation wait, for callers that want the outcome
    /// inline instead of through the spawned task. Callers holding a
    /// `Submission` cancel its handle first so only one waiter patches.
    pub async fn await_completion(&self, hash: &str) -> Result<TransactionRecord, WalletError> {
        match self.chain.await_confirmations(hash, self.confirmations).await {
            Ok(receipt) => {
                let patch = if receipt.status == ReceiptStatus::Success {
                    TransactionPatch::completed(
                        receipt.block_number,
                        receipt.fee_paid,
                        receipt.confirmations.max(self.confirmations),
                    )
                } else {
                    TransactionPatch::failed()
                };
                self.ledger
                    .patch_transaction(hash, patch)
                    .await
                    .ok_or_else(|| WalletError::NotFound(hash.to_string()))
            }
            Err(e) => {
                self.ledger
                    .patch_transaction(hash, TransactionPatch::failed())
                    .await;
                Err(WalletError::Confirmation(e))
            }
        }
    }

    /// Read-only stream of updates for the record matching `key`. The
    /// stream starts with the record's current state, so a subscriber that
    /// arrives after a transition still observes it; consecutive identical
    /// states are collapsed.
    pub fn track_status(&self, key: impl Into<String>) -> impl Stream<Item = TransactionRecord> {
        let key = key.into();
        // Subscribe before the current-state read so no update can fall
        // between the two.
        let events = BroadcastStream::new(self.ledger.subscribe());

        let ledger = self.ledger.clone();
        let seed_key = key.clone();
        let current = futures::stream::once(async move { ledger.find(&seed_key).await })
            .filter_map(|record| record);

        let updates = events.filter_map(move |event| match event {
            Ok(LedgerEvent::TransactionUpserted(record)) if record.matches_key(&key) => {
                Some(record)
            }
            _ => None,
        });

        let mut last: Option<(TxStatus, Option<u32>)> = None;
        Box::pin(current.chain(updates).filter_map(move |record| {
            let state = (record.status, record.confirmation_count);
            if last == Some(state) {
                None
            } else {
                last = Some(state);
                Some(record)
            }
        }))
    }

    /// Receipt lookup; `None` while the node has not sealed one yet.
    pub async fn receipt(&self, hash: &str) -> Result<Option<ConfirmationOutcome>, ChainError> {
        self.chain.get_receipt(hash).await
    }

    /// Cost estimate × current fee level; facade errors are surfaced
    /// unchanged, with no local retry.
    pub async fn estimate_cost(
        &self,
        sender: &str,
        recipient: &str,
        amount: &BigDecimal,
        payload: Option<&str>,
    ) -> Result<CostEstimate, ChainError> {
        let estimate = self
            .chain
            .estimate_cost(sender, recipient, amount, payload)
            .await?;
        let fee_level = self.chain.current_fee_level().await?.unwrap_or_default();

        let fee = &estimate * &fee_level;
        let total_cost = amount + &fee;

        Ok(CostEstimate {
            estimate,
            fee,
            total_cost,
        })
    }

    /// Replaces a pending transfer with a higher-fee copy carrying the same
    /// nonce and destination. Returns the replacement hash; no new ledger
    /// record is written and the original is not linked automatically.
    pub async fn speed_up(
        &self,
        original_hash: &str,
        multiplier: Option<f64>,
    ) -> Result<String, WalletError> {
        let multiplier = multiplier.unwrap_or(DEFAULT_SPEED_UP_MULTIPLIER);
        if !multiplier.is_finite() || multiplier <= 1.0 {
            return Err(WalletError::Validation(
                "speed-up multiplier must be greater than 1".to_string(),
            ));
        }

        let original = self
            .chain
            .get_transfer(original_hash)
            .await
            .map_err(|e| match e {
                ChainError::NotFound(hash) => WalletError::NotFound(hash),
                other => WalletError::Submission(other),
            })?;

        let fee_level = original.fee_level.ok_or_else(|| {
            WalletError::Unsupported(
                "cannot speed up a transfer on a network without a discoverable fee".to_string(),
            )
        })?;

        let factor = BigDecimal::try_from(multiplier)
            .map_err(|e| WalletError::Validation(e.to_string()))?;
        // with_scale(0) truncates toward zero, i.e. floor for positive fees.
        let new_fee = (&fee_level * factor).with_scale(0);

        let replacement = TransferParams {
            sender: original.sender,
            recipient: original.recipient,
            amount: original.amount,
            payload: original.payload,
            fee_level: Some(new_fee),
            nonce: Some(original.nonce),
        };

        self.chain
            .broadcast_transfer(&replacement)
            .await
            .map_err(WalletError::Submission)
    }
}
