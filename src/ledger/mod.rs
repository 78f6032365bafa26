//! Ledger store: the single shared mutable resource in the crate.
//!
//! All transaction records and payment outcomes live here; the tracker and
//! the orchestrator never hold private copies, they mutate through this
//! API so every reader observes one consistent version. Mutations are
//! broadcast so callers can subscribe instead of polling.

pub mod snapshot;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::warn;

use crate::domain::{
    PaymentOutcome, TransactionPatch, TransactionRecord, TxStatus,
};
use snapshot::LedgerSnapshot;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum LedgerEvent {
    TransactionUpserted(TransactionRecord),
    OutcomeUpserted(PaymentOutcome),
}

#[derive(Default)]
struct LedgerInner {
    /// Newest first, matching the persisted window order.
    transactions: Vec<TransactionRecord>,
    outcomes: HashMap<String, PaymentOutcome>,
}

/// Single-writer store over the client's transaction and payment state.
#[derive(Clone)]
pub struct LedgerStore {
    inner: Arc<RwLock<LedgerInner>>,
    events: broadcast::Sender<LedgerEvent>,
    path: Option<PathBuf>,
    persist_outcomes: bool,
}

impl LedgerStore {
    /// In-memory store with no durability, for sessions that opt out.
    pub fn in_memory() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(LedgerInner::default())),
            events,
            path: None,
            persist_outcomes: false,
        }
    }

    /// Opens a durable store, loading any previous snapshot from `path`.
    pub async fn open(path: PathBuf, persist_outcomes: bool) -> Self {
        let mut inner = LedgerInner::default();
        match snapshot::read(&path).await {
            Ok(Some(loaded)) => {
                inner.transactions = loaded.transactions;
                inner.outcomes = loaded
                    .outcomes
                    .into_iter()
                    .map(|o| (o.request_id.clone(), o))
                    .collect();
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable ledger snapshot: {e:#}"),
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(inner)),
            events,
            path: Some(path),
            persist_outcomes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Registers a new record. If a record with the same external hash
    /// already exists the insert is an idempotent no-op — there is exactly
    /// one record per hash.
    pub async fn insert_transaction(&self, record: TransactionRecord) {
        {
            let mut inner = self.inner.write().await;
            if let Some(hash) = record.external_hash.as_deref() {
                if inner
                    .transactions
                    .iter()
                    .any(|r| r.external_hash.as_deref() == Some(hash))
                {
                    return;
                }
            }
            inner.transactions.insert(0, record.clone());
        }

        let _ = self.events.send(LedgerEvent::TransactionUpserted(record));
        self.persist().await;
    }

    /// Applies a partial update to the record matching `key` (external hash
    /// once known, local id before then). Terminal records only accept
    /// confirmation-count updates; a terminal status never changes again.
    pub async fn patch_transaction(
        &self,
        key: &str,
        patch: TransactionPatch,
    ) -> Option<TransactionRecord> {
        let updated = {
            let mut inner = self.inner.write().await;
            let record = inner.transactions.iter_mut().find(|r| r.matches_key(key))?;

            if record.status.is_terminal() {
                // Terminal states are final; only the confirmation count may
                // keep growing.
                if let Some(count) = patch.confirmation_count {
                    record.confirmation_count = Some(count);
                }
                record.clone()
            } else {
                apply_patch(record, patch);
                record.clone()
            }
        };

        let _ = self
            .events
            .send(LedgerEvent::TransactionUpserted(updated.clone()));
        self.persist().await;
        Some(updated)
    }

    pub async fn find(&self, key: &str) -> Option<TransactionRecord> {
        self.inner
            .read()
            .await
            .transactions
            .iter()
            .find(|r| r.matches_key(key))
            .cloned()
    }

    pub async fn query<F>(&self, predicate: F) -> Vec<TransactionRecord>
    where
        F: Fn(&TransactionRecord) -> bool,
    {
        self.inner
            .read()
            .await
            .transactions
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    pub async fn pending(&self) -> Vec<TransactionRecord> {
        self.query(|r| r.status == TxStatus::Pending).await
    }

    pub async fn by_network(&self, chain_id: u64) -> Vec<TransactionRecord> {
        self.query(move |r| r.chain_id == chain_id).await
    }

    /// Upserts a payment outcome, enforcing status monotonicity: an outcome
    /// never regresses along Pending → Processing → terminal, and a terminal
    /// status never changes to a different one. Returns the version actually
    /// held after the upsert.
    pub async fn upsert_outcome(&self, outcome: PaymentOutcome) -> PaymentOutcome {
        let (applied, changed) = {
            let mut inner = self.inner.write().await;
            match inner.outcomes.get(&outcome.request_id) {
                Some(existing)
                    if existing.status.rank() > outcome.status.rank()
                        || (existing.status.is_terminal()
                            && outcome.status != existing.status) =>
                {
                    (existing.clone(), false)
                }
                _ => {
                    inner
                        .outcomes
                        .insert(outcome.request_id.clone(), outcome.clone());
                    (outcome, true)
                }
            }
        };

        if changed {
            let _ = self
                .events
                .send(LedgerEvent::OutcomeUpserted(applied.clone()));
            if self.persist_outcomes {
                self.persist().await;
            }
        }
        applied
    }

    pub async fn outcome(&self, request_id: &str) -> Option<PaymentOutcome> {
        self.inner.read().await.outcomes.get(request_id).cloned()
    }

    /// Writes the bounded recent window to the durable namespace. Snapshot
    /// failures are logged, not propagated: local durability problems must
    /// not fail an otherwise-settled mutation.
    pub async fn persist(&self) {
        let Some(path) = &self.path else { return };

        let snapshot = {
            let inner = self.inner.read().await;
            let outcomes = if self.persist_outcomes {
                inner.outcomes.values().cloned().collect()
            } else {
                Vec::new()
            };
            LedgerSnapshot::bounded(inner.transactions.clone(), outcomes)
        };

        if let Err(e) = snapshot::write(path, &snapshot).await {
            warn!("Failed to persist ledger snapshot: {e:#}");
        }
    }
}

fn apply_patch(record: &mut TransactionRecord, patch: TransactionPatch) {
    if let Some(hash) = patch.external_hash {
        record.external_hash = Some(hash);
    }
    if let Some(status) = patch.status {
        record.status = status;
    }
    if let Some(at) = patch.confirmed_at {
        record.confirmed_at = Some(at);
    }
    if let Some(height) = patch.block_height {
        record.block_height = Some(height);
    }
    if let Some(fee) = patch.fee_paid {
        record.fee_paid = Some(fee);
    }
    if let Some(count) = patch.confirmation_count {
        record.confirmation_count = Some(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PaymentStatus, TxKind};
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn record(hash: &str) -> TransactionRecord {
        TransactionRecord::pending(
            hash.to_string(),
            TxKind::Send,
            BigDecimal::from_str("1.5").unwrap(),
            "ETH".to_string(),
            8453,
            "0x1111111111111111111111111111111111111111".to_string(),
            "0x2222222222222222222222222222222222222222".to_string(),
        )
    }

    fn outcome(status: PaymentStatus) -> PaymentOutcome {
        PaymentOutcome {
            request_id: "req-1".to_string(),
            status,
            transaction_hash: None,
            confirmed_at: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn insert_is_idempotent_per_hash() {
        let store = LedgerStore::in_memory();
        store.insert_transaction(record("0xaaa")).await;
        store.insert_transaction(record("0xaaa")).await;

        assert_eq!(store.query(|_| true).await.len(), 1);
    }

    #[tokio::test]
    async fn patch_matches_hash_or_id() {
        let store = LedgerStore::in_memory();
        let r = record("0xaaa");
        let id = r.id.to_string();
        store.insert_transaction(r).await;

        let by_id = store
            .patch_transaction(&id, TransactionPatch::completed(10, BigDecimal::from(1), 1))
            .await
            .unwrap();
        assert_eq!(by_id.status, TxStatus::Completed);

        let by_hash = store.find("0xaaa").await.unwrap();
        assert_eq!(by_hash.status, TxStatus::Completed);
    }

    #[tokio::test]
    async fn terminal_status_never_regresses() {
        let store = LedgerStore::in_memory();
        store.insert_transaction(record("0xaaa")).await;

        store
            .patch_transaction("0xaaa", TransactionPatch::completed(12, BigDecimal::from(1), 1))
            .await
            .unwrap();

        // A late failure patch must not flip a completed record.
        let after = store
            .patch_transaction("0xaaa", TransactionPatch::failed())
            .await
            .unwrap();
        assert_eq!(after.status, TxStatus::Completed);
        assert_eq!(after.block_height, Some(12));
    }

    #[tokio::test]
    async fn terminal_record_still_accepts_confirmation_count() {
        let store = LedgerStore::in_memory();
        store.insert_transaction(record("0xaaa")).await;
        store
            .patch_transaction("0xaaa", TransactionPatch::completed(12, BigDecimal::from(1), 1))
            .await;

        let patch = TransactionPatch {
            confirmation_count: Some(6),
            ..TransactionPatch::default()
        };
        let after = store.patch_transaction("0xaaa", patch).await.unwrap();
        assert_eq!(after.confirmation_count, Some(6));
        assert_eq!(after.status, TxStatus::Completed);
    }

    #[tokio::test]
    async fn patch_of_unknown_key_is_none() {
        let store = LedgerStore::in_memory();
        assert!(store
            .patch_transaction("0xmissing", TransactionPatch::failed())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn outcome_status_is_monotone() {
        let store = LedgerStore::in_memory();
        store.upsert_outcome(outcome(PaymentStatus::Completed)).await;

        let applied = store.upsert_outcome(outcome(PaymentStatus::Processing)).await;
        assert_eq!(applied.status, PaymentStatus::Completed);

        let held = store.outcome("req-1").await.unwrap();
        assert_eq!(held.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn terminal_outcome_never_flips_to_another_terminal() {
        let store = LedgerStore::in_memory();
        store.upsert_outcome(outcome(PaymentStatus::Completed)).await;

        // A late gateway report must not turn a completed payment failed.
        let applied = store.upsert_outcome(outcome(PaymentStatus::Failed)).await;
        assert_eq!(applied.status, PaymentStatus::Completed);

        let held = store.outcome("req-1").await.unwrap();
        assert_eq!(held.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn subscription_observes_status_transition() {
        let store = LedgerStore::in_memory();
        let mut rx = store.subscribe();

        store.insert_transaction(record("0xaaa")).await;
        store
            .patch_transaction("0xaaa", TransactionPatch::completed(5, BigDecimal::from(1), 1))
            .await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        match (first, second) {
            (
                LedgerEvent::TransactionUpserted(a),
                LedgerEvent::TransactionUpserted(b),
            ) => {
                assert_eq!(a.status, TxStatus::Pending);
                assert_eq!(b.status, TxStatus::Completed);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn durable_store_reloads_snapshot() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let store = LedgerStore::open(path.clone(), false).await;
        store.insert_transaction(record("0xaaa")).await;

        let reopened = LedgerStore::open(path, false).await;
        assert!(reopened.find("0xaaa").await.is_some());
    }
}
