//! Durable snapshot of the ledger's recent window. Written as JSON via a
//! temp file + rename so readers never observe a half-written namespace.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::{PaymentOutcome, TransactionRecord};

/// Most-recent transaction records kept durable.
pub const SNAPSHOT_WINDOW: usize = 100;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub transactions: Vec<TransactionRecord>,
    #[serde(default)]
    pub outcomes: Vec<PaymentOutcome>,
}

impl LedgerSnapshot {
    /// Caps the transaction list at the persisted window, newest first.
    pub fn bounded(mut transactions: Vec<TransactionRecord>, outcomes: Vec<PaymentOutcome>) -> Self {
        transactions.truncate(SNAPSHOT_WINDOW);
        Self {
            transactions,
            outcomes,
        }
    }
}

pub async fn write(path: &Path, snapshot: &LedgerSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .context("Failed to create ledger directory")?;
    }

    let serialized =
        serde_json::to_vec_pretty(snapshot).context("Failed to serialize ledger snapshot")?;

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)
        .await
        .context("Failed to create snapshot temp file")?;
    file.write_all(&serialized)
        .await
        .context("Failed to write snapshot")?;
    file.flush().await.context("Failed to flush snapshot")?;
    drop(file);

    fs::rename(&temp_path, path)
        .await
        .context("Failed to move snapshot into place")?;

    Ok(())
}

/// Reads a snapshot if one exists; a missing file is a fresh ledger.
pub async fn read(path: &Path) -> Result<Option<LedgerSnapshot>> {
    match fs::read(path).await {
        Ok(bytes) => {
            let snapshot =
                serde_json::from_slice(&bytes).context("Failed to parse ledger snapshot")?;
            Ok(Some(snapshot))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context("Failed to read ledger snapshot"),
    }
}
