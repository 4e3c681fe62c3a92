//! The public event log messages are announced on.
//!
//! [`MemoryLedger`] keeps the log in process. Nodes read it through
//! [`ingest_ledger`], which copies new entries into their local event store
//! where the drain loop picks them up.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use murmur_shared::crypto::sha256_concat;
use murmur_shared::protocol::WireRecord;
use murmur_store::{lock_db, NewEvent, SharedDatabase, StoreError};

use crate::error::LedgerError;

/// Proof that an event was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: String,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Announce a message. Fails with [`LedgerError::Submission`] when the
    /// record was not accepted.
    async fn emit_event(&self, record: &WireRecord) -> Result<TransactionReceipt, LedgerError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub transaction_hash: String,
    pub record: WireRecord,
}

/// Append-only in-process log.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries at positions `cursor..`, oldest first.
    pub async fn entries_since(&self, cursor: usize) -> Vec<LedgerEntry> {
        let entries = self.entries.lock().await;
        entries.get(cursor..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn emit_event(&self, record: &WireRecord) -> Result<TransactionReceipt, LedgerError> {
        let bytes = record
            .to_bytes()
            .map_err(|e| LedgerError::Submission(e.to_string()))?;

        let mut entries = self.entries.lock().await;
        let position = entries.len() as u64;
        let transaction_hash = hex::encode(sha256_concat(&[&bytes, &position.to_be_bytes()]));

        entries.push(LedgerEntry {
            transaction_hash: transaction_hash.clone(),
            record: record.clone(),
        });

        tracing::debug!(
            tx = %transaction_hash,
            identifier = %record.channel_identifier,
            "event emitted"
        );
        Ok(TransactionReceipt { transaction_hash })
    }
}

/// Copy ledger entries from `cursor` on into the node's event store and
/// return the cursor to resume from. Entries already ingested are skipped by
/// transaction hash.
pub async fn ingest_ledger(
    ledger: &MemoryLedger,
    db: &SharedDatabase,
    cursor: usize,
) -> Result<usize, StoreError> {
    let entries = ledger.entries_since(cursor).await;
    if entries.is_empty() {
        return Ok(cursor);
    }

    let guard = lock_db(db)?;
    let mut inserted = 0usize;
    for entry in &entries {
        let event = NewEvent {
            transaction_hash: entry.transaction_hash.clone(),
            channel_identifier: entry.record.channel_identifier.clone(),
            encrypted_message_link: entry.record.encrypted_message_link.clone(),
            encrypted_message_link_signature: entry.record.encrypted_message_link_signature.clone(),
        };
        if guard.insert_event(&event)?.is_some() {
            inserted += 1;
        }
    }

    tracing::debug!(seen = entries.len(), inserted, "ledger ingested");
    Ok(cursor + entries.len())
}
