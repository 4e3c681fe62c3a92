use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use murmur_shared::protocol::WireRecord;
use murmur_store::{lock_db, SharedDatabase};

use crate::codec::ChannelCodec;
use crate::error::{CodecError, DrainError};

/// Works through the local event store, oldest event first, handing each one
/// to the codec exactly once.
pub struct EventDrainer {
    db: SharedDatabase,
    codec: Arc<ChannelCodec>,
    running: AtomicBool,
}

/// Clears the running flag however the drain ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EventDrainer {
    pub fn new(db: SharedDatabase, codec: Arc<ChannelCodec>) -> Self {
        Self {
            db,
            codec,
            running: AtomicBool::new(false),
        }
    }

    /// Process every unprocessed event and return how many were visited.
    ///
    /// Decode failures are logged and the event is still marked processed;
    /// only a failing event store stops the loop.
    pub async fn drain(&self) -> Result<usize, DrainError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(DrainError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        let mut visited = 0usize;
        loop {
            let Some(event) = lock_db(&self.db)?.first_unprocessed_event()? else {
                break;
            };

            let record = WireRecord {
                channel_identifier: event.channel_identifier,
                encrypted_message_link: event.encrypted_message_link,
                encrypted_message_link_signature: event.encrypted_message_link_signature,
            };

            match self.codec.decode(&record).await {
                Ok(message) => tracing::debug!(
                    event = event.id,
                    member = %message.channel_member_id,
                    nonce = message.nonce,
                    "event decoded"
                ),
                // most log traffic belongs to other parties
                Err(CodecError::UnknownChannel(identifier)) => tracing::debug!(
                    event = event.id,
                    identifier = %identifier,
                    "event not addressed to us"
                ),
                Err(e) => tracing::warn!(event = event.id, error = %e, "failed to decode event"),
            }

            lock_db(&self.db)?.mark_event_processed(event.id)?;
            visited += 1;
        }

        if visited > 0 {
            tracing::info!(events = visited, "event log drained");
        }
        Ok(visited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::FsBlobStore;
    use crate::key_manager::{KeyManager, MemoryKeyManager};
    use crate::ledger::MemoryLedger;
    use murmur_shared::types::ChannelIdentifier;
    use murmur_store::{Database, NewEvent};
    use tempfile::TempDir;

    async fn drainer() -> (EventDrainer, SharedDatabase, TempDir) {
        let db = Database::open_in_memory().unwrap().into_shared();
        let keys: Arc<dyn KeyManager> = Arc::new(MemoryKeyManager::new());
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(FsBlobStore::new(dir.path().to_path_buf(), 1024).await.unwrap());
        let codec = Arc::new(ChannelCodec::new(
            db.clone(),
            keys,
            blobs,
            Arc::new(MemoryLedger::new()),
        ));
        (EventDrainer::new(db.clone(), codec), db, dir)
    }

    fn foreign_event(tag: u8) -> NewEvent {
        NewEvent {
            transaction_hash: format!("tx-{tag}"),
            channel_identifier: ChannelIdentifier(format!("{tag:02x}").repeat(32)),
            encrypted_message_link: vec![tag; 40],
            encrypted_message_link_signature: vec![tag; 64],
        }
    }

    #[tokio::test]
    async fn test_undecodable_events_are_still_consumed() {
        let (drainer, db, _dir) = drainer().await;
        {
            let db = lock_db(&db).unwrap();
            for tag in 1..=3 {
                db.insert_event(&foreign_event(tag)).unwrap();
            }
        }

        assert_eq!(drainer.drain().await.unwrap(), 3);
        assert_eq!(drainer.drain().await.unwrap(), 0);
        assert_eq!(lock_db(&db).unwrap().count_unprocessed_events().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_drain_rejected() {
        let (drainer, _db, _dir) = drainer().await;

        drainer.running.store(true, Ordering::SeqCst);
        assert!(matches!(drainer.drain().await, Err(DrainError::AlreadyRunning)));

        drainer.running.store(false, Ordering::SeqCst);
        assert_eq!(drainer.drain().await.unwrap(), 0);
        // the flag is released after a normal run
        assert!(!drainer.running.load(Ordering::SeqCst));
    }
}
