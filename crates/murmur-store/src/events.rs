//! Ledger events ingested into the local log, drained in id order.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use murmur_shared::types::ChannelIdentifier;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Event, NewEvent};
use crate::rows::timestamp_at;

impl Database {
    /// Append an event. A transaction hash already present is ignored and
    /// `None` is returned, so re-ingesting the same ledger range is harmless.
    pub fn insert_event(&self, event: &NewEvent) -> Result<Option<i64>> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO events (transaction_hash, channel_identifier,
                 encrypted_message_link, encrypted_message_link_signature, processed, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                event.transaction_hash,
                event.channel_identifier.as_str(),
                event.encrypted_message_link,
                event.encrypted_message_link_signature,
                Utc::now().to_rfc3339(),
            ],
        )?;
        if affected == 0 {
            tracing::debug!(tx = %event.transaction_hash, "duplicate event ignored");
            return Ok(None);
        }
        Ok(Some(self.conn().last_insert_rowid()))
    }

    /// The oldest event not yet marked processed.
    pub fn first_unprocessed_event(&self) -> Result<Option<Event>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, transaction_hash, channel_identifier, encrypted_message_link,
                        encrypted_message_link_signature, processed, created_at
                 FROM events
                 WHERE processed = 0
                 ORDER BY id ASC
                 LIMIT 1",
                [],
                row_to_event,
            )
            .optional()?)
    }

    /// Flag an event as handled. Returns `false` if it already was, or does
    /// not exist.
    pub fn mark_event_processed(&self, id: i64) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE events SET processed = 1 WHERE id = ?1 AND processed = 0",
            params![id],
        )?;
        Ok(affected > 0)
    }

    pub fn count_unprocessed_events(&self) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM events WHERE processed = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let identifier: String = row.get(2)?;
    let processed: i64 = row.get(5)?;
    Ok(Event {
        id: row.get(0)?,
        transaction_hash: row.get(1)?,
        channel_identifier: ChannelIdentifier(identifier),
        encrypted_message_link: row.get(3)?,
        encrypted_message_link_signature: row.get(4)?,
        processed: processed != 0,
        created_at: timestamp_at(row, 6)?,
    })
}
