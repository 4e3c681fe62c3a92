use chrono::Utc;
use rusqlite::{params, TransactionBehavior};
use zeroize::Zeroizing;

use murmur_shared::types::{ChannelMemberId, ChannelMessageId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ChannelMessage, RatchetCommit};
use crate::rows::{nonce_at, timestamp_at, uuid_at};

impl Database {
    /// Highest nonce recorded for a member, `None` before its first message.
    pub fn max_nonce(&self, member_id: ChannelMemberId) -> Result<Option<u64>> {
        max_nonce_on(self.conn(), member_id)
    }

    pub fn list_channel_messages(&self, member_id: ChannelMemberId) -> Result<Vec<ChannelMessage>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, channel_member_id, message_contents, nonce, created_at
             FROM channel_messages
             WHERE channel_member_id = ?1
             ORDER BY nonce ASC",
        )?;

        let rows = stmt.query_map(params![member_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Record a message and advance its member's ratchet in one transaction.
    ///
    /// The message nonce must be exactly one past the member's last nonce
    /// (`NonceViolation` otherwise), and the member's stored chain key must
    /// still be `expected_chain_key` (`StaleRatchet` otherwise). On any error
    /// nothing is written.
    pub fn commit_ratchet_step(&mut self, commit: &RatchetCommit) -> Result<()> {
        let member = commit.member_id;
        if commit.message.channel_member_id != member {
            return Err(StoreError::InvalidRecord(format!(
                "message {} does not belong to member {member}",
                commit.message.id
            )));
        }

        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let last = max_nonce_on(&tx, member)?;
        let expected = match last {
            None => 1,
            Some(n) => n.saturating_add(1),
        };
        if commit.message.nonce != expected {
            return Err(StoreError::NonceViolation {
                member: member.to_string(),
                attempted: commit.message.nonce,
                last,
            });
        }
        let nonce = i64::try_from(commit.message.nonce).map_err(|_| StoreError::NonceViolation {
            member: member.to_string(),
            attempted: commit.message.nonce,
            last,
        })?;

        let expected_hex = Zeroizing::new(hex::encode(commit.expected_chain_key));
        let next_hex = Zeroizing::new(hex::encode(commit.next_chain_key));
        let updated = tx.execute(
            "UPDATE channel_members
             SET message_chain_key = ?3, next_channel_identifier = ?4, updated_at = ?5
             WHERE id = ?1 AND message_chain_key = ?2",
            params![
                member.to_string(),
                expected_hex.as_str(),
                next_hex.as_str(),
                commit.next_identifier.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::StaleRatchet(member.to_string()));
        }

        tx.execute(
            "INSERT INTO channel_messages (id, channel_member_id, message_contents, nonce, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                commit.message.id.to_string(),
                member.to_string(),
                commit.message.message_contents,
                nonce,
                commit.message.created_at.to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        tracing::debug!(member = %member, nonce = commit.message.nonce, "ratchet step committed");
        Ok(())
    }

    /// Undo a committed step: drop its message and put the member back on
    /// the chain key and identifier it was planned from.
    ///
    /// Only the member's latest step can be undone. If the member has moved
    /// past it the call fails with `StaleRatchet` and nothing is written.
    pub fn revert_ratchet_step(&mut self, commit: &RatchetCommit) -> Result<()> {
        let member = commit.member_id;
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current_hex = Zeroizing::new(hex::encode(commit.next_chain_key));
        let previous_hex = Zeroizing::new(hex::encode(commit.expected_chain_key));
        let restored = tx.execute(
            "UPDATE channel_members
             SET message_chain_key = ?4, next_channel_identifier = ?5, updated_at = ?6
             WHERE id = ?1 AND message_chain_key = ?2 AND next_channel_identifier = ?3",
            params![
                member.to_string(),
                current_hex.as_str(),
                commit.next_identifier.as_str(),
                previous_hex.as_str(),
                commit.previous_identifier.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        if restored == 0 {
            return Err(StoreError::StaleRatchet(member.to_string()));
        }

        let removed = tx.execute(
            "DELETE FROM channel_messages WHERE id = ?1 AND channel_member_id = ?2",
            params![commit.message.id.to_string(), member.to_string()],
        )?;
        if removed == 0 {
            return Err(StoreError::InvalidRecord(format!(
                "message {} was never committed for member {member}",
                commit.message.id
            )));
        }

        tx.commit()?;

        tracing::debug!(member = %member, nonce = commit.message.nonce, "ratchet step reverted");
        Ok(())
    }
}

fn max_nonce_on(conn: &rusqlite::Connection, member_id: ChannelMemberId) -> Result<Option<u64>> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(nonce) FROM channel_messages WHERE channel_member_id = ?1",
        params![member_id.to_string()],
        |row| row.get(0),
    )?;
    max.map(|n| {
        u64::try_from(n).map_err(|_| StoreError::InvalidRecord(format!("negative nonce {n}")))
    })
    .transpose()
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelMessage> {
    Ok(ChannelMessage {
        id: ChannelMessageId(uuid_at(row, 0)?),
        channel_member_id: ChannelMemberId(uuid_at(row, 1)?),
        message_contents: row.get(2)?,
        nonce: nonce_at(row, 3)?,
        created_at: timestamp_at(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::tests::seed_channel;
    use murmur_shared::types::ChannelIdentifier;

    fn commit(member_id: ChannelMemberId, nonce: u64, from: [u8; 32], to: [u8; 32]) -> RatchetCommit {
        RatchetCommit {
            member_id,
            expected_chain_key: from,
            previous_identifier: ChannelIdentifier(format!("next-{nonce}")),
            next_chain_key: to,
            next_identifier: ChannelIdentifier(format!("next-{}", nonce + 1)),
            message: ChannelMessage {
                id: ChannelMessageId::new(),
                channel_member_id: member_id,
                message_contents: format!("message {nonce}"),
                nonce,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn sequential_commits_advance_member() {
        let mut db = Database::open_in_memory().unwrap();
        let member = seed_channel(&mut db).user_member.id;
        assert_eq!(db.max_nonce(member).unwrap(), None);

        db.commit_ratchet_step(&commit(member, 1, [0x10; 32], [0x11; 32])).unwrap();
        db.commit_ratchet_step(&commit(member, 2, [0x11; 32], [0x12; 32])).unwrap();

        assert_eq!(db.max_nonce(member).unwrap(), Some(2));
        let stored = db.get_channel_member(member).unwrap();
        assert_eq!(*stored.message_chain_key, [0x12; 32]);
        assert_eq!(stored.next_channel_identifier.as_str(), "next-3");

        let nonces: Vec<u64> = db
            .list_channel_messages(member)
            .unwrap()
            .iter()
            .map(|m| m.nonce)
            .collect();
        assert_eq!(nonces, vec![1, 2]);
    }

    #[test]
    fn replayed_or_skipped_nonce_is_rejected() {
        let mut db = Database::open_in_memory().unwrap();
        let member = seed_channel(&mut db).user_member.id;
        db.commit_ratchet_step(&commit(member, 1, [0x10; 32], [0x11; 32])).unwrap();

        let replay = db.commit_ratchet_step(&commit(member, 1, [0x11; 32], [0x12; 32]));
        assert!(matches!(
            replay,
            Err(StoreError::NonceViolation { attempted: 1, last: Some(1), .. })
        ));

        let skip = db.commit_ratchet_step(&commit(member, 3, [0x11; 32], [0x12; 32]));
        assert!(matches!(skip, Err(StoreError::NonceViolation { attempted: 3, .. })));

        // nothing was written by the rejected attempts
        assert_eq!(db.max_nonce(member).unwrap(), Some(1));
        assert_eq!(*db.get_channel_member(member).unwrap().message_chain_key, [0x11; 32]);
    }

    #[test]
    fn stale_chain_key_rolls_back() {
        let mut db = Database::open_in_memory().unwrap();
        let member = seed_channel(&mut db).contact_member.id;

        let stale = db.commit_ratchet_step(&commit(member, 1, [0x99; 32], [0x11; 32]));
        assert!(matches!(stale, Err(StoreError::StaleRatchet(_))));
        assert_eq!(db.max_nonce(member).unwrap(), None);
        assert_eq!(*db.get_channel_member(member).unwrap().message_chain_key, [0x10; 32]);
    }

    #[test]
    fn message_for_other_member_is_invalid() {
        let mut db = Database::open_in_memory().unwrap();
        let seeded = seed_channel(&mut db);
        let mut bad = commit(seeded.user_member.id, 1, [0x10; 32], [0x11; 32]);
        bad.message.channel_member_id = seeded.contact_member.id;

        assert!(matches!(
            db.commit_ratchet_step(&bad),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn latest_step_can_be_reverted() {
        let mut db = Database::open_in_memory().unwrap();
        let member = seed_channel(&mut db).user_member.id;
        db.commit_ratchet_step(&commit(member, 1, [0x10; 32], [0x11; 32])).unwrap();

        let second = commit(member, 2, [0x11; 32], [0x12; 32]);
        db.commit_ratchet_step(&second).unwrap();
        db.revert_ratchet_step(&second).unwrap();

        assert_eq!(db.max_nonce(member).unwrap(), Some(1));
        let stored = db.get_channel_member(member).unwrap();
        assert_eq!(*stored.message_chain_key, [0x11; 32]);
        assert_eq!(stored.next_channel_identifier.as_str(), "next-2");

        // the freed position can be claimed again
        db.commit_ratchet_step(&commit(member, 2, [0x11; 32], [0x13; 32])).unwrap();
        assert_eq!(*db.get_channel_member(member).unwrap().message_chain_key, [0x13; 32]);
    }

    #[test]
    fn superseded_step_is_not_reverted() {
        let mut db = Database::open_in_memory().unwrap();
        let member = seed_channel(&mut db).user_member.id;
        let first = commit(member, 1, [0x10; 32], [0x11; 32]);
        db.commit_ratchet_step(&first).unwrap();
        db.commit_ratchet_step(&commit(member, 2, [0x11; 32], [0x12; 32])).unwrap();

        assert!(matches!(
            db.revert_ratchet_step(&first),
            Err(StoreError::StaleRatchet(_))
        ));
        assert_eq!(db.max_nonce(member).unwrap(), Some(2));
        assert_eq!(*db.get_channel_member(member).unwrap().message_chain_key, [0x12; 32]);
    }
}
