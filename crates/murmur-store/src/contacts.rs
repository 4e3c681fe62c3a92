//! CRUD operations for [`Contact`] records.
//!
//! A contact is written twice at most: once when created and once when the
//! counterparty's verified handshake fields are attached. State-only
//! transitions are compare-and-swap updates on the previous state.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;
use zeroize::Zeroizing;

use murmur_shared::handshake::HandshakeState;
use murmur_shared::types::{ContactId, IdentityId, SigningPublicKey};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Contact, Counterparty};
use crate::rows::{key_at, not_found, opt_key_at, timestamp_at, uuid_at};

const CONTACT_COLUMNS: &str = "id, identity_id, handshake_identifier, handshake_public_key,
     handshake_private_key, state, oneuse_key, signing_key, signature, created_at,
     expected_signing_key";

impl Database {
    pub fn insert_contact(&self, contact: &Contact) -> Result<()> {
        let private_hex = Zeroizing::new(hex::encode(&*contact.handshake_private_key));
        let counterparty = contact.counterparty.as_ref();
        self.conn().execute(
            "INSERT INTO contacts (id, identity_id, handshake_identifier, handshake_public_key,
                 handshake_private_key, state, oneuse_key, signing_key, signature, created_at,
                 expected_signing_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                contact.id.to_string(),
                contact.identity_id.to_string(),
                contact.handshake_identifier.to_string(),
                hex::encode(contact.handshake_public_key),
                private_hex.as_str(),
                contact.state.as_str(),
                counterparty.map(|c| hex::encode(c.oneuse_key)),
                counterparty.map(|c| c.signing_key.to_hex()),
                counterparty.map(|c| c.signature.clone()),
                contact.created_at.to_rfc3339(),
                contact.expected_peer.map(|k| k.to_hex()),
            ],
        )?;
        Ok(())
    }

    pub fn get_contact(&self, id: ContactId) -> Result<Contact> {
        self.conn()
            .query_row(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                params![id.to_string()],
                row_to_contact,
            )
            .map_err(not_found)
    }

    /// Find the contact an identity holds for a given handshake identifier.
    pub fn find_contact_by_handshake_identifier(
        &self,
        identity_id: IdentityId,
        identifier: Uuid,
    ) -> Result<Option<Contact>> {
        Ok(self
            .conn()
            .query_row(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts
                     WHERE identity_id = ?1 AND handshake_identifier = ?2"
                ),
                params![identity_id.to_string(), identifier.to_string()],
                row_to_contact,
            )
            .optional()?)
    }

    /// Move a contact from `from` to `to` without touching any other field.
    /// Returns `false` if the contact was not in state `from`.
    pub fn update_contact_state(
        &self,
        id: ContactId,
        from: HandshakeState,
        to: HandshakeState,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE contacts SET state = ?3 WHERE id = ?1 AND state = ?2",
            params![id.to_string(), from.as_str(), to.as_str()],
        )?;
        Ok(affected > 0)
    }

    /// The one completion write: attach the counterparty and move to `to`.
    /// Fails if the contact is not in state `from` or already has a
    /// counterparty.
    pub fn complete_contact(
        &self,
        id: ContactId,
        from: HandshakeState,
        to: HandshakeState,
        counterparty: &Counterparty,
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE contacts
             SET state = ?3, oneuse_key = ?4, signing_key = ?5, signature = ?6
             WHERE id = ?1 AND state = ?2 AND oneuse_key IS NULL",
            params![
                id.to_string(),
                from.as_str(),
                to.as_str(),
                hex::encode(counterparty.oneuse_key),
                counterparty.signing_key.to_hex(),
                counterparty.signature,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::InvalidRecord(format!(
                "contact {id} is not awaiting completion from {from}"
            )));
        }
        Ok(())
    }
}

fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let state_str: String = row.get(5)?;
    let state = HandshakeState::parse(&state_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown handshake state '{state_str}'").into(),
        )
    })?;

    let oneuse_key = opt_key_at(row, 6)?;
    let signing_key = opt_key_at(row, 7)?;
    let signature: Option<Vec<u8>> = row.get(8)?;
    let counterparty = match (oneuse_key, signing_key, signature) {
        (Some(oneuse_key), Some(signing_key), Some(signature)) => Some(Counterparty {
            oneuse_key,
            signing_key: SigningPublicKey(signing_key),
            signature,
        }),
        _ => None,
    };

    Ok(Contact {
        id: ContactId(uuid_at(row, 0)?),
        identity_id: IdentityId(uuid_at(row, 1)?),
        handshake_identifier: uuid_at(row, 2)?,
        handshake_public_key: key_at(row, 3)?,
        handshake_private_key: Zeroizing::new(key_at(row, 4)?),
        state,
        counterparty,
        expected_peer: opt_key_at(row, 10)?.map(SigningPublicKey),
        created_at: timestamp_at(row, 9)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::IdentityRecord;
    use chrono::Utc;

    pub(crate) fn seed_identity(db: &Database, key: u8) -> IdentityId {
        let identity = IdentityRecord {
            id: IdentityId::new(),
            display_name: None,
            public_signing_key: SigningPublicKey([key; 32]),
            created_at: Utc::now(),
        };
        db.insert_identity(&identity).unwrap();
        identity.id
    }

    pub(crate) fn pending_contact(identity_id: IdentityId) -> Contact {
        let id = ContactId::new();
        Contact {
            id,
            identity_id,
            handshake_identifier: id.0,
            handshake_public_key: [3u8; 32],
            handshake_private_key: Zeroizing::new([4u8; 32]),
            state: HandshakeState::AwaitingReply,
            counterparty: None,
            expected_peer: None,
            created_at: Utc::now(),
        }
    }

    fn counterparty() -> Counterparty {
        Counterparty {
            oneuse_key: [5u8; 32],
            signing_key: SigningPublicKey([6u8; 32]),
            signature: vec![7u8; 64],
        }
    }

    #[test]
    fn insert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let identity = seed_identity(&db, 1);
        let contact = pending_contact(identity);
        db.insert_contact(&contact).unwrap();

        let loaded = db.get_contact(contact.id).unwrap();
        assert_eq!(loaded.state, HandshakeState::AwaitingReply);
        assert_eq!(*loaded.handshake_private_key, [4u8; 32]);
        assert!(loaded.counterparty.is_none());

        let found = db
            .find_contact_by_handshake_identifier(identity, contact.id.0)
            .unwrap();
        assert_eq!(found.map(|c| c.id), Some(contact.id));

        let mut pinned = pending_contact(identity);
        pinned.expected_peer = Some(SigningPublicKey([8u8; 32]));
        db.insert_contact(&pinned).unwrap();
        assert_eq!(
            db.get_contact(pinned.id).unwrap().expected_peer,
            Some(SigningPublicKey([8u8; 32]))
        );
    }

    #[test]
    fn completion_is_written_once() {
        let db = Database::open_in_memory().unwrap();
        let contact = pending_contact(seed_identity(&db, 1));
        db.insert_contact(&contact).unwrap();

        db.complete_contact(
            contact.id,
            HandshakeState::AwaitingReply,
            HandshakeState::Complete,
            &counterparty(),
        )
        .unwrap();

        let loaded = db.get_contact(contact.id).unwrap();
        assert_eq!(loaded.state, HandshakeState::Complete);
        assert_eq!(loaded.counterparty, Some(counterparty()));

        let again = db.complete_contact(
            contact.id,
            HandshakeState::Complete,
            HandshakeState::Complete,
            &counterparty(),
        );
        assert!(matches!(again, Err(StoreError::InvalidRecord(_))));
    }

    #[test]
    fn state_update_is_compare_and_swap() {
        let db = Database::open_in_memory().unwrap();
        let mut contact = pending_contact(seed_identity(&db, 1));
        contact.state = HandshakeState::PendingSelf;
        db.insert_contact(&contact).unwrap();

        assert!(db
            .update_contact_state(
                contact.id,
                HandshakeState::PendingSelf,
                HandshakeState::AwaitingReply
            )
            .unwrap());
        assert!(!db
            .update_contact_state(
                contact.id,
                HandshakeState::PendingSelf,
                HandshakeState::AwaitingReply
            )
            .unwrap());
    }
}
