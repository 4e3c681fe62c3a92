//! Contact handshakes.
//!
//! ```text
//! initiator                                   responder
//! init_handshake  ── init (identifier = A) ──▶ accept_handshake  (ReceivedInit)
//!   (AwaitingReply)                            reply_handshake   (Replied)
//! accept_handshake ◀── reply (identifier = A) ──
//!   (Complete)
//! ```
//!
//! Every incoming message is verified before anything is written. A reply is
//! matched to its init by the identifier alone unless the initiator pinned
//! the signing key it expects the reply from.

use std::sync::Arc;

use chrono::Utc;

use murmur_shared::crypto::generate_one_use_key_pair;
use murmur_shared::handshake::{HandshakeMessage, HandshakeState};
use murmur_shared::types::{ContactId, IdentityId, SigningPublicKey};
use murmur_shared::HandshakeError;
use murmur_store::{lock_db, Contact, Counterparty, SharedDatabase, StoreError};

use crate::error::ContactError;
use crate::key_manager::KeyManager;

pub struct ContactService {
    db: SharedDatabase,
    keys: Arc<dyn KeyManager>,
}

impl ContactService {
    pub fn new(db: SharedDatabase, keys: Arc<dyn KeyManager>) -> Self {
        Self { db, keys }
    }

    /// Start a handshake for `identity`: store a pending contact with a fresh
    /// one-use keypair and return the signed init to hand to the other party.
    pub fn init_handshake(
        &self,
        identity: IdentityId,
    ) -> Result<(Contact, HandshakeMessage), ContactError> {
        self.init_handshake_with(identity, None)
    }

    /// Like [`init_handshake`](Self::init_handshake), but when `expected_peer`
    /// is set only a reply signed by that key can complete the contact.
    pub fn init_handshake_with(
        &self,
        identity: IdentityId,
        expected_peer: Option<SigningPublicKey>,
    ) -> Result<(Contact, HandshakeMessage), ContactError> {
        let own_key = self.keys.read_public_signing_key(identity)?;
        let oneuse = generate_one_use_key_pair();
        let signature = self.keys.sign(identity, &oneuse.public)?;
        let id = ContactId::new();

        let contact = Contact {
            id,
            identity_id: identity,
            handshake_identifier: id.0,
            handshake_public_key: oneuse.public,
            handshake_private_key: oneuse.private,
            state: HandshakeState::PendingSelf.transition(HandshakeState::AwaitingReply)?,
            counterparty: None,
            expected_peer,
            created_at: Utc::now(),
        };
        lock_db(&self.db)?.insert_contact(&contact)?;

        let message =
            HandshakeMessage::from_parts(id.0, contact.handshake_public_key, own_key, signature);

        tracing::info!(
            contact = %id,
            identity = %identity,
            pinned = expected_peer.is_some(),
            "handshake initiated"
        );
        Ok((contact, message))
    }

    /// Take in a handshake message addressed to `identity`.
    ///
    /// A reply to one of our inits completes that contact; anything else is
    /// treated as a new init and creates a responder contact in
    /// `ReceivedInit`. A bad signature fails with `SignatureMismatch` and
    /// leaves the store untouched.
    pub fn accept_handshake(
        &self,
        identity: IdentityId,
        incoming: &HandshakeMessage,
    ) -> Result<Contact, ContactError> {
        incoming.verify()?;

        if self.keys.read_public_signing_key(identity)? == incoming.signing_key {
            return Err(ContactError::SelfHandshake);
        }

        let counterparty = Counterparty {
            oneuse_key: incoming.oneuse_key,
            signing_key: incoming.signing_key,
            signature: incoming.signature.clone(),
        };

        let db = lock_db(&self.db)?;
        match db.find_contact_by_handshake_identifier(identity, incoming.identifier)? {
            Some(mut contact) => {
                if let Some(expected) = contact.expected_peer {
                    if expected != incoming.signing_key {
                        return Err(ContactError::UnexpectedPeer {
                            contact: contact.id,
                            peer: incoming.signing_key,
                        });
                    }
                }
                let next = contact.state.transition(HandshakeState::Complete)?;
                db.complete_contact(contact.id, contact.state, next, &counterparty)?;
                contact.state = next;
                contact.counterparty = Some(counterparty);

                tracing::info!(
                    contact = %contact.id,
                    peer = %incoming.signing_key.short(),
                    "handshake complete"
                );
                Ok(contact)
            }
            None => {
                let oneuse = generate_one_use_key_pair();
                let contact = Contact {
                    id: ContactId::new(),
                    identity_id: identity,
                    handshake_identifier: incoming.identifier,
                    handshake_public_key: oneuse.public,
                    handshake_private_key: oneuse.private,
                    state: HandshakeState::ReceivedInit,
                    counterparty: Some(counterparty),
                    expected_peer: None,
                    created_at: Utc::now(),
                };
                db.insert_contact(&contact)?;

                tracing::info!(
                    contact = %contact.id,
                    peer = %incoming.signing_key.short(),
                    "handshake init received"
                );
                Ok(contact)
            }
        }
    }

    /// Answer a received init with our own signed one-use key, under the
    /// initiator's identifier.
    pub fn reply_handshake(&self, contact_id: ContactId) -> Result<HandshakeMessage, ContactError> {
        let contact = self.load(contact_id)?;
        contact.state.transition(HandshakeState::Replied)?;

        let own_key = self.keys.read_public_signing_key(contact.identity_id)?;
        let signature = self
            .keys
            .sign(contact.identity_id, &contact.handshake_public_key)?;
        let message = HandshakeMessage::from_parts(
            contact.handshake_identifier,
            contact.handshake_public_key,
            own_key,
            signature,
        );

        self.advance(contact_id, contact.state, HandshakeState::Replied)?;

        tracing::info!(contact = %contact_id, "handshake replied");
        Ok(message)
    }

    pub fn get_contact(&self, contact_id: ContactId) -> Result<Contact, ContactError> {
        self.load(contact_id)
    }

    fn load(&self, contact_id: ContactId) -> Result<Contact, ContactError> {
        lock_db(&self.db)?
            .get_contact(contact_id)
            .map_err(|e| match e {
                StoreError::NotFound => ContactError::NotFound(contact_id),
                other => ContactError::Store(other),
            })
    }

    /// Compare-and-swap a state-only transition.
    fn advance(
        &self,
        contact_id: ContactId,
        from: HandshakeState,
        to: HandshakeState,
    ) -> Result<HandshakeState, ContactError> {
        let next = from.transition(to)?;
        let moved = lock_db(&self.db)?.update_contact_state(contact_id, from, next)?;
        if !moved {
            let current = self.load(contact_id)?.state;
            return Err(HandshakeError::InvalidState {
                from: current.as_str(),
                to: to.as_str(),
            }
            .into());
        }
        Ok(next)
    }
}
