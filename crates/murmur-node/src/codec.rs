//! Turning plaintext into ledger records and back.
//!
//! ```text
//! encode: plaintext ─▶ keyed ─▶ claimed ─▶ encrypted ─▶ linked ─▶ signed ─▶ emitted
//! decode: record ─▶ identified ─▶ verified ─▶ decrypted ─▶ committed
//! ```
//!
//! The content is sealed with the member's current message key and stored
//! in the blob store; the record carries the blob address sealed with the
//! same key (on a separate nonce lane) and signed by the sender.
//!
//! A send claims its ratchet step through [`Database::commit_ratchet_step`]
//! before any ciphertext leaves the node, so two senders sharing a database
//! can never seal under the same message key. A send that fails after the
//! claim hands the step back with [`Database::revert_ratchet_step`]. A
//! receiver commits only once the whole record has been opened.
//!
//! [`Database::commit_ratchet_step`]: murmur_store::Database::commit_ratchet_step
//! [`Database::revert_ratchet_step`]: murmur_store::Database::revert_ratchet_step

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use murmur_shared::constants::MAX_MESSAGE_SIZE;
use murmur_shared::crypto::{decrypt, encrypt, MessageNonce, NonceLane, SymmetricKey};
use murmur_shared::protocol::WireRecord;
use murmur_shared::ratchet::{MemberRatchet, PlannedStep};
use murmur_shared::types::{
    ChannelIdentifier, ChannelMemberId, ChannelMessageId, IdentityId, SigningPublicKey,
};
use murmur_store::{
    lock_db, ChannelMember, ChannelMemberParty, ChannelMessage, RatchetCommit, SharedDatabase,
    StoreError,
};

use crate::blob_store::BlobStore;
use crate::error::CodecError;
use crate::key_manager::KeyManager;
use crate::ledger::{Ledger, TransactionReceipt};
use crate::locks::MemberLocks;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedMessage {
    pub plaintext: String,
    pub channel_member_id: ChannelMemberId,
    pub nonce: u64,
}

/// Member state read in one go before a step is planned.
struct MemberSnapshot {
    member: ChannelMember,
    channel_key: SymmetricKey,
    last_nonce: Option<u64>,
}

impl MemberSnapshot {
    fn plan(&self, signer: &SigningPublicKey) -> Result<PlannedStep, CodecError> {
        let ratchet = MemberRatchet {
            chain_key: self.member.message_chain_key.clone(),
            next_identifier: self.member.next_channel_identifier.clone(),
        };
        Ok(ratchet.plan(signer, &self.channel_key, self.last_nonce)?)
    }
}

pub struct ChannelCodec {
    db: SharedDatabase,
    keys: Arc<dyn KeyManager>,
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<dyn Ledger>,
    locks: MemberLocks,
}

impl ChannelCodec {
    pub fn new(
        db: SharedDatabase,
        keys: Arc<dyn KeyManager>,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            db,
            keys,
            blobs,
            ledger,
            locks: MemberLocks::default(),
        }
    }

    /// Send `plaintext` on one of our own (user-side) members.
    ///
    /// If anything fails after the step was claimed (blob upload, signing,
    /// ledger submission) the step is released again and the member keeps
    /// its current position; an uploaded blob is left behind.
    pub async fn encode(
        &self,
        plaintext: &str,
        member_id: ChannelMemberId,
    ) -> Result<WireRecord, CodecError> {
        if plaintext.len() > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge {
                size: plaintext.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let _turn = self.locks.acquire(member_id).await;

        let snapshot = match self.snapshot(member_id) {
            Ok(snapshot) => snapshot,
            Err(StoreError::NotFound) => return Err(CodecError::RecipientNotFound(member_id)),
            Err(e) => return Err(e.into()),
        };
        let ChannelMemberParty::User(identity) = snapshot.member.party else {
            return Err(CodecError::RecipientNotFound(member_id));
        };

        // keyed
        let sender = self.keys.read_public_signing_key(identity)?;
        let step = snapshot.plan(&sender)?;
        if step.channel_identifier != snapshot.member.next_channel_identifier {
            return Err(StoreError::InvalidRecord(format!(
                "member {member_id} stores identifier {} but its chain yields {}",
                snapshot.member.next_channel_identifier, step.channel_identifier
            ))
            .into());
        }

        // claimed
        let claim = ratchet_commit(&snapshot, &step, plaintext.to_string());
        self.commit(&claim)?;

        let (record, receipt) = match self.publish(identity, &sender, &step, plaintext).await {
            Ok(published) => published,
            Err(e) => {
                if let Err(revert) = self.revert(&claim) {
                    tracing::error!(
                        member = %member_id,
                        nonce = step.nonce,
                        error = %revert,
                        "failed send could not release its ratchet step"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            member = %member_id,
            nonce = step.nonce,
            tx = %receipt.transaction_hash,
            "message sent"
        );
        Ok(record)
    }

    async fn publish(
        &self,
        identity: IdentityId,
        sender: &SigningPublicKey,
        step: &PlannedStep,
        plaintext: &str,
    ) -> Result<(WireRecord, TransactionReceipt), CodecError> {
        // encrypted
        let content = encrypt(
            plaintext.as_bytes(),
            &MessageNonce::new(NonceLane::Content, step.nonce, sender),
            &step.message_key,
        )?;

        // linked
        let address = self.blobs.store(&content).await?;
        let link = encrypt(
            address.as_bytes(),
            &MessageNonce::new(NonceLane::Link, step.nonce, sender),
            &step.message_key,
        )?;

        // signed
        let signature = self.keys.sign(identity, &link)?;
        let record = WireRecord {
            channel_identifier: step.channel_identifier.clone(),
            encrypted_message_link: link,
            encrypted_message_link_signature: signature.to_vec(),
        };

        // emitted
        let receipt = self
            .ledger
            .emit_event(&record)
            .await
            .map_err(CodecError::Submission)?;
        Ok((record, receipt))
    }

    /// Open a record addressed to one of our contact-side members.
    pub async fn decode(&self, record: &WireRecord) -> Result<DecodedMessage, CodecError> {
        let identifier = &record.channel_identifier;
        let member_id = self
            .find_recipient(identifier)?
            .ok_or_else(|| CodecError::UnknownChannel(identifier.clone()))?;

        let _turn = self.locks.acquire(member_id).await;

        // the member may have moved on while we waited for our turn
        let snapshot = match self.snapshot(member_id) {
            Ok(s) if &s.member.next_channel_identifier == identifier => s,
            Ok(_) | Err(StoreError::NotFound) => {
                return Err(CodecError::UnknownChannel(identifier.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let ChannelMemberParty::Contact(contact_id) = snapshot.member.party else {
            return Err(CodecError::UnknownChannel(identifier.clone()));
        };
        let sender = lock_db(&self.db)?
            .get_contact(contact_id)?
            .counterparty
            .map(|c| c.signing_key)
            .ok_or_else(|| {
                StoreError::InvalidRecord(format!("contact {contact_id} has no counterparty"))
            })?;

        // verified
        if !self.keys.verify_signature(
            &record.encrypted_message_link_signature,
            &record.encrypted_message_link,
            &sender,
        ) {
            return Err(CodecError::SignatureMismatch);
        }

        // decrypted
        let step = snapshot.plan(&sender)?;
        let link = decrypt(
            &record.encrypted_message_link,
            &MessageNonce::new(NonceLane::Link, step.nonce, &sender),
            &step.message_key,
        )
        .map_err(|_| CodecError::Authentication)?;
        let address = String::from_utf8(link).map_err(|_| CodecError::InvalidLink)?;

        let content = self.blobs.retrieve(&address).await?;
        let plaintext = decrypt(
            &content,
            &MessageNonce::new(NonceLane::Content, step.nonce, &sender),
            &step.message_key,
        )
        .map_err(|_| CodecError::Authentication)?;
        let plaintext = String::from_utf8(plaintext).map_err(|_| CodecError::InvalidPlaintext)?;

        // accepted
        let commit = ratchet_commit(&snapshot, &step, plaintext);
        self.commit(&commit)?;
        let message = commit.message;

        tracing::info!(member = %member_id, nonce = message.nonce, "message received");
        Ok(DecodedMessage {
            plaintext: message.message_contents,
            channel_member_id: member_id,
            nonce: message.nonce,
        })
    }

    fn find_recipient(
        &self,
        identifier: &ChannelIdentifier,
    ) -> Result<Option<ChannelMemberId>, StoreError> {
        Ok(lock_db(&self.db)?
            .find_contact_member_by_identifier(identifier)?
            .map(|member| member.id))
    }

    fn snapshot(&self, member_id: ChannelMemberId) -> Result<MemberSnapshot, StoreError> {
        let db = lock_db(&self.db)?;
        let member = db.get_channel_member(member_id)?;
        let channel = db.get_channel(member.channel_id)?;
        let last_nonce = db.max_nonce(member_id)?;
        Ok(MemberSnapshot {
            member,
            channel_key: channel.channel_key,
            last_nonce,
        })
    }

    fn commit(&self, commit: &RatchetCommit) -> Result<(), StoreError> {
        lock_db(&self.db)?.commit_ratchet_step(commit)
    }

    fn revert(&self, commit: &RatchetCommit) -> Result<(), StoreError> {
        lock_db(&self.db)?.revert_ratchet_step(commit)
    }
}

fn ratchet_commit(snapshot: &MemberSnapshot, step: &PlannedStep, contents: String) -> RatchetCommit {
    RatchetCommit {
        member_id: snapshot.member.id,
        expected_chain_key: *snapshot.member.message_chain_key,
        previous_identifier: snapshot.member.next_channel_identifier.clone(),
        next_chain_key: step.next_chain_key,
        next_identifier: step.next_identifier.clone(),
        message: ChannelMessage {
            id: ChannelMessageId::new(),
            channel_member_id: snapshot.member.id,
            message_contents: contents,
            nonce: step.nonce,
            created_at: Utc::now(),
        },
    }
}
