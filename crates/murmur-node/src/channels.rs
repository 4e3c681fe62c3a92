use std::sync::Arc;

use chrono::Utc;

use murmur_shared::crypto::generate_ecdh_shared_secret;
use murmur_shared::handshake::HandshakeState;
use murmur_shared::ratchet::{derive_channel_key, MemberRatchet};
use murmur_shared::types::{ChannelId, ChannelMemberId, ContactId};
use murmur_store::{
    lock_db, Channel, ChannelMember, ChannelMemberParty, ChannelMemberQuery, SharedDatabase,
    StoreError,
};

use crate::error::ChannelError;
use crate::key_manager::KeyManager;

/// A freshly opened channel and the two members tracking its directions.
#[derive(Debug, Clone)]
pub struct OpenedChannel {
    pub channel: Channel,
    /// Our outbound chain; pass its id to the codec to send.
    pub user_member: ChannelMember,
    /// The contact's chain; incoming messages are matched against it.
    pub contact_member: ChannelMember,
}

pub struct ChannelService {
    db: SharedDatabase,
    keys: Arc<dyn KeyManager>,
}

impl ChannelService {
    pub fn new(db: SharedDatabase, keys: Arc<dyn KeyManager>) -> Self {
        Self { db, keys }
    }

    /// Open the channel with a contact whose handshake has finished. A
    /// contact gets one channel; opening it again fails with `AlreadyOpen`.
    ///
    /// Both parties derive the same secret, hence the same channel key and
    /// initial chain key; each member's identifiers are bound to the signing
    /// key of the party that sends on it.
    pub fn open_channel(
        &self,
        contact_id: ContactId,
        name: &str,
    ) -> Result<OpenedChannel, ChannelError> {
        let contact = lock_db(&self.db)?
            .get_contact(contact_id)
            .map_err(|e| match e {
                StoreError::NotFound => ChannelError::ContactNotFound(contact_id),
                other => ChannelError::Store(other),
            })?;

        let counterparty = match (&contact.counterparty, contact.state) {
            (Some(c), HandshakeState::Complete | HandshakeState::Replied) => c,
            _ => {
                return Err(ChannelError::ContactNotReady {
                    contact: contact_id,
                    state: contact.state.to_string(),
                })
            }
        };

        let own_key = self.keys.read_public_signing_key(contact.identity_id)?;
        let secret =
            generate_ecdh_shared_secret(&counterparty.oneuse_key, &contact.handshake_private_key);

        let channel = Channel {
            id: ChannelId::new(),
            name: name.to_string(),
            channel_key: derive_channel_key(&*secret),
            created_at: Utc::now(),
        };

        let user = MemberRatchet::initial(&*secret, &own_key)?;
        let peer = MemberRatchet::initial(&*secret, &counterparty.signing_key)?;
        let now = Utc::now();
        let member = |party: ChannelMemberParty, ratchet: MemberRatchet| ChannelMember {
            id: ChannelMemberId::new(),
            channel_id: channel.id,
            party,
            message_chain_key: ratchet.chain_key,
            next_channel_identifier: ratchet.next_identifier,
            created_at: now,
            updated_at: now,
        };
        let user_member = member(ChannelMemberParty::User(contact.identity_id), user);
        let contact_member = member(ChannelMemberParty::Contact(contact_id), peer);

        let mut db = lock_db(&self.db)?;
        let existing = db.find_channel_members(&ChannelMemberQuery {
            contact_id: Some(contact_id),
            ..Default::default()
        })?;
        if let Some(member) = existing.first() {
            return Err(ChannelError::AlreadyOpen {
                contact: contact_id,
                channel: member.channel_id,
            });
        }
        db.create_channel_with_members(&channel, &[user_member.clone(), contact_member.clone()])?;
        drop(db);

        tracing::info!(
            channel = %channel.id,
            contact = %contact_id,
            name = %channel.name,
            "channel opened"
        );

        Ok(OpenedChannel {
            channel,
            user_member,
            contact_member,
        })
    }

    /// Members of a channel, oldest first.
    pub fn members(&self, channel_id: ChannelId) -> Result<Vec<ChannelMember>, ChannelError> {
        Ok(lock_db(&self.db)?.find_channel_members(&ChannelMemberQuery {
            channel_id: Some(channel_id),
            ..Default::default()
        })?)
    }
}
