//! Domain model structs persisted in the local database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use murmur_shared::handshake::HandshakeState;
use murmur_shared::types::{
    ChannelId, ChannelIdentifier, ChannelMemberId, ChannelMessageId, ContactId, IdentityId,
    SigningPublicKey,
};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A local party. The private signing key lives with the key manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityRecord {
    pub id: IdentityId,
    pub display_name: Option<String>,
    pub public_signing_key: SigningPublicKey,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// Counterparty fields written once the handshake signature verified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counterparty {
    /// Their one-use X25519 public key.
    pub oneuse_key: [u8; 32],
    /// Their long-term Ed25519 public key.
    pub signing_key: SigningPublicKey,
    /// Their signature binding `oneuse_key` to `signing_key`.
    pub signature: Vec<u8>,
}

/// One identity's record of a handshake with another party.
#[derive(Clone)]
pub struct Contact {
    pub id: ContactId,
    pub identity_id: IdentityId,
    /// UUID of the initiator's contact; equal to `id` on the initiating side.
    pub handshake_identifier: Uuid,
    pub handshake_public_key: [u8; 32],
    pub handshake_private_key: Zeroizing<[u8; 32]>,
    pub state: HandshakeState,
    pub counterparty: Option<Counterparty>,
    /// Signing key a reply must carry, when the initiator knew its peer.
    pub expected_peer: Option<SigningPublicKey>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contact")
            .field("id", &self.id)
            .field("identity_id", &self.identity_id)
            .field("handshake_identifier", &self.handshake_identifier)
            .field("state", &self.state)
            .field("counterparty", &self.counterparty)
            .field("expected_peer", &self.expected_peer)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    /// SHA256(secret || secret); identical on both sides of the channel.
    pub channel_key: [u8; 32],
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Channel member
// ---------------------------------------------------------------------------

/// Whose ratchet a member row tracks: our own outbound chain or a contact's
/// inbound chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelMemberParty {
    User(IdentityId),
    Contact(ContactId),
}

impl ChannelMemberParty {
    pub fn side(&self) -> MemberSide {
        match self {
            Self::User(_) => MemberSide::User,
            Self::Contact(_) => MemberSide::Contact,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemberSide {
    User,
    Contact,
}

#[derive(Clone)]
pub struct ChannelMember {
    pub id: ChannelMemberId,
    pub channel_id: ChannelId,
    pub party: ChannelMemberParty,
    pub message_chain_key: Zeroizing<[u8; 32]>,
    /// Identifier this member's next message will carry.
    pub next_channel_identifier: ChannelIdentifier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for ChannelMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelMember")
            .field("id", &self.id)
            .field("channel_id", &self.channel_id)
            .field("party", &self.party)
            .field("next_channel_identifier", &self.next_channel_identifier)
            .finish_non_exhaustive()
    }
}

/// Typed filter for [`Database::find_channel_members`]. `None` fields do not
/// constrain the result.
///
/// [`Database::find_channel_members`]: crate::Database::find_channel_members
#[derive(Debug, Clone, Default)]
pub struct ChannelMemberQuery {
    pub contact_id: Option<ContactId>,
    pub user_id: Option<IdentityId>,
    pub channel_id: Option<ChannelId>,
    pub next_identifier: Option<ChannelIdentifier>,
    pub side: Option<MemberSide>,
}

// ---------------------------------------------------------------------------
// Channel message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: ChannelMessageId,
    pub channel_member_id: ChannelMemberId,
    pub message_contents: String,
    pub nonce: u64,
    pub created_at: DateTime<Utc>,
}

/// A message together with the member state that results from processing it.
/// Applied by [`Database::commit_ratchet_step`] in one transaction and undone
/// by [`Database::revert_ratchet_step`] while it is still the latest step.
///
/// [`Database::commit_ratchet_step`]: crate::Database::commit_ratchet_step
/// [`Database::revert_ratchet_step`]: crate::Database::revert_ratchet_step
pub struct RatchetCommit {
    pub member_id: ChannelMemberId,
    /// Chain key the step was planned from.
    pub expected_chain_key: [u8; 32],
    /// Identifier the step was planned from.
    pub previous_identifier: ChannelIdentifier,
    pub next_chain_key: [u8; 32],
    pub next_identifier: ChannelIdentifier,
    pub message: ChannelMessage,
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A ledger log entry ingested locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: i64,
    pub transaction_hash: String,
    pub channel_identifier: ChannelIdentifier,
    pub encrypted_message_link: Vec<u8>,
    pub encrypted_message_link_signature: Vec<u8>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub transaction_hash: String,
    pub channel_identifier: ChannelIdentifier,
    pub encrypted_message_link: Vec<u8>,
    pub encrypted_message_link_signature: Vec<u8>,
}
