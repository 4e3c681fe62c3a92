use thiserror::Error;

use murmur_shared::types::{
    ChannelId, ChannelIdentifier, ChannelMemberId, ContactId, IdentityId, SigningPublicKey,
};
use murmur_shared::{CryptoError, HandshakeError, RatchetError};
use murmur_store::StoreError;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Blob too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Empty blob")]
    Empty,

    #[error("Invalid blob address: {0}")]
    InvalidAddress(String),

    #[error("Blob storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger refused or failed to record the event.
    #[error("Ledger submission failed: {0}")]
    Submission(String),
}

#[derive(Debug, Error)]
pub enum KeyManagerError {
    #[error("Unknown key manager '{0}'")]
    UnknownBackend(String),

    #[error("No signing key for identity {0}")]
    KeyNotFound(IdentityId),

    #[error("Signing key for identity {0} already exists")]
    KeyExists(IdentityId),

    #[error("Key storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    KeyManager(#[from] KeyManagerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ContactError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("Contact not found: {0}")]
    NotFound(ContactId),

    #[error("Handshake message is signed by the receiving identity itself")]
    SelfHandshake,

    #[error("Reply for contact {contact} is signed by {peer}, not the pinned peer")]
    UnexpectedPeer {
        contact: ContactId,
        peer: SigningPublicKey,
    },

    #[error(transparent)]
    KeyManager(#[from] KeyManagerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Contact {contact} has no completed handshake (state {state})")]
    ContactNotReady { contact: ContactId, state: String },

    #[error("Contact not found: {0}")]
    ContactNotFound(ContactId),

    #[error("Contact {contact} already has channel {channel}")]
    AlreadyOpen { contact: ContactId, channel: ChannelId },

    #[error(transparent)]
    Ratchet(#[from] RatchetError),

    #[error(transparent)]
    KeyManager(#[from] KeyManagerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum CodecError {
    /// The sending member does not exist or is not one of our own members.
    #[error("Recipient not found: channel member {0}")]
    RecipientNotFound(ChannelMemberId),

    /// No contact-side member expects a message with this identifier.
    #[error("Unknown channel identifier {0}")]
    UnknownChannel(ChannelIdentifier),

    #[error("Message link signature does not verify against the sender's key")]
    SignatureMismatch,

    /// The link or the content failed AEAD authentication.
    #[error("Authentication failed while decrypting message")]
    Authentication,

    #[error(transparent)]
    Submission(LedgerError),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Decrypted message is not valid UTF-8")]
    InvalidPlaintext,

    #[error("Decrypted message link is not a blob address")]
    InvalidLink,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Ratchet(#[from] RatchetError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    KeyManager(#[from] KeyManagerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum DrainError {
    #[error("A drain is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Store(#[from] StoreError),
}
