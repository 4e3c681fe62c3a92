//! Contact handshake: a signed binding of a one-use X25519 key to a long-term
//! Ed25519 signing key.
//!
//! The initiator sends an init message carrying the UUID of its pending
//! contact. The responder verifies it, records the counterparty, and answers
//! with its own one-use key under the same identifier so the initiator can
//! correlate the reply. Once both sides hold the other's one-use key they
//! derive the same shared secret with ECDH.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::validate_signature;
use crate::error::HandshakeError;
use crate::identity::Identity;
use crate::types::SigningPublicKey;

/// Per-contact handshake state.
///
/// Initiator: `PendingSelf -> AwaitingReply -> Complete`.
/// Responder: `ReceivedInit -> Replied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeState {
    PendingSelf,
    AwaitingReply,
    Complete,
    ReceivedInit,
    Replied,
}

impl HandshakeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingSelf => "pending_self",
            Self::AwaitingReply => "awaiting_reply",
            Self::Complete => "complete",
            Self::ReceivedInit => "received_init",
            Self::Replied => "replied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending_self" => Some(Self::PendingSelf),
            "awaiting_reply" => Some(Self::AwaitingReply),
            "complete" => Some(Self::Complete),
            "received_init" => Some(Self::ReceivedInit),
            "replied" => Some(Self::Replied),
            _ => None,
        }
    }

    /// Move to `next`, rejecting anything outside the two chains above.
    pub fn transition(self, next: HandshakeState) -> Result<HandshakeState, HandshakeError> {
        use HandshakeState::*;
        match (self, next) {
            (PendingSelf, AwaitingReply) | (AwaitingReply, Complete) | (ReceivedInit, Replied) => {
                Ok(next)
            }
            _ => Err(HandshakeError::InvalidState {
                from: self.as_str(),
                to: next.as_str(),
            }),
        }
    }

    /// Whether the counterparty's fields have been verified and stored.
    pub fn has_counterparty(&self) -> bool {
        matches!(self, Self::Complete | Self::ReceivedInit | Self::Replied)
    }
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Init or reply payload exchanged between the two parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeMessage {
    /// UUID of the initiator's contact record.
    pub identifier: Uuid,
    /// Sender's one-use X25519 public key.
    pub oneuse_key: [u8; 32],
    /// Sender's long-term Ed25519 public key.
    pub signing_key: SigningPublicKey,
    /// Ed25519 signature over `oneuse_key` by `signing_key`.
    pub signature: Vec<u8>,
}

impl HandshakeMessage {
    /// Sign `oneuse_key` with the identity's long-term key.
    pub fn create(identifier: Uuid, oneuse_key: [u8; 32], identity: &Identity) -> Self {
        Self::from_parts(
            identifier,
            oneuse_key,
            identity.public_key(),
            identity.sign(&oneuse_key),
        )
    }

    /// Assemble a message from a signature produced elsewhere (e.g. a key
    /// manager that never exposes the private key).
    pub fn from_parts(
        identifier: Uuid,
        oneuse_key: [u8; 32],
        signing_key: SigningPublicKey,
        signature: [u8; 64],
    ) -> Self {
        Self {
            identifier,
            oneuse_key,
            signing_key,
            signature: signature.to_vec(),
        }
    }

    pub fn verify(&self) -> Result<(), HandshakeError> {
        if validate_signature(&self.signature, &self.oneuse_key, &self.signing_key.0) {
            Ok(())
        } else {
            Err(HandshakeError::SignatureMismatch)
        }
    }

    /// Encode as a copiable base64url string.
    pub fn encode(&self) -> Result<String, HandshakeError> {
        let bytes = bincode::serialize(self).map_err(|_| HandshakeError::InvalidFormat)?;
        Ok(base64_url_encode(&bytes))
    }

    pub fn decode(code: &str) -> Result<Self, HandshakeError> {
        let bytes = base64_url_decode(code)?;
        bincode::deserialize(&bytes).map_err(|_| HandshakeError::InvalidFormat)
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

fn base64_url_decode(s: &str) -> Result<Vec<u8>, HandshakeError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD
        .decode(s.trim())
        .map_err(|_| HandshakeError::Base64Decode)
}
