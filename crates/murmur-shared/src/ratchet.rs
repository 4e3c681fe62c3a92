//! Channel ratchet: deterministic derivations over a channel member's state.
//!
//! ```text
//! shared secret ──SHA256(s || s)──────────────▶ channel key
//!       │
//!       └─HKDF(id = 1, "ChainKey")──▶ chain key₀
//!                                       │
//!            ┌──SHA256(ck || 1)─────────┤
//!            ▼                          │ SHA256(ck || 2)
//!       message key (nonce n)           ▼
//!                                   chain key₁ ── ...
//! ```
//!
//! A member's stored identifier always names the message it will carry next,
//! while its stored chain key is the one that message is sealed with. Every
//! send or receive consumes exactly one step.

use zeroize::Zeroizing;

use crate::constants::{
    CHAIN_KEY_ID, CHAIN_KEY_RATCHET, FIRST_NONCE, KDF_CONTEXT_CHAIN_KEY, MESSAGE_KEY_RATCHET,
};
use crate::crypto::{derive_symmetric_key_from_secret, sha256_concat, SymmetricKey};
use crate::error::RatchetError;
use crate::types::{ChannelIdentifier, SigningPublicKey};

pub fn derive_channel_key(secret: &[u8]) -> SymmetricKey {
    sha256_concat(&[secret, secret])
}

pub fn initial_chain_key(secret: &[u8]) -> Result<SymmetricKey, RatchetError> {
    Ok(derive_symmetric_key_from_secret(
        secret,
        CHAIN_KEY_ID,
        KDF_CONTEXT_CHAIN_KEY,
    )?)
}

/// Identifier a member's message number `nonce` will carry on the log.
pub fn next_channel_identifier(
    signing_key: &SigningPublicKey,
    channel_key: &SymmetricKey,
    nonce: u64,
) -> ChannelIdentifier {
    let digest = sha256_concat(&[&signing_key.0, channel_key, &nonce.to_be_bytes()]);
    ChannelIdentifier::from_digest(&digest)
}

/// Output of one hash-ratchet step.
pub struct RatchetStep {
    pub message_key: Zeroizing<SymmetricKey>,
    pub next_chain_key: SymmetricKey,
}

pub fn ratchet_step(chain_key: &SymmetricKey) -> RatchetStep {
    RatchetStep {
        message_key: Zeroizing::new(sha256_concat(&[chain_key, &[MESSAGE_KEY_RATCHET]])),
        next_chain_key: sha256_concat(&[chain_key, &[CHAIN_KEY_RATCHET]]),
    }
}

/// Nonce of the message being processed and of the one after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceSchedule {
    pub current: u64,
    pub next: u64,
}

impl NonceSchedule {
    /// `current = max + 1` (1 for a fresh member), `next = current + 1`.
    pub fn after(max_existing: Option<u64>) -> Result<Self, RatchetError> {
        let current = match max_existing {
            None => FIRST_NONCE,
            Some(last) => last
                .checked_add(1)
                .ok_or(RatchetError::NonceExhausted { last })?,
        };
        let next = current
            .checked_add(1)
            .ok_or(RatchetError::NonceExhausted { last: current })?;
        Ok(Self { current, next })
    }
}

/// Ratchet state of a member at the moment before a message is processed.
#[derive(Clone)]
pub struct MemberRatchet {
    pub chain_key: Zeroizing<SymmetricKey>,
    pub next_identifier: ChannelIdentifier,
}

impl MemberRatchet {
    /// State for nonce 1 of a member whose messages are signed by `signing_key`.
    pub fn initial(
        secret: &[u8],
        signing_key: &SigningPublicKey,
    ) -> Result<Self, RatchetError> {
        let channel_key = derive_channel_key(secret);
        Ok(Self {
            chain_key: Zeroizing::new(initial_chain_key(secret)?),
            next_identifier: next_channel_identifier(signing_key, &channel_key, FIRST_NONCE),
        })
    }

    /// Plan the step for the message after `max_existing`. Nothing is
    /// mutated; the caller persists `next_chain_key`/`next_identifier`.
    pub fn plan(
        &self,
        signing_key: &SigningPublicKey,
        channel_key: &SymmetricKey,
        max_existing: Option<u64>,
    ) -> Result<PlannedStep, RatchetError> {
        let nonces = NonceSchedule::after(max_existing)?;
        let step = ratchet_step(&self.chain_key);
        Ok(PlannedStep {
            nonce: nonces.current,
            channel_identifier: next_channel_identifier(signing_key, channel_key, nonces.current),
            message_key: step.message_key,
            next_chain_key: step.next_chain_key,
            next_identifier: next_channel_identifier(signing_key, channel_key, nonces.next),
        })
    }
}

/// Everything needed to seal or open one message and then advance the member.
pub struct PlannedStep {
    pub nonce: u64,
    /// Identifier this message carries.
    pub channel_identifier: ChannelIdentifier,
    pub message_key: Zeroizing<SymmetricKey>,
    pub next_chain_key: SymmetricKey,
    /// Identifier the following message will carry.
    pub next_identifier: ChannelIdentifier,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn signer() -> SigningPublicKey {
        SigningPublicKey([0x11; 32])
    }

    #[test]
    fn test_channel_key_deterministic() {
        let secret = [0x42u8; 32];
        assert_eq!(derive_channel_key(&secret), derive_channel_key(&secret));
        assert_ne!(derive_channel_key(&secret), derive_channel_key(&[0x43u8; 32]));
    }

    #[test]
    fn test_step_outputs_are_distinct() {
        let chain = initial_chain_key(&[9u8; 32]).unwrap();
        let step = ratchet_step(&chain);

        assert_ne!(*step.message_key, step.next_chain_key);
        assert_ne!(*step.message_key, chain);
        assert_ne!(step.next_chain_key, chain);

        let following = ratchet_step(&step.next_chain_key);
        assert_ne!(*following.message_key, *step.message_key);
        assert_ne!(following.next_chain_key, step.next_chain_key);
    }

    #[test]
    fn test_nonce_schedule() {
        assert_eq!(
            NonceSchedule::after(None).unwrap(),
            NonceSchedule { current: 1, next: 2 }
        );
        assert_eq!(
            NonceSchedule::after(Some(41)).unwrap(),
            NonceSchedule { current: 42, next: 43 }
        );
        assert!(NonceSchedule::after(Some(u64::MAX)).is_err());
        assert!(NonceSchedule::after(Some(u64::MAX - 1)).is_err());
    }

    #[test]
    fn test_identifier_depends_on_every_input() {
        let channel_key = derive_channel_key(b"secret");
        let base = next_channel_identifier(&signer(), &channel_key, 1);

        assert_eq!(base, next_channel_identifier(&signer(), &channel_key, 1));
        assert_ne!(base, next_channel_identifier(&signer(), &channel_key, 2));
        assert_ne!(
            base,
            next_channel_identifier(&SigningPublicKey([0x12; 32]), &channel_key, 1)
        );
        assert_ne!(
            base,
            next_channel_identifier(&signer(), &derive_channel_key(b"other"), 1)
        );
        assert_eq!(base.as_str().len(), 64);
    }

    #[test]
    fn test_plan_keeps_identifier_offset() {
        let secret = [5u8; 32];
        let channel_key = derive_channel_key(&secret);
        let state = MemberRatchet::initial(&secret, &signer()).unwrap();

        let first = state.plan(&signer(), &channel_key, None).unwrap();
        assert_eq!(first.nonce, 1);
        // the stored identifier names exactly the message being planned
        assert_eq!(first.channel_identifier, state.next_identifier);
        assert_eq!(
            first.next_identifier,
            next_channel_identifier(&signer(), &channel_key, 2)
        );

        let advanced = MemberRatchet {
            chain_key: Zeroizing::new(first.next_chain_key),
            next_identifier: first.next_identifier.clone(),
        };
        let second = advanced.plan(&signer(), &channel_key, Some(1)).unwrap();
        assert_eq!(second.nonce, 2);
        assert_eq!(second.channel_identifier, first.next_identifier);
        assert_ne!(*second.message_key, *first.message_key);
    }

    #[test]
    fn test_both_sides_agree_on_initial_state() {
        let secret = [77u8; 32];
        let sender_view = MemberRatchet::initial(&secret, &signer()).unwrap();
        let receiver_view = MemberRatchet::initial(&secret, &signer()).unwrap();
        assert_eq!(*sender_view.chain_key, *receiver_view.chain_key);
        assert_eq!(sender_view.next_identifier, receiver_view.next_identifier);
    }

    proptest! {
        #[test]
        fn prop_chain_never_repeats(seed in any::<[u8; 32]>(), steps in 1usize..64) {
            let mut chain = seed;
            let mut seen = std::collections::HashSet::new();
            seen.insert(chain);
            for _ in 0..steps {
                let step = ratchet_step(&chain);
                prop_assert!(seen.insert(*step.message_key));
                prop_assert!(seen.insert(step.next_chain_key));
                chain = step.next_chain_key;
            }
        }
    }
}
