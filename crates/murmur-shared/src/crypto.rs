//! Cryptographic primitives used by the handshake, the ratchet and the codec.
//!
//! Signing is Ed25519, key agreement is X25519, symmetric encryption is
//! XChaCha20-Poly1305, hashing is SHA-256 and key derivation is HKDF-SHA256.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::constants::{NONCE_SIZE, PUBKEY_SIZE, SECRET_KEY_SIZE, SIGNATURE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::CryptoError;
use crate::types::SigningPublicKey;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];
pub type Sha256Digest = [u8; 32];

/// Ed25519 keypair. The private half is wiped on drop.
#[derive(Clone)]
pub struct SigningKeyPair {
    pub public: [u8; PUBKEY_SIZE],
    pub private: Zeroizing<[u8; SECRET_KEY_SIZE]>,
}

/// X25519 keypair generated fresh for every contact handshake.
#[derive(Clone)]
pub struct OneUseKeyPair {
    pub public: [u8; 32],
    pub private: Zeroizing<[u8; 32]>,
}

pub fn generate_signing_key_pair() -> SigningKeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    SigningKeyPair {
        public: signing_key.verifying_key().to_bytes(),
        private: Zeroizing::new(signing_key.to_bytes()),
    }
}

pub fn generate_one_use_key_pair() -> OneUseKeyPair {
    let secret = StaticSecret::random_from_rng(OsRng);
    OneUseKeyPair {
        public: PublicKey::from(&secret).to_bytes(),
        private: Zeroizing::new(secret.to_bytes()),
    }
}

/// X25519 Diffie-Hellman. `ecdh(a.pub, b.priv) == ecdh(b.pub, a.priv)`.
pub fn generate_ecdh_shared_secret(
    peer_public_key: &[u8; 32],
    own_private_key: &[u8; 32],
) -> Zeroizing<[u8; 32]> {
    let secret = StaticSecret::from(*own_private_key);
    let shared = secret.diffie_hellman(&PublicKey::from(*peer_public_key));
    Zeroizing::new(shared.to_bytes())
}

pub fn generate_signature(message: &[u8], private_key: &[u8; SECRET_KEY_SIZE]) -> [u8; SIGNATURE_SIZE] {
    SigningKey::from_bytes(private_key).sign(message).to_bytes()
}

/// Verify an Ed25519 signature. Any malformed input yields `false`.
pub fn validate_signature(signature: &[u8], message: &[u8], public_key: &[u8]) -> bool {
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    verifying_key.verify_strict(message, &signature).is_ok()
}

pub fn generate_sha256_hash(input: &[u8]) -> Sha256Digest {
    Sha256::digest(input).into()
}

/// SHA-256 over the concatenation of `parts`.
pub fn sha256_concat(parts: &[&[u8]]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

// HKDF-SHA256: key id is the salt, context is the info string
pub fn derive_symmetric_key_from_secret(
    secret: &[u8],
    key_id: u64,
    context: &str,
) -> Result<SymmetricKey, CryptoError> {
    let salt = key_id.to_be_bytes();
    let hk = Hkdf::<Sha256>::new(Some(&salt), secret);
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    hk.expand(context.as_bytes(), &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// What a message key is sealing. Content and link share a message key, so
/// they must never share a nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NonceLane {
    Content = 0x01,
    Link = 0x02,
}

/// AEAD nonce: `lane (1) || counter (8, BE) || sender signing key prefix (15)`.
///
/// Both directions of a channel start from the same chain key; the sender
/// prefix keeps their nonces apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageNonce {
    lane: NonceLane,
    counter: u64,
    sender: SigningPublicKey,
}

impl MessageNonce {
    pub fn new(lane: NonceLane, counter: u64, sender: &SigningPublicKey) -> Self {
        Self {
            lane,
            counter,
            sender: *sender,
        }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn to_bytes(&self) -> [u8; NONCE_SIZE] {
        let mut out = [0u8; NONCE_SIZE];
        out[0] = self.lane as u8;
        out[1..9].copy_from_slice(&self.counter.to_be_bytes());
        out[9..].copy_from_slice(&self.sender.0[..NONCE_SIZE - 9]);
        out
    }
}

pub fn encrypt(
    plaintext: &[u8],
    nonce: &MessageNonce,
    key: &SymmetricKey,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = nonce.to_bytes();
    cipher
        .encrypt(XNonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}

pub fn decrypt(
    ciphertext: &[u8],
    nonce: &MessageNonce,
    key: &SymmetricKey,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = nonce.to_bytes();
    cipher
        .decrypt(XNonce::from_slice(&nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TAG_SIZE;
    use proptest::prelude::*;

    fn sender() -> SigningPublicKey {
        SigningPublicKey(generate_signing_key_pair().public)
    }

    #[test]
    fn test_ecdh_commutative() {
        let a = generate_one_use_key_pair();
        let b = generate_one_use_key_pair();

        let ab = generate_ecdh_shared_secret(&b.public, &a.private);
        let ba = generate_ecdh_shared_secret(&a.public, &b.private);
        assert_eq!(*ab, *ba);

        let c = generate_one_use_key_pair();
        let ac = generate_ecdh_shared_secret(&c.public, &a.private);
        assert_ne!(*ab, *ac);
    }

    #[test]
    fn test_sign_validate() {
        let pair = generate_signing_key_pair();
        let signature = generate_signature(b"one-use key", &pair.private);

        assert!(validate_signature(&signature, b"one-use key", &pair.public));
        assert!(!validate_signature(&signature, b"other key", &pair.public));
    }

    #[test]
    fn test_validate_malformed_input_is_false() {
        let pair = generate_signing_key_pair();
        let signature = generate_signature(b"msg", &pair.private);

        assert!(!validate_signature(&signature[..10], b"msg", &pair.public));
        assert!(!validate_signature(&signature, b"msg", &pair.public[..31]));
        assert!(!validate_signature(&[], b"msg", &[]));
        assert!(!validate_signature(&signature, b"msg", &[0xFFu8; 32]));
    }

    #[test]
    fn test_flipped_signature_bit_rejected() {
        let pair = generate_signing_key_pair();
        let mut signature = generate_signature(b"msg", &pair.private);
        signature[5] ^= 0x01;
        assert!(!validate_signature(&signature, b"msg", &pair.public));
    }

    #[test]
    fn test_sha256_known_vector() {
        let digest = generate_sha256_hash(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_concat(&[b"a", b"bc"]), digest);
    }

    #[test]
    fn test_kdf_deterministic_and_context_separated() {
        let secret = [0x42u8; 32];
        let k1 = derive_symmetric_key_from_secret(&secret, 1, "ChainKey").unwrap();
        let k2 = derive_symmetric_key_from_secret(&secret, 1, "ChainKey").unwrap();
        let k3 = derive_symmetric_key_from_secret(&secret, 1, "OtherKey").unwrap();
        let k4 = derive_symmetric_key_from_secret(&secret, 2, "ChainKey").unwrap();

        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert_ne!(k1, k4);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_symmetric_key();
        let nonce = MessageNonce::new(NonceLane::Content, 1, &sender());

        let encrypted = encrypt(b"Hello, Murmur!", &nonce, &key).unwrap();
        assert_eq!(encrypted.len(), 14 + TAG_SIZE);
        let decrypted = decrypt(&encrypted, &nonce, &key).unwrap();
        assert_eq!(decrypted, b"Hello, Murmur!");
    }

    #[test]
    fn test_wrong_key_fails() {
        let nonce = MessageNonce::new(NonceLane::Content, 1, &sender());
        let encrypted = encrypt(b"secret", &nonce, &generate_symmetric_key()).unwrap();

        let err = decrypt(&encrypted, &nonce, &generate_symmetric_key()).unwrap_err();
        assert_eq!(err, CryptoError::Authentication);
    }

    #[test]
    fn test_wrong_nonce_fails() {
        let key = generate_symmetric_key();
        let from = sender();
        let nonce = MessageNonce::new(NonceLane::Content, 1, &from);
        let encrypted = encrypt(b"secret", &nonce, &key).unwrap();

        let other_counter = MessageNonce::new(NonceLane::Content, 2, &from);
        let other_lane = MessageNonce::new(NonceLane::Link, 1, &from);
        assert!(decrypt(&encrypted, &other_counter, &key).is_err());
        assert!(decrypt(&encrypted, &other_lane, &key).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_symmetric_key();
        let nonce = MessageNonce::new(NonceLane::Link, 7, &sender());
        let mut encrypted = encrypt(b"link", &nonce, &key).unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0xFF;

        assert_eq!(
            decrypt(&encrypted, &nonce, &key),
            Err(CryptoError::Authentication)
        );
    }

    #[test]
    fn test_nonce_layout() {
        let from = SigningPublicKey([0xAB; 32]);
        let bytes = MessageNonce::new(NonceLane::Link, 0x0102, &from).to_bytes();
        assert_eq!(bytes[0], 0x02);
        assert_eq!(&bytes[1..9], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
        assert!(bytes[9..].iter().all(|b| *b == 0xAB));
    }

    proptest! {
        #[test]
        fn prop_aead_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..512), counter in 1u64..u64::MAX) {
            let key = generate_symmetric_key();
            let nonce = MessageNonce::new(NonceLane::Content, counter, &SigningPublicKey([7; 32]));
            let sealed = encrypt(&plaintext, &nonce, &key).unwrap();
            prop_assert_eq!(decrypt(&sealed, &nonce, &key).unwrap(), plaintext);
        }
    }
}
