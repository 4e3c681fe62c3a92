use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    /// AEAD tag did not verify: wrong key, wrong nonce or tampered ciphertext.
    #[error("Authentication failed: invalid ciphertext, key or nonce")]
    Authentication,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("Handshake signature does not bind the one-use key to the signing key")]
    SignatureMismatch,

    #[error("Invalid handshake transition from {from} to {to}")]
    InvalidState {
        from: &'static str,
        to: &'static str,
    },

    #[error("Invalid handshake encoding")]
    InvalidFormat,

    #[error("Base64 decode error")]
    Base64Decode,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatchetError {
    #[error("Nonce space exhausted after {last}")]
    NonceExhausted { last: u64 },

    #[error("Key derivation failed: {0}")]
    Derivation(#[from] CryptoError),
}
