/// Application name
pub const APP_NAME: &str = "Murmur";

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const TAG_SIZE: usize = 16;

/// Ed25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Ed25519 secret key size in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Ed25519 signature size in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Key id used when deriving the initial chain key of a channel
pub const CHAIN_KEY_ID: u64 = 1;

/// HKDF context for the initial chain key
pub const KDF_CONTEXT_CHAIN_KEY: &str = "ChainKey";

/// Ratchet input byte for deriving a message key from a chain key
pub const MESSAGE_KEY_RATCHET: u8 = 1;

/// Ratchet input byte for deriving the next chain key
pub const CHAIN_KEY_RATCHET: u8 = 2;

/// First nonce carried by a channel member
pub const FIRST_NONCE: u64 = 1;

/// Maximum plaintext size accepted by the codec (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;
