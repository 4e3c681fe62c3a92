//! # murmur-shared
//!
//! Protocol building blocks shared by the store and the node: cryptographic
//! primitives, the contact handshake, the channel ratchet and the wire record
//! handed to the ledger.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod protocol;
pub mod ratchet;
pub mod types;

pub use error::{CryptoError, HandshakeError, RatchetError};
