//! # murmur-node
//!
//! Services of a murmur node:
//! - **Identities and contacts**: onboarding through a [`KeyManager`] and the
//!   signed one-use-key handshake
//! - **Channels**: shared-secret channels with one ratchet per direction
//! - **Codec**: sealing messages into blob-addressed ledger records and
//!   opening them again
//! - **Drain loop**: consuming the local copy of the event log exactly once
//!
//! [`KeyManager`]: key_manager::KeyManager

pub mod blob_store;
pub mod channels;
pub mod codec;
pub mod config;
pub mod contacts;
pub mod drain;
pub mod error;
pub mod identity;
pub mod key_manager;
pub mod ledger;

mod locks;

pub use blob_store::{BlobStore, FsBlobStore};
pub use channels::{ChannelService, OpenedChannel};
pub use codec::{ChannelCodec, DecodedMessage};
pub use config::NodeConfig;
pub use contacts::ContactService;
pub use drain::EventDrainer;
pub use identity::IdentityService;
pub use key_manager::{build_key_manager, KeyManager};
pub use ledger::{ingest_ledger, Ledger, MemoryLedger, TransactionReceipt};
