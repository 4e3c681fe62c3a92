//! # murmur-store
//!
//! Local persistence for a murmur node, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for identities,
//! contacts, channels with their ratchet state, decrypted messages and the
//! ingested ledger event log.

pub mod channels;
pub mod contacts;
pub mod database;
pub mod events;
pub mod identities;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;
mod rows;

pub use database::{lock_db, Database, SharedDatabase};
pub use error::StoreError;
pub use models::*;
