use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// UUID parsing error.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Hex decoding error.
    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),

    /// A message nonce was not exactly one past the member's last nonce.
    #[error("Nonce violation for member {member}: got {attempted}, last recorded {last:?}")]
    NonceViolation {
        member: String,
        attempted: u64,
        last: Option<u64>,
    },

    /// The member's chain key changed between planning and committing a
    /// ratchet step.
    #[error("Ratchet state of member {0} changed concurrently")]
    StaleRatchet(String),

    /// A thread panicked while holding the shared database.
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// A row violates a model invariant.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
