//! v001 -- Initial schema creation.
//!
//! Creates `identities`, `signing_keys`, `contacts`, `channels`,
//! `channel_members`, `channel_messages` and `events`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Identities
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS identities (
    id                 TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    display_name       TEXT,
    public_signing_key TEXT NOT NULL UNIQUE,        -- hex-encoded Ed25519 pubkey
    created_at         TEXT NOT NULL                -- RFC-3339
);

-- Private halves, only touched by the database key manager. Keys are
-- created before the identity row that will reference them.
CREATE TABLE IF NOT EXISTS signing_keys (
    identity_id TEXT PRIMARY KEY NOT NULL,          -- identities(id)
    private_key TEXT NOT NULL                       -- hex-encoded Ed25519 secret
);

-- ----------------------------------------------------------------
-- Contacts (handshake records)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    id                    TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    identity_id           TEXT NOT NULL,              -- FK -> identities(id)
    handshake_identifier  TEXT NOT NULL,              -- initiator's contact UUID
    handshake_public_key  TEXT NOT NULL,              -- hex X25519 public
    handshake_private_key TEXT NOT NULL,              -- hex X25519 secret
    state                 TEXT NOT NULL,
    oneuse_key            TEXT,                       -- counterparty X25519 public
    signing_key           TEXT,                       -- counterparty Ed25519 public
    signature             BLOB,                       -- counterparty signature
    expected_signing_key  TEXT,                       -- peer pinned at init, if any
    created_at            TEXT NOT NULL,

    FOREIGN KEY (identity_id) REFERENCES identities(id) ON DELETE CASCADE,
    CHECK ((oneuse_key IS NULL) = (signing_key IS NULL)),
    CHECK ((oneuse_key IS NULL) = (signature IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_contacts_identity ON contacts(identity_id);

-- ----------------------------------------------------------------
-- Channels
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channels (
    id          TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    name        TEXT NOT NULL,
    channel_key TEXT NOT NULL,                 -- hex SHA256(secret || secret)
    created_at  TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Channel members (ratchet state)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channel_members (
    id                      TEXT PRIMARY KEY NOT NULL,
    channel_id              TEXT NOT NULL,     -- FK -> channels(id)
    user_id                 TEXT,              -- FK -> identities(id)
    contact_id              TEXT,              -- FK -> contacts(id)
    message_chain_key       TEXT NOT NULL,     -- hex
    next_channel_identifier TEXT NOT NULL,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL,

    FOREIGN KEY (channel_id) REFERENCES channels(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES identities(id) ON DELETE CASCADE,
    FOREIGN KEY (contact_id) REFERENCES contacts(id) ON DELETE CASCADE,
    CHECK ((user_id IS NULL) <> (contact_id IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_members_channel ON channel_members(channel_id);
-- one channel per contact
CREATE UNIQUE INDEX IF NOT EXISTS idx_members_contact ON channel_members(contact_id);
CREATE INDEX IF NOT EXISTS idx_members_next_identifier
    ON channel_members(next_channel_identifier);

-- ----------------------------------------------------------------
-- Channel messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channel_messages (
    id                TEXT PRIMARY KEY NOT NULL,
    channel_member_id TEXT NOT NULL,           -- FK -> channel_members(id)
    message_contents  TEXT NOT NULL,
    nonce             INTEGER NOT NULL CHECK (nonce >= 1),
    created_at        TEXT NOT NULL,

    FOREIGN KEY (channel_member_id) REFERENCES channel_members(id) ON DELETE CASCADE,
    UNIQUE (channel_member_id, nonce)
);

-- ----------------------------------------------------------------
-- Ledger events
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS events (
    id                               INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_hash                 TEXT NOT NULL UNIQUE,
    channel_identifier               TEXT NOT NULL,
    encrypted_message_link           BLOB NOT NULL,
    encrypted_message_link_signature BLOB NOT NULL,
    processed                        INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    created_at                       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_unprocessed ON events(processed, id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
