//! CRUD operations for [`IdentityRecord`] rows and their private signing keys.

use rusqlite::params;
use zeroize::Zeroizing;

use murmur_shared::types::{IdentityId, SigningPublicKey};

use crate::database::Database;
use crate::error::Result;
use crate::models::IdentityRecord;
use crate::rows::{key_at, not_found, timestamp_at, uuid_at};

impl Database {
    pub fn insert_identity(&self, identity: &IdentityRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO identities (id, display_name, public_signing_key, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                identity.id.to_string(),
                identity.display_name,
                identity.public_signing_key.to_hex(),
                identity.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_identity(&self, id: IdentityId) -> Result<IdentityRecord> {
        self.conn()
            .query_row(
                "SELECT id, display_name, public_signing_key, created_at
                 FROM identities WHERE id = ?1",
                params![id.to_string()],
                row_to_identity,
            )
            .map_err(not_found)
    }

    // ------------------------------------------------------------------
    // Private keys
    // ------------------------------------------------------------------

    pub fn store_signing_key(&self, id: IdentityId, private_key: &[u8; 32]) -> Result<()> {
        let encoded = Zeroizing::new(hex::encode(private_key));
        self.conn().execute(
            "INSERT INTO signing_keys (identity_id, private_key) VALUES (?1, ?2)",
            params![id.to_string(), encoded.as_str()],
        )?;
        Ok(())
    }

    pub fn load_signing_key(&self, id: IdentityId) -> Result<Zeroizing<[u8; 32]>> {
        let key = self
            .conn()
            .query_row(
                "SELECT private_key FROM signing_keys WHERE identity_id = ?1",
                params![id.to_string()],
                |row| key_at(row, 0),
            )
            .map_err(not_found)?;
        Ok(Zeroizing::new(key))
    }
}

fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<IdentityRecord> {
    Ok(IdentityRecord {
        id: IdentityId(uuid_at(row, 0)?),
        display_name: row.get(1)?,
        public_signing_key: SigningPublicKey(key_at(row, 2)?),
        created_at: timestamp_at(row, 3)?,
    })
}
