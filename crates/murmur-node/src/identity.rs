use std::sync::Arc;

use chrono::Utc;

use murmur_shared::types::IdentityId;
use murmur_store::{lock_db, IdentityRecord, SharedDatabase};

use crate::error::IdentityError;
use crate::key_manager::KeyManager;

/// Onboards local identities. The signing key is created by the key manager
/// first, then the public record is stored.
pub struct IdentityService {
    db: SharedDatabase,
    keys: Arc<dyn KeyManager>,
}

impl IdentityService {
    pub fn new(db: SharedDatabase, keys: Arc<dyn KeyManager>) -> Self {
        Self { db, keys }
    }

    pub fn create_identity(
        &self,
        display_name: Option<String>,
    ) -> Result<IdentityRecord, IdentityError> {
        let id = IdentityId::new();
        let public_signing_key = self.keys.create_signing_key(id)?;

        let record = IdentityRecord {
            id,
            display_name,
            public_signing_key,
            created_at: Utc::now(),
        };
        lock_db(&self.db)?.insert_identity(&record)?;

        tracing::info!(identity = %id, key = %public_signing_key.short(), "identity created");
        Ok(record)
    }
}
