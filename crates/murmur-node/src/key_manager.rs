//! Signing-key custody.
//!
//! Services never see a private signing key; they ask a [`KeyManager`] to
//! create one, report its public half, or sign with it. The backend is chosen
//! by name from configuration through [`build_key_manager`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use murmur_shared::crypto::{generate_signing_key_pair, validate_signature};
use murmur_shared::identity::Identity;
use murmur_shared::types::{IdentityId, SigningPublicKey};
use murmur_store::{lock_db, SharedDatabase, StoreError};

use crate::error::KeyManagerError;

pub trait KeyManager: Send + Sync {
    /// Generate and keep a fresh signing keypair for `identity`.
    fn create_signing_key(&self, identity: IdentityId)
        -> Result<SigningPublicKey, KeyManagerError>;

    fn read_public_signing_key(
        &self,
        identity: IdentityId,
    ) -> Result<SigningPublicKey, KeyManagerError>;

    fn sign(&self, identity: IdentityId, message: &[u8]) -> Result<[u8; 64], KeyManagerError>;

    /// Never fails; malformed input verifies as `false`.
    fn verify_signature(
        &self,
        signature: &[u8],
        message: &[u8],
        public_key: &SigningPublicKey,
    ) -> bool {
        validate_signature(signature, message, &public_key.0)
    }
}

/// Private keys kept in the node's own database.
pub struct DatabaseKeyManager {
    db: SharedDatabase,
}

impl DatabaseKeyManager {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    fn load(&self, identity: IdentityId) -> Result<Identity, KeyManagerError> {
        let secret = lock_db(&self.db)?
            .load_signing_key(identity)
            .map_err(|e| match e {
                StoreError::NotFound => KeyManagerError::KeyNotFound(identity),
                other => KeyManagerError::Store(other),
            })?;
        Ok(Identity::from_secret_bytes(&secret))
    }
}

impl KeyManager for DatabaseKeyManager {
    fn create_signing_key(
        &self,
        identity: IdentityId,
    ) -> Result<SigningPublicKey, KeyManagerError> {
        let pair = generate_signing_key_pair();
        let db = lock_db(&self.db)?;
        match db.load_signing_key(identity) {
            Ok(_) => return Err(KeyManagerError::KeyExists(identity)),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
        db.store_signing_key(identity, &pair.private)?;
        tracing::info!(identity = %identity, "signing key created");
        Ok(SigningPublicKey(pair.public))
    }

    fn read_public_signing_key(
        &self,
        identity: IdentityId,
    ) -> Result<SigningPublicKey, KeyManagerError> {
        Ok(self.load(identity)?.public_key())
    }

    fn sign(&self, identity: IdentityId, message: &[u8]) -> Result<[u8; 64], KeyManagerError> {
        Ok(self.load(identity)?.sign(message))
    }
}

/// Keys held only for the life of the process.
#[derive(Default)]
pub struct MemoryKeyManager {
    keys: Mutex<HashMap<IdentityId, Identity>>,
}

impl MemoryKeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_identity<T>(
        &self,
        identity: IdentityId,
        f: impl FnOnce(&Identity) -> T,
    ) -> Result<T, KeyManagerError> {
        let keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        keys.get(&identity)
            .map(f)
            .ok_or(KeyManagerError::KeyNotFound(identity))
    }
}

impl KeyManager for MemoryKeyManager {
    fn create_signing_key(
        &self,
        identity: IdentityId,
    ) -> Result<SigningPublicKey, KeyManagerError> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if keys.contains_key(&identity) {
            return Err(KeyManagerError::KeyExists(identity));
        }
        let key = Identity::from_key_pair(&generate_signing_key_pair());
        let public = key.public_key();
        keys.insert(identity, key);
        Ok(public)
    }

    fn read_public_signing_key(
        &self,
        identity: IdentityId,
    ) -> Result<SigningPublicKey, KeyManagerError> {
        self.with_identity(identity, Identity::public_key)
    }

    fn sign(&self, identity: IdentityId, message: &[u8]) -> Result<[u8; 64], KeyManagerError> {
        self.with_identity(identity, |key| key.sign(message))
    }
}

pub type KeyManagerBuilder = fn(&SharedDatabase) -> Arc<dyn KeyManager>;

/// Every available backend, keyed by its configuration name.
pub fn key_manager_builders() -> HashMap<&'static str, KeyManagerBuilder> {
    let mut builders: HashMap<&'static str, KeyManagerBuilder> = HashMap::new();
    builders.insert("database", build_database);
    builders.insert("memory", build_memory);
    builders
}

fn build_database(db: &SharedDatabase) -> Arc<dyn KeyManager> {
    Arc::new(DatabaseKeyManager::new(db.clone()))
}

fn build_memory(_db: &SharedDatabase) -> Arc<dyn KeyManager> {
    Arc::new(MemoryKeyManager::new())
}

pub fn build_key_manager(
    name: &str,
    db: &SharedDatabase,
) -> Result<Arc<dyn KeyManager>, KeyManagerError> {
    let builders = key_manager_builders();
    let build = builders
        .get(name)
        .ok_or_else(|| KeyManagerError::UnknownBackend(name.to_string()))?;
    tracing::debug!(backend = name, "key manager selected");
    Ok(build(db))
}
