//! Content-addressed storage for encrypted message bodies.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use murmur_shared::crypto::generate_sha256_hash;

use crate::error::BlobError;

/// Hex SHA-256 of the stored bytes.
pub type BlobAddress = String;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `data` and return the address it can be fetched from.
    async fn store(&self, data: &[u8]) -> Result<BlobAddress, BlobError>;

    /// Fetch the bytes stored at `address`.
    async fn retrieve(&self, address: &str) -> Result<Vec<u8>, BlobError>;
}

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, BlobError> {
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(&canonical_base)
        .or_else(|_| target.strip_prefix(base))
        .unwrap_or(target)
        .components()
    {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(BlobError::InvalidAddress("path traversal detected".into()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(BlobError::InvalidAddress("path traversal detected".into()));
    }
    Ok(resolved)
}

/// Blobs as files named by their SHA-256 under one directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base_path: PathBuf,
    max_size: usize,
}

impl FsBlobStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, BlobError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            BlobError::Storage(format!(
                "Failed to create blob directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Blob store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    fn safe_blob_path(&self, address: &str) -> Result<PathBuf, BlobError> {
        if address.len() != 64 || !address.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BlobError::InvalidAddress(address.to_string()));
        }
        let raw = self.base_path.join(address.to_ascii_lowercase());
        ensure_within(&self.base_path, &raw)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, data: &[u8]) -> Result<BlobAddress, BlobError> {
        if data.is_empty() {
            return Err(BlobError::Empty);
        }
        if data.len() > self.max_size {
            return Err(BlobError::TooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let address = hex::encode(generate_sha256_hash(data));
        let path = self.safe_blob_path(&address)?;

        // same content, same address
        if fs::try_exists(&path).await.unwrap_or(false) {
            debug!(address = %address, "Blob already stored");
            return Ok(address);
        }

        fs::write(&path, data).await.map_err(|e| {
            BlobError::Storage(format!("Failed to write blob {}: {}", address, e))
        })?;

        debug!(address = %address, size = data.len(), "Stored blob");
        Ok(address)
    }

    async fn retrieve(&self, address: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.safe_blob_path(address)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(BlobError::NotFound(address.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            BlobError::Storage(format!("Failed to read blob {}: {}", address, e))
        })?;

        debug!(address = %address, size = data.len(), "Retrieved blob");
        Ok(data)
    }
}
