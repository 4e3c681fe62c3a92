//! Node configuration loaded from environment variables.
//!
//! All settings have defaults so a node can start with zero configuration
//! for local development.

use std::path::PathBuf;
use std::time::Duration;

/// Node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: the platform data directory (see `Database::new`).
    pub database_path: Option<PathBuf>,

    /// Directory where encrypted message bodies are stored.
    /// Env: `BLOB_STORAGE_PATH`
    /// Default: `./blobs`
    pub blob_storage_path: PathBuf,

    /// Maximum blob size in bytes.
    /// Env: `MAX_BLOB_SIZE`
    /// Default: 50 MiB
    pub max_blob_size: usize,

    /// Name of the key manager backend (`database` or `memory`).
    /// Env: `KEY_MANAGER`
    /// Default: `database`
    pub key_manager: String,

    /// Pause between event log drains.
    /// Env: `DRAIN_INTERVAL_SECS`
    /// Default: 5 seconds
    pub drain_interval: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            blob_storage_path: PathBuf::from("./blobs"),
            max_blob_size: 50 * 1024 * 1024, // 50 MiB
            key_manager: "database".to_string(),
            drain_interval: Duration::from_secs(5),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`NodeConfig::from_env`] over an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(path) = var("BLOB_STORAGE_PATH") {
            config.blob_storage_path = PathBuf::from(path);
        }

        if let Some(val) = var("MAX_BLOB_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_blob_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_BLOB_SIZE, using default"),
            }
        }

        if let Some(name) = var("KEY_MANAGER") {
            config.key_manager = name.trim().to_ascii_lowercase();
        }

        if let Some(val) = var("DRAIN_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.drain_interval = Duration::from_secs(secs),
                _ => tracing::warn!(value = %val, "Invalid DRAIN_INTERVAL_SECS, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::from_vars(vars(&[]));
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.key_manager, "database");
        assert_eq!(config.drain_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = NodeConfig::from_vars(vars(&[
            ("DATABASE_PATH", "/tmp/node.db"),
            ("BLOB_STORAGE_PATH", "/tmp/blobs"),
            ("MAX_BLOB_SIZE", "1024"),
            ("KEY_MANAGER", " Memory "),
            ("DRAIN_INTERVAL_SECS", "30"),
        ]));
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/node.db")));
        assert_eq!(config.blob_storage_path, PathBuf::from("/tmp/blobs"));
        assert_eq!(config.max_blob_size, 1024);
        assert_eq!(config.key_manager, "memory");
        assert_eq!(config.drain_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = NodeConfig::from_vars(vars(&[
            ("MAX_BLOB_SIZE", "lots"),
            ("DRAIN_INTERVAL_SECS", "0"),
        ]));
        assert_eq!(config.max_blob_size, NodeConfig::default().max_blob_size);
        assert_eq!(config.drain_interval, Duration::from_secs(5));
    }
}
