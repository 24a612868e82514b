pub mod schema;

pub use schema::{
    BlobConfig, Config, LoggingConfig, SnapshotConfig, StoreConfig, SyncConfig, APP_DIR_NAME,
    CONFIG_FILE_NAME,
};

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

impl Config {
    /// Read and parse a TOML config file. `~` in `path` is expanded.
    pub fn load_from_file(path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(path);
        let content = fs::read_to_string(expanded_path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Load `path` if given, else the default location. A missing default
    /// file yields the built-in defaults; a missing explicit file is an error.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match default_config_path() {
            Some(p) if p.exists() => Self::load_from_file(&p.to_string_lossy()),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.batch_size == 0 {
            anyhow::bail!("sync.batch_size must be at least 1");
        }
        if self.sync.max_concurrent_subjects == 0 {
            anyhow::bail!("sync.max_concurrent_subjects must be at least 1");
        }
        if self.sync.stale_lock_secs == Some(0) {
            anyhow::bail!("sync.stale_lock_secs must be positive when set");
        }
        if self.blobs.cache_entries == 0 {
            anyhow::bail!("blobs.cache_entries must be at least 1");
        }
        let share = self.contribution.claimed_share;
        if !(0.0..=1.0).contains(&share) {
            anyhow::bail!("contribution.claimed_share must be within [0, 1], got {}", share);
        }
        if self.store.db_path.trim().is_empty() {
            anyhow::bail!("store.db_path must not be empty");
        }
        Ok(())
    }

    pub fn expand_paths(&mut self) -> Result<()> {
        self.store.db_path = shellexpand::tilde(&self.store.db_path).to_string();
        self.snapshots.dir = shellexpand::tilde(&self.snapshots.dir).to_string();
        self.blobs.dir = shellexpand::tilde(&self.blobs.dir).to_string();
        Ok(())
    }

    /// JSON Schema of the config file, pretty-printed.
    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(Config);
        serde_json::to_string_pretty(&schema).context("Failed to serialize config schema")
    }
}

/// `~/.topicsync/config.toml`, if a home directory can be determined.
pub fn default_config_path() -> Option<PathBuf> {
    directories::UserDirs::new().map(|dirs| dirs.home_dir().join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use topic_consensus::TrustTier;

    #[test]
    fn deserialize_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.sync.batch_size, 200);
        assert_eq!(config.sync.stale_lock_secs, None);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.contribution.claimed_share, 0.9);
        config.validate().unwrap();
    }

    #[test]
    fn deserialize_partial_config() {
        let toml_str = r#"
[sync]
batch_size = 50
stale_lock_secs = 600

[consensus]
default_protection = "editor"

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.sync.max_concurrent_subjects, 4);
        assert_eq!(config.sync.stale_lock_secs, Some(600));
        assert_eq!(config.consensus.default_protection, TrustTier::Editor);
        assert_eq!(config.logging.level, "debug");
        assert!(config.store.db_path.ends_with("mirror.db"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.sync.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.contribution.claimed_share = -0.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sync.stale_lock_secs = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file_and_expand() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[store]\ndb_path = \"~/mirror-test.db\"").unwrap();

        let mut config = Config::load_from_file(&path.to_string_lossy()).unwrap();
        config.expand_paths().unwrap();
        assert!(!config.store.db_path.starts_with('~'));
        assert!(config.store.db_path.ends_with("mirror-test.db"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(Config::load_or_default(Some("/nonexistent/topicsync.toml")).is_err());
    }

    #[test]
    fn schema_mentions_sections() {
        let schema = Config::json_schema().unwrap();
        assert!(schema.contains("batch_size"));
        assert!(schema.contains("claimed_share"));
    }
}
