//! Configuration types for the topicsync mirror.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use topic_consensus::{ConsensusConfig, ContributionConfig};

// ── Identity ────────────────────────────────────────────────────

/// Default config directory name under `$HOME`.
pub const APP_DIR_NAME: &str = ".topicsync";

/// Default config file name inside [`APP_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top level ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub snapshots: SnapshotConfig,
    #[serde(default)]
    pub blobs: BlobConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub contribution: ContributionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ── Store ───────────────────────────────────────────────────────

/// Local mirror database.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoreConfig {
    /// Path of the SQLite mirror database. `~` is expanded.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    format!("~/{APP_DIR_NAME}/mirror.db")
}

// ── Sync ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncConfig {
    /// Records per processor transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Subjects synced concurrently by a multi-subject run.
    #[serde(default = "default_max_concurrent_subjects")]
    pub max_concurrent_subjects: usize,
    /// Age in seconds after which an in-process claim may be taken over by
    /// a new trigger. Unset means a claim never expires; use `reset`.
    #[serde(default)]
    pub stale_lock_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrent_subjects: default_max_concurrent_subjects(),
            stale_lock_secs: None,
        }
    }
}

fn default_batch_size() -> usize {
    200
}
fn default_max_concurrent_subjects() -> usize {
    4
}

// ── Snapshots ───────────────────────────────────────────────────

/// File-backed snapshot source: one `<subject>.json` per subject.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_dir")]
    pub dir: String,
    /// Snapshots larger than this fail the sync as too large.
    #[serde(default = "default_max_snapshot_bytes")]
    pub max_bytes: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: default_snapshot_dir(),
            max_bytes: default_max_snapshot_bytes(),
        }
    }
}

fn default_snapshot_dir() -> String {
    format!("~/{APP_DIR_NAME}/snapshots")
}
fn default_max_snapshot_bytes() -> u64 {
    64 * 1024 * 1024
}

// ── Blobs ───────────────────────────────────────────────────────

/// File-backed blob source: `<owner>/<cid>` under `dir`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BlobConfig {
    #[serde(default = "default_blob_dir")]
    pub dir: String,
    /// Number of blob texts kept in memory.
    #[serde(default = "default_blob_cache_entries")]
    pub cache_entries: usize,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            dir: default_blob_dir(),
            cache_entries: default_blob_cache_entries(),
        }
    }
}

fn default_blob_dir() -> String {
    format!("~/{APP_DIR_NAME}/blobs")
}
fn default_blob_cache_entries() -> usize {
    256
}

// ── Logging ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LoggingConfig {
    /// error | warn | info | debug | trace. `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
