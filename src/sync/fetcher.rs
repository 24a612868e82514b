//! Repository snapshot source.

use async_trait::async_trait;
use repo_records::{compute_cid, Collection, RecordUri, SnapshotEntry};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The repository exceeds what this mirror accepts. Not retried.
    #[error("repository of {subject} is too large ({size} bytes, limit {limit})")]
    TooLarge { subject: String, size: u64, limit: u64 },
    /// Anything else; the next trigger retries.
    #[error("failed to fetch repository of {subject}: {source}")]
    Transport {
        subject: String,
        #[source]
        source: anyhow::Error,
    },
}

impl FetchError {
    pub fn transport(subject: &str, source: impl Into<anyhow::Error>) -> Self {
        FetchError::Transport {
            subject: subject.to_string(),
            source: source.into(),
        }
    }
}

#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Every record of `subject` in the given collections. Implementations
    /// may return records of other collections too; the diff ignores them.
    async fn fetch_snapshot(
        &self,
        subject: &str,
        collections: &[Collection],
    ) -> Result<Vec<SnapshotEntry>, FetchError>;
}

/// Snapshot files at `<dir>/<subject>.json`, each a JSON array of
/// `{"uri", "cid"?, "value"}` objects. A missing cid is computed from the
/// value.
pub struct DirSnapshotFetcher {
    dir: PathBuf,
    max_bytes: u64,
}

#[derive(Deserialize)]
struct FileEntry {
    uri: RecordUri,
    #[serde(default)]
    cid: Option<String>,
    value: serde_json::Value,
}

impl DirSnapshotFetcher {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
        }
    }

    fn path_for(&self, subject: &str) -> PathBuf {
        self.dir.join(format!("{subject}.json"))
    }
}

#[async_trait]
impl SnapshotFetcher for DirSnapshotFetcher {
    async fn fetch_snapshot(
        &self,
        subject: &str,
        _collections: &[Collection],
    ) -> Result<Vec<SnapshotEntry>, FetchError> {
        if subject.contains(['/', '\\']) {
            return Err(FetchError::transport(
                subject,
                anyhow::anyhow!("invalid subject"),
            ));
        }
        let path = self.path_for(subject);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| FetchError::transport(subject, e))?;
        if meta.len() > self.max_bytes {
            return Err(FetchError::TooLarge {
                subject: subject.to_string(),
                size: meta.len(),
                limit: self.max_bytes,
            });
        }

        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::transport(subject, e))?;
        let entries: Vec<FileEntry> =
            serde_json::from_slice(&raw).map_err(|e| FetchError::transport(subject, e))?;

        Ok(entries
            .into_iter()
            .filter(|e| e.uri.subject() == subject)
            .map(|e| SnapshotEntry {
                collection: e.uri.collection().to_string(),
                cid: e.cid.unwrap_or_else(|| compute_cid(&e.value)),
                uri: e.uri,
                payload: e.value,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_snapshot(dir: &TempDir, subject: &str, value: serde_json::Value) {
        std::fs::write(
            dir.path().join(format!("{subject}.json")),
            serde_json::to_vec(&value).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn reads_entries_and_fills_missing_cids() {
        let dir = TempDir::new().unwrap();
        write_snapshot(
            &dir,
            "did:plc:alice",
            json!([
                {"uri": "at://did:plc:alice/org.commonwiki.feed.post/p1", "cid": "c1", "value": {"text": "a"}},
                {"uri": "at://did:plc:alice/org.commonwiki.feed.post/p2", "value": {"text": "b"}},
                {"uri": "at://did:plc:mallory/org.commonwiki.feed.post/p3", "value": {"text": "c"}}
            ]),
        );
        let fetcher = DirSnapshotFetcher::new(dir.path(), 1024 * 1024);
        let entries = fetcher
            .fetch_snapshot("did:plc:alice", &Collection::ALL)
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].cid, "c1");
        assert_eq!(entries[1].cid, compute_cid(&json!({"text": "b"})));
        assert_eq!(entries[1].known_collection(), Some(Collection::Post));
    }

    #[tokio::test]
    async fn oversize_snapshot_is_too_large() {
        let dir = TempDir::new().unwrap();
        write_snapshot(&dir, "did:plc:alice", json!([{"uri": "at://did:plc:alice/org.commonwiki.feed.post/p1", "value": {"text": "x".repeat(200)}}]));
        let fetcher = DirSnapshotFetcher::new(dir.path(), 16);
        let err = fetcher
            .fetch_snapshot("did:plc:alice", &Collection::ALL)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 16, .. }));
    }

    #[tokio::test]
    async fn missing_snapshot_is_transport_error() {
        let dir = TempDir::new().unwrap();
        let fetcher = DirSnapshotFetcher::new(dir.path(), 1024);
        let err = fetcher
            .fetch_snapshot("did:plc:nobody", &Collection::ALL)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
