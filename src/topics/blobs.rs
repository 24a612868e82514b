//! Out-of-line version text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

/// Fetches the text of a blob owned by a subject.
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    /// `Ok(None)` when the blob does not exist.
    async fn fetch_blob_text(&self, cid: &str, owner: &str) -> Result<Option<String>>;
}

/// Blobs stored as files at `<dir>/<owner>/<cid>`.
pub struct DirBlobFetcher {
    dir: PathBuf,
}

impl DirBlobFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn is_plain_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

#[async_trait]
impl BlobFetcher for DirBlobFetcher {
    async fn fetch_blob_text(&self, cid: &str, owner: &str) -> Result<Option<String>> {
        if !is_plain_segment(cid) || !is_plain_segment(owner) {
            anyhow::bail!("Invalid blob reference {owner}/{cid}");
        }
        let path = self.dir.join(owner).join(cid);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read blob: {}", path.display()))
            }
        }
    }
}

/// LRU cache in front of another fetcher, keyed by cid. Misses are not
/// cached.
pub struct CachedBlobFetcher {
    inner: Arc<dyn BlobFetcher>,
    cache: Mutex<LruCache<String, String>>,
}

impl CachedBlobFetcher {
    pub fn new(inner: Arc<dyn BlobFetcher>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl BlobFetcher for CachedBlobFetcher {
    async fn fetch_blob_text(&self, cid: &str, owner: &str) -> Result<Option<String>> {
        let hit = self.cache.lock().get(cid).cloned();
        if hit.is_some() {
            return Ok(hit);
        }
        let fetched = self.inner.fetch_blob_text(cid, owner).await?;
        if let Some(text) = &fetched {
            self.cache.lock().put(cid.to_string(), text.clone());
        }
        Ok(fetched)
    }
}
