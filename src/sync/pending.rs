//! Buffer for commit events that arrive while their subject is syncing.

use async_trait::async_trait;
use repo_records::CommitEvent;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[async_trait]
pub trait PendingBuffer: Send + Sync {
    async fn push(&self, event: CommitEvent) -> anyhow::Result<()>;

    /// Remove and return every buffered event of `subject`, oldest first.
    async fn drain(&self, subject: &str) -> anyhow::Result<Vec<CommitEvent>>;
}

#[derive(Default)]
pub struct MemoryPendingBuffer {
    events: Mutex<HashMap<String, Vec<CommitEvent>>>,
}

impl MemoryPendingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, subject: &str) -> usize {
        self.events.lock().await.get(subject).map_or(0, Vec::len)
    }
}

#[async_trait]
impl PendingBuffer for MemoryPendingBuffer {
    async fn push(&self, event: CommitEvent) -> anyhow::Result<()> {
        let subject = event.subject().to_string();
        self.events.lock().await.entry(subject).or_default().push(event);
        Ok(())
    }

    async fn drain(&self, subject: &str) -> anyhow::Result<Vec<CommitEvent>> {
        Ok(self.events.lock().await.remove(subject).unwrap_or_default())
    }
}
