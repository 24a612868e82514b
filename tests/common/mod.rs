//! Shared fixture: an on-disk mirror fed from snapshot files in a temp dir.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use topic_consensus::{ConsensusConfig, ContributionConfig};
use topicsync::config::SyncConfig;
use topicsync::jobs::{Job, MemoryJobQueue};
use topicsync::processors::ProcessorRegistry;
use topicsync::store::SqliteMirrorStore;
use topicsync::sync::{DirSnapshotFetcher, MemoryPendingBuffer, SyncCoordinator};
use topicsync::topics::{ContributionAccountant, DirBlobFetcher};

pub struct Mirror {
    pub dir: TempDir,
    pub store: Arc<SqliteMirrorStore>,
    pub jobs: Arc<MemoryJobQueue>,
    pub coordinator: SyncCoordinator,
    pub accountant: ContributionAccountant,
}

impl Mirror {
    pub fn new() -> Self {
        Self::with_limit(1024 * 1024)
    }

    pub fn with_limit(max_bytes: u64) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("snapshots")).unwrap();
        std::fs::create_dir_all(dir.path().join("blobs")).unwrap();

        let store = Arc::new(SqliteMirrorStore::open(&dir.path().join("mirror.db")).unwrap());
        let jobs = Arc::new(MemoryJobQueue::new());
        let coordinator = SyncCoordinator::new(
            store.clone(),
            ProcessorRegistry::new(ConsensusConfig::default()),
            Arc::new(DirSnapshotFetcher::new(dir.path().join("snapshots"), max_bytes)),
            Arc::new(MemoryPendingBuffer::new()),
            jobs.clone(),
            SyncConfig::default(),
        );
        let accountant = ContributionAccountant::new(
            store.clone(),
            Arc::new(DirBlobFetcher::new(dir.path().join("blobs"))),
            ConsensusConfig::default(),
            ContributionConfig::default(),
        );

        Self {
            dir,
            store,
            jobs,
            coordinator,
            accountant,
        }
    }

    /// Replace the snapshot of `subject` with `records` (`(uri, value)`).
    pub fn publish(&self, subject: &str, records: &[(String, Value)]) {
        let entries: Vec<Value> = records
            .iter()
            .map(|(uri, value)| json!({"uri": uri, "value": value}))
            .collect();
        std::fs::write(
            self.dir.path().join("snapshots").join(format!("{subject}.json")),
            serde_json::to_vec(&entries).unwrap(),
        )
        .unwrap();
    }

    /// Run queued contribution jobs; returns every job drained.
    pub async fn run_jobs(&self) -> Vec<Job> {
        let jobs = self.jobs.drain().await;
        for job in &jobs {
            if let Job::UpdateTopicContributions { topic_id } = job {
                self.accountant.update_topic(topic_id).await.unwrap();
            }
        }
        jobs
    }
}

pub fn version_uri(author: &str, rkey: &str) -> String {
    format!("at://{author}/org.commonwiki.topic.version/{rkey}")
}

pub fn version(author: &str, rkey: &str, topic: &str, text: &str, at: &str, claims: bool) -> (String, Value) {
    (
        version_uri(author, rkey),
        json!({"id": topic, "text": text, "claimsAuthorship": claims, "createdAt": at}),
    )
}

pub fn vote(author: &str, rkey: &str, accept: bool, subject: &str, at: &str) -> (String, Value) {
    let collection = if accept {
        "org.commonwiki.topic.voteAccept"
    } else {
        "org.commonwiki.topic.voteReject"
    };
    (
        format!("at://{author}/{collection}/{rkey}"),
        json!({"subject": {"uri": subject, "cid": "c"}, "createdAt": at}),
    )
}

pub fn like(author: &str, rkey: &str, subject: &str) -> (String, Value) {
    (
        format!("at://{author}/org.commonwiki.feed.like/{rkey}"),
        json!({"subject": {"uri": subject, "cid": "c"}, "createdAt": "2024-05-01T10:00:00Z"}),
    )
}

pub fn post(author: &str, rkey: &str, text: &str) -> (String, Value) {
    (
        format!("at://{author}/org.commonwiki.feed.post/{rkey}"),
        json!({"text": text, "createdAt": "2024-05-01T09:00:00Z"}),
    )
}
