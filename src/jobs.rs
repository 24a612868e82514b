//! Background jobs emitted by record processors.
//!
//! Processors only describe follow-up work; scheduling and delivery belong
//! to whatever implements [`JobQueue`]. Jobs are enqueued after the batch
//! transaction that produced them has committed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload", rename_all = "kebab-case")]
pub enum Job {
    /// Recompute diff stats and contribution shares for every version of
    /// a topic.
    UpdateTopicContributions { topic_id: String },
    /// Re-evaluate the standing of authors whose edits changed.
    UpdateAuthorStatus { authors: Vec<String> },
    /// Tell the other editors of a topic about a new version.
    NotifyTopicEditors {
        topic_id: String,
        version_uri: String,
        recipients: Vec<String>,
    },
    /// Tell a version's author about a vote on it.
    NotifyVote {
        vote_uri: String,
        version_uri: String,
        recipient: String,
    },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::UpdateTopicContributions { .. } => "update-topic-contributions",
            Job::UpdateAuthorStatus { .. } => "update-author-status",
            Job::NotifyTopicEditors { .. } => "notify-topic-editors",
            Job::NotifyVote { .. } => "notify-vote",
        }
    }

    /// The job's payload without its name.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("payload").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> anyhow::Result<()>;
}

/// In-process FIFO queue. Identical jobs already waiting are not queued
/// twice, so a sync that touches one topic many times recomputes it once.
#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every waiting job, oldest first.
    pub async fn drain(&self) -> Vec<Job> {
        self.jobs.lock().await.drain(..).collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: Job) -> anyhow::Result<()> {
        let mut jobs = self.jobs.lock().await;
        if !jobs.contains(&job) {
            tracing::debug!(job = job.name(), "Enqueued job");
            jobs.push_back(job);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_serializes_with_name_and_payload() {
        let job = Job::UpdateTopicContributions {
            topic_id: "rust".into(),
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["name"], "update-topic-contributions");
        assert_eq!(json["payload"]["topic_id"], "rust");
        assert_eq!(job.name(), "update-topic-contributions");
        assert_eq!(job.payload()["topic_id"], "rust");

        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[tokio::test]
    async fn memory_queue_dedups_waiting_jobs() {
        let queue = MemoryJobQueue::new();
        let job = Job::UpdateTopicContributions {
            topic_id: "rust".into(),
        };
        queue.enqueue(job.clone()).await.unwrap();
        queue.enqueue(job.clone()).await.unwrap();
        queue
            .enqueue(Job::UpdateAuthorStatus {
                authors: vec!["did:plc:alice".into()],
            })
            .await
            .unwrap();
        assert_eq!(queue.len().await, 2);

        let drained = queue.drain().await;
        assert_eq!(drained[0], job);
        assert!(queue.is_empty().await);

        // Once drained, the same job can be queued again.
        queue.enqueue(job).await.unwrap();
        assert_eq!(queue.len().await, 1);
    }
}
