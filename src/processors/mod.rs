//! Per-collection record processors.
//!
//! Every [`Collection`] has exactly one upsert processor and one delete
//! processor; [`ProcessorRegistry`] dispatches with an exhaustive `match`,
//! so a new collection does not compile until both exist. A batch is
//! validated up front, then applied in a single transaction. Jobs the
//! batch produces are returned to the caller, which enqueues them once
//! the transaction has committed.

pub mod post;
pub mod reaction;
pub mod topic_version;

use crate::jobs::Job;
use crate::store::{MirrorStore, MirrorTx};
use anyhow::{Context, Result};
use repo_records::{
    validate_record, Collection, ReactionKind, RecordUri, SnapshotEntry, TypedRecord,
};
use std::collections::BTreeSet;
use topic_consensus::ConsensusConfig;
use tracing::{debug, warn};

pub use post::{PostDeleteProcessor, PostProcessor};
pub use reaction::{ReactionDeleteProcessor, ReactionProcessor};
pub use topic_version::{TopicVersionDeleteProcessor, TopicVersionProcessor};

/// A snapshot entry that passed validation.
#[derive(Debug, Clone)]
pub struct ValidRecord {
    pub entry: SnapshotEntry,
    pub record: TypedRecord,
}

/// What one batch did.
#[derive(Debug, Default)]
pub struct BatchEffects {
    pub applied: usize,
    pub invalid: usize,
    pub jobs: Vec<Job>,
}

impl BatchEffects {
    fn push_job(&mut self, job: Job) {
        if !self.jobs.contains(&job) {
            self.jobs.push(job);
        }
    }

    /// Queue contribution recomputation for each topic.
    fn contributions_for(&mut self, topics: &BTreeSet<String>) {
        for topic_id in topics {
            self.push_job(Job::UpdateTopicContributions {
                topic_id: topic_id.clone(),
            });
        }
    }
}

pub trait RecordProcessor: Send + Sync {
    fn collection(&self) -> Collection;

    fn validate(&self, payload: &serde_json::Value) -> Result<TypedRecord, repo_records::ValidationError> {
        validate_record(self.collection(), payload)
    }

    /// Apply validated records inside `tx`.
    fn apply_batch(
        &self,
        tx: &mut dyn MirrorTx,
        records: &[ValidRecord],
        effects: &mut BatchEffects,
    ) -> Result<()>;
}

pub trait DeleteProcessor: Send + Sync {
    /// Remove the records at `uris` and everything that depends on them.
    fn apply_batch(
        &self,
        tx: &mut dyn MirrorTx,
        uris: &[RecordUri],
        effects: &mut BatchEffects,
    ) -> Result<()>;
}

/// Drop the ledger row for (author, subject, kind) and move the counter
/// if there was one.
fn release_ledger(
    tx: &mut dyn MirrorTx,
    author: &str,
    subject_uri: &str,
    kind: ReactionKind,
) -> Result<bool> {
    let removed = tx.delete_ledger(author, subject_uri, kind)?;
    if removed {
        tx.adjust_counter(subject_uri, kind, -1)?;
    }
    Ok(removed)
}

/// Remove a deleted record's row. While reactions, ledger rows or replies
/// still point at it, it becomes a placeholder instead so its counters
/// keep matching the ledger.
fn retire_record(tx: &mut dyn MirrorTx, uri: &str) -> Result<()> {
    if tx.is_referenced(uri)? {
        debug!(uri, "Keeping referenced record as placeholder");
        tx.clear_record(uri)?;
    } else {
        tx.delete_record(uri)?;
    }
    Ok(())
}

/// Recompute the current version of each topic, logging failures and
/// leaving the stored pointer as it was.
fn recompute_topics(tx: &mut dyn MirrorTx, topics: &BTreeSet<String>, config: &ConsensusConfig) {
    for topic_id in topics {
        if let Err(e) = crate::topics::recompute_current_version(tx, topic_id, config) {
            warn!(topic_id = topic_id.as_str(), "Consensus recomputation failed: {e:#}");
        }
    }
}

pub struct ProcessorRegistry {
    post: PostProcessor,
    post_delete: PostDeleteProcessor,
    topic_version: TopicVersionProcessor,
    topic_version_delete: TopicVersionDeleteProcessor,
    like: ReactionProcessor,
    like_delete: ReactionDeleteProcessor,
    repost: ReactionProcessor,
    repost_delete: ReactionDeleteProcessor,
    accept: ReactionProcessor,
    accept_delete: ReactionDeleteProcessor,
    reject: ReactionProcessor,
    reject_delete: ReactionDeleteProcessor,
}

impl ProcessorRegistry {
    pub fn new(consensus: ConsensusConfig) -> Self {
        Self {
            post: PostProcessor,
            post_delete: PostDeleteProcessor,
            topic_version: TopicVersionProcessor::new(consensus.clone()),
            topic_version_delete: TopicVersionDeleteProcessor::new(consensus.clone()),
            like: ReactionProcessor::new(Collection::Like, consensus.clone()),
            like_delete: ReactionDeleteProcessor::new(Collection::Like, consensus.clone()),
            repost: ReactionProcessor::new(Collection::Repost, consensus.clone()),
            repost_delete: ReactionDeleteProcessor::new(Collection::Repost, consensus.clone()),
            accept: ReactionProcessor::new(Collection::VoteAccept, consensus.clone()),
            accept_delete: ReactionDeleteProcessor::new(Collection::VoteAccept, consensus.clone()),
            reject: ReactionProcessor::new(Collection::VoteReject, consensus.clone()),
            reject_delete: ReactionDeleteProcessor::new(Collection::VoteReject, consensus),
        }
    }

    pub fn record_processor(&self, collection: Collection) -> &dyn RecordProcessor {
        match collection {
            Collection::Post => &self.post,
            Collection::TopicVersion => &self.topic_version,
            Collection::Like => &self.like,
            Collection::Repost => &self.repost,
            Collection::VoteAccept => &self.accept,
            Collection::VoteReject => &self.reject,
        }
    }

    pub fn delete_processor(&self, collection: Collection) -> &dyn DeleteProcessor {
        match collection {
            Collection::Post => &self.post_delete,
            Collection::TopicVersion => &self.topic_version_delete,
            Collection::Like => &self.like_delete,
            Collection::Repost => &self.repost_delete,
            Collection::VoteAccept => &self.accept_delete,
            Collection::VoteReject => &self.reject_delete,
        }
    }

    /// Validate `entries` and apply the valid ones in one transaction.
    /// Invalid entries are logged and counted; an all-invalid batch does
    /// not open a transaction.
    pub fn process_upserts(
        &self,
        store: &dyn MirrorStore,
        collection: Collection,
        entries: &[SnapshotEntry],
    ) -> Result<BatchEffects> {
        let processor = self.record_processor(collection);
        let mut effects = BatchEffects::default();

        let mut valid = Vec::with_capacity(entries.len());
        for entry in entries {
            match processor.validate(&entry.payload) {
                Ok(record) => valid.push(ValidRecord {
                    entry: entry.clone(),
                    record,
                }),
                Err(e) => {
                    warn!(uri = %entry.uri, %collection, "Skipping invalid record: {e}");
                    effects.invalid += 1;
                }
            }
        }
        if valid.is_empty() {
            return Ok(effects);
        }

        let mut tx = store.begin()?;
        processor
            .apply_batch(tx.as_mut(), &valid, &mut effects)
            .with_context(|| format!("Failed to apply {collection} batch"))?;
        tx.commit()?;

        effects.applied = valid.len();
        debug!(%collection, applied = effects.applied, invalid = effects.invalid, "Applied batch");
        Ok(effects)
    }

    /// Apply a delete batch in one transaction.
    pub fn process_deletes(
        &self,
        store: &dyn MirrorStore,
        collection: Collection,
        uris: &[RecordUri],
    ) -> Result<BatchEffects> {
        let mut effects = BatchEffects::default();
        if uris.is_empty() {
            return Ok(effects);
        }

        let mut tx = store.begin()?;
        self.delete_processor(collection)
            .apply_batch(tx.as_mut(), uris, &mut effects)
            .with_context(|| format!("Failed to apply {collection} delete batch"))?;
        tx.commit()?;

        effects.applied = uris.len();
        debug!(%collection, deleted = effects.applied, "Applied delete batch");
        Ok(effects)
    }
}
