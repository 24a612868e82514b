//! Mirror store interface.
//!
//! The coordinator and processors only see these traits. Reads are
//! available both on the store (autocommit) and inside a transaction,
//! where they observe the transaction's own uncommitted writes.
//!
//! Implementations are synchronous: a transaction must be opened,
//! used and committed without crossing an `.await`.

pub mod sqlite;
pub mod types;

pub use sqlite::SqliteMirrorStore;
pub use types::{
    ClaimResult, MirrorStatus, NewRecord, PostRow, ReactionRow, RecordRow, SyncStatus, TopicRow,
    TopicVersionRow,
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use repo_records::{Collection, ReactionKind, RecordUri};
use std::collections::HashMap;
use std::time::Duration;
use topic_consensus::{ContributionStats, TrustTier};

/// Read access to the mirror.
pub trait MirrorRead {
    /// `uri -> cid` of the mirrored (non-placeholder) records of `subject`
    /// in the given collections.
    fn local_index(&self, subject: &str, collections: &[Collection])
        -> Result<HashMap<String, String>>;

    fn record(&self, uri: &str) -> Result<Option<RecordRow>>;
    fn post(&self, uri: &str) -> Result<Option<PostRow>>;
    fn reaction(&self, uri: &str) -> Result<Option<ReactionRow>>;

    /// Reactions with the given subject, author and kind.
    fn reactions_matching(
        &self,
        subject_uri: &str,
        author: &str,
        kind: ReactionKind,
    ) -> Result<Vec<ReactionRow>>;

    fn has_reacted(&self, author: &str, subject_uri: &str, kind: ReactionKind) -> Result<bool>;

    /// Whether any reaction, ledger row or reply points at `uri`.
    fn is_referenced(&self, uri: &str) -> Result<bool>;

    fn topic(&self, id: &str) -> Result<Option<TopicRow>>;
    fn topic_version(&self, uri: &str) -> Result<Option<TopicVersionRow>>;
    /// All versions of a topic, in no particular order.
    fn topic_versions(&self, topic_id: &str) -> Result<Vec<TopicVersionRow>>;
    /// Accept and reject reactions on any version of the topic.
    fn votes_on_topic(&self, topic_id: &str) -> Result<Vec<ReactionRow>>;

    /// Unknown authors are beginners.
    fn author_tier(&self, author: &str) -> Result<TrustTier>;

    fn mirror_status(&self, subject: &str) -> Result<Option<MirrorStatus>>;
}

/// Writes performed inside one transaction. Dropping the transaction
/// without calling [`MirrorTx::commit`] rolls it back.
pub trait MirrorTx: MirrorRead {
    /// Insert or overwrite a record. Everything except `first_seen_at` and
    /// the reaction counters is replaced on conflict.
    fn upsert_record(&mut self, record: &NewRecord<'_>) -> Result<()>;

    /// Insert a payload-less placeholder unless the uri is already known.
    /// Returns whether a row was inserted.
    fn ensure_placeholder(&mut self, uri: &RecordUri) -> Result<bool>;

    fn delete_record(&mut self, uri: &str) -> Result<bool>;

    /// Turn a record back into a placeholder: payload and cid are dropped,
    /// counters stay.
    fn clear_record(&mut self, uri: &str) -> Result<bool>;

    fn upsert_post(&mut self, post: &PostRow) -> Result<()>;
    fn delete_post(&mut self, uri: &str) -> Result<bool>;

    fn upsert_reaction(&mut self, reaction: &ReactionRow) -> Result<()>;
    fn delete_reaction(&mut self, uri: &str) -> Result<bool>;

    /// Insert a ledger row. Returns `false` if it already existed.
    fn insert_ledger(&mut self, author: &str, subject_uri: &str, kind: ReactionKind)
        -> Result<bool>;
    /// Remove a ledger row. Returns `false` if there was none.
    fn delete_ledger(&mut self, author: &str, subject_uri: &str, kind: ReactionKind)
        -> Result<bool>;

    /// Move the `kind` counter of `uri` by `delta`, never below zero.
    fn adjust_counter(&mut self, uri: &str, kind: ReactionKind, delta: i64) -> Result<()>;

    /// Create the topic if needed (with `default_protection`) and advance
    /// its last edit time to at least `edited_at`.
    fn touch_topic(
        &mut self,
        topic_id: &str,
        edited_at: DateTime<Utc>,
        default_protection: TrustTier,
    ) -> Result<()>;

    /// Insert or overwrite a version's content fields. Accounting fields
    /// of an existing row are kept.
    fn upsert_topic_version(&mut self, version: &TopicVersionRow) -> Result<()>;
    fn delete_topic_version(&mut self, uri: &str) -> Result<bool>;

    fn set_current_version(&mut self, topic_id: &str, version_uri: Option<&str>) -> Result<()>;
    fn write_contributions(&mut self, stats: &[ContributionStats]) -> Result<()>;

    fn commit(self: Box<Self>) -> Result<()>;
}

/// The mirror store as seen by the sync coordinator.
pub trait MirrorStore: MirrorRead + Send + Sync {
    fn begin(&self) -> Result<Box<dyn MirrorTx + '_>>;

    /// Compare-and-set `subject` to in-process under `run_id`.
    ///
    /// Fails with [`ClaimResult::InProcess`] if another run holds the claim,
    /// unless `stale_after` is set and that claim is older. Terminal statuses
    /// are never claimed. Nothing is written unless the claim succeeds.
    fn claim_sync(
        &self,
        subject: &str,
        run_id: &str,
        now: DateTime<Utc>,
        stale_after: Option<Duration>,
    ) -> Result<ClaimResult>;

    /// Write a terminal status for the run holding the claim. Returns
    /// `false`, writing nothing, if `run_id` no longer holds it.
    fn finish_sync(&self, subject: &str, run_id: &str, status: SyncStatus) -> Result<bool>;

    /// Return a subject to idle regardless of its status.
    fn reset_status(&self, subject: &str) -> Result<()>;

    fn set_author_tier(&self, author: &str, tier: TrustTier) -> Result<()>;

    /// Set a topic's protection tier, creating the topic if needed.
    fn set_topic_protection(&self, topic_id: &str, tier: TrustTier) -> Result<()>;
}
