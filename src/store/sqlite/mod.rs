//! SQLite-backed mirror store.
//!
//! The connection sits behind a `parking_lot::Mutex` (sync) so that a
//! non-Send guard is never held across an `.await`. A [`SqliteTx`] owns
//! the guard for its whole lifetime, which serializes transactions.

mod queries;
mod schema;

use super::types::{
    ClaimResult, MirrorStatus, NewRecord, PostRow, ReactionRow, RecordRow, SyncStatus, TopicRow,
    TopicVersionRow,
};
use super::{MirrorRead, MirrorStore, MirrorTx};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use repo_records::{Collection, ReactionKind, RecordUri};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use topic_consensus::{ContributionStats, TrustTier};
use tracing::{debug, warn};

pub struct SqliteMirrorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMirrorStore {
    /// Open (or create) the mirror database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create mirror dir: {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open mirror DB: {}", path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory mirror DB")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        schema::create_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl MirrorRead for SqliteMirrorStore {
    fn local_index(
        &self,
        subject: &str,
        collections: &[Collection],
    ) -> Result<HashMap<String, String>> {
        queries::local_index(&self.conn.lock(), subject, collections)
    }

    fn record(&self, uri: &str) -> Result<Option<RecordRow>> {
        queries::record(&self.conn.lock(), uri)
    }

    fn post(&self, uri: &str) -> Result<Option<PostRow>> {
        queries::post(&self.conn.lock(), uri)
    }

    fn reaction(&self, uri: &str) -> Result<Option<ReactionRow>> {
        queries::reaction(&self.conn.lock(), uri)
    }

    fn reactions_matching(
        &self,
        subject_uri: &str,
        author: &str,
        kind: ReactionKind,
    ) -> Result<Vec<ReactionRow>> {
        queries::reactions_matching(&self.conn.lock(), subject_uri, author, kind)
    }

    fn has_reacted(&self, author: &str, subject_uri: &str, kind: ReactionKind) -> Result<bool> {
        queries::has_reacted(&self.conn.lock(), author, subject_uri, kind)
    }

    fn is_referenced(&self, uri: &str) -> Result<bool> {
        queries::is_referenced(&self.conn.lock(), uri)
    }

    fn topic(&self, id: &str) -> Result<Option<TopicRow>> {
        queries::topic(&self.conn.lock(), id)
    }

    fn topic_version(&self, uri: &str) -> Result<Option<TopicVersionRow>> {
        queries::topic_version(&self.conn.lock(), uri)
    }

    fn topic_versions(&self, topic_id: &str) -> Result<Vec<TopicVersionRow>> {
        queries::topic_versions(&self.conn.lock(), topic_id)
    }

    fn votes_on_topic(&self, topic_id: &str) -> Result<Vec<ReactionRow>> {
        queries::votes_on_topic(&self.conn.lock(), topic_id)
    }

    fn author_tier(&self, author: &str) -> Result<TrustTier> {
        queries::author_tier(&self.conn.lock(), author)
    }

    fn mirror_status(&self, subject: &str) -> Result<Option<MirrorStatus>> {
        queries::mirror_status(&self.conn.lock(), subject)
    }
}

impl MirrorStore for SqliteMirrorStore {
    fn begin(&self) -> Result<Box<dyn MirrorTx + '_>> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")
            .context("Failed to begin mirror transaction")?;
        Ok(Box::new(SqliteTx {
            conn,
            finished: false,
        }))
    }

    fn claim_sync(
        &self,
        subject: &str,
        run_id: &str,
        now: DateTime<Utc>,
        stale_after: Option<Duration>,
    ) -> Result<ClaimResult> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        let current = queries::mirror_status(&tx, subject)?;
        if let Some(current) = &current {
            match current.status {
                SyncStatus::FailedTooLarge => {
                    return Ok(ClaimResult::Terminal(current.status));
                }
                SyncStatus::InProcess => {
                    let stale = match (stale_after, current.claimed_at) {
                        (Some(limit), Some(claimed_at)) => {
                            let age = now.signed_duration_since(claimed_at);
                            age.to_std().map(|age| age > limit).unwrap_or(false)
                        }
                        _ => false,
                    };
                    if !stale {
                        return Ok(ClaimResult::InProcess);
                    }
                    warn!(
                        subject,
                        stale_run = current.run_id.as_deref().unwrap_or("-"),
                        "Reclaiming stale sync claim"
                    );
                }
                SyncStatus::Idle | SyncStatus::Sync | SyncStatus::Failed => {}
            }
        }

        queries::write_status(&tx, subject, SyncStatus::InProcess, Some(run_id), Some(now), now)?;
        tx.commit()?;
        debug!(subject, run_id, "Claimed subject for sync");
        Ok(ClaimResult::Claimed)
    }

    fn finish_sync(&self, subject: &str, run_id: &str, status: SyncStatus) -> Result<bool> {
        queries::finish_status(&self.conn.lock(), subject, run_id, status, Utc::now())
    }

    fn reset_status(&self, subject: &str) -> Result<()> {
        queries::write_status(&self.conn.lock(), subject, SyncStatus::Idle, None, None, Utc::now())
    }

    fn set_author_tier(&self, author: &str, tier: TrustTier) -> Result<()> {
        queries::set_author_tier(&self.conn.lock(), author, tier)
    }

    fn set_topic_protection(&self, topic_id: &str, tier: TrustTier) -> Result<()> {
        queries::set_topic_protection(&self.conn.lock(), topic_id, tier)
    }
}

// ── Transaction ──────────────────────────────────────────────────

/// An open `BEGIN IMMEDIATE` transaction. Rolled back on drop unless
/// committed.
pub struct SqliteTx<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!("Failed to roll back mirror transaction: {e}");
            }
        }
    }
}

impl MirrorRead for SqliteTx<'_> {
    fn local_index(
        &self,
        subject: &str,
        collections: &[Collection],
    ) -> Result<HashMap<String, String>> {
        queries::local_index(&self.conn, subject, collections)
    }

    fn record(&self, uri: &str) -> Result<Option<RecordRow>> {
        queries::record(&self.conn, uri)
    }

    fn post(&self, uri: &str) -> Result<Option<PostRow>> {
        queries::post(&self.conn, uri)
    }

    fn reaction(&self, uri: &str) -> Result<Option<ReactionRow>> {
        queries::reaction(&self.conn, uri)
    }

    fn reactions_matching(
        &self,
        subject_uri: &str,
        author: &str,
        kind: ReactionKind,
    ) -> Result<Vec<ReactionRow>> {
        queries::reactions_matching(&self.conn, subject_uri, author, kind)
    }

    fn has_reacted(&self, author: &str, subject_uri: &str, kind: ReactionKind) -> Result<bool> {
        queries::has_reacted(&self.conn, author, subject_uri, kind)
    }

    fn is_referenced(&self, uri: &str) -> Result<bool> {
        queries::is_referenced(&self.conn, uri)
    }

    fn topic(&self, id: &str) -> Result<Option<TopicRow>> {
        queries::topic(&self.conn, id)
    }

    fn topic_version(&self, uri: &str) -> Result<Option<TopicVersionRow>> {
        queries::topic_version(&self.conn, uri)
    }

    fn topic_versions(&self, topic_id: &str) -> Result<Vec<TopicVersionRow>> {
        queries::topic_versions(&self.conn, topic_id)
    }

    fn votes_on_topic(&self, topic_id: &str) -> Result<Vec<ReactionRow>> {
        queries::votes_on_topic(&self.conn, topic_id)
    }

    fn author_tier(&self, author: &str) -> Result<TrustTier> {
        queries::author_tier(&self.conn, author)
    }

    fn mirror_status(&self, subject: &str) -> Result<Option<MirrorStatus>> {
        queries::mirror_status(&self.conn, subject)
    }
}

impl MirrorTx for SqliteTx<'_> {
    fn upsert_record(&mut self, record: &NewRecord<'_>) -> Result<()> {
        queries::upsert_record(&self.conn, record, Utc::now())
    }

    fn ensure_placeholder(&mut self, uri: &RecordUri) -> Result<bool> {
        queries::ensure_placeholder(&self.conn, uri, Utc::now())
    }

    fn delete_record(&mut self, uri: &str) -> Result<bool> {
        queries::delete_record(&self.conn, uri)
    }

    fn clear_record(&mut self, uri: &str) -> Result<bool> {
        queries::clear_record(&self.conn, uri, Utc::now())
    }

    fn upsert_post(&mut self, post: &PostRow) -> Result<()> {
        queries::upsert_post(&self.conn, post)
    }

    fn delete_post(&mut self, uri: &str) -> Result<bool> {
        queries::delete_post(&self.conn, uri)
    }

    fn upsert_reaction(&mut self, reaction: &ReactionRow) -> Result<()> {
        queries::upsert_reaction(&self.conn, reaction)
    }

    fn delete_reaction(&mut self, uri: &str) -> Result<bool> {
        queries::delete_reaction(&self.conn, uri)
    }

    fn insert_ledger(
        &mut self,
        author: &str,
        subject_uri: &str,
        kind: ReactionKind,
    ) -> Result<bool> {
        queries::insert_ledger(&self.conn, author, subject_uri, kind)
    }

    fn delete_ledger(
        &mut self,
        author: &str,
        subject_uri: &str,
        kind: ReactionKind,
    ) -> Result<bool> {
        queries::delete_ledger(&self.conn, author, subject_uri, kind)
    }

    fn adjust_counter(&mut self, uri: &str, kind: ReactionKind, delta: i64) -> Result<()> {
        queries::adjust_counter(&self.conn, uri, kind, delta)
    }

    fn touch_topic(
        &mut self,
        topic_id: &str,
        edited_at: DateTime<Utc>,
        default_protection: TrustTier,
    ) -> Result<()> {
        queries::touch_topic(&self.conn, topic_id, edited_at, default_protection)
    }

    fn upsert_topic_version(&mut self, version: &TopicVersionRow) -> Result<()> {
        queries::upsert_topic_version(&self.conn, version)
    }

    fn delete_topic_version(&mut self, uri: &str) -> Result<bool> {
        queries::delete_topic_version(&self.conn, uri)
    }

    fn set_current_version(&mut self, topic_id: &str, version_uri: Option<&str>) -> Result<()> {
        queries::set_current_version(&self.conn, topic_id, version_uri)
    }

    fn write_contributions(&mut self, stats: &[ContributionStats]) -> Result<()> {
        queries::write_contributions(&self.conn, stats)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("Failed to commit mirror transaction")?;
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn uri(s: &str) -> RecordUri {
        s.parse().unwrap()
    }

    const POST: &str = "at://did:plc:alice/org.commonwiki.feed.post/p1";

    fn insert_post(store: &SqliteMirrorStore, cid: &str) {
        let u = uri(POST);
        let payload = json!({"text": "hi", "createdAt": "2024-01-01T00:00:00Z"});
        let mut tx = store.begin().unwrap();
        tx.upsert_record(&NewRecord {
            uri: &u,
            cid,
            collection: Collection::Post,
            payload: &payload,
            created_at: Utc::now(),
        })
        .unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn open_creates_db_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("mirror.db");
        let _store = SqliteMirrorStore::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn upsert_keeps_first_seen_and_counters() {
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        insert_post(&store, "c1");
        let first = store.record(POST).unwrap().unwrap();

        let mut tx = store.begin().unwrap();
        tx.adjust_counter(POST, ReactionKind::Like, 2).unwrap();
        tx.commit().unwrap();

        insert_post(&store, "c2");
        let second = store.record(POST).unwrap().unwrap();
        assert_eq!(second.cid.as_deref(), Some("c2"));
        assert_eq!(second.first_seen_at, first.first_seen_at);
        assert_eq!(second.like_count, 2);
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        {
            let mut tx = store.begin().unwrap();
            tx.ensure_placeholder(&uri(POST)).unwrap();
            assert!(tx.record(POST).unwrap().is_some());
        }
        assert!(store.record(POST).unwrap().is_none());
    }

    #[test]
    fn placeholder_is_not_in_local_index() {
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        let mut tx = store.begin().unwrap();
        assert!(tx.ensure_placeholder(&uri(POST)).unwrap());
        assert!(!tx.ensure_placeholder(&uri(POST)).unwrap());
        tx.commit().unwrap();

        assert!(store.record(POST).unwrap().unwrap().is_placeholder());
        let index = store.local_index("did:plc:alice", &Collection::ALL).unwrap();
        assert!(index.is_empty());

        insert_post(&store, "c1");
        let index = store.local_index("did:plc:alice", &Collection::ALL).unwrap();
        assert_eq!(index.get(POST).map(String::as_str), Some("c1"));
    }

    #[test]
    fn cleared_record_keeps_counters_and_leaves_the_index() {
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        insert_post(&store, "c1");
        let mut tx = store.begin().unwrap();
        assert!(!tx.is_referenced(POST).unwrap());
        assert!(tx.insert_ledger("bob", POST, ReactionKind::Like).unwrap());
        tx.adjust_counter(POST, ReactionKind::Like, 1).unwrap();
        assert!(tx.is_referenced(POST).unwrap());
        assert!(tx.clear_record(POST).unwrap());
        tx.commit().unwrap();

        let record = store.record(POST).unwrap().unwrap();
        assert!(record.is_placeholder());
        assert_eq!(record.cid, None);
        assert_eq!(record.like_count, 1);
        assert!(store.local_index("did:plc:alice", &Collection::ALL).unwrap().is_empty());
    }

    #[test]
    fn ledger_insert_is_conflict_free() {
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        let mut tx = store.begin().unwrap();
        assert!(tx.insert_ledger("bob", POST, ReactionKind::Like).unwrap());
        assert!(!tx.insert_ledger("bob", POST, ReactionKind::Like).unwrap());
        assert!(tx.insert_ledger("bob", POST, ReactionKind::Repost).unwrap());
        assert!(tx.delete_ledger("bob", POST, ReactionKind::Like).unwrap());
        assert!(!tx.delete_ledger("bob", POST, ReactionKind::Like).unwrap());
        tx.commit().unwrap();
        assert!(store.has_reacted("bob", POST, ReactionKind::Repost).unwrap());
    }

    #[test]
    fn counters_never_go_negative() {
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        insert_post(&store, "c1");
        let mut tx = store.begin().unwrap();
        tx.adjust_counter(POST, ReactionKind::Reject, -3).unwrap();
        tx.commit().unwrap();
        assert_eq!(store.record(POST).unwrap().unwrap().reject_count, 0);
    }

    #[test]
    fn touch_topic_keeps_latest_edit() {
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        let early = DateTime::from_timestamp(1_000, 0).unwrap();
        let late = DateTime::from_timestamp(2_000, 0).unwrap();
        let mut tx = store.begin().unwrap();
        tx.touch_topic("rust", late, TrustTier::Editor).unwrap();
        tx.touch_topic("rust", early, TrustTier::Beginner).unwrap();
        tx.commit().unwrap();

        let topic = store.topic("rust").unwrap().unwrap();
        assert_eq!(topic.last_edit, Some(late));
        assert_eq!(topic.protection, TrustTier::Editor);
        assert_eq!(topic.current_version, None);
    }

    #[test]
    fn claim_is_compare_and_set() {
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        let now = Utc::now();
        assert_eq!(
            store.claim_sync("did:plc:alice", "run-1", now, None).unwrap(),
            ClaimResult::Claimed
        );
        assert_eq!(
            store.claim_sync("did:plc:alice", "run-2", now, None).unwrap(),
            ClaimResult::InProcess
        );
        let status = store.mirror_status("did:plc:alice").unwrap().unwrap();
        assert_eq!(status.transitions, 1);
        assert_eq!(status.run_id.as_deref(), Some("run-1"));

        // Only the claiming run may finish.
        assert!(!store.finish_sync("did:plc:alice", "run-2", SyncStatus::Sync).unwrap());
        assert!(store.finish_sync("did:plc:alice", "run-1", SyncStatus::Sync).unwrap());
        let status = store.mirror_status("did:plc:alice").unwrap().unwrap();
        assert_eq!(status.status, SyncStatus::Sync);
        assert_eq!(status.transitions, 2);
    }

    #[test]
    fn stale_claim_can_be_reclaimed() {
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        let then = Utc::now() - chrono::Duration::seconds(600);
        store.claim_sync("s", "old", then, None).unwrap();

        let limit = Some(Duration::from_secs(60));
        assert_eq!(
            store.claim_sync("s", "new", Utc::now(), limit).unwrap(),
            ClaimResult::Claimed
        );
        assert!(!store.finish_sync("s", "old", SyncStatus::Failed).unwrap());
        assert!(store.finish_sync("s", "new", SyncStatus::Sync).unwrap());
    }

    #[test]
    fn too_large_is_terminal_until_reset() {
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        store.claim_sync("s", "r1", Utc::now(), None).unwrap();
        store.finish_sync("s", "r1", SyncStatus::FailedTooLarge).unwrap();
        assert_eq!(
            store.claim_sync("s", "r2", Utc::now(), None).unwrap(),
            ClaimResult::Terminal(SyncStatus::FailedTooLarge)
        );
        store.reset_status("s").unwrap();
        assert_eq!(
            store.claim_sync("s", "r3", Utc::now(), None).unwrap(),
            ClaimResult::Claimed
        );
    }

    #[test]
    fn unknown_author_is_beginner() {
        let store = SqliteMirrorStore::open_in_memory().unwrap();
        assert_eq!(store.author_tier("nobody").unwrap(), TrustTier::Beginner);
        store.set_author_tier("ada", TrustTier::Administrator).unwrap();
        assert_eq!(store.author_tier("ada").unwrap(), TrustTier::Administrator);
    }
}
