//! Mirror queries. All take `&Connection`; locking and transactions are
//! handled by the callers in `mod.rs`.

use crate::store::types::{
    MirrorStatus, NewRecord, PostRow, ReactionRow, RecordRow, SyncStatus, TopicRow,
    TopicVersionRow,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use repo_records::{Collection, ReactionKind, RecordUri};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use topic_consensus::{ContributionStats, TrustTier};

// ── Conversions ──────────────────────────────────────────────────

pub(super) fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(super) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn invalid(idx: usize, value: String) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(idx, value, Type::Text)
}

fn kind_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<ReactionKind> {
    let raw: String = row.get(idx)?;
    ReactionKind::parse(&raw).ok_or_else(|| invalid(idx, raw))
}

fn tier_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<TrustTier> {
    let raw: String = row.get(idx)?;
    TrustTier::parse(&raw).ok_or_else(|| invalid(idx, raw))
}

fn status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<SyncStatus> {
    let raw: String = row.get(idx)?;
    SyncStatus::parse(&raw).ok_or_else(|| invalid(idx, raw))
}

fn counter_column(kind: ReactionKind) -> &'static str {
    match kind {
        ReactionKind::Like => "like_count",
        ReactionKind::Repost => "repost_count",
        ReactionKind::Accept => "accept_count",
        ReactionKind::Reject => "reject_count",
    }
}

// ── Records ──────────────────────────────────────────────────────

const RECORD_COLUMNS: &str = "uri, cid, author, collection, payload, like_count, repost_count,
     accept_count, reject_count, created_at, first_seen_at, updated_at";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        uri: row.get(0)?,
        cid: row.get(1)?,
        author: row.get(2)?,
        collection: row.get(3)?,
        payload: row.get(4)?,
        like_count: row.get::<_, i64>(5)?.max(0) as u64,
        repost_count: row.get::<_, i64>(6)?.max(0) as u64,
        accept_count: row.get::<_, i64>(7)?.max(0) as u64,
        reject_count: row.get::<_, i64>(8)?.max(0) as u64,
        created_at: row.get::<_, Option<i64>>(9)?.map(from_millis),
        first_seen_at: from_millis(row.get(10)?),
        updated_at: from_millis(row.get(11)?),
    })
}

pub fn local_index(
    conn: &Connection,
    subject: &str,
    collections: &[Collection],
) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT uri, cid FROM records
         WHERE author = ?1 AND collection = ?2
           AND payload IS NOT NULL AND cid IS NOT NULL",
    )?;
    let mut index = HashMap::new();
    for collection in collections {
        let rows = stmt.query_map(params![subject, collection.nsid()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (uri, cid) = row?;
            index.insert(uri, cid);
        }
    }
    Ok(index)
}

pub fn record(conn: &Connection, uri: &str) -> Result<Option<RecordRow>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE uri = ?1");
    let row = conn
        .query_row(&sql, params![uri], record_from_row)
        .optional()
        .with_context(|| format!("Failed to read record {uri}"))?;
    Ok(row)
}

pub fn upsert_record(conn: &Connection, record: &NewRecord<'_>, now: DateTime<Utc>) -> Result<()> {
    let payload = serde_json::to_string(record.payload)?;
    conn.execute(
        "INSERT INTO records (uri, cid, author, collection, payload, created_at,
                              first_seen_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(uri) DO UPDATE SET
            cid = excluded.cid,
            author = excluded.author,
            collection = excluded.collection,
            payload = excluded.payload,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at",
        params![
            record.uri.to_string(),
            record.cid,
            record.uri.subject(),
            record.collection.nsid(),
            payload,
            to_millis(record.created_at),
            to_millis(now),
        ],
    )
    .with_context(|| format!("Failed to upsert record {}", record.uri))?;
    Ok(())
}

pub fn ensure_placeholder(conn: &Connection, uri: &RecordUri, now: DateTime<Utc>) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO records (uri, cid, author, collection, payload, first_seen_at, updated_at)
         VALUES (?1, NULL, ?2, ?3, NULL, ?4, ?4)
         ON CONFLICT(uri) DO NOTHING",
        params![uri.to_string(), uri.subject(), uri.collection(), to_millis(now)],
    )?;
    Ok(inserted > 0)
}

pub fn delete_record(conn: &Connection, uri: &str) -> Result<bool> {
    Ok(conn.execute("DELETE FROM records WHERE uri = ?1", params![uri])? > 0)
}

pub fn clear_record(conn: &Connection, uri: &str, now: DateTime<Utc>) -> Result<bool> {
    let cleared = conn
        .execute(
            "UPDATE records SET cid = NULL, payload = NULL, created_at = NULL, updated_at = ?2
             WHERE uri = ?1",
            params![uri, to_millis(now)],
        )
        .with_context(|| format!("Failed to clear record {uri}"))?;
    Ok(cleared > 0)
}

pub fn is_referenced(conn: &Connection, uri: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 WHERE
                EXISTS (SELECT 1 FROM reactions WHERE subject_uri = ?1)
             OR EXISTS (SELECT 1 FROM has_reacted WHERE subject_uri = ?1)
             OR EXISTS (SELECT 1 FROM posts
                        WHERE uri != ?1 AND (reply_parent = ?1 OR reply_root = ?1))",
            params![uri],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn adjust_counter(conn: &Connection, uri: &str, kind: ReactionKind, delta: i64) -> Result<()> {
    let column = counter_column(kind);
    let sql = format!("UPDATE records SET {column} = MAX(0, {column} + ?2) WHERE uri = ?1");
    conn.execute(&sql, params![uri, delta])
        .with_context(|| format!("Failed to adjust {column} of {uri}"))?;
    Ok(())
}

// ── Posts ────────────────────────────────────────────────────────

pub fn post(conn: &Connection, uri: &str) -> Result<Option<PostRow>> {
    let row = conn
        .query_row(
            "SELECT uri, text, reply_parent, reply_root FROM posts WHERE uri = ?1",
            params![uri],
            |row| {
                Ok(PostRow {
                    uri: row.get(0)?,
                    text: row.get(1)?,
                    reply_parent: row.get(2)?,
                    reply_root: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn upsert_post(conn: &Connection, post: &PostRow) -> Result<()> {
    conn.execute(
        "INSERT INTO posts (uri, text, reply_parent, reply_root) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(uri) DO UPDATE SET
            text = excluded.text,
            reply_parent = excluded.reply_parent,
            reply_root = excluded.reply_root",
        params![post.uri, post.text, post.reply_parent, post.reply_root],
    )?;
    Ok(())
}

pub fn delete_post(conn: &Connection, uri: &str) -> Result<bool> {
    Ok(conn.execute("DELETE FROM posts WHERE uri = ?1", params![uri])? > 0)
}

// ── Reactions and ledger ─────────────────────────────────────────

const REACTION_COLUMNS: &str = "uri, subject_uri, kind, author, created_at";

fn reaction_from_row(row: &Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        uri: row.get(0)?,
        subject_uri: row.get(1)?,
        kind: kind_at(row, 2)?,
        author: row.get(3)?,
        created_at: from_millis(row.get(4)?),
    })
}

pub fn reaction(conn: &Connection, uri: &str) -> Result<Option<ReactionRow>> {
    let sql = format!("SELECT {REACTION_COLUMNS} FROM reactions WHERE uri = ?1");
    Ok(conn.query_row(&sql, params![uri], reaction_from_row).optional()?)
}

pub fn reactions_matching(
    conn: &Connection,
    subject_uri: &str,
    author: &str,
    kind: ReactionKind,
) -> Result<Vec<ReactionRow>> {
    let sql = format!(
        "SELECT {REACTION_COLUMNS} FROM reactions
         WHERE subject_uri = ?1 AND author = ?2 AND kind = ?3
         ORDER BY uri"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![subject_uri, author, kind.as_str()], reaction_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn upsert_reaction(conn: &Connection, reaction: &ReactionRow) -> Result<()> {
    conn.execute(
        "INSERT INTO reactions (uri, subject_uri, kind, author, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(uri) DO UPDATE SET
            subject_uri = excluded.subject_uri,
            kind = excluded.kind,
            author = excluded.author,
            created_at = excluded.created_at",
        params![
            reaction.uri,
            reaction.subject_uri,
            reaction.kind.as_str(),
            reaction.author,
            to_millis(reaction.created_at),
        ],
    )?;
    Ok(())
}

pub fn delete_reaction(conn: &Connection, uri: &str) -> Result<bool> {
    Ok(conn.execute("DELETE FROM reactions WHERE uri = ?1", params![uri])? > 0)
}

pub fn has_reacted(
    conn: &Connection,
    author: &str,
    subject_uri: &str,
    kind: ReactionKind,
) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM has_reacted WHERE author = ?1 AND subject_uri = ?2 AND kind = ?3",
            params![author, subject_uri, kind.as_str()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn insert_ledger(
    conn: &Connection,
    author: &str,
    subject_uri: &str,
    kind: ReactionKind,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT INTO has_reacted (author, subject_uri, kind) VALUES (?1, ?2, ?3)
         ON CONFLICT(author, subject_uri, kind) DO NOTHING",
        params![author, subject_uri, kind.as_str()],
    )?;
    Ok(inserted > 0)
}

pub fn delete_ledger(
    conn: &Connection,
    author: &str,
    subject_uri: &str,
    kind: ReactionKind,
) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM has_reacted WHERE author = ?1 AND subject_uri = ?2 AND kind = ?3",
        params![author, subject_uri, kind.as_str()],
    )?;
    Ok(removed > 0)
}

// ── Topics ───────────────────────────────────────────────────────

pub fn topic(conn: &Connection, id: &str) -> Result<Option<TopicRow>> {
    let row = conn
        .query_row(
            "SELECT id, protection, current_version, last_edit, popularity
             FROM topics WHERE id = ?1",
            params![id],
            |row| {
                Ok(TopicRow {
                    id: row.get(0)?,
                    protection: tier_at(row, 1)?,
                    current_version: row.get(2)?,
                    last_edit: row.get::<_, Option<i64>>(3)?.map(from_millis),
                    popularity: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn touch_topic(
    conn: &Connection,
    topic_id: &str,
    edited_at: DateTime<Utc>,
    default_protection: TrustTier,
) -> Result<()> {
    conn.execute(
        "INSERT INTO topics (id, protection, current_version, last_edit)
         VALUES (?1, ?2, NULL, ?3)
         ON CONFLICT(id) DO UPDATE SET
            last_edit = MAX(COALESCE(topics.last_edit, 0), excluded.last_edit)",
        params![topic_id, default_protection.as_str(), to_millis(edited_at)],
    )
    .with_context(|| format!("Failed to touch topic {topic_id}"))?;
    Ok(())
}

pub fn set_topic_protection(conn: &Connection, topic_id: &str, tier: TrustTier) -> Result<()> {
    conn.execute(
        "INSERT INTO topics (id, protection) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET protection = excluded.protection",
        params![topic_id, tier.as_str()],
    )?;
    Ok(())
}

pub fn set_current_version(
    conn: &Connection,
    topic_id: &str,
    version_uri: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE topics SET current_version = ?2 WHERE id = ?1",
        params![topic_id, version_uri],
    )?;
    Ok(())
}

const VERSION_COLUMNS: &str = "uri, topic_id, author, created_at, message, props,
     claims_authorship, text, text_blob, chars_added, chars_deleted, accumulated_chars,
     contribution_all, contribution_monetized, prev_accepted";

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<TopicVersionRow> {
    let props_json: String = row.get(5)?;
    let props = serde_json::from_str(&props_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(TopicVersionRow {
        uri: row.get(0)?,
        topic_id: row.get(1)?,
        author: row.get(2)?,
        created_at: from_millis(row.get(3)?),
        message: row.get(4)?,
        props,
        claims_authorship: row.get::<_, i64>(6)? != 0,
        text: row.get(7)?,
        text_blob: row.get(8)?,
        chars_added: row.get::<_, i64>(9)?.max(0) as u64,
        chars_deleted: row.get::<_, i64>(10)?.max(0) as u64,
        accumulated_chars: row.get::<_, i64>(11)?.max(0) as u64,
        contribution_all: row.get(12)?,
        contribution_monetized: row.get(13)?,
        prev_accepted: row.get(14)?,
    })
}

pub fn topic_version(conn: &Connection, uri: &str) -> Result<Option<TopicVersionRow>> {
    let sql = format!("SELECT {VERSION_COLUMNS} FROM topic_versions WHERE uri = ?1");
    Ok(conn.query_row(&sql, params![uri], version_from_row).optional()?)
}

pub fn topic_versions(conn: &Connection, topic_id: &str) -> Result<Vec<TopicVersionRow>> {
    let sql = format!("SELECT {VERSION_COLUMNS} FROM topic_versions WHERE topic_id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![topic_id], version_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("Failed to read versions of topic {topic_id}"))?;
    Ok(rows)
}

pub fn votes_on_topic(conn: &Connection, topic_id: &str) -> Result<Vec<ReactionRow>> {
    let mut stmt = conn.prepare(
        "SELECT r.uri, r.subject_uri, r.kind, r.author, r.created_at
         FROM reactions r
         JOIN topic_versions v ON v.uri = r.subject_uri
         WHERE v.topic_id = ?1 AND r.kind IN ('accept', 'reject')",
    )?;
    let rows = stmt
        .query_map(params![topic_id], reaction_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn upsert_topic_version(conn: &Connection, version: &TopicVersionRow) -> Result<()> {
    let props = serde_json::to_string(&version.props)?;
    conn.execute(
        "INSERT INTO topic_versions (uri, topic_id, author, created_at, message, props,
                                     claims_authorship, text, text_blob)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(uri) DO UPDATE SET
            topic_id = excluded.topic_id,
            author = excluded.author,
            created_at = excluded.created_at,
            message = excluded.message,
            props = excluded.props,
            claims_authorship = excluded.claims_authorship,
            text = excluded.text,
            text_blob = excluded.text_blob",
        params![
            version.uri,
            version.topic_id,
            version.author,
            to_millis(version.created_at),
            version.message,
            props,
            version.claims_authorship as i64,
            version.text,
            version.text_blob,
        ],
    )
    .with_context(|| format!("Failed to upsert topic version {}", version.uri))?;
    Ok(())
}

pub fn delete_topic_version(conn: &Connection, uri: &str) -> Result<bool> {
    Ok(conn.execute("DELETE FROM topic_versions WHERE uri = ?1", params![uri])? > 0)
}

pub fn write_contributions(conn: &Connection, stats: &[ContributionStats]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "UPDATE topic_versions SET
            chars_added = ?2,
            chars_deleted = ?3,
            accumulated_chars = ?4,
            contribution_all = ?5,
            contribution_monetized = ?6,
            prev_accepted = ?7
         WHERE uri = ?1",
    )?;
    for s in stats {
        stmt.execute(params![
            s.uri,
            s.chars_added as i64,
            s.chars_deleted as i64,
            s.accumulated_chars as i64,
            s.contribution_all,
            s.contribution_monetized,
            s.prev_accepted,
        ])?;
    }
    Ok(())
}

// ── Authors ──────────────────────────────────────────────────────

pub fn author_tier(conn: &Connection, author: &str) -> Result<TrustTier> {
    let tier = conn
        .query_row(
            "SELECT tier FROM author_tiers WHERE author = ?1",
            params![author],
            |row| tier_at(row, 0),
        )
        .optional()?;
    Ok(tier.unwrap_or_default())
}

pub fn set_author_tier(conn: &Connection, author: &str, tier: TrustTier) -> Result<()> {
    conn.execute(
        "INSERT INTO author_tiers (author, tier) VALUES (?1, ?2)
         ON CONFLICT(author) DO UPDATE SET tier = excluded.tier",
        params![author, tier.as_str()],
    )?;
    Ok(())
}

// ── Mirror status ────────────────────────────────────────────────

pub fn mirror_status(conn: &Connection, subject: &str) -> Result<Option<MirrorStatus>> {
    let row = conn
        .query_row(
            "SELECT subject, status, run_id, claimed_at, transitions, updated_at
             FROM mirror_status WHERE subject = ?1",
            params![subject],
            |row| {
                Ok(MirrorStatus {
                    subject: row.get(0)?,
                    status: status_at(row, 1)?,
                    run_id: row.get(2)?,
                    claimed_at: row.get::<_, Option<i64>>(3)?.map(from_millis),
                    transitions: row.get::<_, i64>(4)?.max(0) as u64,
                    updated_at: from_millis(row.get(5)?),
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Write a status row, bumping the transition counter.
pub fn write_status(
    conn: &Connection,
    subject: &str,
    status: SyncStatus,
    run_id: Option<&str>,
    claimed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO mirror_status (subject, status, run_id, claimed_at, transitions, updated_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5)
         ON CONFLICT(subject) DO UPDATE SET
            status = excluded.status,
            run_id = excluded.run_id,
            claimed_at = excluded.claimed_at,
            transitions = mirror_status.transitions + 1,
            updated_at = excluded.updated_at",
        params![
            subject,
            status.as_str(),
            run_id,
            claimed_at.map(to_millis),
            to_millis(now),
        ],
    )
    .with_context(|| format!("Failed to write status {status} for {subject}"))?;
    Ok(())
}

/// Terminal write guarded by the run id. Returns whether a row changed.
pub fn finish_status(
    conn: &Connection,
    subject: &str,
    run_id: &str,
    status: SyncStatus,
    now: DateTime<Utc>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE mirror_status SET
            status = ?3,
            run_id = NULL,
            claimed_at = NULL,
            transitions = transitions + 1,
            updated_at = ?4
         WHERE subject = ?1 AND run_id = ?2 AND status = 'in_process'",
        params![subject, run_id, status.as_str(), to_millis(now)],
    )?;
    Ok(changed > 0)
}
