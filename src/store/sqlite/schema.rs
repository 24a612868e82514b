use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create the mirror tables if they do not exist yet.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "-- Every mirrored record, plus payload-less placeholders
        CREATE TABLE IF NOT EXISTS records (
            uri TEXT PRIMARY KEY,
            cid TEXT,
            author TEXT NOT NULL,
            collection TEXT NOT NULL,
            payload TEXT,
            like_count INTEGER NOT NULL DEFAULT 0,
            repost_count INTEGER NOT NULL DEFAULT 0,
            accept_count INTEGER NOT NULL DEFAULT 0,
            reject_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER,
            first_seen_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_author_collection
            ON records(author, collection);

        CREATE TABLE IF NOT EXISTS posts (
            uri TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            reply_parent TEXT,
            reply_root TEXT
        );

        CREATE TABLE IF NOT EXISTS reactions (
            uri TEXT PRIMARY KEY,
            subject_uri TEXT NOT NULL,
            kind TEXT NOT NULL,
            author TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_reactions_subject
            ON reactions(subject_uri, kind);
        CREATE INDEX IF NOT EXISTS idx_reactions_author
            ON reactions(author, subject_uri, kind);

        -- At most one counted reaction per (author, subject, kind)
        CREATE TABLE IF NOT EXISTS has_reacted (
            author TEXT NOT NULL,
            subject_uri TEXT NOT NULL,
            kind TEXT NOT NULL,
            PRIMARY KEY (author, subject_uri, kind)
        );

        CREATE TABLE IF NOT EXISTS topics (
            id TEXT PRIMARY KEY,
            protection TEXT NOT NULL,
            current_version TEXT,
            last_edit INTEGER,
            popularity REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS topic_versions (
            uri TEXT PRIMARY KEY,
            topic_id TEXT NOT NULL,
            author TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            props TEXT NOT NULL DEFAULT '[]',
            claims_authorship INTEGER NOT NULL DEFAULT 0,
            text TEXT,
            text_blob TEXT,
            chars_added INTEGER NOT NULL DEFAULT 0,
            chars_deleted INTEGER NOT NULL DEFAULT 0,
            accumulated_chars INTEGER NOT NULL DEFAULT 0,
            contribution_all REAL NOT NULL DEFAULT 0,
            contribution_monetized REAL NOT NULL DEFAULT 0,
            prev_accepted TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_topic_versions_topic
            ON topic_versions(topic_id, created_at);

        CREATE TABLE IF NOT EXISTS mirror_status (
            subject TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            run_id TEXT,
            claimed_at INTEGER,
            transitions INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS author_tiers (
            author TEXT PRIMARY KEY,
            tier TEXT NOT NULL
        );",
    )
    .context("Failed to create mirror tables")?;
    Ok(())
}
