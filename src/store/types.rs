//! Row types of the mirror.

use chrono::{DateTime, Utc};
use repo_records::{Collection, ReactionKind, RecordUri, TopicProp};
use serde::{Deserialize, Serialize};
use std::fmt;
use topic_consensus::TrustTier;

// ── Sync status ──────────────────────────────────────────────────

/// Mirror status of one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    InProcess,
    Sync,
    Failed,
    /// The snapshot exceeded the size limit. Terminal until reset.
    FailedTooLarge,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::InProcess => "in_process",
            SyncStatus::Sync => "sync",
            SyncStatus::Failed => "failed",
            SyncStatus::FailedTooLarge => "failed_too_large",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(SyncStatus::Idle),
            "in_process" => Some(SyncStatus::InProcess),
            "sync" => Some(SyncStatus::Sync),
            "failed" => Some(SyncStatus::Failed),
            "failed_too_large" => Some(SyncStatus::FailedTooLarge),
            _ => None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorStatus {
    pub subject: String,
    pub status: SyncStatus,
    /// Run holding the current claim, if any.
    pub run_id: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    /// Number of status writes ever made for this subject.
    pub transitions: u64,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of trying to claim a subject for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimResult {
    Claimed,
    /// Another run holds the claim.
    InProcess,
    /// The subject is in a terminal status and needs an explicit reset.
    Terminal(SyncStatus),
}

// ── Records ──────────────────────────────────────────────────────

/// A record row. A row with no payload is a dirty placeholder: something
/// references it but its content has not been mirrored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    pub uri: String,
    pub cid: Option<String>,
    pub author: String,
    pub collection: String,
    pub payload: Option<String>,
    pub like_count: u64,
    pub repost_count: u64,
    pub accept_count: u64,
    pub reject_count: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordRow {
    pub fn is_placeholder(&self) -> bool {
        self.payload.is_none()
    }

    pub fn count(&self, kind: ReactionKind) -> u64 {
        match kind {
            ReactionKind::Like => self.like_count,
            ReactionKind::Repost => self.repost_count,
            ReactionKind::Accept => self.accept_count,
            ReactionKind::Reject => self.reject_count,
        }
    }
}

/// Input for a record upsert.
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    pub uri: &'a RecordUri,
    pub cid: &'a str,
    pub collection: Collection,
    pub payload: &'a serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRow {
    pub uri: String,
    pub text: String,
    pub reply_parent: Option<String>,
    pub reply_root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionRow {
    pub uri: String,
    pub subject_uri: String,
    pub kind: ReactionKind,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

// ── Topics ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRow {
    pub id: String,
    pub protection: TrustTier,
    pub current_version: Option<String>,
    pub last_edit: Option<DateTime<Utc>>,
    /// Owned by an external writer; never written here.
    pub popularity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicVersionRow {
    pub uri: String,
    pub topic_id: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub message: String,
    pub props: Vec<TopicProp>,
    pub claims_authorship: bool,
    pub text: Option<String>,
    pub text_blob: Option<String>,
    pub chars_added: u64,
    pub chars_deleted: u64,
    pub accumulated_chars: u64,
    pub contribution_all: f64,
    pub contribution_monetized: f64,
    pub prev_accepted: Option<String>,
}
