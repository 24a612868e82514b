//! Core types for topic consensus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust level of an author. Ordered: a higher tier outranks a lower one.
///
/// A topic's protection tier is expressed in the same scale: only voters
/// at or above it can veto a version of that topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    #[default]
    Beginner,
    Editor,
    Administrator,
}

impl TrustTier {
    pub const ALL: [TrustTier; 3] = [
        TrustTier::Beginner,
        TrustTier::Editor,
        TrustTier::Administrator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrustTier::Beginner => "beginner",
            TrustTier::Editor => "editor",
            TrustTier::Administrator => "administrator",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Some(TrustTier::Beginner),
            "editor" => Some(TrustTier::Editor),
            "administrator" | "admin" => Some(TrustTier::Administrator),
            _ => None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteKind {
    Accept,
    Reject,
}

/// One vote on one version, with the voter's tier resolved at tally time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// URI of the vote record itself. Breaks ties between votes from the
    /// same voter with the same timestamp.
    pub uri: String,
    pub voter: String,
    pub kind: VoteKind,
    pub voter_tier: TrustTier,
    pub created_at: DateTime<Utc>,
}

/// A version as seen by the consensus engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCandidate {
    pub uri: String,
    pub created_at: DateTime<Utc>,
    pub votes: Vec<Vote>,
}

/// Computed status of a version. Never stored; derived on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// No qualifying rejection, but lower-tier rejections are outstanding.
    Pending,
    /// No rejection at all that the topic's protection can see.
    Accepted,
    /// At least one rejection from a voter at or above the protection tier.
    Rejected,
}

impl VersionStatus {
    /// Pending and Accepted versions can both become current and both
    /// advance the contribution baseline.
    pub fn is_eligible(&self) -> bool {
        !matches!(self, VersionStatus::Rejected)
    }
}
