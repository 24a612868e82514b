//! Version consensus and contribution accounting for wiki topics.
//!
//! A topic accumulates competing versions, each of which collects accept
//! and reject votes from voters of different trust tiers. This crate
//! decides which version is canonical and how much of the topic's text
//! each accepted version contributed. Everything here is pure: callers
//! load versions, votes and text, and persist the results.

pub mod blockdiff;
pub mod config;
pub mod consensus;
pub mod contribution;
pub mod types;

pub use blockdiff::{diff_blocks, split_blocks, DiffStats};
pub use config::{ConsensusConfig, ContributionConfig};
pub use consensus::{
    resolve_current_version, resolve_statuses, sort_versions, tally_votes, version_status, Tally,
};
pub use contribution::{account_contributions, AccountInput, AccountingError, ContributionStats};
pub use types::{TrustTier, VersionCandidate, VersionStatus, Vote, VoteKind};
