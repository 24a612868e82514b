//! Vote tallying and current-version resolution.
//!
//! Policy:
//! - only a voter's most recent vote on a version counts;
//! - a single rejection from a voter at or above the topic's protection
//!   tier disqualifies the version, whatever its accept count;
//! - the newest eligible version is current.

use crate::types::{TrustTier, VersionCandidate, VersionStatus, Vote, VoteKind};
use std::collections::HashMap;

const TIERS: usize = TrustTier::ALL.len();

/// Counted votes on one version, bucketed by voter tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    accepts: [usize; TIERS],
    rejects: [usize; TIERS],
}

impl Tally {
    pub fn accepts_at_or_above(&self, tier: TrustTier) -> usize {
        self.accepts[tier.index()..].iter().sum()
    }

    pub fn rejects_at_or_above(&self, tier: TrustTier) -> usize {
        self.rejects[tier.index()..].iter().sum()
    }

    pub fn total_rejects(&self) -> usize {
        self.rejects.iter().sum()
    }
}

/// Tally the votes on one version. Earlier votes from a voter are
/// superseded by their latest one (by timestamp, then vote uri).
pub fn tally_votes(votes: &[Vote]) -> Tally {
    let mut latest: HashMap<&str, &Vote> = HashMap::new();
    for vote in votes {
        latest
            .entry(vote.voter.as_str())
            .and_modify(|current| {
                if (vote.created_at, vote.uri.as_str()) > (current.created_at, current.uri.as_str()) {
                    *current = vote;
                }
            })
            .or_insert(vote);
    }

    let mut tally = Tally::default();
    for vote in latest.values() {
        let bucket = match vote.kind {
            VoteKind::Accept => &mut tally.accepts,
            VoteKind::Reject => &mut tally.rejects,
        };
        bucket[vote.voter_tier.index()] += 1;
    }
    tally
}

/// Status of a version under the given protection tier.
pub fn version_status(votes: &[Vote], protection: TrustTier) -> VersionStatus {
    let tally = tally_votes(votes);
    if tally.rejects_at_or_above(protection) > 0 {
        VersionStatus::Rejected
    } else if tally.total_rejects() > 0 {
        VersionStatus::Pending
    } else {
        VersionStatus::Accepted
    }
}

/// Order versions oldest to newest by content creation time, ties broken
/// by uri so the order is total.
pub fn sort_versions(versions: &mut [VersionCandidate]) {
    versions.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.uri.cmp(&b.uri))
    });
}

/// Status of every version, in input order.
pub fn resolve_statuses(
    versions: &[VersionCandidate],
    protection: TrustTier,
) -> Vec<(String, VersionStatus)> {
    versions
        .iter()
        .map(|v| (v.uri.clone(), version_status(&v.votes, protection)))
        .collect()
}

/// Resolve the current version of a topic.
///
/// `versions` must be ordered oldest to newest (see [`sort_versions`]).
/// Returns the uri of the newest eligible version, or `None` when every
/// version carries a qualifying rejection.
pub fn resolve_current_version(
    versions: &[VersionCandidate],
    protection: TrustTier,
) -> Option<String> {
    let current = versions
        .iter()
        .rev()
        .find(|v| version_status(&v.votes, protection).is_eligible())
        .map(|v| v.uri.clone());

    log::debug!(
        "resolved current version among {} candidates at protection {}: {:?}",
        versions.len(),
        protection,
        current
    );
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn vote(uri: &str, voter: &str, kind: VoteKind, tier: TrustTier, secs: i64) -> Vote {
        Vote {
            uri: uri.to_string(),
            voter: voter.to_string(),
            kind,
            voter_tier: tier,
            created_at: at(secs),
        }
    }

    fn version(uri: &str, secs: i64, votes: Vec<Vote>) -> VersionCandidate {
        VersionCandidate {
            uri: uri.to_string(),
            created_at: at(secs),
            votes,
        }
    }

    #[test]
    fn latest_vote_per_voter_supersedes_earlier() {
        let votes = vec![
            vote("v1", "alice", VoteKind::Reject, TrustTier::Editor, 10),
            vote("v2", "alice", VoteKind::Accept, TrustTier::Editor, 20),
        ];
        let tally = tally_votes(&votes);
        assert_eq!(tally.rejects_at_or_above(TrustTier::Beginner), 0);
        assert_eq!(tally.accepts_at_or_above(TrustTier::Beginner), 1);
    }

    #[test]
    fn same_timestamp_tie_broken_by_vote_uri() {
        let votes = vec![
            vote("vb", "alice", VoteKind::Reject, TrustTier::Editor, 10),
            vote("va", "alice", VoteKind::Accept, TrustTier::Editor, 10),
        ];
        // "vb" > "va", so the reject is the latest.
        assert_eq!(version_status(&votes, TrustTier::Beginner), VersionStatus::Rejected);
    }

    #[test]
    fn single_qualifying_rejection_vetoes_many_accepts() {
        let mut votes: Vec<Vote> = (0..10)
            .map(|i| {
                vote(
                    &format!("a{i}"),
                    &format!("voter{i}"),
                    VoteKind::Accept,
                    TrustTier::Administrator,
                    i,
                )
            })
            .collect();
        votes.push(vote("r", "critic", VoteKind::Reject, TrustTier::Beginner, 50));
        assert_eq!(version_status(&votes, TrustTier::Beginner), VersionStatus::Rejected);
    }

    #[test]
    fn lower_tier_rejection_cannot_veto_protected_topic() {
        let votes = vec![vote("r", "newbie", VoteKind::Reject, TrustTier::Beginner, 1)];
        assert_eq!(version_status(&votes, TrustTier::Editor), VersionStatus::Pending);
        assert_eq!(version_status(&votes, TrustTier::Beginner), VersionStatus::Rejected);

        let votes = vec![vote("r", "admin", VoteKind::Reject, TrustTier::Administrator, 1)];
        assert_eq!(version_status(&votes, TrustTier::Editor), VersionStatus::Rejected);
    }

    #[test]
    fn newest_eligible_version_wins() {
        let versions = vec![
            version("A", 1, vec![]),
            version("B", 2, vec![]),
            version(
                "C",
                3,
                vec![vote("r", "bob", VoteKind::Reject, TrustTier::Editor, 4)],
            ),
        ];
        assert_eq!(
            resolve_current_version(&versions, TrustTier::Beginner),
            Some("B".to_string())
        );
    }

    #[test]
    fn all_rejected_resolves_to_none() {
        let reject = |u: &str| vec![vote(u, "bob", VoteKind::Reject, TrustTier::Editor, 9)];
        let versions = vec![version("A", 1, reject("r1")), version("B", 2, reject("r2"))];
        assert_eq!(resolve_current_version(&versions, TrustTier::Beginner), None);
        assert_eq!(resolve_current_version(&[], TrustTier::Beginner), None);
    }

    #[test]
    fn resolution_is_deterministic() {
        let versions = vec![
            version(
                "A",
                1,
                vec![vote("x", "bob", VoteKind::Accept, TrustTier::Editor, 2)],
            ),
            version(
                "B",
                2,
                vec![
                    vote("y", "bob", VoteKind::Reject, TrustTier::Editor, 3),
                    vote("z", "carol", VoteKind::Accept, TrustTier::Beginner, 4),
                ],
            ),
        ];
        let first = resolve_current_version(&versions, TrustTier::Beginner);
        for _ in 0..20 {
            assert_eq!(resolve_current_version(&versions, TrustTier::Beginner), first);
        }
        assert_eq!(first, Some("A".to_string()));
    }

    #[test]
    fn sort_orders_by_creation_then_uri() {
        let mut versions = vec![version("b", 5, vec![]), version("c", 1, vec![]), version("a", 5, vec![])];
        sort_versions(&mut versions);
        let uris: Vec<&str> = versions.iter().map(|v| v.uri.as_str()).collect();
        assert_eq!(uris, vec!["c", "a", "b"]);
    }
}
