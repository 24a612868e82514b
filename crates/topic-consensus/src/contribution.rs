//! Contribution accounting over a topic's version history.
//!
//! Walks versions oldest to newest, diffing each against the text of the
//! last eligible version (the baseline). Rejected versions get their own
//! diff stats but never move the baseline, so the version after them is
//! measured against the same text they were. Any status change anywhere in
//! the history shifts every later baseline, so callers always recompute a
//! topic in full.

use crate::blockdiff::diff_blocks;
use crate::config::ContributionConfig;
use crate::types::VersionStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One version as input to the accountant, already ordered and resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInput {
    pub uri: String,
    pub status: VersionStatus,
    pub text: String,
    pub claims_authorship: bool,
}

/// Computed accounting fields for one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionStats {
    pub uri: String,
    pub chars_added: u64,
    pub chars_deleted: u64,
    /// Running total of characters added by eligible versions up to and
    /// including this one.
    pub accumulated_chars: u64,
    pub contribution_all: f64,
    pub contribution_monetized: f64,
    /// The eligible version this one was diffed against.
    pub prev_accepted: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AccountingError {
    #[error("claimed share must be within [0, 1], got {0}")]
    InvalidShare(f64),
    #[error("version {0} appears more than once in the history")]
    DuplicateVersion(String),
}

/// Compute diff stats and contribution fractions for a full history.
///
/// Fractions over eligible versions sum to 1 for both `contribution_all`
/// and `contribution_monetized`; rejected versions get 0 for both.
pub fn account_contributions(
    versions: &[AccountInput],
    config: &ContributionConfig,
) -> Result<Vec<ContributionStats>, AccountingError> {
    let share = config.claimed_share;
    if !(0.0..=1.0).contains(&share) {
        return Err(AccountingError::InvalidShare(share));
    }
    let mut seen = HashSet::new();
    for v in versions {
        if !seen.insert(v.uri.as_str()) {
            return Err(AccountingError::DuplicateVersion(v.uri.clone()));
        }
    }

    // First pass: diffs against the moving baseline.
    let mut baseline_text = "";
    let mut baseline_uri: Option<&str> = None;
    let mut cumulative: u64 = 0;
    let mut monetized_total: u64 = 0;
    let mut stats = Vec::with_capacity(versions.len());

    for v in versions {
        let diff = diff_blocks(baseline_text, &v.text);
        let prev_accepted = baseline_uri.map(String::from);
        if v.status.is_eligible() {
            baseline_text = &v.text;
            baseline_uri = Some(&v.uri);
            cumulative += diff.chars_added;
            if v.claims_authorship {
                monetized_total += diff.chars_added;
            }
        }
        stats.push(ContributionStats {
            uri: v.uri.clone(),
            chars_added: diff.chars_added,
            chars_deleted: diff.chars_deleted,
            accumulated_chars: cumulative,
            contribution_all: 0.0,
            contribution_monetized: 0.0,
            prev_accepted,
        });
    }

    // Second pass: fractions over eligible versions.
    let eligible = versions.iter().filter(|v| v.status.is_eligible()).count();
    if eligible == 0 {
        return Ok(stats);
    }
    let even = 1.0 / eligible as f64;
    let claims_pool = versions
        .iter()
        .any(|v| v.status.is_eligible() && v.claims_authorship)
        && monetized_total > 0;

    for (v, s) in versions.iter().zip(stats.iter_mut()) {
        if !v.status.is_eligible() {
            continue;
        }
        s.contribution_all = if cumulative > 0 {
            s.chars_added as f64 / cumulative as f64
        } else {
            even
        };
        s.contribution_monetized = if claims_pool {
            let claimed = if v.claims_authorship {
                share * s.chars_added as f64 / monetized_total as f64
            } else {
                0.0
            };
            claimed + (1.0 - share) * even
        } else {
            even
        };
    }

    log::debug!(
        "accounted {} versions ({} eligible), {} chars accumulated, {} monetized",
        versions.len(),
        eligible,
        cumulative,
        monetized_total
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn input(uri: &str, status: VersionStatus, text: &str, claims: bool) -> AccountInput {
        AccountInput {
            uri: uri.to_string(),
            status,
            text: text.to_string(),
            claims_authorship: claims,
        }
    }

    fn sums(stats: &[ContributionStats]) -> (f64, f64) {
        (
            stats.iter().map(|s| s.contribution_all).sum(),
            stats.iter().map(|s| s.contribution_monetized).sum(),
        )
    }

    #[test]
    fn rejected_version_does_not_move_baseline() {
        let a = "x".repeat(100);
        let b = format!("{a}\n\n{}", "y".repeat(20));
        let c = format!("{a}\n\n{}", "z".repeat(30));
        let versions = vec![
            input("A", VersionStatus::Accepted, &a, true),
            input("B", VersionStatus::Rejected, &b, false),
            input("C", VersionStatus::Accepted, &c, false),
        ];
        let stats = account_contributions(&versions, &ContributionConfig::default()).unwrap();

        assert_eq!(stats[0].chars_added, 100);
        assert_eq!(stats[1].chars_added, 20);
        assert_eq!(stats[1].prev_accepted.as_deref(), Some("A"));
        assert_eq!(stats[1].accumulated_chars, 100);
        // C is measured against A, not B.
        assert_eq!(stats[2].chars_added, 30);
        assert_eq!(stats[2].chars_deleted, 0);
        assert_eq!(stats[2].prev_accepted.as_deref(), Some("A"));
        assert_eq!(stats[2].accumulated_chars, 130);

        assert!((stats[0].contribution_all - 100.0 / 130.0).abs() < EPS);
        assert!((stats[2].contribution_all - 30.0 / 130.0).abs() < EPS);
        assert_eq!(stats[1].contribution_all, 0.0);

        assert!((stats[0].contribution_monetized - 0.95).abs() < EPS);
        assert!((stats[2].contribution_monetized - 0.05).abs() < EPS);
        assert_eq!(stats[1].contribution_monetized, 0.0);
    }

    #[test]
    fn without_claims_monetized_is_even() {
        let versions = vec![
            input("A", VersionStatus::Accepted, "aaaa", false),
            input("B", VersionStatus::Accepted, "aaaa\n\nbb", false),
            input("C", VersionStatus::Pending, "aaaa\n\nbb\n\nc", false),
        ];
        let stats = account_contributions(&versions, &ContributionConfig::default()).unwrap();
        for s in &stats {
            assert!((s.contribution_monetized - 1.0 / 3.0).abs() < EPS);
        }
        let (all, monetized) = sums(&stats);
        assert!((all - 1.0).abs() < EPS);
        assert!((monetized - 1.0).abs() < EPS);
    }

    #[test]
    fn fractions_sum_to_one_with_claims() {
        let versions = vec![
            input("A", VersionStatus::Accepted, "alpha", true),
            input("B", VersionStatus::Accepted, "alpha\n\nbeta beta", false),
            input("C", VersionStatus::Rejected, "spam", true),
            input("D", VersionStatus::Accepted, "alpha\n\nbeta beta\n\ngamma", true),
        ];
        let stats = account_contributions(&versions, &ContributionConfig::default()).unwrap();
        let (all, monetized) = sums(&stats);
        assert!((all - 1.0).abs() < EPS);
        assert!((monetized - 1.0).abs() < EPS);
    }

    #[test]
    fn zero_growth_history_splits_evenly() {
        let versions = vec![
            input("A", VersionStatus::Accepted, "", true),
            input("B", VersionStatus::Accepted, "", false),
        ];
        let stats = account_contributions(&versions, &ContributionConfig::default()).unwrap();
        for s in &stats {
            assert!((s.contribution_all - 0.5).abs() < EPS);
            assert!((s.contribution_monetized - 0.5).abs() < EPS);
        }
    }

    #[test]
    fn all_rejected_yields_zero_fractions() {
        let versions = vec![input("A", VersionStatus::Rejected, "text", true)];
        let stats = account_contributions(&versions, &ContributionConfig::default()).unwrap();
        assert_eq!(stats[0].chars_added, 4);
        assert_eq!(stats[0].accumulated_chars, 0);
        assert_eq!(stats[0].contribution_all, 0.0);
        assert_eq!(stats[0].prev_accepted, None);
    }

    #[test]
    fn deletions_are_tracked() {
        let versions = vec![
            input("A", VersionStatus::Accepted, "one\n\ntwo", false),
            input("B", VersionStatus::Accepted, "one", false),
        ];
        let stats = account_contributions(&versions, &ContributionConfig::default()).unwrap();
        assert_eq!(stats[1].chars_added, 0);
        assert_eq!(stats[1].chars_deleted, 3);
        assert_eq!(stats[1].accumulated_chars, 6);
    }

    #[test]
    fn rejects_bad_share_and_duplicates() {
        let config = ContributionConfig { claimed_share: 1.5 };
        assert_eq!(
            account_contributions(&[], &config),
            Err(AccountingError::InvalidShare(1.5))
        );

        let versions = vec![
            input("A", VersionStatus::Accepted, "a", false),
            input("A", VersionStatus::Accepted, "b", false),
        ];
        assert_eq!(
            account_contributions(&versions, &ContributionConfig::default()),
            Err(AccountingError::DuplicateVersion("A".into()))
        );
    }
}
