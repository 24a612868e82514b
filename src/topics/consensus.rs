//! Loads a topic's versions and votes from the mirror and runs the
//! consensus engine over them.

use crate::store::{MirrorRead, MirrorTx, TopicVersionRow};
use anyhow::{Context, Result};
use repo_records::ReactionKind;
use std::collections::HashMap;
use topic_consensus::{
    resolve_current_version, sort_versions, version_status, ConsensusConfig, TrustTier,
    VersionCandidate, VersionStatus, Vote, VoteKind,
};
use tracing::{debug, info};

/// A topic as the consensus engine sees it, versions oldest first.
#[derive(Debug, Clone)]
pub struct TopicState {
    /// Whether the topic row exists. Versions can outlive it briefly
    /// while a delete batch is being applied.
    pub exists: bool,
    pub protection: TrustTier,
    pub current_version: Option<String>,
    pub versions: Vec<TopicVersionRow>,
    /// Same order as `versions`.
    pub candidates: Vec<VersionCandidate>,
}

impl TopicState {
    /// Status of every version under the topic's protection, in order.
    pub fn statuses(&self) -> Vec<VersionStatus> {
        self.candidates
            .iter()
            .map(|c| version_status(&c.votes, self.protection))
            .collect()
    }

    pub fn resolve(&self) -> Option<String> {
        resolve_current_version(&self.candidates, self.protection)
    }
}

/// Read everything the consensus engine needs for `topic_id`.
pub fn load_topic(
    reader: &(impl MirrorRead + ?Sized),
    topic_id: &str,
    config: &ConsensusConfig,
) -> Result<TopicState> {
    let topic = reader.topic(topic_id)?;
    let mut versions = reader.topic_versions(topic_id)?;
    versions.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.uri.cmp(&b.uri))
    });

    let mut tiers: HashMap<String, TrustTier> = HashMap::new();
    let mut votes_by_version: HashMap<String, Vec<Vote>> = HashMap::new();
    for reaction in reader.votes_on_topic(topic_id)? {
        let kind = match reaction.kind {
            ReactionKind::Accept => VoteKind::Accept,
            ReactionKind::Reject => VoteKind::Reject,
            ReactionKind::Like | ReactionKind::Repost => continue,
        };
        let voter_tier = match tiers.get(&reaction.author) {
            Some(tier) => *tier,
            None => {
                let tier = reader.author_tier(&reaction.author)?;
                tiers.insert(reaction.author.clone(), tier);
                tier
            }
        };
        votes_by_version
            .entry(reaction.subject_uri)
            .or_default()
            .push(Vote {
                uri: reaction.uri,
                voter: reaction.author,
                kind,
                voter_tier,
                created_at: reaction.created_at,
            });
    }

    let mut candidates: Vec<VersionCandidate> = versions
        .iter()
        .map(|v| VersionCandidate {
            uri: v.uri.clone(),
            created_at: v.created_at,
            votes: votes_by_version.remove(&v.uri).unwrap_or_default(),
        })
        .collect();
    sort_versions(&mut candidates);

    Ok(TopicState {
        exists: topic.is_some(),
        protection: topic
            .as_ref()
            .map(|t| t.protection)
            .unwrap_or(config.default_protection),
        current_version: topic.and_then(|t| t.current_version),
        versions,
        candidates,
    })
}

/// Recompute and store the current version of `topic_id` inside `tx`.
///
/// Returns the resolved version. The pointer is only written when it
/// changes.
pub fn recompute_current_version(
    tx: &mut dyn MirrorTx,
    topic_id: &str,
    config: &ConsensusConfig,
) -> Result<Option<String>> {
    let state = load_topic(&*tx, topic_id, config)
        .with_context(|| format!("Failed to load topic {topic_id} for consensus"))?;
    if !state.exists {
        debug!(topic_id, "Topic not mirrored, nothing to resolve");
        return Ok(None);
    }

    let current = state.resolve();
    if current != state.current_version {
        tx.set_current_version(topic_id, current.as_deref())?;
        info!(
            topic_id,
            from = state.current_version.as_deref().unwrap_or("-"),
            to = current.as_deref().unwrap_or("-"),
            "Current version changed"
        );
    }
    Ok(current)
}
