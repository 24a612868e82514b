//! Likes, reposts and votes.
//!
//! Counters on the subject record move only when a ledger row is
//! inserted or removed, so repeated or duplicate reactions by the same
//! author never count twice.

use super::{
    recompute_topics, release_ledger, retire_record, BatchEffects, DeleteProcessor,
    RecordProcessor, ValidRecord,
};
use crate::jobs::Job;
use crate::store::{MirrorTx, NewRecord, ReactionRow};
use anyhow::{Context, Result};
use repo_records::{Collection, ReactionKind, RecordUri, TypedRecord};
use std::collections::BTreeSet;
use topic_consensus::ConsensusConfig;
use tracing::debug;

fn kind_of(collection: Collection) -> Result<ReactionKind> {
    collection
        .reaction_kind()
        .with_context(|| format!("{collection} is not a reaction collection"))
}

/// Topic owning the version `subject_uri`, if it is mirrored.
fn topic_of(tx: &dyn MirrorTx, subject_uri: &str) -> Result<Option<(String, String)>> {
    Ok(tx
        .topic_version(subject_uri)?
        .map(|v| (v.topic_id, v.author)))
}

pub struct ReactionProcessor {
    collection: Collection,
    consensus: ConsensusConfig,
}

impl ReactionProcessor {
    pub fn new(collection: Collection, consensus: ConsensusConfig) -> Self {
        Self {
            collection,
            consensus,
        }
    }
}

impl RecordProcessor for ReactionProcessor {
    fn collection(&self) -> Collection {
        self.collection
    }

    fn apply_batch(
        &self,
        tx: &mut dyn MirrorTx,
        records: &[ValidRecord],
        effects: &mut BatchEffects,
    ) -> Result<()> {
        let kind = kind_of(self.collection)?;
        let mut topics = BTreeSet::new();

        for valid in records {
            let TypedRecord::Reaction(reaction) = &valid.record else {
                continue;
            };
            let uri = &valid.entry.uri;
            let author = uri.subject();
            let subject_uri = reaction.subject.uri.to_string();

            // An update that points the reaction elsewhere gives up the old subject.
            if let Some(previous) = tx.reaction(&uri.to_string())? {
                if previous.subject_uri != subject_uri && previous.kind == kind {
                    release_ledger(tx, &previous.author, &previous.subject_uri, kind)?;
                    for duplicate in
                        tx.reactions_matching(&previous.subject_uri, &previous.author, kind)?
                    {
                        if duplicate.uri != previous.uri {
                            tx.delete_reaction(&duplicate.uri)?;
                            tx.delete_record(&duplicate.uri)?;
                        }
                    }
                    if kind.is_vote() {
                        if let Some((topic_id, _)) = topic_of(tx, &previous.subject_uri)? {
                            topics.insert(topic_id);
                        }
                    }
                }
            }

            tx.ensure_placeholder(&reaction.subject.uri)?;
            tx.upsert_record(&NewRecord {
                uri,
                cid: &valid.entry.cid,
                collection: self.collection,
                payload: &valid.entry.payload,
                created_at: reaction.created_at,
            })?;
            tx.upsert_reaction(&ReactionRow {
                uri: uri.to_string(),
                subject_uri: subject_uri.clone(),
                kind,
                author: author.to_string(),
                created_at: reaction.created_at,
            })?;

            if tx.insert_ledger(author, &subject_uri, kind)? {
                tx.adjust_counter(&subject_uri, kind, 1)?;
            } else {
                debug!(%uri, subject = subject_uri.as_str(), "Reaction already counted");
            }

            if kind.is_vote() {
                if let Some((topic_id, version_author)) = topic_of(tx, &subject_uri)? {
                    topics.insert(topic_id);
                    if version_author != author {
                        effects.push_job(Job::NotifyVote {
                            vote_uri: uri.to_string(),
                            version_uri: subject_uri.clone(),
                            recipient: version_author,
                        });
                    }
                }
            }
        }

        recompute_topics(tx, &topics, &self.consensus);
        effects.contributions_for(&topics);
        Ok(())
    }
}

/// Removes reactions, their ledger rows and their counter contribution.
///
/// Once the ledger row for (subject, author, kind) is gone, any other
/// reaction by the same author of the same kind on the same subject is
/// purged too, record included, so the next sync re-adds it cleanly if
/// it still exists upstream.
pub struct ReactionDeleteProcessor {
    collection: Collection,
    consensus: ConsensusConfig,
}

impl ReactionDeleteProcessor {
    pub fn new(collection: Collection, consensus: ConsensusConfig) -> Self {
        Self {
            collection,
            consensus,
        }
    }
}

impl DeleteProcessor for ReactionDeleteProcessor {
    fn apply_batch(
        &self,
        tx: &mut dyn MirrorTx,
        uris: &[RecordUri],
        effects: &mut BatchEffects,
    ) -> Result<()> {
        let kind = kind_of(self.collection)?;

        let mut targets: BTreeSet<(String, String)> = BTreeSet::new();
        for uri in uris {
            let uri = uri.to_string();
            if let Some(reaction) = tx.reaction(&uri)? {
                targets.insert((reaction.subject_uri, reaction.author));
            }
            tx.delete_reaction(&uri)?;
            retire_record(tx, &uri)?;
        }

        let mut topics = BTreeSet::new();
        for (subject_uri, author) in &targets {
            release_ledger(tx, author, subject_uri, kind)?;
            for duplicate in tx.reactions_matching(subject_uri, author, kind)? {
                debug!(uri = duplicate.uri.as_str(), "Purging duplicate reaction");
                tx.delete_reaction(&duplicate.uri)?;
                tx.delete_record(&duplicate.uri)?;
            }
            if kind.is_vote() {
                if let Some((topic_id, _)) = topic_of(tx, subject_uri)? {
                    topics.insert(topic_id);
                }
            }
        }

        recompute_topics(tx, &topics, &self.consensus);
        effects.contributions_for(&topics);
        Ok(())
    }
}
