use super::{
    recompute_topics, release_ledger, retire_record, BatchEffects, DeleteProcessor,
    RecordProcessor, ValidRecord,
};
use crate::jobs::Job;
use crate::store::{MirrorTx, NewRecord, TopicVersionRow};
use anyhow::Result;
use repo_records::{Collection, RecordUri, TypedRecord};
use std::collections::BTreeSet;
use topic_consensus::ConsensusConfig;
use tracing::debug;

pub struct TopicVersionProcessor {
    consensus: ConsensusConfig,
}

impl TopicVersionProcessor {
    pub fn new(consensus: ConsensusConfig) -> Self {
        Self { consensus }
    }
}

impl RecordProcessor for TopicVersionProcessor {
    fn collection(&self) -> Collection {
        Collection::TopicVersion
    }

    fn apply_batch(
        &self,
        tx: &mut dyn MirrorTx,
        records: &[ValidRecord],
        effects: &mut BatchEffects,
    ) -> Result<()> {
        let mut topics = BTreeSet::new();
        let mut authors = BTreeSet::new();

        for valid in records {
            let TypedRecord::TopicVersion(version) = &valid.record else {
                continue;
            };
            let uri = &valid.entry.uri;
            let author = uri.subject().to_string();

            // Moving a version to another topic leaves the old one to re-resolve.
            if let Some(previous) = tx.topic_version(&uri.to_string())? {
                if previous.topic_id != version.topic_id {
                    topics.insert(previous.topic_id);
                }
            }

            tx.touch_topic(
                &version.topic_id,
                version.created_at,
                self.consensus.default_protection,
            )?;
            tx.upsert_record(&NewRecord {
                uri,
                cid: &valid.entry.cid,
                collection: Collection::TopicVersion,
                payload: &valid.entry.payload,
                created_at: version.created_at,
            })?;
            tx.upsert_topic_version(&TopicVersionRow {
                uri: uri.to_string(),
                topic_id: version.topic_id.clone(),
                author: author.clone(),
                created_at: version.created_at,
                message: version.message.clone(),
                props: version.props.clone(),
                claims_authorship: version.claims_authorship,
                text: version.text.clone(),
                text_blob: version.text_blob.clone(),
                chars_added: 0,
                chars_deleted: 0,
                accumulated_chars: 0,
                contribution_all: 0.0,
                contribution_monetized: 0.0,
                prev_accepted: None,
            })?;

            let recipients: BTreeSet<String> = tx
                .topic_versions(&version.topic_id)?
                .into_iter()
                .map(|v| v.author)
                .filter(|a| *a != author)
                .collect();
            if !recipients.is_empty() {
                effects.push_job(Job::NotifyTopicEditors {
                    topic_id: version.topic_id.clone(),
                    version_uri: uri.to_string(),
                    recipients: recipients.into_iter().collect(),
                });
            }

            topics.insert(version.topic_id.clone());
            authors.insert(author);
        }

        recompute_topics(tx, &topics, &self.consensus);
        effects.contributions_for(&topics);
        if !authors.is_empty() {
            effects.push_job(Job::UpdateAuthorStatus {
                authors: authors.into_iter().collect(),
            });
        }
        Ok(())
    }
}

/// Removes versions together with the votes cast on them, then
/// re-resolves every affected topic whether or not the version was
/// current.
///
/// The votes' own records go too, so a voter's next sync re-adds any
/// vote that still exists upstream once the version is back.
pub struct TopicVersionDeleteProcessor {
    consensus: ConsensusConfig,
}

impl TopicVersionDeleteProcessor {
    pub fn new(consensus: ConsensusConfig) -> Self {
        Self { consensus }
    }
}

impl DeleteProcessor for TopicVersionDeleteProcessor {
    fn apply_batch(
        &self,
        tx: &mut dyn MirrorTx,
        uris: &[RecordUri],
        effects: &mut BatchEffects,
    ) -> Result<()> {
        let mut topics = BTreeSet::new();

        for uri in uris {
            let uri = uri.to_string();
            if let Some(version) = tx.topic_version(&uri)? {
                let votes: Vec<_> = tx
                    .votes_on_topic(&version.topic_id)?
                    .into_iter()
                    .filter(|r| r.subject_uri == uri)
                    .collect();
                for vote in &votes {
                    tx.delete_reaction(&vote.uri)?;
                    tx.delete_record(&vote.uri)?;
                    release_ledger(tx, &vote.author, &uri, vote.kind)?;
                }
                debug!(uri = uri.as_str(), votes = votes.len(), "Removing topic version");
                tx.delete_topic_version(&uri)?;
                topics.insert(version.topic_id);
            }
            retire_record(tx, &uri)?;
        }

        recompute_topics(tx, &topics, &self.consensus);
        effects.contributions_for(&topics);
        Ok(())
    }
}
