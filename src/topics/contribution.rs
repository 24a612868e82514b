//! Runs contribution accounting for one topic and stores the results.

use super::blobs::BlobFetcher;
use super::consensus::load_topic;
use crate::store::MirrorStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use topic_consensus::{
    account_contributions, AccountInput, ConsensusConfig, ContributionConfig, ContributionStats,
};
use tracing::info;

pub struct ContributionAccountant {
    store: Arc<dyn MirrorStore>,
    blobs: Arc<dyn BlobFetcher>,
    consensus: ConsensusConfig,
    config: ContributionConfig,
}

impl ContributionAccountant {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        blobs: Arc<dyn BlobFetcher>,
        consensus: ConsensusConfig,
        config: ContributionConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            consensus,
            config,
        }
    }

    /// Recompute diff stats and contribution shares for every version of
    /// `topic_id`.
    ///
    /// Nothing is written unless every version's text could be resolved,
    /// so a missing blob leaves the stored values as they were.
    pub async fn update_topic(&self, topic_id: &str) -> Result<Vec<ContributionStats>> {
        let state = load_topic(self.store.as_ref(), topic_id, &self.consensus)
            .with_context(|| format!("Failed to load topic {topic_id}"))?;
        let statuses = state.statuses();

        let mut inputs = Vec::with_capacity(state.versions.len());
        for (version, status) in state.versions.iter().zip(statuses) {
            let text = match (&version.text, &version.text_blob) {
                (Some(text), _) => text.clone(),
                (None, Some(cid)) => self
                    .blobs
                    .fetch_blob_text(cid, &version.author)
                    .await
                    .with_context(|| format!("Failed to fetch text of {}", version.uri))?
                    .with_context(|| format!("Blob {cid} of {} is missing", version.uri))?,
                (None, None) => String::new(),
            };
            inputs.push(AccountInput {
                uri: version.uri.clone(),
                status,
                text,
                claims_authorship: version.claims_authorship,
            });
        }

        let stats = account_contributions(&inputs, &self.config)?;

        let mut tx = self.store.begin()?;
        tx.write_contributions(&stats)?;
        tx.commit()?;

        info!(
            topic_id,
            versions = stats.len(),
            accumulated = stats.last().map(|s| s.accumulated_chars).unwrap_or(0),
            "Updated topic contributions"
        );
        Ok(stats)
    }
}
