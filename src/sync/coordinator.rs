//! Per-subject sync runs.
//!
//! A run claims the subject, fetches its snapshot, diffs it against the
//! mirror and hands the differences to the collection processors in
//! batches. Commit events that arrive for the subject meanwhile are
//! buffered and replayed in waves before the run finishes.

use super::diff::diff_snapshot;
use super::fetcher::{FetchError, SnapshotFetcher};
use super::pending::PendingBuffer;
use crate::config::SyncConfig;
use crate::jobs::JobQueue;
use crate::processors::{BatchEffects, ProcessorRegistry};
use crate::store::{ClaimResult, MirrorStore, SyncStatus};
use anyhow::Result;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use repo_records::{Collection, CommitEvent, CommitOp, RecordUri, SnapshotEntry};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Counters for one finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub upserted: usize,
    pub deleted: usize,
    pub skipped_unchanged: usize,
    pub ignored: usize,
    pub invalid: usize,
    pub pending_events: usize,
    pub failed_batches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The trigger did nothing: another run holds the subject, or its
    /// status is terminal.
    Skipped { status: SyncStatus },
    Finished(SyncReport),
}

impl SyncOutcome {
    pub fn status(&self) -> SyncStatus {
        match self {
            SyncOutcome::Skipped { status } => *status,
            SyncOutcome::Finished(report) => report.status,
        }
    }

    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Finished(report) => Some(report),
            SyncOutcome::Skipped { .. } => None,
        }
    }
}

/// Totals from applying a set of changes.
#[derive(Debug, Default)]
struct Applied {
    upserted: usize,
    deleted: usize,
    invalid: usize,
    failed_batches: usize,
}

pub struct SyncCoordinator {
    store: Arc<dyn MirrorStore>,
    processors: ProcessorRegistry,
    fetcher: Arc<dyn SnapshotFetcher>,
    pending: Arc<dyn PendingBuffer>,
    jobs: Arc<dyn JobQueue>,
    config: SyncConfig,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        processors: ProcessorRegistry,
        fetcher: Arc<dyn SnapshotFetcher>,
        pending: Arc<dyn PendingBuffer>,
        jobs: Arc<dyn JobQueue>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            processors,
            fetcher,
            pending,
            jobs,
            config,
        }
    }

    /// Sync one subject over `collections` (all when `None`).
    ///
    /// Errors are store failures; the subject is marked failed before they
    /// are returned. Fetch failures and processor failures are reported in
    /// the outcome instead.
    pub async fn sync_subject(
        &self,
        subject: &str,
        collections: Option<&[Collection]>,
    ) -> Result<SyncOutcome> {
        let run_id = Uuid::new_v4().to_string();
        let stale_after = self.config.stale_lock_secs.map(Duration::from_secs);

        match self.store.claim_sync(subject, &run_id, Utc::now(), stale_after)? {
            ClaimResult::Claimed => {}
            ClaimResult::InProcess => {
                debug!(subject, "Sync already in process, skipping");
                return Ok(SyncOutcome::Skipped {
                    status: SyncStatus::InProcess,
                });
            }
            ClaimResult::Terminal(status) => {
                info!(subject, %status, "Subject needs a reset before it can sync");
                return Ok(SyncOutcome::Skipped { status });
            }
        }

        let collections = collections.unwrap_or(&Collection::ALL);
        match self.run(subject, &run_id, collections).await {
            Ok(report) => Ok(SyncOutcome::Finished(report)),
            Err(e) => {
                error!(subject, run_id = run_id.as_str(), "Sync run failed: {e:#}");
                if let Err(status_err) =
                    self.store.finish_sync(subject, &run_id, SyncStatus::Failed)
                {
                    error!(subject, "Failed to record sync failure: {status_err:#}");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        subject: &str,
        run_id: &str,
        collections: &[Collection],
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        let snapshot = match self.fetcher.fetch_snapshot(subject, collections).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let status = match &e {
                    FetchError::TooLarge { .. } => SyncStatus::FailedTooLarge,
                    FetchError::Transport { .. } => SyncStatus::Failed,
                };
                warn!(subject, %status, "{e:#}");
                self.finish(subject, run_id, status)?;
                report.status = status;
                return Ok(report);
            }
        };

        let local = self.store.local_index(subject, collections)?;
        let plan = diff_snapshot(&local, snapshot, collections);
        report.skipped_unchanged = plan.unchanged;
        report.ignored = plan.ignored;
        info!(
            subject,
            upserts = plan.upsert_count(),
            deletes = plan.delete_count(),
            unchanged = plan.unchanged,
            "Snapshot diffed"
        );

        let applied = self.apply(plan.to_upsert, plan.to_delete).await;
        report.absorb(applied);

        // Events buffered while the run held the subject.
        loop {
            let events = self.pending.drain(subject).await?;
            if events.is_empty() {
                break;
            }
            report.pending_events += events.len();
            debug!(subject, events = events.len(), "Applying pending wave");
            let applied = self.apply_events(events).await;
            report.absorb(applied);
        }

        self.finish(subject, run_id, SyncStatus::Sync)?;
        report.status = SyncStatus::Sync;

        // Anything pushed between the last drain and the status write.
        let late = self.pending.drain(subject).await?;
        if !late.is_empty() {
            report.pending_events += late.len();
            let applied = self.apply_events(late).await;
            report.absorb(applied);
        }

        info!(
            subject,
            upserted = report.upserted,
            deleted = report.deleted,
            invalid = report.invalid,
            pending = report.pending_events,
            failed_batches = report.failed_batches,
            "Sync finished"
        );
        Ok(report)
    }

    fn finish(&self, subject: &str, run_id: &str, status: SyncStatus) -> Result<()> {
        if !self.store.finish_sync(subject, run_id, status)? {
            warn!(subject, run_id, %status, "Sync claim was taken over; status not written");
        }
        Ok(())
    }

    /// Sync several subjects, at most `max_concurrent_subjects` at a time.
    pub async fn sync_many(
        &self,
        subjects: &[String],
        collections: Option<&[Collection]>,
    ) -> Vec<(String, Result<SyncOutcome>)> {
        let limit = self.config.max_concurrent_subjects.max(1);
        stream::iter(subjects)
            .map(|subject| async move {
                let outcome = self.sync_subject(subject, collections).await;
                (subject.clone(), outcome)
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }

    /// Take one commit event from the live stream. It is buffered while a
    /// sync holds its subject and applied straight away otherwise.
    pub async fn ingest_commit(&self, event: CommitEvent) -> Result<()> {
        let subject = event.subject().to_string();
        let in_process = self
            .store
            .mirror_status(&subject)?
            .is_some_and(|s| s.status == SyncStatus::InProcess);

        if in_process {
            debug!(subject, uri = %event.uri, "Buffering commit during sync");
            self.pending.push(event).await
        } else {
            let applied = self.apply_events(vec![event]).await;
            if applied.failed_batches > 0 {
                anyhow::bail!("Failed to apply commit event for {subject}");
            }
            Ok(())
        }
    }

    /// Apply a wave of commit events. Only the last event per uri counts.
    async fn apply_events(&self, events: Vec<CommitEvent>) -> Applied {
        let mut last: HashMap<RecordUri, CommitEvent> = HashMap::with_capacity(events.len());
        let mut order = Vec::with_capacity(events.len());
        for event in events {
            if !last.contains_key(&event.uri) {
                order.push(event.uri.clone());
            }
            last.insert(event.uri.clone(), event);
        }

        let mut upserts: BTreeMap<Collection, Vec<SnapshotEntry>> = BTreeMap::new();
        let mut deletes: BTreeMap<Collection, Vec<RecordUri>> = BTreeMap::new();
        for uri in order {
            let Some(event) = last.remove(&uri) else {
                continue;
            };
            let Some(collection) = event.collection() else {
                debug!(uri = %event.uri, "Ignoring commit in unknown collection");
                continue;
            };
            match event.op {
                CommitOp::Delete => deletes.entry(collection).or_default().push(event.uri),
                CommitOp::Create | CommitOp::Update => match event.as_snapshot_entry() {
                    Some(entry) => upserts.entry(collection).or_default().push(entry),
                    None => warn!(uri = %event.uri, "Commit event without payload"),
                },
            }
        }

        self.apply(upserts, deletes).await
    }

    /// Run upserts then deletes, collection by collection in the fixed
    /// processing order, one transaction per batch.
    async fn apply(
        &self,
        mut upserts: BTreeMap<Collection, Vec<SnapshotEntry>>,
        mut deletes: BTreeMap<Collection, Vec<RecordUri>>,
    ) -> Applied {
        let batch_size = self.config.batch_size.max(1);
        let mut applied = Applied::default();

        for collection in Collection::ALL {
            let Some(entries) = upserts.remove(&collection) else {
                continue;
            };
            for batch in entries.chunks(batch_size) {
                match self
                    .processors
                    .process_upserts(self.store.as_ref(), collection, batch)
                {
                    Ok(effects) => {
                        applied.upserted += effects.applied;
                        applied.invalid += effects.invalid;
                        self.enqueue(effects).await;
                    }
                    Err(e) => {
                        error!(%collection, records = batch.len(), "Upsert batch failed: {e:#}");
                        applied.failed_batches += 1;
                    }
                }
            }
        }

        for collection in Collection::ALL {
            let Some(uris) = deletes.remove(&collection) else {
                continue;
            };
            for batch in uris.chunks(batch_size) {
                match self
                    .processors
                    .process_deletes(self.store.as_ref(), collection, batch)
                {
                    Ok(effects) => {
                        applied.deleted += effects.applied;
                        self.enqueue(effects).await;
                    }
                    Err(e) => {
                        error!(%collection, records = batch.len(), "Delete batch failed: {e:#}");
                        applied.failed_batches += 1;
                    }
                }
            }
        }

        applied
    }

    async fn enqueue(&self, effects: BatchEffects) {
        for job in effects.jobs {
            let name = job.name();
            if let Err(e) = self.jobs.enqueue(job).await {
                warn!(job = name, "Failed to enqueue job: {e:#}");
            }
        }
    }
}

impl SyncReport {
    fn absorb(&mut self, applied: Applied) {
        self.upserted += applied.upserted;
        self.deleted += applied.deleted;
        self.invalid += applied.invalid;
        self.failed_batches += applied.failed_batches;
    }
}
