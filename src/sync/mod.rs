//! Repository sync: snapshot diffing, fetching, buffering of live commits
//! and the coordinator that drives a run.

pub mod coordinator;
pub mod diff;
pub mod fetcher;
pub mod pending;

pub use coordinator::{SyncCoordinator, SyncOutcome, SyncReport};
pub use diff::{diff_snapshot, SyncPlan};
pub use fetcher::{DirSnapshotFetcher, FetchError, SnapshotFetcher};
pub use pending::{MemoryPendingBuffer, PendingBuffer};
