//! Topic consensus and contribution accounting against the mirror.

pub mod blobs;
pub mod consensus;
pub mod contribution;

pub use blobs::{BlobFetcher, CachedBlobFetcher, DirBlobFetcher};
pub use consensus::{load_topic, recompute_current_version, TopicState};
pub use contribution::ContributionAccountant;
