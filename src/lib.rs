//! topicsync: mirror per-subject record repositories into a local store and
//! resolve the current version of collaboratively edited topics.
//!
//! A sync run (see [`sync::SyncCoordinator`]) fetches a subject's snapshot,
//! diffs it against the mirror and applies the differences through one
//! processor per collection ([`processors`]). Topic version and vote changes
//! re-run trust-tiered consensus ([`topics`]) and queue contribution
//! accounting as [`jobs::Job`]s.

pub mod config;
pub mod jobs;
pub mod processors;
pub mod store;
pub mod sync;
pub mod topics;

pub use config::Config;
