//! Record-level building blocks for topicsync.
//!
//! This crate knows how records in a subject's repository are addressed
//! (`at://<subject>/<collection>/<rkey>`), which collections the mirror
//! understands, and how a raw JSON payload is validated into a typed record.
//! It has no storage or network dependencies.

pub mod collection;
pub mod event;
pub mod records;
pub mod uri;

// Re-export commonly used types
pub use collection::{Collection, ReactionKind};
pub use event::{compute_cid, CommitEvent, CommitOp, SnapshotEntry};
pub use records::{
    validate_record, PostRecord, ReactionRecord, StrongRef, TopicProp, TopicVersionRecord,
    TypedRecord, ValidationError,
};
pub use uri::{RecordUri, UriError};
