//! Snapshot entries and commit events as they arrive from a repository.

use crate::collection::Collection;
use crate::uri::RecordUri;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One record in a repository snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub uri: RecordUri,
    /// Collection NSID as reported by the repository. May name a collection
    /// this mirror does not know.
    pub collection: String,
    pub cid: String,
    pub payload: serde_json::Value,
}

impl SnapshotEntry {
    pub fn known_collection(&self) -> Option<Collection> {
        Collection::from_nsid(&self.collection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOp {
    Create,
    Update,
    Delete,
}

/// A near-real-time change to one record of a subject's repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitEvent {
    pub op: CommitOp,
    pub uri: RecordUri,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl CommitEvent {
    pub fn subject(&self) -> &str {
        self.uri.subject()
    }

    pub fn collection(&self) -> Option<Collection> {
        Collection::from_nsid(self.uri.collection())
    }

    /// Turn a create/update into the snapshot entry it stands for.
    /// Deletes and events without a payload yield `None`.
    pub fn as_snapshot_entry(&self) -> Option<SnapshotEntry> {
        if self.op == CommitOp::Delete {
            return None;
        }
        let payload = self.payload.clone()?;
        let cid = self.cid.clone().unwrap_or_else(|| compute_cid(&payload));
        Some(SnapshotEntry {
            uri: self.uri.clone(),
            collection: self.uri.collection().to_string(),
            cid,
            payload,
        })
    }
}

/// Content hash for a payload that arrived without one: hex SHA-256 of the
/// compact JSON encoding.
pub fn compute_cid(payload: &serde_json::Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}
