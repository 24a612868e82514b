//! Snapshot-vs-mirror diff.

use repo_records::{Collection, RecordUri, SnapshotEntry};
use std::collections::{BTreeMap, HashMap, HashSet};

/// What a sync has to do for one subject.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Remote entries that are new or whose cid changed, by collection.
    pub to_upsert: BTreeMap<Collection, Vec<SnapshotEntry>>,
    /// Local uris no longer present remotely, by collection.
    pub to_delete: BTreeMap<Collection, Vec<RecordUri>>,
    /// Remote entries with a matching local cid.
    pub unchanged: usize,
    /// Remote entries in collections not requested or not understood.
    pub ignored: usize,
}

impl SyncPlan {
    pub fn upsert_count(&self) -> usize {
        self.to_upsert.values().map(Vec::len).sum()
    }

    pub fn delete_count(&self) -> usize {
        self.to_delete.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.to_upsert.is_empty() && self.to_delete.is_empty()
    }
}

/// Diff a remote snapshot against the local `uri -> cid` index.
///
/// `local` must already be restricted to `collections`. Runs in
/// `O(|local| + |remote|)`.
pub fn diff_snapshot(
    local: &HashMap<String, String>,
    remote: Vec<SnapshotEntry>,
    collections: &[Collection],
) -> SyncPlan {
    let wanted: HashSet<Collection> = collections.iter().copied().collect();
    let mut plan = SyncPlan::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(remote.len());

    for entry in remote {
        let collection = match entry.known_collection() {
            Some(c) if wanted.contains(&c) => c,
            _ => {
                plan.ignored += 1;
                continue;
            }
        };
        let uri = entry.uri.to_string();
        // A repository lists each record once; keep the first if it doesn't.
        if !seen.insert(uri.clone()) {
            plan.ignored += 1;
            continue;
        }
        match local.get(&uri) {
            Some(cid) if *cid == entry.cid => plan.unchanged += 1,
            _ => plan.to_upsert.entry(collection).or_default().push(entry),
        }
    }

    for uri in local.keys() {
        if seen.contains(uri) {
            continue;
        }
        let Ok(parsed) = uri.parse::<RecordUri>() else {
            continue;
        };
        if let Some(collection) = Collection::from_nsid(parsed.collection()) {
            plan.to_delete.entry(collection).or_default().push(parsed);
        }
    }
    for uris in plan.to_delete.values_mut() {
        uris.sort();
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(uri: &str, cid: &str) -> SnapshotEntry {
        let uri: RecordUri = uri.parse().unwrap();
        SnapshotEntry {
            collection: uri.collection().to_string(),
            uri,
            cid: cid.to_string(),
            payload: json!({}),
        }
    }

    const P1: &str = "at://did:plc:alice/org.commonwiki.feed.post/p1";
    const P2: &str = "at://did:plc:alice/org.commonwiki.feed.post/p2";
    const L1: &str = "at://did:plc:alice/org.commonwiki.feed.like/l1";

    #[test]
    fn classifies_new_changed_unchanged_and_gone() {
        let local = HashMap::from([
            (P1.to_string(), "c1".to_string()),
            (P2.to_string(), "c2".to_string()),
            (L1.to_string(), "cl".to_string()),
        ]);
        let remote = vec![
            entry(P1, "c1"),
            entry(P2, "c2-new"),
            entry("at://did:plc:alice/org.commonwiki.feed.post/p3", "c3"),
        ];
        let plan = diff_snapshot(&local, remote, &Collection::ALL);

        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.upsert_count(), 2);
        assert_eq!(plan.delete_count(), 1);
        assert_eq!(plan.to_delete[&Collection::Like][0].to_string(), L1);
    }

    #[test]
    fn identical_snapshot_is_empty_plan() {
        let local = HashMap::from([(P1.to_string(), "c1".to_string())]);
        let plan = diff_snapshot(&local, vec![entry(P1, "c1")], &Collection::ALL);
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged, 1);
    }

    #[test]
    fn unknown_and_unrequested_collections_are_ignored() {
        let mut foreign = entry("at://did:plc:alice/app.other.thing/x", "cx");
        foreign.collection = "app.other.thing".into();
        let remote = vec![foreign, entry(L1, "cl"), entry(P1, "c1")];
        let plan = diff_snapshot(&HashMap::new(), remote, &[Collection::Post]);
        assert_eq!(plan.ignored, 2);
        assert_eq!(plan.upsert_count(), 1);
        assert!(plan.to_upsert.contains_key(&Collection::Post));
    }

    #[test]
    fn duplicate_remote_entries_count_once() {
        let plan = diff_snapshot(&HashMap::new(), vec![entry(P1, "a"), entry(P1, "b")], &Collection::ALL);
        assert_eq!(plan.upsert_count(), 1);
        assert_eq!(plan.to_upsert[&Collection::Post][0].cid, "a");
    }
}
