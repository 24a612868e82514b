use super::{retire_record, BatchEffects, DeleteProcessor, RecordProcessor, ValidRecord};
use crate::store::{MirrorTx, NewRecord, PostRow};
use anyhow::Result;
use repo_records::{Collection, RecordUri, TypedRecord};
use tracing::debug;

pub struct PostProcessor;

impl RecordProcessor for PostProcessor {
    fn collection(&self) -> Collection {
        Collection::Post
    }

    fn apply_batch(
        &self,
        tx: &mut dyn MirrorTx,
        records: &[ValidRecord],
        _effects: &mut BatchEffects,
    ) -> Result<()> {
        for valid in records {
            let TypedRecord::Post(post) = &valid.record else {
                continue;
            };
            let uri = &valid.entry.uri;
            for referenced in post.references() {
                if referenced != uri && tx.ensure_placeholder(referenced)? {
                    debug!(%referenced, "Created placeholder for reply target");
                }
            }
            tx.upsert_record(&NewRecord {
                uri,
                cid: &valid.entry.cid,
                collection: Collection::Post,
                payload: &valid.entry.payload,
                created_at: post.created_at,
            })?;
            tx.upsert_post(&PostRow {
                uri: uri.to_string(),
                text: post.text.clone(),
                reply_parent: post.reply_parent.as_ref().map(|r| r.uri.to_string()),
                reply_root: post.reply_root.as_ref().map(|r| r.uri.to_string()),
            })?;
        }
        Ok(())
    }
}

/// Removes a post's content. Reactions and replies others made on it
/// stay, so a post that is still referenced is kept as a placeholder with
/// its counters and picks them up again if it is re-created.
pub struct PostDeleteProcessor;

impl DeleteProcessor for PostDeleteProcessor {
    fn apply_batch(
        &self,
        tx: &mut dyn MirrorTx,
        uris: &[RecordUri],
        _effects: &mut BatchEffects,
    ) -> Result<()> {
        for uri in uris {
            let uri = uri.to_string();
            tx.delete_post(&uri)?;
            retire_record(tx, &uri)?;
        }
        Ok(())
    }
}
