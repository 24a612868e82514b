//! Typed records and payload validation.
//!
//! A payload arrives as arbitrary JSON. Validation parses it into the typed
//! record for its collection and checks the constraints serde cannot
//! express (timestamps, URIs, lengths). Anything that fails here is dropped
//! from its batch before a transaction is opened.

use crate::collection::Collection;
use crate::uri::{RecordUri, UriError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum post text length in characters.
pub const MAX_POST_CHARS: usize = 3000;
/// Maximum topic id length in characters.
pub const MAX_TOPIC_ID_CHARS: usize = 500;
/// Maximum edit message length in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Errors from validating a record payload.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid createdAt '{0}'")]
    InvalidTimestamp(String),
    #[error("invalid reference: {0}")]
    InvalidReference(#[from] UriError),
    #[error("subject of a {collection} must be a {expected} record, got {actual}")]
    WrongSubjectCollection {
        collection: Collection,
        expected: Collection,
        actual: String,
    },
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("topic version carries both inline text and a text blob")]
    AmbiguousText,
}

/// Reference to a specific version of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: RecordUri,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub reply_parent: Option<StrongRef>,
    pub reply_root: Option<StrongRef>,
}

impl PostRecord {
    /// Records this post points at and that must exist locally.
    pub fn references(&self) -> impl Iterator<Item = &RecordUri> {
        self.reply_parent
            .iter()
            .chain(self.reply_root.iter())
            .map(|r| &r.uri)
    }
}

/// A like, repost, accept vote or reject vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionRecord {
    pub subject: StrongRef,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicProp {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicVersionRecord {
    pub topic_id: String,
    pub text: Option<String>,
    /// Content hash of the text when it is stored out of line.
    pub text_blob: Option<String>,
    pub message: String,
    pub props: Vec<TopicProp>,
    pub claims_authorship: bool,
    pub created_at: DateTime<Utc>,
}

/// A validated record of any known collection.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedRecord {
    Post(PostRecord),
    Reaction(ReactionRecord),
    TopicVersion(TopicVersionRecord),
}

impl TypedRecord {
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            TypedRecord::Post(r) => r.created_at,
            TypedRecord::Reaction(r) => r.created_at,
            TypedRecord::TopicVersion(r) => r.created_at,
        }
    }
}

// ── Wire shapes ──────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRef {
    uri: String,
    cid: String,
}

#[derive(Deserialize)]
struct WireReply {
    parent: WireRef,
    root: WireRef,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePost {
    text: String,
    created_at: String,
    #[serde(default)]
    reply: Option<WireReply>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReaction {
    subject: WireRef,
    created_at: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob {
    cid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTopicVersion {
    id: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    text_blob: Option<WireBlob>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    props: Vec<TopicProp>,
    #[serde(default)]
    claims_authorship: bool,
    created_at: String,
}

// ── Validation ───────────────────────────────────────────────────

/// Validate a raw payload as a record of `collection`.
pub fn validate_record(
    collection: Collection,
    payload: &serde_json::Value,
) -> Result<TypedRecord, ValidationError> {
    match collection {
        Collection::Post => validate_post(payload).map(TypedRecord::Post),
        Collection::Like | Collection::Repost => {
            validate_reaction(collection, payload, None).map(TypedRecord::Reaction)
        }
        Collection::VoteAccept | Collection::VoteReject => {
            validate_reaction(collection, payload, Some(Collection::TopicVersion))
                .map(TypedRecord::Reaction)
        }
        Collection::TopicVersion => validate_topic_version(payload).map(TypedRecord::TopicVersion),
    }
}

pub fn validate_post(payload: &serde_json::Value) -> Result<PostRecord, ValidationError> {
    let wire: WirePost = serde_json::from_value(payload.clone())?;
    check_len("text", &wire.text, MAX_POST_CHARS)?;
    let (reply_parent, reply_root) = match wire.reply {
        Some(reply) => (Some(strong_ref(reply.parent)?), Some(strong_ref(reply.root)?)),
        None => (None, None),
    };
    Ok(PostRecord {
        text: wire.text,
        created_at: parse_timestamp(&wire.created_at)?,
        reply_parent,
        reply_root,
    })
}

/// Validate a reaction. Votes additionally require their subject to be a
/// record of `subject_collection`.
pub fn validate_reaction(
    collection: Collection,
    payload: &serde_json::Value,
    subject_collection: Option<Collection>,
) -> Result<ReactionRecord, ValidationError> {
    let wire: WireReaction = serde_json::from_value(payload.clone())?;
    let subject = strong_ref(wire.subject)?;
    if let Some(expected) = subject_collection {
        if subject.uri.collection() != expected.nsid() {
            return Err(ValidationError::WrongSubjectCollection {
                collection,
                expected,
                actual: subject.uri.collection().to_string(),
            });
        }
    }
    if let Some(reason) = &wire.reason {
        check_len("reason", reason, MAX_MESSAGE_CHARS)?;
    }
    Ok(ReactionRecord {
        subject,
        created_at: parse_timestamp(&wire.created_at)?,
        reason: wire.reason,
    })
}

pub fn validate_topic_version(
    payload: &serde_json::Value,
) -> Result<TopicVersionRecord, ValidationError> {
    let wire: WireTopicVersion = serde_json::from_value(payload.clone())?;
    let topic_id = wire.id.trim().to_string();
    if topic_id.is_empty() {
        return Err(ValidationError::Empty("id"));
    }
    check_len("id", &topic_id, MAX_TOPIC_ID_CHARS)?;
    if wire.text.is_some() && wire.text_blob.is_some() {
        return Err(ValidationError::AmbiguousText);
    }
    let message = wire.message.unwrap_or_default();
    check_len("message", &message, MAX_MESSAGE_CHARS)?;
    let text_blob = match wire.text_blob {
        Some(blob) if blob.cid.is_empty() => return Err(ValidationError::Empty("textBlob.cid")),
        Some(blob) => Some(blob.cid),
        None => None,
    };
    Ok(TopicVersionRecord {
        topic_id,
        text: wire.text,
        text_blob,
        message,
        props: wire.props,
        claims_authorship: wire.claims_authorship,
        created_at: parse_timestamp(&wire.created_at)?,
    })
}

fn strong_ref(wire: WireRef) -> Result<StrongRef, ValidationError> {
    if wire.cid.is_empty() {
        return Err(ValidationError::Empty("cid"));
    }
    Ok(StrongRef {
        uri: wire.uri.parse()?,
        cid: wire.cid,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ValidationError::InvalidTimestamp(raw.to_string()))
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}
