//! Record URIs: `at://<subject>/<collection>/<rkey>`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

const SCHEME: &str = "at://";

static SUBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^did:[a-z]+:[A-Za-z0-9._:%-]+$").expect("valid subject regex"));

static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._~:-]{1,512}$").expect("valid segment regex"));

/// Errors from parsing a record URI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UriError {
    #[error("uri must start with at://: {0}")]
    MissingScheme(String),
    #[error("uri must have exactly three path segments: {0}")]
    WrongShape(String),
    #[error("invalid subject id '{0}'")]
    InvalidSubject(String),
    #[error("invalid {segment} segment '{value}'")]
    InvalidSegment { segment: &'static str, value: String },
}

/// A parsed record URI.
///
/// The string form is the stable key of a record in the mirror; it is
/// derived from subject + collection + rkey and never from the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordUri {
    subject: String,
    collection: String,
    rkey: String,
}

impl RecordUri {
    pub fn new(subject: &str, collection: &str, rkey: &str) -> Result<Self, UriError> {
        if !SUBJECT_RE.is_match(subject) {
            return Err(UriError::InvalidSubject(subject.to_string()));
        }
        if !SEGMENT_RE.is_match(collection) {
            return Err(UriError::InvalidSegment {
                segment: "collection",
                value: collection.to_string(),
            });
        }
        if !SEGMENT_RE.is_match(rkey) {
            return Err(UriError::InvalidSegment {
                segment: "rkey",
                value: rkey.to_string(),
            });
        }
        Ok(Self {
            subject: subject.to_string(),
            collection: collection.to_string(),
            rkey: rkey.to_string(),
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn rkey(&self) -> &str {
        &self.rkey
    }
}

impl FromStr for RecordUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| UriError::MissingScheme(s.to_string()))?;
        let mut parts = rest.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(subject), Some(collection), Some(rkey), None) => {
                Self::new(subject, collection, rkey)
            }
            _ => Err(UriError::WrongShape(s.to_string())),
        }
    }
}

impl TryFrom<String> for RecordUri {
    type Error = UriError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordUri> for String {
    fn from(uri: RecordUri) -> Self {
        uri.to_string()
    }
}

impl fmt::Display for RecordUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}/{}", SCHEME, self.subject, self.collection, self.rkey)
    }
}
