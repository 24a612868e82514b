//! The closed set of collections the mirror understands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A record collection, identified on the wire by its NSID.
///
/// The set is closed: every collection maps to exactly one processor and
/// one delete processor, and adding a variant forces every `match` over
/// it to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Post,
    TopicVersion,
    Like,
    Repost,
    VoteAccept,
    VoteReject,
}

impl Collection {
    /// All collections, in processing order. Topic versions come before the
    /// votes that reference them so a single sync can resolve both.
    pub const ALL: [Collection; 6] = [
        Collection::Post,
        Collection::TopicVersion,
        Collection::Like,
        Collection::Repost,
        Collection::VoteAccept,
        Collection::VoteReject,
    ];

    pub fn nsid(&self) -> &'static str {
        match self {
            Collection::Post => "org.commonwiki.feed.post",
            Collection::TopicVersion => "org.commonwiki.topic.version",
            Collection::Like => "org.commonwiki.feed.like",
            Collection::Repost => "org.commonwiki.feed.repost",
            Collection::VoteAccept => "org.commonwiki.topic.voteAccept",
            Collection::VoteReject => "org.commonwiki.topic.voteReject",
        }
    }

    pub fn from_nsid(nsid: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.nsid() == nsid)
    }

    /// The reaction kind recorded by this collection, if it is a reaction.
    pub fn reaction_kind(&self) -> Option<ReactionKind> {
        match self {
            Collection::Like => Some(ReactionKind::Like),
            Collection::Repost => Some(ReactionKind::Repost),
            Collection::VoteAccept => Some(ReactionKind::Accept),
            Collection::VoteReject => Some(ReactionKind::Reject),
            Collection::Post | Collection::TopicVersion => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nsid())
    }
}

/// Kind of reaction one record expresses about another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    Repost,
    Accept,
    Reject,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Repost => "repost",
            ReactionKind::Accept => "accept",
            ReactionKind::Reject => "reject",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(ReactionKind::Like),
            "repost" => Some(ReactionKind::Repost),
            "accept" => Some(ReactionKind::Accept),
            "reject" => Some(ReactionKind::Reject),
            _ => None,
        }
    }

    /// Votes feed the topic consensus engine.
    pub fn is_vote(&self) -> bool {
        matches!(self, ReactionKind::Accept | ReactionKind::Reject)
    }

    pub fn collection(&self) -> Collection {
        match self {
            ReactionKind::Like => Collection::Like,
            ReactionKind::Repost => Collection::Repost,
            ReactionKind::Accept => Collection::VoteAccept,
            ReactionKind::Reject => Collection::VoteReject,
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nsid_roundtrip_for_every_collection() {
        for c in Collection::ALL {
            assert_eq!(Collection::from_nsid(c.nsid()), Some(c));
        }
        assert_eq!(Collection::from_nsid("org.example.unknown"), None);
    }

    #[test]
    fn reaction_kinds_map_back_to_their_collection() {
        for c in Collection::ALL {
            if let Some(kind) = c.reaction_kind() {
                assert_eq!(kind.collection(), c);
                assert_eq!(ReactionKind::parse(kind.as_str()), Some(kind));
            }
        }
    }

    #[test]
    fn only_accept_and_reject_are_votes() {
        assert!(ReactionKind::Accept.is_vote());
        assert!(ReactionKind::Reject.is_vote());
        assert!(!ReactionKind::Like.is_vote());
        assert!(!ReactionKind::Repost.is_vote());
    }
}
