use chrono::{DateTime, TimeZone, Utc};
use topic_consensus::*;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn vote(uri: &str, voter: &str, kind: VoteKind, tier: TrustTier, secs: i64) -> Vote {
    Vote {
        uri: uri.into(),
        voter: voter.into(),
        kind,
        voter_tier: tier,
        created_at: at(secs),
    }
}

#[test]
fn test_full_topic_history() {
    // Three versions of one topic; B is vetoed by an editor.
    let a_text = "x".repeat(100);
    let b_text = format!("{a_text}\n\n{}", "y".repeat(20));
    let c_text = format!("{a_text}\n\n{}", "z".repeat(30));

    let mut versions = vec![
        VersionCandidate {
            uri: "at://did:ex:carol/org.commonwiki.topic.version/c".into(),
            created_at: at(30),
            votes: vec![],
        },
        VersionCandidate {
            uri: "at://did:ex:alice/org.commonwiki.topic.version/a".into(),
            created_at: at(10),
            votes: vec![vote("va", "did:ex:dave", VoteKind::Accept, TrustTier::Beginner, 11)],
        },
        VersionCandidate {
            uri: "at://did:ex:bob/org.commonwiki.topic.version/b".into(),
            created_at: at(20),
            votes: vec![vote("vb", "did:ex:erin", VoteKind::Reject, TrustTier::Editor, 21)],
        },
    ];
    sort_versions(&mut versions);

    let protection = ConsensusConfig::default().default_protection;
    let current = resolve_current_version(&versions, protection);
    assert_eq!(current.as_deref(), Some("at://did:ex:carol/org.commonwiki.topic.version/c"));

    let statuses = resolve_statuses(&versions, protection);
    assert_eq!(statuses[1].1, VersionStatus::Rejected);

    let texts = [&a_text, &b_text, &c_text];
    let claims = [true, false, false];
    let inputs: Vec<AccountInput> = statuses
        .iter()
        .zip(texts.iter().zip(claims))
        .map(|((uri, status), (text, claims_authorship))| AccountInput {
            uri: uri.clone(),
            status: *status,
            text: (*text).clone(),
            claims_authorship,
        })
        .collect();

    let stats = account_contributions(&inputs, &ContributionConfig::default()).unwrap();
    assert_eq!(stats[2].accumulated_chars, 130);
    assert!((stats[0].contribution_all - 100.0 / 130.0).abs() < 1e-9);
    assert!((stats[2].contribution_all - 30.0 / 130.0).abs() < 1e-9);
    assert!((stats[0].contribution_monetized - 0.95).abs() < 1e-9);
    assert!((stats[2].contribution_monetized - 0.05).abs() < 1e-9);
    assert_eq!(stats[1].contribution_all, 0.0);
}

#[test]
fn test_raising_protection_unblocks_version() {
    let versions = vec![
        VersionCandidate {
            uri: "a".into(),
            created_at: at(1),
            votes: vec![],
        },
        VersionCandidate {
            uri: "b".into(),
            created_at: at(2),
            votes: vec![vote("r", "newbie", VoteKind::Reject, TrustTier::Beginner, 3)],
        },
    ];

    assert_eq!(
        resolve_current_version(&versions, TrustTier::Beginner).as_deref(),
        Some("a")
    );
    // Once the topic is protected, the beginner's rejection no longer vetoes.
    assert_eq!(
        resolve_current_version(&versions, TrustTier::Editor).as_deref(),
        Some("b")
    );
    assert_eq!(version_status(&versions[1].votes, TrustTier::Editor), VersionStatus::Pending);
}

#[test]
fn test_changed_vote_cascades_into_contributions() {
    let texts = ["intro", "intro\n\nsecond", "intro\n\nsecond\n\nthird"];
    let build = |status_b: VersionStatus| -> Vec<AccountInput> {
        ["a", "b", "c"]
            .iter()
            .zip(texts)
            .map(|(uri, text)| AccountInput {
                uri: (*uri).into(),
                status: if *uri == "b" { status_b } else { VersionStatus::Accepted },
                text: text.into(),
                claims_authorship: false,
            })
            .collect()
    };

    let before = account_contributions(&build(VersionStatus::Accepted), &ContributionConfig::default()).unwrap();
    assert_eq!(before[2].chars_added, 5);
    assert_eq!(before[2].prev_accepted.as_deref(), Some("b"));

    // Rejecting b moves c's baseline back to a: c now adds both blocks.
    let after = account_contributions(&build(VersionStatus::Rejected), &ContributionConfig::default()).unwrap();
    assert_eq!(after[2].chars_added, 11);
    assert_eq!(after[2].prev_accepted.as_deref(), Some("a"));
    assert_eq!(after[2].accumulated_chars, 16);
}
