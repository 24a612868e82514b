use criterion::{criterion_group, criterion_main, Criterion};
use repo_records::{Collection, RecordUri, SnapshotEntry};
use std::collections::HashMap;
use std::hint::black_box;
use topic_consensus::{
    account_contributions, diff_blocks, AccountInput, ContributionConfig, VersionStatus,
};
use topicsync::sync::diff_snapshot;

fn article(paragraphs: usize, salt: usize) -> String {
    (0..paragraphs)
        .map(|i| format!("Paragraph {i} revision {} with some body text.", (i + salt) % 7))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn bench_block_diff(c: &mut Criterion) {
    let old = article(200, 0);
    let new = article(200, 3);

    c.bench_function("diff_blocks_200_paragraphs", |b| {
        b.iter(|| diff_blocks(black_box(&old), black_box(&new)));
    });
}

fn bench_topic_history(c: &mut Criterion) {
    let inputs: Vec<AccountInput> = (0..50)
        .map(|i| AccountInput {
            uri: format!("at://did:plc:author{}/org.commonwiki.topic.version/{i}", i % 5),
            status: if i % 9 == 4 {
                VersionStatus::Rejected
            } else {
                VersionStatus::Accepted
            },
            text: article(20 + i, i),
            claims_authorship: i % 3 == 0,
        })
        .collect();
    let config = ContributionConfig::default();

    c.bench_function("account_contributions_50_versions", |b| {
        b.iter(|| account_contributions(black_box(&inputs), &config));
    });
}

fn bench_snapshot_diff(c: &mut Criterion) {
    let nsid = Collection::Post.nsid();
    let mut local = HashMap::new();
    let mut remote = Vec::new();
    for i in 0..10_000 {
        let uri = RecordUri::new("did:plc:bench", nsid, &format!("p{i}")).unwrap_or_else(|e| panic!("{e}"));
        if i % 10 != 0 {
            local.insert(uri.to_string(), format!("cid-{i}"));
        }
        remote.push(SnapshotEntry {
            collection: nsid.to_string(),
            cid: format!("cid-{}", if i % 25 == 0 { i + 1 } else { i }),
            uri,
            payload: serde_json::Value::Null,
        });
    }

    c.bench_function("diff_snapshot_10k", |b| {
        b.iter(|| diff_snapshot(black_box(&local), remote.clone(), &Collection::ALL));
    });
}

criterion_group!(benches, bench_block_diff, bench_topic_history, bench_snapshot_diff);
criterion_main!(benches);
