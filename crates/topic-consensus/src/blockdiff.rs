//! Block-level text diff.
//!
//! Text is split into blocks at blank lines. Two versions are compared as
//! sequences of blocks: blocks on the longest common subsequence are
//! unchanged, the rest count as added (new side) or deleted (old side).
//! Sizes are measured in characters, not bytes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Characters added and deleted going from one text to another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub chars_added: u64,
    pub chars_deleted: u64,
}

/// Split text into blocks separated by one or more blank lines. Leading and
/// trailing whitespace on each line is kept; blank lines are dropped.
pub fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

fn block_len(block: &str) -> u64 {
    block.chars().count() as u64
}

/// Diff `new` against `old` block by block.
pub fn diff_blocks(old: &str, new: &str) -> DiffStats {
    let old_blocks = split_blocks(old);
    let new_blocks = split_blocks(new);

    // Common prefix and suffix never reach the subsequence search.
    let prefix = old_blocks
        .iter()
        .zip(new_blocks.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let old_rest = &old_blocks[prefix..];
    let new_rest = &new_blocks[prefix..];
    let suffix = old_rest
        .iter()
        .rev()
        .zip(new_rest.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old_mid = &old_rest[..old_rest.len() - suffix];
    let new_mid = &new_rest[..new_rest.len() - suffix];

    let (old_kept, new_kept) = lcs_membership(old_mid, new_mid);

    let chars_deleted = old_mid
        .iter()
        .zip(old_kept.iter())
        .filter(|(_, kept)| !**kept)
        .map(|(b, _)| block_len(b))
        .sum();
    let chars_added = new_mid
        .iter()
        .zip(new_kept.iter())
        .filter(|(_, kept)| !**kept)
        .map(|(b, _)| block_len(b))
        .sum();

    DiffStats {
        chars_added,
        chars_deleted,
    }
}

/// Mark which blocks of each side lie on a longest common subsequence.
///
/// Blocks are interned to ids first; the subsequence is found with
/// Hirschberg's divide and conquer, so memory stays linear in the number
/// of blocks however different the two sides are.
fn lcs_membership(old: &[String], new: &[String]) -> (Vec<bool>, Vec<bool>) {
    let mut ids = HashMap::new();
    let old_ids = intern(&mut ids, old);
    let new_ids = intern(&mut ids, new);

    let mut old_kept = vec![false; old.len()];
    let mut new_kept = vec![false; new.len()];
    hirschberg(&old_ids, &new_ids, 0, 0, &mut old_kept, &mut new_kept);
    (old_kept, new_kept)
}

fn intern<'a>(ids: &mut HashMap<&'a str, u32>, blocks: &'a [String]) -> Vec<u32> {
    blocks
        .iter()
        .map(|block| {
            let next = ids.len() as u32;
            *ids.entry(block.as_str()).or_insert(next)
        })
        .collect()
}

/// LCS lengths of `a` against every prefix of `b` (`b.len() + 1` entries).
fn lcs_row(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut prev = vec![0u32; b.len() + 1];
    let mut cur = vec![0u32; b.len() + 1];
    for &x in a {
        for (j, &y) in b.iter().enumerate() {
            cur[j + 1] = if x == y {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev
}

fn hirschberg(
    a: &[u32],
    b: &[u32],
    a_offset: usize,
    b_offset: usize,
    a_kept: &mut [bool],
    b_kept: &mut [bool],
) {
    if a.is_empty() || b.is_empty() {
        return;
    }
    if a.len() == 1 {
        if let Some(j) = b.iter().position(|&y| y == a[0]) {
            a_kept[a_offset] = true;
            b_kept[b_offset + j] = true;
        }
        return;
    }

    let mid = a.len() / 2;
    let (top, bottom) = a.split_at(mid);
    let forward = lcs_row(top, b);
    let bottom_rev: Vec<u32> = bottom.iter().rev().copied().collect();
    let b_rev: Vec<u32> = b.iter().rev().copied().collect();
    let backward = lcs_row(&bottom_rev, &b_rev);

    let m = b.len();
    let mut split = 0;
    let mut best = 0;
    for j in 0..=m {
        let total = forward[j] + backward[m - j];
        if total > best {
            best = total;
            split = j;
        }
    }

    let (b_top, b_bottom) = b.split_at(split);
    hirschberg(top, b_top, a_offset, b_offset, a_kept, b_kept);
    hirschberg(bottom, b_bottom, a_offset + mid, b_offset + split, a_kept, b_kept);
}
