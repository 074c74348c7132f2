//! Reduction of branch-hit lists into novelty keys.
//!
//! All modes sort their input first, so the key depends only on the set of
//! hits and never on the order they were recorded in. Arithmetic is a
//! wrapping 31-polynomial over `i32`, which keeps keys identical across
//! processes and platforms.

use serde::{Deserialize, Serialize};

use crate::hit::BranchHit;

/// Coarse hit-count class.
///
/// Counts are grouped as 0, 1, 2, 3, 4-7, 8-15, 16-31, 32-127 and 128+, so
/// loops that run a few more times do not look like new behavior.
pub fn bucket(hit_count: u32) -> u32 {
    match hit_count {
        0 => 0,
        1 => 1,
        2 => 2,
        3 => 4,
        4..=7 => 8,
        8..=15 => 16,
        16..=31 => 32,
        32..=127 => 64,
        _ => 128,
    }
}

fn combine(acc: i32, value: i32) -> i32 {
    acc.wrapping_mul(31).wrapping_add(value)
}

fn hit_key(hit: &BranchHit) -> i32 {
    combine(combine(1, hit.branch_id), bucket(hit.hit_count) as i32)
}

/// How an execution's hits become cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hasher {
    /// One key from the set of branch ids; repetition is ignored.
    #[default]
    WithoutHitCounts,
    /// One key from the branch ids and their bucketed hit counts.
    WithHitCounts,
    /// One key per hit, from its branch id and bucketed count.
    /// An execution is novel if any single branch/bucket pair is.
    PerBranch,
}

impl Hasher {
    /// Keys representing the coverage shape of `hits`.
    pub fn keys(&self, hits: &[BranchHit]) -> Vec<i32> {
        match self {
            Hasher::WithoutHitCounts | Hasher::WithHitCounts => vec![self.hash(hits)],
            Hasher::PerBranch => {
                let mut keys: Vec<i32> = hits.iter().map(hit_key).collect();
                keys.sort_unstable();
                keys.dedup();
                keys
            }
        }
    }

    /// Single combined key. For [`Hasher::PerBranch`] this folds the
    /// per-branch keys into one.
    pub fn hash(&self, hits: &[BranchHit]) -> i32 {
        match self {
            Hasher::WithoutHitCounts => {
                let mut ids: Vec<i32> = hits.iter().map(|h| h.branch_id).collect();
                ids.sort_unstable();
                ids.dedup();
                ids.into_iter().fold(1, combine)
            }
            Hasher::WithHitCounts => {
                let mut sorted = hits.to_vec();
                sorted.sort_unstable();
                sorted.iter().map(hit_key).fold(1, combine)
            }
            Hasher::PerBranch => self.keys(hits).into_iter().fold(1, combine),
        }
    }
}
