use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One taken branch outcome and how often it fired during an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchHit {
    /// Identifier of the site/outcome pair (switch ids include the case value).
    pub branch_id: i32,
    /// Number of times the outcome was taken.
    pub hit_count: u32,
}

impl BranchHit {
    pub fn new(branch_id: i32, hit_count: u32) -> Self {
        Self {
            branch_id,
            hit_count,
        }
    }
}

/// Hits recorded during one execution, in first-seen order.
///
/// Each branch id appears at most once; repeated hits bump its count.
#[derive(Debug, Clone, Default)]
pub struct BranchHits {
    hits: Vec<BranchHit>,
    index: HashMap<i32, usize>,
}

impl BranchHits {
    pub fn new() -> Self {
        Self {
            hits: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Record one hit for `branch_id`.
    pub fn record(&mut self, branch_id: i32) {
        match self.index.get(&branch_id) {
            Some(&slot) => {
                let hit = &mut self.hits[slot];
                hit.hit_count = hit.hit_count.saturating_add(1);
            }
            None => {
                self.index.insert(branch_id, self.hits.len());
                self.hits.push(BranchHit::new(branch_id, 1));
            }
        }
    }

    /// Hit count for a branch, zero if it never fired.
    pub fn count(&self, branch_id: i32) -> u32 {
        self.index
            .get(&branch_id)
            .map(|&slot| self.hits[slot].hit_count)
            .unwrap_or(0)
    }

    pub fn hits(&self) -> &[BranchHit] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Consume into a list sorted by `(branch_id, hit_count)`.
    pub fn into_sorted(self) -> Vec<BranchHit> {
        let mut hits = self.hits;
        hits.sort_unstable();
        hits
    }
}
