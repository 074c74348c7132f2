//! Per-execution coverage state and the branch-check surface.
//!
//! A [`CoverageContext`] is created when an execution starts and consumed
//! when it ends. Every check computes its outcome, appends it to the
//! coverage path and, when the outcome is "taken", records a hit for the
//! derived branch id:
//! - simple comparisons and catch handlers use the site id;
//! - table and lookup switches combine the site id with the matched value
//!   (see [`switch_branch_id`]), so each case counts as its own branch.

use crate::hit::{BranchHit, BranchHits};
use crate::path::CoveragePath;

/// Branch id for a matched switch case.
///
/// Polynomial over `[site, value]` with multiplier 31, wrapping on overflow.
pub fn switch_branch_id(site: i32, value: i32) -> i32 {
    31i32
        .wrapping_mul(31i32.wrapping_add(site))
        .wrapping_add(value)
}

/// Coverage captured during one execution.
#[derive(Debug, Clone, Default)]
pub struct Coverage {
    pub hits: BranchHits,
    pub path: CoveragePath,
}

impl Coverage {
    /// Hits sorted by `(branch_id, hit_count)`.
    pub fn sorted_hits(self) -> (Vec<BranchHit>, CoveragePath) {
        (self.hits.into_sorted(), self.path)
    }
}

/// Explicit coverage object for one execution.
#[derive(Debug, Clone, Default)]
pub struct CoverageContext {
    coverage: Coverage,
}

impl CoverageContext {
    pub fn new() -> Self {
        Self {
            coverage: Coverage::default(),
        }
    }

    pub fn hits(&self) -> &BranchHits {
        &self.coverage.hits
    }

    pub fn path(&self) -> &CoveragePath {
        &self.coverage.path
    }

    pub fn into_coverage(self) -> Coverage {
        self.coverage
    }

    /// Record the decision and, if taken, a hit on `branch_id`.
    fn decide(&mut self, taken: bool, branch_id: i32) {
        self.coverage.path.push(taken);
        if taken {
            self.coverage.hits.record(branch_id);
        }
    }

    pub fn if_eq(&mut self, value: i32, site: i32) {
        self.decide(value == 0, site);
    }

    pub fn if_ne(&mut self, value: i32, site: i32) {
        self.decide(value != 0, site);
    }

    pub fn if_lt(&mut self, value: i32, site: i32) {
        self.decide(value < 0, site);
    }

    pub fn if_le(&mut self, value: i32, site: i32) {
        self.decide(value <= 0, site);
    }

    pub fn if_gt(&mut self, value: i32, site: i32) {
        self.decide(value > 0, site);
    }

    pub fn if_ge(&mut self, value: i32, site: i32) {
        self.decide(value >= 0, site);
    }

    pub fn if_icmp_eq(&mut self, lhs: i32, rhs: i32, site: i32) {
        self.decide(lhs == rhs, site);
    }

    pub fn if_icmp_ne(&mut self, lhs: i32, rhs: i32, site: i32) {
        self.decide(lhs != rhs, site);
    }

    pub fn if_icmp_lt(&mut self, lhs: i32, rhs: i32, site: i32) {
        self.decide(lhs < rhs, site);
    }

    pub fn if_icmp_le(&mut self, lhs: i32, rhs: i32, site: i32) {
        self.decide(lhs <= rhs, site);
    }

    pub fn if_icmp_gt(&mut self, lhs: i32, rhs: i32, site: i32) {
        self.decide(lhs > rhs, site);
    }

    pub fn if_icmp_ge(&mut self, lhs: i32, rhs: i32, site: i32) {
        self.decide(lhs >= rhs, site);
    }

    /// Reference identity: taken iff both point at the same object.
    pub fn if_acmp_eq<T: ?Sized>(&mut self, lhs: &T, rhs: &T, site: i32) {
        self.decide(std::ptr::eq(lhs, rhs), site);
    }

    /// Reference identity: taken iff the references point at different
    /// objects.
    pub fn if_acmp_ne<T: ?Sized>(&mut self, lhs: &T, rhs: &T, site: i32) {
        self.decide(!std::ptr::eq(lhs, rhs), site);
    }

    pub fn if_null<T: ?Sized>(&mut self, value: Option<&T>, site: i32) {
        self.decide(value.is_none(), site);
    }

    pub fn if_non_null<T: ?Sized>(&mut self, value: Option<&T>, site: i32) {
        self.decide(value.is_some(), site);
    }

    /// Dense switch over the inclusive range `min..=max`.
    pub fn table_switch(&mut self, value: i32, min: i32, max: i32, site: i32) {
        let matched = (min..=max).contains(&value);
        self.decide(matched, switch_branch_id(site, value));
    }

    /// Sparse switch over `keys`.
    pub fn lookup_switch(&mut self, value: i32, keys: &[i32], site: i32) {
        let matched = keys.contains(&value);
        self.decide(matched, switch_branch_id(site, value));
    }

    /// Entry into a catch handler. The caught error does not affect the id.
    pub fn catch_entry<E: ?Sized>(&mut self, _error: &E, site: i32) {
        self.decide(true, site);
    }
}
