//! Run counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FuzzStats {
    /// Target executions, bootstrap included.
    pub executions: u64,
    /// Executions that produced at least one new coverage key.
    pub novel: u64,
    /// Executions whose outcome was a target failure.
    pub failures: u64,
    /// Queue length at the end of the run.
    pub corpus_size: usize,
    pub elapsed: Duration,
}

/// Shared counters updated by the workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    /// Executions handed out against the budget.
    reserved: AtomicU64,
    executions: AtomicU64,
    novel: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    /// Claim one execution. `max == 0` means no limit.
    pub fn reserve(&self, max: u64) -> bool {
        if max == 0 {
            self.reserved.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        self.reserved
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| (n < max).then_some(n + 1))
            .is_ok()
    }

    pub fn record_execution(&self, success: bool) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_novel(&self) {
        self.novel.fetch_add(1, Ordering::Relaxed);
    }

    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, corpus_size: usize, elapsed: Duration) -> FuzzStats {
        FuzzStats {
            executions: self.executions.load(Ordering::Relaxed),
            novel: self.novel.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            corpus_size,
            elapsed,
        }
    }
}
