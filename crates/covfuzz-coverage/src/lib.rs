//! Branch-coverage tracking for fuzzed executions.
//!
//! Instrumented target code reports every conditional, switch and catch
//! site it executes through the [`probe`] functions (or directly through a
//! [`CoverageContext`]). While a thread is tracked, those reports accumulate
//! into a branch-hit list and a coverage path; the [`Hasher`] reduces the
//! hit list into novelty keys.

pub mod context;
pub mod hasher;
pub mod hit;
pub mod path;
pub mod probe;
pub mod tracker;

pub use context::{switch_branch_id, Coverage, CoverageContext};
pub use hasher::{bucket, Hasher};
pub use hit::{BranchHit, BranchHits};
pub use path::CoveragePath;
pub use tracker::{begin_tracking, end_tracking, is_tracking, TrackError, TrackingGuard};
