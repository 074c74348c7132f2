//! Coverage-guided exploration: mutation of queued inputs, traced execution
//! of the target, and the worker loop that feeds novel coverage back into
//! the corpus.

pub mod execution;
pub mod fuzzer;
pub mod layout;
pub mod mutate;
pub mod rng;
pub mod seeds;

pub use execution::{execute, ExecutionResult, FnTarget, Outcome, Target, TargetFailure};
pub use fuzzer::{FuzzConfig, FuzzError, FuzzStats, Fuzzer};
pub use layout::{LayoutError, ParamKind, ParamLayout, ParamValue};
pub use mutate::{MutationConfig, Mutator, Stage};
pub use seeds::{SeedError, SeedKind, SeedSource};
