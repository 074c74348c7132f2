//! Traced invocation of the target.
//!
//! [`execute`] brackets one call with coverage tracking and packages the
//! outcome, timing and coverage into an [`ExecutionResult`]. Whatever the
//! target does, returning a value, failing, or panicking, ends up as data in
//! the result; only misuse of the tracking protocol is an error.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use covfuzz_coverage::{begin_tracking, BranchHit, CoveragePath, TrackError};
use serde::Serialize;

use crate::layout::ParamValue;

/// A failure raised by the target. Recorded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TargetFailure {
    /// Discriminant of the failure, e.g. an error type name or `"panic"`.
    pub kind: String,
    pub message: String,
}

impl TargetFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::new("panic", message)
    }
}

/// The function under test.
pub trait Target: Send + Sync {
    fn name(&self) -> &str;

    fn invoke(&self, params: &[ParamValue]) -> Result<serde_json::Value, TargetFailure>;
}

/// A [`Target`] backed by a closure.
pub struct FnTarget<F> {
    name: String,
    f: F,
}

impl<F> FnTarget<F>
where
    F: Fn(&[ParamValue]) -> Result<serde_json::Value, TargetFailure> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Target for FnTarget<F>
where
    F: Fn(&[ParamValue]) -> Result<serde_json::Value, TargetFailure> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, params: &[ParamValue]) -> Result<serde_json::Value, TargetFailure> {
        (self.f)(params)
    }
}

impl<F> fmt::Debug for FnTarget<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTarget").field("name", &self.name).finish()
    }
}

/// How the call ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Returned(serde_json::Value),
    Failed(TargetFailure),
}

/// Everything observed about one execution of the target.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    target: Arc<str>,
    params: Vec<ParamValue>,
    branch_hits: Vec<BranchHit>,
    path: CoveragePath,
    duration: Duration,
    outcome: Outcome,
}

impl ExecutionResult {
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn params(&self) -> &[ParamValue] {
        &self.params
    }

    /// Hits sorted by `(branch_id, hit_count)`.
    pub fn branch_hits(&self) -> &[BranchHit] {
        &self.branch_hits
    }

    pub fn path(&self) -> &CoveragePath {
        &self.path
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Returned(_))
    }

    pub fn failure(&self) -> Option<&TargetFailure> {
        match &self.outcome {
            Outcome::Failed(failure) => Some(failure),
            Outcome::Returned(_) => None,
        }
    }

    pub fn return_value(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            Outcome::Returned(value) => Some(value),
            Outcome::Failed(_) => None,
        }
    }
}

/// Run `target` on the calling thread with coverage tracking around it.
///
/// Fails only if the thread is already being tracked.
pub fn execute<T: Target + ?Sized>(
    target: &T,
    params: Vec<ParamValue>,
) -> Result<ExecutionResult, TrackError> {
    let guard = begin_tracking()?;
    let start = Instant::now();
    let outcome = match catch_unwind(AssertUnwindSafe(|| target.invoke(&params))) {
        Ok(Ok(value)) => Outcome::Returned(value),
        Ok(Err(failure)) => Outcome::Failed(failure),
        Err(payload) => Outcome::Failed(TargetFailure::from_panic(payload)),
    };
    let duration = start.elapsed();
    let (branch_hits, path) = guard.finish().sorted_hits();

    Ok(ExecutionResult {
        target: Arc::from(target.name()),
        params,
        branch_hits,
        path,
        duration,
        outcome,
    })
}
