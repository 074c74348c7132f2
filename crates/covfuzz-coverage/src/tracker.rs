//! Thread-bound coverage tracking.
//!
//! Each thread owns at most one active [`CoverageContext`], stored in
//! thread-local storage. Registration and removal happen on the thread that
//! runs the execution; instrumentation on that thread writes to the context
//! without any locking. Threads that never began tracking are ignored by the
//! probes.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

use tracing::trace;

use crate::context::{Coverage, CoverageContext};

/// A registered context and the generation it was registered under.
struct Registration {
    generation: u64,
    context: CoverageContext,
}

thread_local! {
    static CURRENT: RefCell<Option<Registration>> = const { RefCell::new(None) };
    static GENERATION: Cell<u64> = const { Cell::new(0) };
}

/// Misuse of the tracking protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackError {
    #[error("thread {thread} is already being tracked")]
    AlreadyTracked { thread: String },
}

/// Scoped registration for the current thread.
///
/// [`TrackingGuard::finish`] ends tracking and returns the coverage; dropping
/// the guard without finishing discards whatever was recorded, so state never
/// carries into the thread's next execution.
///
/// A guard only ever removes its own registration. Once tracking was ended
/// through [`end_tracking`] and begun again, the old guard is inert.
#[derive(Debug)]
#[must_use = "dropping the guard discards the recorded coverage"]
pub struct TrackingGuard {
    generation: u64,
    finished: bool,
    // Tied to the registering thread.
    _not_send: PhantomData<*const ()>,
}

impl TrackingGuard {
    /// End tracking and take the recorded coverage.
    ///
    /// Empty if this guard's registration was already ended elsewhere.
    pub fn finish(mut self) -> Coverage {
        self.finished = true;
        take_registration(Some(self.generation)).unwrap_or_default()
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        if !self.finished {
            let _ = take_registration(Some(self.generation));
        }
    }
}

/// Start tracking the calling thread with a fresh context.
pub fn begin_tracking() -> Result<TrackingGuard, TrackError> {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(TrackError::AlreadyTracked {
                thread: thread_label(),
            });
        }
        let generation = GENERATION.with(|g| {
            let next = g.get().wrapping_add(1);
            g.set(next);
            next
        });
        *slot = Some(Registration {
            generation,
            context: CoverageContext::new(),
        });
        trace!(thread = %thread_label(), generation, "began coverage tracking");
        Ok(TrackingGuard {
            generation,
            finished: false,
            _not_send: PhantomData,
        })
    })
}

/// Stop tracking the calling thread; `None` if it was never started.
pub fn end_tracking() -> Option<Coverage> {
    take_registration(None)
}

/// Remove the thread's registration, only if it matches `generation` when
/// one is given.
fn take_registration(generation: Option<u64>) -> Option<Coverage> {
    CURRENT
        .try_with(|slot| {
            let mut slot = slot.borrow_mut();
            match (slot.as_ref(), generation) {
                (Some(current), Some(g)) if current.generation != g => None,
                _ => slot.take(),
            }
        })
        .ok()
        .flatten()
        .map(|registration| registration.context.into_coverage())
}

/// Whether the calling thread is currently tracked.
pub fn is_tracking() -> bool {
    CURRENT
        .try_with(|slot| slot.borrow().is_some())
        .unwrap_or(false)
}

/// Run `f` against the calling thread's context, if any.
///
/// Silently does nothing for untracked threads, during thread teardown, or
/// on re-entrant use from inside `f`.
pub(crate) fn with_current<F: FnOnce(&mut CoverageContext)>(f: F) {
    let _ = CURRENT.try_with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut() {
            if let Some(registration) = slot.as_mut() {
                f(&mut registration.context);
            }
        }
    });
}

fn thread_label() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => format!("{name} ({:?})", current.id()),
        None => format!("{:?}", current.id()),
    }
}
