//! File-backed persistence shared by the novelty cache and the input queue.
//!
//! A [`Persisted`] value keeps its state in memory and rewrites the backing
//! file once `save_after_count` mutations have accumulated since the last
//! write, and again when it is closed or dropped. A crash between writes
//! loses at most the unwritten tail; a crash during a write leaves the
//! previous file intact.
//!
//! Loading is strict: a file that cannot be decoded fails the open with
//! [`PersistError::Corrupt`] and is never overwritten.

pub mod file;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Errors from loading or writing a persistence file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt persistence file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// A mutation that took effect in memory but whose flush to disk failed.
///
/// `value` is what the operation would have returned on success; the
/// unflushed change is retried on the next flush.
#[derive(Debug)]
pub struct FlushFailure<T> {
    pub value: T,
    pub source: PersistError,
}

impl<T> FlushFailure<T> {
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, PersistError) {
        (self.value, self.source)
    }
}

impl<T> fmt::Display for FlushFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation applied but not persisted: {}", self.source)
    }
}

impl<T: fmt::Debug> std::error::Error for FlushFailure<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Text encoding of the persistence file. Files are always UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    /// Single-line JSON.
    #[default]
    Json,
    /// Indented JSON, easier to inspect by hand.
    JsonPretty,
}

/// Where and how often a structure is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    /// Backing file. Parent directories are created on open.
    pub path: PathBuf,
    /// Mutations to accumulate before rewriting the file (0 = every one).
    pub save_after_count: u64,
    #[serde(default)]
    pub format: FileFormat,
}

impl PersistConfig {
    pub fn new(path: impl Into<PathBuf>, save_after_count: u64) -> Self {
        Self {
            path: path.into(),
            save_after_count,
            format: FileFormat::default(),
        }
    }
}

/// In-memory state that round-trips through a serializable document.
pub trait PersistentState: Default + Send {
    type Document: Serialize + DeserializeOwned;

    /// Snapshot for writing. Must be deterministic for equal states.
    fn to_document(&self) -> Self::Document;

    fn from_document(document: Self::Document) -> Self;

    /// Number of records, for logging.
    fn record_count(&self) -> usize;
}

struct Inner<S> {
    state: S,
    pending: u64,
}

/// A state value mirrored to a file.
pub struct Persisted<S: PersistentState> {
    config: PersistConfig,
    inner: Mutex<Inner<S>>,
}

impl<S: PersistentState> Persisted<S> {
    /// Load from `config.path`, or create the file holding an empty state.
    ///
    /// An existing file is read but never rewritten by opening.
    pub fn open(config: PersistConfig) -> Result<Self, PersistError> {
        let state = if config.path.exists() {
            let document = file::read_document::<S::Document>(&config.path)?;
            let state = S::from_document(document);
            info!(
                path = %config.path.display(),
                records = state.record_count(),
                "loaded persisted state"
            );
            state
        } else {
            file::ensure_parent(&config.path)?;
            let state = S::default();
            let bytes = file::encode(&config.path, &state.to_document(), config.format)?;
            file::write_atomic(&config.path, &bytes)?;
            debug!(path = %config.path.display(), "created persistence file");
            state
        };

        Ok(Self {
            config,
            inner: Mutex::new(Inner { state, pending: 0 }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    /// Mutations applied since the last successful write.
    pub fn pending(&self) -> u64 {
        self.lock().pending
    }

    /// Read the state under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.lock().state)
    }

    /// Apply `f` under the lock. `f` returns its result and whether it
    /// changed the state; changes count towards the flush threshold and the
    /// flush, if due, happens before the lock is released.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut S) -> (R, bool)) -> Result<R, FlushFailure<R>> {
        let mut inner = self.lock();
        let (value, changed) = f(&mut inner.state);
        if !changed {
            return Ok(value);
        }
        inner.pending += 1;
        if inner.pending >= self.config.save_after_count {
            if let Err(source) = self.write(&mut inner) {
                return Err(FlushFailure { value, source });
            }
        }
        Ok(value)
    }

    /// Write the state if anything changed since the last write.
    pub fn flush(&self) -> Result<(), PersistError> {
        let mut inner = self.lock();
        if inner.pending == 0 {
            return Ok(());
        }
        self.write(&mut inner)
    }

    /// Flush outstanding changes and release the file.
    pub fn close(self) -> Result<(), PersistError> {
        // Drop runs afterwards but finds nothing pending.
        self.flush()
    }

    fn write(&self, inner: &mut Inner<S>) -> Result<(), PersistError> {
        let bytes = file::encode(&self.config.path, &inner.state.to_document(), self.config.format)?;
        file::write_atomic(&self.config.path, &bytes)?;
        debug!(
            path = %self.config.path.display(),
            records = inner.state.record_count(),
            mutations = inner.pending,
            "flushed persisted state"
        );
        inner.pending = 0;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: PersistentState> Drop for Persisted<S> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.config.path.display(), error = %e, "failed to flush on drop");
        }
    }
}

impl<S: PersistentState> fmt::Debug for Persisted<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persisted")
            .field("config", &self.config)
            .field("pending", &self.pending())
            .finish()
    }
}
