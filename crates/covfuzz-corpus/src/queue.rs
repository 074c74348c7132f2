//! FIFO queue of test cases awaiting mutation.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::persist::{FlushFailure, PersistConfig, PersistError, Persisted, PersistentState};
use crate::test_case::TestCase;

/// Frontier of known-interesting inputs.
///
/// `dequeue` moves the entry out, so a test case is held by at most one
/// worker at a time.
pub trait InputQueue: Send + Sync {
    fn enqueue(&self, test_case: TestCase) -> Result<(), FlushFailure<()>>;

    /// Oldest entry, or `None` when the queue is empty.
    fn dequeue(&self) -> Result<Option<TestCase>, FlushFailure<Option<TestCase>>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn flush(&self) -> Result<(), PersistError> {
        Ok(())
    }
}

/// Queue held only in memory.
#[derive(Debug, Default)]
pub struct MemoryInputQueue {
    entries: Mutex<VecDeque<TestCase>>,
}

impl MemoryInputQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputQueue for MemoryInputQueue {
    fn enqueue(&self, test_case: TestCase) -> Result<(), FlushFailure<()>> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push_back(test_case);
        Ok(())
    }

    fn dequeue(&self) -> Result<Option<TestCase>, FlushFailure<Option<TestCase>>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front())
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[derive(Debug, Default)]
struct Entries(VecDeque<TestCase>);

#[derive(Serialize, Deserialize)]
struct EntryDocument {
    entries: Vec<TestCase>,
}

impl PersistentState for Entries {
    type Document = EntryDocument;

    fn to_document(&self) -> EntryDocument {
        EntryDocument {
            entries: self.0.iter().cloned().collect(),
        }
    }

    fn from_document(document: EntryDocument) -> Self {
        Entries(document.entries.into())
    }

    fn record_count(&self) -> usize {
        self.0.len()
    }
}

/// Queue mirrored to a file; see [`crate::persist`] for the write policy.
///
/// Both enqueue and dequeue count as mutations.
#[derive(Debug)]
pub struct FileInputQueue {
    persisted: Persisted<Entries>,
}

impl FileInputQueue {
    /// Load the queue from `config.path`, creating the file if missing.
    pub fn open(config: PersistConfig) -> Result<Self, PersistError> {
        Ok(Self {
            persisted: Persisted::open(config)?,
        })
    }

    pub fn close(self) -> Result<(), PersistError> {
        self.persisted.close()
    }
}

impl InputQueue for FileInputQueue {
    fn enqueue(&self, test_case: TestCase) -> Result<(), FlushFailure<()>> {
        self.persisted.mutate(|entries| {
            entries.0.push_back(test_case);
            ((), true)
        })
    }

    fn dequeue(&self) -> Result<Option<TestCase>, FlushFailure<Option<TestCase>>> {
        self.persisted.mutate(|entries| {
            let entry = entries.0.pop_front();
            let changed = entry.is_some();
            (entry, changed)
        })
    }

    fn len(&self) -> usize {
        self.persisted.read(|entries| entries.0.len())
    }

    fn flush(&self) -> Result<(), PersistError> {
        self.persisted.flush()
    }
}
