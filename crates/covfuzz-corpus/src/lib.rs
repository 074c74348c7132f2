//! Corpus state shared by fuzzing workers: the novelty cache that
//! deduplicates coverage keys, the queue of test cases awaiting mutation,
//! and the file persistence both of them can be backed by.

pub mod cache;
pub mod persist;
pub mod queue;
pub mod test_case;

pub use cache::{check_all, FileHashCache, HashCache, MemoryHashCache};
pub use persist::{FileFormat, FlushFailure, PersistConfig, PersistError};
pub use queue::{FileInputQueue, InputQueue, MemoryInputQueue};
pub use test_case::TestCase;
