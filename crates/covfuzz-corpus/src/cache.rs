//! Novelty cache: the set of coverage keys seen so far.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::persist::{FlushFailure, PersistConfig, PersistError, Persisted, PersistentState};

/// Deduplication set of coverage keys.
///
/// `check_unique_and_store` is atomic: when several workers offer the same
/// key concurrently, exactly one of them is told it is novel.
pub trait HashCache: Send + Sync {
    /// Insert `key` if absent. Returns true if it was not present before.
    fn check_unique_and_store(&self, key: i32) -> Result<bool, FlushFailure<bool>>;

    fn contains(&self, key: i32) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write outstanding keys to durable storage, if any.
    fn flush(&self) -> Result<(), PersistError> {
        Ok(())
    }
}

/// Store every key; novel if any of them was new.
pub fn check_all<C: HashCache + ?Sized>(
    cache: &C,
    keys: &[i32],
) -> Result<bool, FlushFailure<bool>> {
    let mut novel = false;
    let mut failure = None;
    for &key in keys {
        match cache.check_unique_and_store(key) {
            Ok(n) => novel |= n,
            Err(f) => {
                let (n, source) = f.into_parts();
                novel |= n;
                failure.get_or_insert(source);
            }
        }
    }
    match failure {
        Some(source) => Err(FlushFailure {
            value: novel,
            source,
        }),
        None => Ok(novel),
    }
}

/// Cache held only in memory.
#[derive(Debug, Default)]
pub struct MemoryHashCache {
    keys: Mutex<HashSet<i32>>,
}

impl MemoryHashCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HashCache for MemoryHashCache {
    fn check_unique_and_store(&self, key: i32) -> Result<bool, FlushFailure<bool>> {
        Ok(self
            .keys
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(key))
    }

    fn contains(&self, key: i32) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&key)
    }

    fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[derive(Debug, Default)]
struct KeySet(HashSet<i32>);

#[derive(Serialize, Deserialize)]
struct KeyDocument {
    keys: Vec<i32>,
}

impl PersistentState for KeySet {
    type Document = KeyDocument;

    fn to_document(&self) -> KeyDocument {
        let mut keys: Vec<i32> = self.0.iter().copied().collect();
        keys.sort_unstable();
        KeyDocument { keys }
    }

    fn from_document(document: KeyDocument) -> Self {
        KeySet(document.keys.into_iter().collect())
    }

    fn record_count(&self) -> usize {
        self.0.len()
    }
}

/// Cache mirrored to a file; see [`crate::persist`] for the write policy.
#[derive(Debug)]
pub struct FileHashCache {
    persisted: Persisted<KeySet>,
}

impl FileHashCache {
    /// Load the cache from `config.path`, creating the file if missing.
    pub fn open(config: PersistConfig) -> Result<Self, PersistError> {
        Ok(Self {
            persisted: Persisted::open(config)?,
        })
    }

    /// Flush outstanding keys and release the file.
    pub fn close(self) -> Result<(), PersistError> {
        self.persisted.close()
    }
}

impl HashCache for FileHashCache {
    fn check_unique_and_store(&self, key: i32) -> Result<bool, FlushFailure<bool>> {
        self.persisted.mutate(|set| {
            let novel = set.0.insert(key);
            (novel, novel)
        })
    }

    fn contains(&self, key: i32) -> bool {
        self.persisted.read(|set| set.0.contains(&key))
    }

    fn len(&self) -> usize {
        self.persisted.read(|set| set.0.len())
    }

    fn flush(&self) -> Result<(), PersistError> {
        self.persisted.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_store_is_novel() {
        let cache = MemoryHashCache::new();
        assert!(cache.check_unique_and_store(5).unwrap());
        assert!(!cache.check_unique_and_store(5).unwrap());
        assert!(!cache.check_unique_and_store(5).unwrap());
        assert!(cache.contains(5));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_check_all_stores_every_key() {
        let cache = MemoryHashCache::new();
        assert!(check_all(&cache, &[1, 2]).unwrap());
        assert!(check_all(&cache, &[2, 3]).unwrap());
        assert!(!check_all(&cache, &[1, 3]).unwrap());
        assert!(!check_all(&cache, &[]).unwrap());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_save_load_save_is_byte_identical() {
        use crate::persist::file::{encode, read_document, write_atomic};
        use crate::persist::FileFormat;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let original = KeySet([9, -4, 77, 0, 12].into_iter().collect());
        let first = encode(&path, &original.to_document(), FileFormat::JsonPretty).unwrap();
        write_atomic(&path, &first).unwrap();

        let loaded = KeySet::from_document(read_document(&path).unwrap());
        let second = encode(&path, &loaded.to_document(), FileFormat::JsonPretty).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_same_key_single_winner() {
        let cache = Arc::new(MemoryHashCache::new());
        for key in 0..50 {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let cache = Arc::clone(&cache);
                    thread::spawn(move || cache.check_unique_and_store(key).unwrap())
                })
                .collect();
            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&novel| novel)
                .count();
            assert_eq!(winners, 1, "key {key}");
        }
    }
}
