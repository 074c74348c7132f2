use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::{fs, thread};

use covfuzz_corpus::{
    FileHashCache, FileInputQueue, FlushFailure, HashCache, InputQueue, MemoryHashCache,
    MemoryInputQueue, PersistConfig, PersistError,
};
use covfuzz_coverage::probe;
use covfuzz_explore::{
    ExecutionResult, FnTarget, FuzzConfig, FuzzError, Fuzzer, ParamKind, ParamLayout, ParamValue,
    SeedSource, Target, TargetFailure,
};
use serde_json::json;

/// Reaches depth 2 only when the payload starts with `[100, 64]`.
fn nested_target() -> Arc<dyn Target> {
    Arc::new(FnTarget::new("nested", |params: &[ParamValue]| {
        let bytes = params[0].as_bytes().unwrap_or_default();
        probe::if_icmp_lt(bytes.len() as i32, 2, 1);
        if bytes.len() < 2 {
            return Ok(json!(0));
        }
        probe::if_icmp_ne(bytes[0] as i32, 100, 2);
        if bytes[0] != 100 {
            return Ok(json!(0));
        }
        probe::if_icmp_ne(bytes[1] as i32, 64, 3);
        if bytes[1] != 64 {
            return Ok(json!(1));
        }
        Ok(json!(2))
    }))
}

fn config(max_executions: u64, workers: usize) -> FuzzConfig {
    FuzzConfig {
        workers,
        max_executions,
        seed: 42,
        ..FuzzConfig::default()
    }
}

fn collect(fuzzer: &Fuzzer) -> (Result<covfuzz_explore::FuzzStats, FuzzError>, Vec<ExecutionResult>) {
    let (tx, rx) = crossbeam::channel::unbounded();
    let outcome = fuzzer.run(&tx);
    drop(tx);
    (outcome, rx.iter().collect())
}

#[test]
fn test_discovers_nested_branch() {
    let fuzzer = Fuzzer::new(
        config(20_000, 2),
        nested_target(),
        Arc::new(MemoryHashCache::new()),
        Arc::new(MemoryInputQueue::new()),
    )
    .unwrap();

    let (stats, results) = collect(&fuzzer);
    let stats = stats.unwrap();

    assert!(
        results
            .iter()
            .any(|r| r.return_value() == Some(&json!(2))),
        "depth 2 never reached in {} executions",
        results.len()
    );
    assert!(stats.novel >= 3);
    assert_eq!(stats.failures, 0);
}

#[test]
fn test_every_execution_is_reported_once() {
    let fuzzer = Fuzzer::new(
        config(1_500, 3),
        nested_target(),
        Arc::new(MemoryHashCache::new()),
        Arc::new(MemoryInputQueue::new()),
    )
    .unwrap();

    let (stats, results) = collect(&fuzzer);
    let stats = stats.unwrap();
    assert_eq!(stats.executions, 1_500);
    assert_eq!(results.len(), 1_500);
    assert!(results.iter().all(|r| r.target() == "nested"));
}

#[test]
fn test_single_worker_run_is_reproducible() {
    let payloads = |seed: u64| {
        let fuzzer = Fuzzer::new(
            FuzzConfig {
                seed,
                ..config(400, 1)
            },
            nested_target(),
            Arc::new(MemoryHashCache::new()),
            Arc::new(MemoryInputQueue::new()),
        )
        .unwrap();
        let (stats, results) = collect(&fuzzer);
        stats.unwrap();
        results
            .into_iter()
            .map(|r| r.params().to_vec())
            .collect::<Vec<_>>()
    };

    assert_eq!(payloads(7), payloads(7));
    assert_ne!(payloads(7), payloads(8));
}

#[test]
fn test_target_failures_are_results() {
    let target: Arc<dyn Target> = Arc::new(FnTarget::new("picky", |params: &[ParamValue]| {
        let bytes = params[0].as_bytes().unwrap_or_default();
        probe::if_eq(bytes.len() as i32, 4);
        if bytes.is_empty() {
            Ok(json!(null))
        } else {
            Err(TargetFailure::new("Rejected", "non-empty input"))
        }
    }));
    let fuzzer = Fuzzer::new(
        config(200, 1),
        target,
        Arc::new(MemoryHashCache::new()),
        Arc::new(MemoryInputQueue::new()),
    )
    .unwrap();

    let (stats, results) = collect(&fuzzer);
    let stats = stats.unwrap();
    assert!(stats.failures > 0);
    assert_eq!(
        stats.failures as usize,
        results.iter().filter(|r| !r.is_success()).count()
    );
    assert!(results
        .iter()
        .filter_map(|r| r.failure())
        .all(|f| f.kind == "Rejected"));
}

#[test]
fn test_seed_values_fill_typed_parameters() {
    let target: Arc<dyn Target> = Arc::new(FnTarget::new("typed", |params: &[ParamValue]| {
        let n = params[1].as_int().unwrap_or(0);
        probe::if_icmp_eq(n, 0x1234_5678, 1);
        Ok(json!(n))
    }));
    let fuzzer = Fuzzer::new(
        FuzzConfig {
            layout: ParamLayout::new(vec![ParamKind::Long, ParamKind::Int]).unwrap(),
            seeds: SeedSource::from_ints(vec![0x1234_5678]),
            ..config(50, 1)
        },
        target,
        Arc::new(MemoryHashCache::new()),
        Arc::new(MemoryInputQueue::new()),
    )
    .unwrap();

    let (stats, results) = collect(&fuzzer);
    stats.unwrap();
    // Bootstrap runs the zero payload, then the seed payload.
    assert_eq!(results[0].params(), &[ParamValue::Long(0), ParamValue::Int(0)]);
    assert_eq!(
        results[1].params(),
        &[ParamValue::Long(0), ParamValue::Int(0x1234_5678)]
    );
}

#[test]
fn test_stop_flag_ends_unbounded_run() {
    let fuzzer = Fuzzer::new(
        config(0, 2),
        nested_target(),
        Arc::new(MemoryHashCache::new()),
        Arc::new(MemoryInputQueue::new()),
    )
    .unwrap();
    let stop = fuzzer.stop_flag();
    let (tx, rx) = crossbeam::channel::unbounded();

    let watcher = thread::spawn(move || {
        let seen = rx.iter().take(500).count();
        stop.store(true, Ordering::SeqCst);
        seen
    });
    let stats = fuzzer.run(&tx).unwrap();
    drop(tx);

    assert_eq!(watcher.join().unwrap(), 500);
    assert!(stats.executions >= 500);
}

#[test]
fn test_stop_raised_before_run_is_honoured_once() {
    let fuzzer = Fuzzer::new(
        config(100, 2),
        nested_target(),
        Arc::new(MemoryHashCache::new()),
        Arc::new(MemoryInputQueue::new()),
    )
    .unwrap();
    fuzzer.stop_flag().store(true, Ordering::SeqCst);

    let (stats, results) = collect(&fuzzer);
    assert_eq!(stats.unwrap().executions, 0);
    assert!(results.is_empty());
    assert!(!fuzzer.stop_flag().load(Ordering::SeqCst));

    let (stats, _) = collect(&fuzzer);
    assert_eq!(stats.unwrap().executions, 100);
}

#[test]
fn test_dropped_receiver_does_not_stop_run() {
    let fuzzer = Fuzzer::new(
        config(300, 2),
        nested_target(),
        Arc::new(MemoryHashCache::new()),
        Arc::new(MemoryInputQueue::new()),
    )
    .unwrap();
    let (tx, rx) = crossbeam::channel::unbounded();
    drop(rx);
    let stats = fuzzer.run(&tx).unwrap();
    assert_eq!(stats.executions, 300);
}

fn persist_configs(dir: &tempfile::TempDir) -> (PersistConfig, PersistConfig) {
    let path = |name: &str| -> PathBuf { dir.path().join(name) };
    (
        PersistConfig::new(path("hash_cache.json"), 10),
        PersistConfig::new(path("input_queue.json"), 10),
    )
}

#[test]
fn test_file_backed_run_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let (cache_config, queue_config) = persist_configs(&dir);

    let first_corpus = {
        let cache = Arc::new(FileHashCache::open(cache_config.clone()).unwrap());
        let queue = Arc::new(FileInputQueue::open(queue_config.clone()).unwrap());
        let fuzzer = Fuzzer::new(config(600, 2), nested_target(), cache.clone(), queue.clone())
            .unwrap();
        let (stats, _) = collect(&fuzzer);
        let stats = stats.unwrap();
        assert_eq!(stats.corpus_size, queue.len());
        (cache.len(), queue.len())
    };
    assert!(first_corpus.0 > 0);
    assert!(first_corpus.1 > 0);

    let cache = Arc::new(FileHashCache::open(cache_config).unwrap());
    let queue = Arc::new(FileInputQueue::open(queue_config).unwrap());
    assert_eq!((cache.len(), queue.len()), first_corpus);

    let fuzzer = Fuzzer::new(config(300, 2), nested_target(), cache.clone(), queue.clone()).unwrap();
    let (stats, results) = collect(&fuzzer);
    let stats = stats.unwrap();
    assert_eq!(stats.executions, 300);
    assert_eq!(results.len(), 300);
    assert!(cache.len() >= first_corpus.0);
    assert!(queue.len() >= first_corpus.1);
}

fn persisted_entries(path: &std::path::Path) -> Vec<serde_json::Value> {
    let document: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    document["entries"].as_array().cloned().unwrap_or_default()
}

#[test]
fn test_queue_file_keeps_seed_during_its_round() {
    let dir = tempfile::tempdir().unwrap();
    let queue_path = dir.path().join("input_queue.json");
    let queue = Arc::new(FileInputQueue::open(PersistConfig::new(&queue_path, 0)).unwrap());

    // Entries on disk at each execution.
    let observed = Arc::new(Mutex::new(Vec::new()));
    let target: Arc<dyn Target> = Arc::new(FnTarget::new("snapshot", {
        let observed = Arc::clone(&observed);
        let queue_path = queue_path.clone();
        move |_: &[ParamValue]| -> Result<serde_json::Value, TargetFailure> {
            observed
                .lock()
                .unwrap()
                .push(persisted_entries(&queue_path).len());
            Ok(json!(null))
        }
    }));
    let fuzzer = Fuzzer::new(
        config(40, 1),
        target,
        Arc::new(MemoryHashCache::new()),
        queue,
    )
    .unwrap();

    let (stats, _) = collect(&fuzzer);
    assert_eq!(stats.unwrap().executions, 40);

    let observed = observed.lock().unwrap();
    // The bootstrap execution runs before anything is queued; every
    // mutation round runs with its seed still on disk.
    assert_eq!(observed[0], 0);
    assert!(observed[1..].iter().all(|&n| n >= 1), "{observed:?}");
    let entries = persisted_entries(&queue_path);
    assert!(entries.iter().any(|e| e["bytes"] == json!([])));
}

/// Cache whose writes always fail after updating memory.
struct FailingCache(MemoryHashCache);

impl HashCache for FailingCache {
    fn check_unique_and_store(&self, key: i32) -> Result<bool, FlushFailure<bool>> {
        let novel = self.0.check_unique_and_store(key).unwrap_or(false);
        Err(FlushFailure {
            value: novel,
            source: PersistError::Io {
                path: PathBuf::from("unwritable/hash_cache.json"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            },
        })
    }

    fn contains(&self, key: i32) -> bool {
        self.0.contains(key)
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

#[test]
fn test_persistence_failure_aborts_run() {
    let cache = Arc::new(FailingCache(MemoryHashCache::new()));
    let fuzzer = Fuzzer::new(
        config(1_000, 2),
        nested_target(),
        cache.clone(),
        Arc::new(MemoryInputQueue::new()),
    )
    .unwrap();

    let (outcome, results) = collect(&fuzzer);
    match outcome {
        Err(FuzzError::Persist(PersistError::Io { .. })) => {}
        other => panic!("expected a persistence error, got {other:?}"),
    }
    // The logical insert still happened.
    assert!(!cache.is_empty());
    assert!(results.len() < 1_000);
}
