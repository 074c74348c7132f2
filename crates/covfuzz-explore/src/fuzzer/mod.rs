//! The coverage-guided worker loop.
//!
//! Workers repeatedly take a test case off the input queue, derive candidate
//! payloads from it, run each against the target, and report every
//! [`ExecutionResult`] on the results channel. A candidate whose branch hits
//! produce a key the novelty cache has not seen joins the queue. The seed
//! itself goes back to the queue, with a fresh RNG seed, before its round
//! starts: a worker mutates a copy, so a flush in the middle of the round
//! still writes every corpus entry.
//!
//! A run ends when the execution budget is spent, when the stop flag is
//! raised, when a persistence write fails, or when the queue is empty and no
//! worker still holds a test case.

mod stats;

pub use stats::FuzzStats;

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher as _};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use covfuzz_corpus::{check_all, FlushFailure, HashCache, InputQueue, PersistError, TestCase};
use covfuzz_coverage::{Hasher, TrackError};
use crossbeam::channel::Sender;
use crossbeam::utils::Backoff;
use rand::{Rng, RngCore};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::execution::{execute, ExecutionResult, Target};
use crate::layout::ParamLayout;
use crate::mutate::{MutationConfig, Mutator, Stage};
use crate::rng::stage_rng;
use crate::seeds::SeedSource;
use stats::Counters;

/// Recently retained payloads kept as splice partners.
const SPLICE_POOL: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum FuzzError {
    #[error("persistence failed: {0}")]
    Persist(#[from] PersistError),

    #[error("coverage tracking failed: {0}")]
    Track(#[from] TrackError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid configuration JSON: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzConfig {
    /// Worker threads.
    pub workers: usize,
    /// Execution budget for the run, bootstrap included (0 = unlimited).
    pub max_executions: u64,
    /// How branch hits become novelty keys.
    pub hasher: Hasher,
    /// Campaign seed, mixed into every round's RNG.
    pub seed: u64,
    pub mutation: MutationConfig,
    /// How payloads decode into target parameters.
    pub layout: ParamLayout,
    /// Typed values to bias parameter generation with.
    pub seeds: SeedSource,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_executions: 100_000,
            hasher: Hasher::default(),
            seed: 0,
            mutation: MutationConfig::default(),
            layout: ParamLayout::default(),
            seeds: SeedSource::default(),
        }
    }
}

impl FuzzConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, FuzzError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FuzzError> {
        if self.workers == 0 {
            return Err(FuzzError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.mutation.max_payload_len == 0 {
            return Err(FuzzError::InvalidConfig(
                "mutation.max_payload_len must be at least 1".into(),
            ));
        }
        if self.mutation.havoc_stack == 0 {
            return Err(FuzzError::InvalidConfig(
                "mutation.havoc_stack must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// State shared by the workers of one run.
struct RunState {
    counters: Counters,
    /// Workers currently holding a dequeued test case.
    in_flight: AtomicUsize,
    /// Fingerprints of payloads that already had their deterministic round.
    visited: Mutex<HashSet<u64>>,
    recent: Mutex<VecDeque<Vec<u8>>>,
    error: Mutex<Option<FuzzError>>,
}

impl RunState {
    fn new() -> Self {
        Self {
            counters: Counters::default(),
            in_flight: AtomicUsize::new(0),
            visited: Mutex::new(HashSet::new()),
            recent: Mutex::new(VecDeque::with_capacity(SPLICE_POOL)),
            error: Mutex::new(None),
        }
    }

    /// True the first time a payload is seen in this run.
    fn first_visit(&self, bytes: &[u8]) -> bool {
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        lock(&self.visited).insert(hasher.finish())
    }

    fn remember(&self, bytes: &[u8]) {
        let mut recent = lock(&self.recent);
        if recent.len() == SPLICE_POOL {
            recent.pop_front();
        }
        recent.push_back(bytes.to_vec());
    }

    fn partner(&self, rng: &mut ChaCha8Rng) -> Option<Vec<u8>> {
        let recent = lock(&self.recent);
        if recent.is_empty() {
            return None;
        }
        recent.get(rng.gen_range(0..recent.len())).cloned()
    }

    /// Keep the first error; later ones are only logged.
    fn fail(&self, stop: &AtomicBool, error: FuzzError) {
        warn!(error = %error, "stopping run");
        stop.store(true, Ordering::SeqCst);
        lock(&self.error).get_or_insert(error);
    }

    fn take_error(&self) -> Option<FuzzError> {
        lock(&self.error).take()
    }
}

/// Drives a target with mutated inputs until the run ends.
pub struct Fuzzer {
    config: FuzzConfig,
    target: Arc<dyn Target>,
    cache: Arc<dyn HashCache>,
    queue: Arc<dyn InputQueue>,
    mutator: Mutator,
    stop: Arc<AtomicBool>,
}

impl Fuzzer {
    pub fn new(
        config: FuzzConfig,
        target: Arc<dyn Target>,
        cache: Arc<dyn HashCache>,
        queue: Arc<dyn InputQueue>,
    ) -> Result<Self, FuzzError> {
        config.validate()?;
        let mutator = Mutator::new(config.mutation.clone());
        Ok(Self {
            config,
            target,
            cache,
            queue,
            mutator,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &FuzzConfig {
        &self.config
    }

    /// Raising this flag ends a run after in-flight executions finish.
    ///
    /// A flag raised before [`Fuzzer::run`] is called makes that run return
    /// without executing anything. Every run clears the flag on its way out.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Fuzz until the run ends, sending every execution on `results`.
    ///
    /// A closed results channel does not stop the run. Persistence failures
    /// do: the in-memory corpus keeps the change and the run returns the
    /// first error after trying to flush what it has.
    pub fn run(&self, results: &Sender<ExecutionResult>) -> Result<FuzzStats, FuzzError> {
        let started = Instant::now();
        let run = RunState::new();

        info!(
            target_name = self.target.name(),
            workers = self.config.workers,
            max_executions = self.config.max_executions,
            corpus = self.queue.len(),
            "starting run"
        );

        let driven = self.drive(&run, results);
        self.stop.store(false, Ordering::SeqCst);
        driven?;

        let flushed = self.cache.flush().and_then(|()| self.queue.flush());
        if let Some(error) = run.take_error() {
            return Err(error);
        }
        flushed?;

        let stats = run
            .counters
            .snapshot(self.queue.len(), started.elapsed());
        info!(
            executions = stats.executions,
            novel = stats.novel,
            failures = stats.failures,
            corpus = stats.corpus_size,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(stats)
    }

    fn drive(&self, run: &RunState, results: &Sender<ExecutionResult>) -> Result<(), FuzzError> {
        self.bootstrap(run, results)?;
        if self.stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("covfuzz-worker-{i}"))
            .build()?;
        pool.scope(|s| {
            for _ in 0..self.config.workers {
                s.spawn(move |_| self.worker(run, results));
            }
        });
        Ok(())
    }

    /// Payloads to start from: all zeroes, and one per seed value.
    fn initial_payloads(&self) -> Vec<Vec<u8>> {
        let zero = vec![0u8; self.config.layout.fixed_width()];
        let mut payloads = vec![zero.clone()];
        let slot = self.config.seeds.kind().and_then(|kind| {
            self.config
                .layout
                .slot_offsets()
                .into_iter()
                .find(|&(_, param)| param.accepts(kind))
                .map(|(offset, _)| offset)
        });
        for value in self.config.seeds.encoded_all() {
            let payload = match slot {
                Some(offset) => {
                    let mut payload = zero.clone();
                    payload[offset..offset + value.len()].copy_from_slice(&value);
                    payload
                }
                None => value,
            };
            if !payloads.contains(&payload) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Seed an empty queue so workers have something to take.
    fn bootstrap(&self, run: &RunState, results: &Sender<ExecutionResult>) -> Result<(), FuzzError> {
        if !self.queue.is_empty() {
            debug!(corpus = self.queue.len(), "resuming from persisted queue");
            return Ok(());
        }
        let mut rng = stage_rng(self.config.seed, 0);
        for payload in self.initial_payloads() {
            if self.stop.load(Ordering::SeqCst)
                || !run.counters.reserve(self.config.max_executions)
            {
                break;
            }
            let result = execute(self.target.as_ref(), self.config.layout.decode(&payload))?;
            run.counters.record_execution(result.is_success());
            let keys = self.config.hasher.keys(result.branch_hits());
            let hits = result.branch_hits().to_vec();
            let _ = results.send(result);

            if settle(run, &self.stop, check_all(self.cache.as_ref(), &keys)) {
                run.counters.record_novel();
            }
            run.remember(&payload);
            settle(
                run,
                &self.stop,
                self.queue.enqueue(TestCase::new(payload, hits, rng.next_u64())),
            );
        }
        Ok(())
    }

    fn worker(&self, run: &RunState, results: &Sender<ExecutionResult>) {
        let backoff = Backoff::new();
        while !self.stop.load(Ordering::SeqCst) {
            run.in_flight.fetch_add(1, Ordering::SeqCst);
            let entry = settle(run, &self.stop, self.queue.dequeue());
            let Some(test_case) = entry else {
                let holders = run.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
                if holders == 0 && self.queue.is_empty() {
                    debug!("queue drained");
                    break;
                }
                backoff.snooze();
                continue;
            };
            backoff.reset();
            self.fuzz_one(test_case, run, results);
            run.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// One round on a dequeued test case.
    ///
    /// The test case goes straight back into the queue under its next seed;
    /// the round works from the checked-out copy.
    fn fuzz_one(&self, test_case: TestCase, run: &RunState, results: &Sender<ExecutionResult>) {
        let stage = if run.first_visit(&test_case.bytes) {
            Stage::Deterministic
        } else {
            Stage::Havoc
        };
        let mut rng = stage_rng(self.config.seed, test_case.seed);
        let next = TestCase {
            seed: rng.next_u64(),
            ..test_case.clone()
        };
        settle(run, &self.stop, self.queue.enqueue(next));
        if self.stop.load(Ordering::SeqCst) {
            return;
        }

        let partner = run.partner(&mut rng);
        let candidates = self.mutator.candidates(
            &test_case.bytes,
            partner.as_deref(),
            &self.config.seeds,
            &self.config.layout,
            stage,
            &mut rng,
        );

        for bytes in candidates {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            if !run.counters.reserve(self.config.max_executions) {
                self.stop.store(true, Ordering::SeqCst);
                break;
            }
            if let Err(error) = self.try_candidate(bytes, run, results, &mut rng) {
                run.fail(&self.stop, error);
                break;
            }
        }
    }

    fn try_candidate(
        &self,
        bytes: Vec<u8>,
        run: &RunState,
        results: &Sender<ExecutionResult>,
        rng: &mut ChaCha8Rng,
    ) -> Result<(), FuzzError> {
        let result = execute(self.target.as_ref(), self.config.layout.decode(&bytes))?;
        run.counters.record_execution(result.is_success());
        let keys = self.config.hasher.keys(result.branch_hits());
        let hits = result.branch_hits().to_vec();
        // The consumer may have gone away; the run carries on.
        let _ = results.send(result);

        if settle(run, &self.stop, check_all(self.cache.as_ref(), &keys)) {
            run.counters.record_novel();
            debug!(
                len = bytes.len(),
                keys = keys.len(),
                executions = run.counters.executions(),
                "new coverage"
            );
            run.remember(&bytes);
            settle(
                run,
                &self.stop,
                self.queue.enqueue(TestCase::new(bytes, hits, rng.next_u64())),
            );
        }
        Ok(())
    }
}

/// Take the logical result of a corpus operation, recording a failed flush.
fn settle<T>(run: &RunState, stop: &AtomicBool, outcome: Result<T, FlushFailure<T>>) -> T {
    match outcome {
        Ok(value) => value,
        Err(failure) => {
            let (value, source) = failure.into_parts();
            run.fail(stop, source.into());
            value
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
