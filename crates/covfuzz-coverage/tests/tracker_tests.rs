use std::sync::{Arc, Barrier};
use std::thread;

use covfuzz_coverage::{
    begin_tracking, end_tracking, is_tracking, probe, switch_branch_id, BranchHit, Hasher,
    TrackError,
};

/// A small instrumented function: each branch reports to the probe first.
fn classify(input: &[u8]) -> i32 {
    let first = input.first().copied().unwrap_or(0) as i32;
    probe::if_icmp_lt(first, 10, 1);
    if first < 10 {
        return 0;
    }
    let mut score = 0;
    for &b in input {
        probe::if_icmp_eq(b as i32, b'x' as i32, 2);
        if b == b'x' {
            score += 1;
        }
    }
    probe::lookup_switch(score, &[0, 1, 2], 3);
    score
}

fn run_tracked(input: &[u8]) -> (Vec<BranchHit>, String) {
    let guard = begin_tracking().unwrap();
    classify(input);
    let (hits, path) = guard.finish().sorted_hits();
    (hits, path.to_bit_string())
}

#[test]
fn test_double_begin_is_misuse() {
    let guard = begin_tracking().unwrap();
    match begin_tracking() {
        Err(TrackError::AlreadyTracked { .. }) => {}
        other => panic!("expected AlreadyTracked, got {other:?}"),
    }
    let _ = guard.finish();
}

#[test]
fn test_end_on_untracked_thread_records_nothing() {
    assert!(!is_tracking());
    assert!(end_tracking().is_none());
}

#[test]
fn test_untracked_probes_are_ignored() {
    // Warm-up execution outside any tracked window must not disturb anything.
    classify(b"xxxx");
    assert!(end_tracking().is_none());

    let (hits, _) = run_tracked(b"\x01");
    assert_eq!(hits, vec![BranchHit::new(1, 1)]);
}

#[test]
fn test_replay_is_deterministic() {
    let input = b"zxyxx";
    let first = run_tracked(input);
    let second = run_tracked(input);
    assert_eq!(first, second);

    let (hits, path) = first;
    // lt false, five equality checks (x at 1, 3, 4), switch on 3 misses.
    assert_eq!(path, "0010110");
    assert!(hits.contains(&BranchHit::new(2, 3)));
    assert!(!hits.iter().any(|h| h.branch_id == switch_branch_id(3, 3)));
}

#[test]
fn test_switch_case_is_distinct_branch() {
    let (one, _) = run_tracked(b"zx");
    let (two, _) = run_tracked(b"xx");
    assert!(one.contains(&BranchHit::new(switch_branch_id(3, 1), 1)));
    assert!(two.contains(&BranchHit::new(switch_branch_id(3, 2), 1)));
    assert_ne!(
        Hasher::WithoutHitCounts.hash(&one),
        Hasher::WithoutHitCounts.hash(&two)
    );
}

#[test]
fn test_threads_track_independently() {
    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4u8)
        .map(|n| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let guard = begin_tracking().unwrap();
                barrier.wait();
                let input = vec![b'x'; 10 + n as usize];
                for _ in 0..50 {
                    classify(&input);
                }
                barrier.wait();
                let coverage = guard.finish();
                (n, coverage.hits.count(2), coverage.path.len())
            })
        })
        .collect();

    for h in handles {
        let (n, eq_hits, path_len) = h.join().unwrap();
        let len = 10 + n as usize;
        assert_eq!(eq_hits as usize, 50 * len);
        assert_eq!(path_len, 50 * (len + 2));
    }
}
