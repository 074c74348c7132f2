use covfuzz_coverage::BranchHit;
use serde::{Deserialize, Serialize};

/// An input retained for further mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestCase {
    /// Raw payload handed to the target.
    pub bytes: Vec<u8>,
    /// Sorted hits recorded when the input was accepted.
    pub branch_hits: Vec<BranchHit>,
    /// Seed for reproducible re-mutation of this input.
    pub seed: u64,
}

impl TestCase {
    pub fn new(bytes: Vec<u8>, branch_hits: Vec<BranchHit>, seed: u64) -> Self {
        Self {
            bytes,
            branch_hits,
            seed,
        }
    }
}
