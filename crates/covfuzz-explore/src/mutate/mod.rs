//! Candidate generation from queued payloads.
//!
//! A round turns one seed payload into a batch of candidate payloads. The
//! first visit to a payload runs the deterministic walks (bit and byte
//! flips, small arithmetic, interesting values) before a havoc batch; later
//! visits only run havoc. All randomness comes from the caller's RNG, so a
//! round is reproducible from its seeds.
//!
//! The mutator only proposes. Whether a candidate is kept is decided by the
//! novelty cache after it runs.

mod havoc;
mod stages;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::layout::ParamLayout;
use crate::seeds::SeedSource;

/// Mutation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    /// Candidates are truncated to this many bytes.
    pub max_payload_len: usize,
    /// Deterministic walks only run on payloads at most this long.
    pub deterministic_limit: usize,
    /// Largest delta tried by the arithmetic stages.
    pub arith_max: u8,
    /// Havoc candidates per round.
    pub havoc_rounds: usize,
    /// Upper bound on operators stacked into one havoc candidate.
    pub havoc_stack: usize,
    /// Cap on deterministic candidates per round.
    pub max_candidates_per_round: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            max_payload_len: 4096,
            deterministic_limit: 32,
            arith_max: 35,
            havoc_rounds: 32,
            havoc_stack: 8,
            max_candidates_per_round: 10_000,
        }
    }
}

/// Which part of the schedule a round runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Deterministic walks followed by havoc.
    Deterministic,
    Havoc,
}

#[derive(Debug, Clone, Default)]
pub struct Mutator {
    config: MutationConfig,
}

impl Mutator {
    pub fn new(config: MutationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    /// Candidates derived from `input` for one round.
    ///
    /// `partner` is another corpus payload used by the splice operator.
    /// Seed values are written into layout slots of the matching type, or
    /// inserted raw when the layout has none. An empty input only grows.
    pub fn candidates<R: Rng + ?Sized>(
        &self,
        input: &[u8],
        partner: Option<&[u8]>,
        seeds: &SeedSource,
        layout: &ParamLayout,
        stage: Stage,
        rng: &mut R,
    ) -> Vec<Vec<u8>> {
        let mut out = Vec::new();

        if stage == Stage::Deterministic {
            if input.is_empty() {
                out.extend(seeds.encoded_all());
            } else if input.len() <= self.config.deterministic_limit {
                out = stages::deterministic(
                    input,
                    self.config.arith_max,
                    self.config.max_candidates_per_round,
                );
            }
        }

        let havoc = havoc::Havoc {
            config: &self.config,
            partner: partner.filter(|p| !p.is_empty()),
            seeds,
            layout,
        };
        for _ in 0..self.config.havoc_rounds {
            out.push(havoc.mutate(input, rng));
        }

        // Clamp before comparing: a candidate that only grew past the limit
        // is the input again once truncated.
        out.into_iter()
            .map(|mut candidate| {
                candidate.truncate(self.config.max_payload_len);
                candidate
            })
            .filter(|candidate| candidate.as_slice() != input)
            .collect()
    }
}
