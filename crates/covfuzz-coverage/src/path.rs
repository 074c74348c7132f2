//! Ordered record of branch decisions for one execution.

use std::fmt;

const WORD_BITS: usize = u64::BITS as usize;

/// Bit sequence where bit `i` is set iff the `i`-th branch decision taken on
/// the tracked thread went the "taken" way.
///
/// The cursor only moves forward; a new path is started per execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CoveragePath {
    words: Vec<u64>,
    len: usize,
}

impl CoveragePath {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            len: 0,
        }
    }

    /// Write `taken` at the cursor and advance it by one.
    pub fn push(&mut self, taken: bool) {
        let word = self.len / WORD_BITS;
        let bit = self.len % WORD_BITS;
        if word == self.words.len() {
            self.words.push(0);
        }
        if taken {
            self.words[word] |= 1 << bit;
        } else {
            self.words[word] &= !(1 << bit);
        }
        self.len += 1;
    }

    /// Outcome of the `index`-th decision, `None` past the cursor.
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        Some(self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0)
    }

    /// Number of decisions recorded.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of decisions that were taken.
    pub fn taken_count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.words[i / WORD_BITS] & (1 << (i % WORD_BITS)) != 0)
    }

    /// Render as a string of `0`/`1`, first decision first.
    pub fn to_bit_string(&self) -> String {
        self.iter().map(|taken| if taken { '1' } else { '0' }).collect()
    }
}

impl fmt::Display for CoveragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_bit_string())
    }
}
