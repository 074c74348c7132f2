//! Stacked random mutations.

use rand::Rng;

use super::stages::{flip_bit, INTERESTING_16, INTERESTING_32, INTERESTING_8};
use super::MutationConfig;
use crate::layout::ParamLayout;
use crate::seeds::SeedSource;

#[derive(Debug, Clone, Copy)]
enum Op {
    FlipBit,
    Interesting,
    RandomByte,
    Arith,
    DeleteChunk,
    CloneChunk,
    OverwriteChunk,
    InsertRandom,
    Splice,
    SeedValue,
}

const OPS: [Op; 10] = [
    Op::FlipBit,
    Op::Interesting,
    Op::RandomByte,
    Op::Arith,
    Op::DeleteChunk,
    Op::CloneChunk,
    Op::OverwriteChunk,
    Op::InsertRandom,
    Op::Splice,
    Op::SeedValue,
];

const MAX_INSERT: usize = 8;

pub(super) struct Havoc<'a> {
    pub config: &'a MutationConfig,
    pub partner: Option<&'a [u8]>,
    pub seeds: &'a SeedSource,
    pub layout: &'a ParamLayout,
}

impl Havoc<'_> {
    /// Apply between one and `havoc_stack` operators to a copy of `input`.
    /// The result may exceed `max_payload_len`; the caller clamps it.
    pub fn mutate<R: Rng + ?Sized>(&self, input: &[u8], rng: &mut R) -> Vec<u8> {
        let mut data = input.to_vec();
        let stack = rng.gen_range(1..=self.config.havoc_stack.max(1));
        for _ in 0..stack {
            let op = OPS[rng.gen_range(0..OPS.len())];
            if !self.apply(op, &mut data, rng) {
                self.fallback(&mut data, rng);
            }
        }
        data
    }

    /// Growth on an empty payload, a bit flip otherwise.
    fn fallback<R: Rng + ?Sized>(&self, data: &mut Vec<u8>, rng: &mut R) {
        if data.is_empty() {
            insert_random(data, rng);
        } else {
            let bit = rng.gen_range(0..data.len() * 8);
            flip_bit(data, bit);
        }
    }

    /// Returns false when `op` does not apply to the current payload.
    fn apply<R: Rng + ?Sized>(&self, op: Op, data: &mut Vec<u8>, rng: &mut R) -> bool {
        let len = data.len();
        let room = self.config.max_payload_len.saturating_sub(len);
        match op {
            Op::FlipBit if len > 0 => {
                let bit = rng.gen_range(0..len * 8);
                flip_bit(data, bit);
            }
            Op::Interesting if len > 0 => {
                let width = pick_width(len, rng);
                let pos = rng.gen_range(0..=len - width);
                let bytes = match width {
                    1 => INTERESTING_8[rng.gen_range(0..INTERESTING_8.len())]
                        .to_le_bytes()
                        .to_vec(),
                    2 => INTERESTING_16[rng.gen_range(0..INTERESTING_16.len())]
                        .to_le_bytes()
                        .to_vec(),
                    _ => INTERESTING_32[rng.gen_range(0..INTERESTING_32.len())]
                        .to_le_bytes()
                        .to_vec(),
                };
                data[pos..pos + width].copy_from_slice(&bytes);
            }
            Op::RandomByte if len > 0 => {
                let pos = rng.gen_range(0..len);
                data[pos] ^= rng.gen_range(1..=u8::MAX);
            }
            Op::Arith if len > 0 => {
                let width = pick_width(len, rng);
                let pos = rng.gen_range(0..=len - width);
                let delta = u32::from(rng.gen_range(1..=self.config.arith_max.max(1)));
                let negate = rng.gen_bool(0.5);
                let window = &mut data[pos..pos + width];
                match width {
                    1 => {
                        let d = delta as u8;
                        window[0] = if negate {
                            window[0].wrapping_sub(d)
                        } else {
                            window[0].wrapping_add(d)
                        };
                    }
                    2 => {
                        let v = u16::from_le_bytes([window[0], window[1]]);
                        let d = delta as u16;
                        let v = if negate { v.wrapping_sub(d) } else { v.wrapping_add(d) };
                        window.copy_from_slice(&v.to_le_bytes());
                    }
                    _ => {
                        let v = u32::from_le_bytes([window[0], window[1], window[2], window[3]]);
                        let v = if negate {
                            v.wrapping_sub(delta)
                        } else {
                            v.wrapping_add(delta)
                        };
                        window.copy_from_slice(&v.to_le_bytes());
                    }
                }
            }
            Op::DeleteChunk if len > 1 => {
                let n = rng.gen_range(1..len);
                let start = rng.gen_range(0..=len - n);
                data.drain(start..start + n);
            }
            Op::CloneChunk if len > 0 && room > 0 => {
                let n = rng.gen_range(1..=len.min(room));
                let from = rng.gen_range(0..=len - n);
                let to = rng.gen_range(0..=len);
                let chunk = data[from..from + n].to_vec();
                data.splice(to..to, chunk);
            }
            Op::OverwriteChunk if len > 1 => {
                let n = rng.gen_range(1..len);
                let from = rng.gen_range(0..=len - n);
                let to = rng.gen_range(0..=len - n);
                data.copy_within(from..from + n, to);
            }
            Op::InsertRandom if room > 0 => insert_random(data, rng),
            Op::Splice => {
                let Some(partner) = self.partner else {
                    return false;
                };
                // Keep a prefix of ours and take the partner's tail.
                let split = rng.gen_range(0..=len.min(partner.len()));
                data.truncate(split);
                data.extend_from_slice(&partner[split..]);
            }
            Op::SeedValue => return self.insert_seed(data, rng),
            _ => return false,
        }
        true
    }

    /// Write a seed value into a parameter slot of its type, or insert it
    /// raw when the layout has no such slot.
    fn insert_seed<R: Rng + ?Sized>(&self, data: &mut Vec<u8>, rng: &mut R) -> bool {
        let Some(kind) = self.seeds.kind().filter(|_| !self.seeds.is_empty()) else {
            return false;
        };
        let Some(value) = self.seeds.encoded(rng.gen_range(0..self.seeds.len())) else {
            return false;
        };

        let slots: Vec<usize> = self
            .layout
            .slot_offsets()
            .into_iter()
            .filter(|&(_, param)| param.accepts(kind))
            .map(|(offset, _)| offset)
            .collect();

        if slots.is_empty() {
            let pos = rng.gen_range(0..=data.len());
            data.splice(pos..pos, value);
        } else {
            let offset = slots[rng.gen_range(0..slots.len())];
            let end = offset + kind.width();
            if data.len() < end {
                data.resize(end, 0);
            }
            data[offset..end].copy_from_slice(&value);
        }
        true
    }
}

fn insert_random<R: Rng + ?Sized>(data: &mut Vec<u8>, rng: &mut R) {
    let n = rng.gen_range(1..=MAX_INSERT);
    let pos = rng.gen_range(0..=data.len());
    let bytes: Vec<u8> = (0..n).map(|_| rng.gen()).collect();
    data.splice(pos..pos, bytes);
}

/// A window width of 1, 2 or 4 bytes that fits in `len`.
fn pick_width<R: Rng + ?Sized>(len: usize, rng: &mut R) -> usize {
    let widths: &[usize] = match len {
        1 => &[1],
        2 | 3 => &[1, 2],
        _ => &[1, 2, 4],
    };
    widths[rng.gen_range(0..widths.len())]
}
