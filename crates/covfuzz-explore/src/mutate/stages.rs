//! Deterministic walks over every position of a payload.
//!
//! Multi-byte windows are read and written little-endian, matching how
//! [`crate::layout::ParamLayout`] decodes parameters.

pub(crate) const INTERESTING_8: [i8; 9] = [-128, -1, 0, 1, 16, 32, 64, 100, 127];

pub(crate) const INTERESTING_16: [i16; 10] =
    [-32768, -129, 128, 255, 256, 512, 1000, 1024, 4096, 32767];

pub(crate) const INTERESTING_32: [i32; 8] = [
    i32::MIN,
    -100_663_046,
    -32769,
    32768,
    65535,
    65536,
    100_663_045,
    i32::MAX,
];

/// Collects candidates up to a cap, dropping copies of the input.
struct Candidates<'a> {
    input: &'a [u8],
    out: Vec<Vec<u8>>,
    limit: usize,
}

impl<'a> Candidates<'a> {
    fn new(input: &'a [u8], limit: usize) -> Self {
        Self {
            input,
            out: Vec::new(),
            limit,
        }
    }

    fn is_full(&self) -> bool {
        self.out.len() >= self.limit
    }

    fn push(&mut self, candidate: Vec<u8>) {
        if !self.is_full() && candidate != self.input {
            self.out.push(candidate);
        }
    }

    /// One candidate per replacement value of each `N`-byte window.
    fn overwrite_windows<const N: usize>(&mut self, values: impl Fn([u8; N]) -> Vec<[u8; N]>) {
        let input = self.input;
        if input.len() < N {
            return;
        }
        for i in 0..=input.len() - N {
            if self.is_full() {
                return;
            }
            let mut window = [0u8; N];
            window.copy_from_slice(&input[i..i + N]);
            for replacement in values(window) {
                let mut candidate = input.to_vec();
                candidate[i..i + N].copy_from_slice(&replacement);
                self.push(candidate);
            }
        }
    }
}

pub(crate) fn deterministic(input: &[u8], arith_max: u8, limit: usize) -> Vec<Vec<u8>> {
    let mut out = Candidates::new(input, limit);

    for width in [1, 2, 4] {
        bitflips(&mut out, width);
    }

    out.overwrite_windows::<1>(|w| vec![w.map(|b| !b)]);
    out.overwrite_windows::<2>(|w| vec![w.map(|b| !b)]);
    out.overwrite_windows::<4>(|w| vec![w.map(|b| !b)]);

    out.overwrite_windows::<1>(|w| {
        (1..=arith_max)
            .flat_map(|d| [[w[0].wrapping_add(d)], [w[0].wrapping_sub(d)]])
            .collect()
    });
    out.overwrite_windows::<2>(|w| {
        let v = u16::from_le_bytes(w);
        (1..=u16::from(arith_max))
            .flat_map(|d| [v.wrapping_add(d), v.wrapping_sub(d)])
            .map(u16::to_le_bytes)
            .collect()
    });
    out.overwrite_windows::<4>(|w| {
        let v = u32::from_le_bytes(w);
        (1..=u32::from(arith_max))
            .flat_map(|d| [v.wrapping_add(d), v.wrapping_sub(d)])
            .map(u32::to_le_bytes)
            .collect()
    });

    out.overwrite_windows::<1>(|_| INTERESTING_8.iter().map(|&v| v.to_le_bytes()).collect());
    out.overwrite_windows::<2>(|_| {
        INTERESTING_8
            .iter()
            .map(|&v| i16::from(v))
            .chain(INTERESTING_16)
            .map(i16::to_le_bytes)
            .collect()
    });
    out.overwrite_windows::<4>(|_| {
        INTERESTING_8
            .iter()
            .map(|&v| i32::from(v))
            .chain(INTERESTING_16.iter().map(|&v| i32::from(v)))
            .chain(INTERESTING_32)
            .map(i32::to_le_bytes)
            .collect()
    });

    out.out
}

/// Flip `width` consecutive bits at every bit offset, most significant bit
/// of each byte first.
fn bitflips(out: &mut Candidates<'_>, width: usize) {
    let input = out.input;
    let bits = input.len() * 8;
    if bits < width {
        return;
    }
    for start in 0..=bits - width {
        if out.is_full() {
            return;
        }
        let mut candidate = input.to_vec();
        for bit in start..start + width {
            flip_bit(&mut candidate, bit);
        }
        out.push(candidate);
    }
}

pub(crate) fn flip_bit(data: &mut [u8], bit: usize) {
    data[bit >> 3] ^= 0x80 >> (bit & 7);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_bitflips_come_first() {
        let out = deterministic(&[0x00], 35, usize::MAX);
        let first: Vec<u8> = out.iter().take(8).map(|c| c[0]).collect();
        assert_eq!(first, vec![0x80, 0x40, 0x20, 0x10, 0x08, 0x04, 0x02, 0x01]);
    }

    #[test]
    fn test_no_candidate_equals_input() {
        let input = [0x00, 0xff, 0x10];
        let out = deterministic(&input, 35, usize::MAX);
        assert!(!out.is_empty());
        assert!(out.iter().all(|c| c.as_slice() != input));
        assert!(out.iter().all(|c| c.len() == input.len()));
    }

    #[test]
    fn test_limit_caps_output() {
        let out = deterministic(&[1, 2, 3, 4, 5, 6], 35, 10);
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_arith_16_is_little_endian() {
        let out = deterministic(&[0xff, 0x00], 1, usize::MAX);
        // 0x00ff + 1 carries into the high byte.
        assert!(out.contains(&vec![0x00, 0x01]));
    }

    #[test]
    fn test_interesting_32_reaches_max() {
        let out = deterministic(&[0, 0, 0, 0], 1, usize::MAX);
        assert!(out.contains(&i32::MAX.to_le_bytes().to_vec()));
    }
}
