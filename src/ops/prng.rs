// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Portable seeded random stream.
//!
//! Every random choice an operation makes is drawn from this PCG32 stream.
//! The algorithm is fixed here rather than borrowed from a crate so the byte
//! stream for a given seed can never change underneath stored sequences:
//! same seed -> same key bytes and permutations on every architecture.

/// PCG-XSH-RR 64/32.
#[derive(Clone, Debug)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

const MULTIPLIER: u64 = 6364136223846793005;

/// Stream selectors, so that one seed used by two operation kinds does not
/// produce correlated output.
pub const STREAM_PERMUTE: u64 = 0x7065_726d;
pub const STREAM_XOR: u64 = 0x0078_6f72;
pub const STREAM_SAMPLER: u64 = 0x7361_6d70;

impl Pcg32 {
    pub fn new(seed: u64, stream: u64) -> Self {
        let mut rng = Self {
            state: 0,
            inc: (stream << 1) | 1,
        };
        rng.next_u32();
        rng.state = rng.state.wrapping_add(seed);
        rng.next_u32();
        rng
    }

    pub fn next_u32(&mut self) -> u32 {
        let oldstate = self.state;
        self.state = oldstate.wrapping_mul(MULTIPLIER).wrapping_add(self.inc);
        let xorshifted = (((oldstate >> 18) ^ oldstate) >> 27) as u32;
        let rot = (oldstate >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    pub fn next_u64(&mut self) -> u64 {
        let hi = self.next_u32() as u64;
        let lo = self.next_u32() as u64;
        (hi << 32) | lo
    }

    /// Uniform-ish value in `0..bound` (multiply-shift reduction). `bound` must be non-zero.
    pub fn below(&mut self, bound: u32) -> u32 {
        debug_assert!(bound > 0);
        ((self.next_u32() as u64 * bound as u64) >> 32) as u32
    }

    /// Value in `lo..=hi`.
    pub fn range_inclusive(&mut self, lo: u64, hi: u64) -> u64 {
        debug_assert!(lo <= hi);
        let span = hi - lo;
        if span == u64::MAX {
            return self.next_u64();
        }
        lo + self.next_u64() % (span + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = Pcg32::new(42, STREAM_XOR);
        let mut b = Pcg32::new(42, STREAM_XOR);
        for _ in 0..64 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_streams_diverge() {
        let mut a = Pcg32::new(42, STREAM_XOR);
        let mut b = Pcg32::new(42, STREAM_PERMUTE);
        let xs: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();
        assert_ne!(xs, ys);
    }

    #[test]
    fn test_below_stays_in_bounds() {
        let mut rng = Pcg32::new(7, STREAM_SAMPLER);
        for bound in 1..200 {
            assert!(rng.below(bound) < bound);
        }
        for _ in 0..100 {
            let v = rng.range_inclusive(100, 105);
            assert!((100..=105).contains(&v));
        }
    }
}
