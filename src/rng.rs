//! Uniform random source consumed by the battle simulator.
//!
//! Any `rand` generator satisfies [`RandomSource`] through the blanket impl,
//! so callers pick the algorithm (small/fast, cryptographic, OS entropy)
//! without the engine caring which one it gets.

use rand::{Rng, RngCore};

/// Capability the simulator needs from a random number generator.
pub trait RandomSource {
    /// Uniform value in `[0, 1)`.
    fn next_double(&mut self) -> f64;

    /// Uniform value in `[min, max)`; returns `min` when the range is empty.
    fn next_int(&mut self, min: i32, max: i32) -> i32;

    /// Full-range 32-bit value.
    fn next_uint(&mut self) -> u32;

    /// Full-range 64-bit value.
    fn next_ulong(&mut self) -> u64;

    /// Fill `buffer` with random bytes.
    fn next_bytes(&mut self, buffer: &mut [u8]);

    /// Zero-based roll of a six-sided die.
    fn dice_roll(&mut self) -> i32 {
        self.next_int(0, 6)
    }
}

impl<R: RngCore> RandomSource for R {
    fn next_double(&mut self) -> f64 {
        self.random::<f64>()
    }

    fn next_int(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        self.random_range(min..max)
    }

    fn next_uint(&mut self) -> u32 {
        self.next_u32()
    }

    fn next_ulong(&mut self) -> u64 {
        self.next_u64()
    }

    fn next_bytes(&mut self, buffer: &mut [u8]) {
        self.fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn same_seed_same_sequence() {
        let mut a = SmallRng::seed_from_u64(7);
        let mut b = SmallRng::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(a.next_ulong(), b.next_ulong());
        }
    }

    #[test]
    fn next_int_respects_bounds() {
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..1000 {
            let v = rng.next_int(2, 5);
            assert!((2..5).contains(&v));
            assert!((0..6).contains(&rng.dice_roll()));
        }
        assert_eq!(rng.next_int(3, 3), 3);
    }

    #[test]
    fn next_double_in_unit_interval() {
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..1000 {
            let v = rng.next_double();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn next_bytes_fills_buffer() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut buf = [0u8; 64];
        rng.next_bytes(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
