//! Seeded linear congruential generator
//!
//! `s = (s * A + C) mod M`. The constants and the modulus are part of the
//! backend contract: the contract runs the same recurrence, so changing any
//! of them on one side only breaks replay.

use serde::{Deserialize, Serialize};

use crate::consts::{LCG_A, LCG_C, LCG_MASK};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lcg {
    state: u64,
    /// Values drawn so far
    draws: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed & LCG_MASK,
            draws: 0,
        }
    }

    /// Advance and return the raw 31-bit value.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> u32 {
        self.state = (self.state.wrapping_mul(LCG_A).wrapping_add(LCG_C)) & LCG_MASK;
        self.draws += 1;
        self.state as u32
    }

    /// `next() % n`, the only way procedural code picks among `n` options.
    ///
    /// Panics if `n` is zero.
    pub fn pick(&mut self, n: usize) -> usize {
        assert!(n > 0, "pick from an empty set");
        self.next() as usize % n
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed_for_level;

    #[test]
    fn test_golden_vector_level_one() {
        let mut rng = Lcg::new(seed_for_level(1));
        let got: Vec<u32> = (0..10).map(|_| rng.next()).collect();
        assert_eq!(
            got,
            vec![
                1705426646, 2027284541, 1204358264, 877946231, 1841595498, 176548033,
                1523690284, 445918363, 2061367614, 1108430725,
            ]
        );
        assert_eq!(rng.draws(), 10);
    }

    #[test]
    fn test_golden_vector_zero_seed() {
        let mut rng = Lcg::new(0);
        assert_eq!(rng.next(), 1013904223);
        assert_eq!(rng.next(), 1196435762);
        assert_eq!(rng.next(), 1372387049);
    }

    #[test]
    fn test_values_stay_below_modulus() {
        let mut rng = Lcg::new(u64::MAX);
        for _ in 0..1000 {
            assert!(rng.next() < 1 << 31);
        }
    }

    #[test]
    fn test_cloned_generator_continues_identically() {
        let mut a = Lcg::new(99);
        a.next();
        let mut b = a.clone();
        for _ in 0..50 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    #[should_panic(expected = "pick from an empty set")]
    fn test_pick_from_empty_set_panics() {
        Lcg::new(1).pick(0);
    }
}
