//! Noise layer: white, pink and crackle, each generator with its own seed.

use serde::{Deserialize, Serialize};

/// Noise colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseType {
    #[default]
    White,
    Pink,
    Crackle,
}

/// Per-sample probability that the crackle generator fires an impulse.
const CRACKLE_PROBABILITY: f64 = 0.003;
/// Per-sample decay applied to a crackle impulse.
const CRACKLE_DECAY: f64 = 0.995;

/// xorshift32 state; never zero.
#[derive(Debug, Clone)]
pub(crate) struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    pub(crate) fn new(seed: u32) -> Self {
        XorShift32 {
            state: if seed == 0 { 0x2545_F491 } else { seed },
        }
    }

    #[inline]
    pub(crate) fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in [0, 1].
    #[inline]
    pub(crate) fn next_unipolar(&mut self) -> f64 {
        f64::from(self.next_u32()) / f64::from(u32::MAX)
    }

    /// Uniform in [-1, 1].
    #[inline]
    pub(crate) fn next_bipolar(&mut self) -> f64 {
        self.next_unipolar() * 2.0 - 1.0
    }
}

/// A seeded noise source.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    pub noise_type: NoiseType,
    seed: u32,
    rng: XorShift32,
    pink: [f64; 7],
    crackle: f64,
}

impl NoiseGenerator {
    pub fn new(seed: u32) -> Self {
        NoiseGenerator {
            noise_type: NoiseType::White,
            seed,
            rng: XorShift32::new(seed),
            pink: [0.0; 7],
            crackle: 0.0,
        }
    }

    pub fn next_sample(&mut self) -> f64 {
        match self.noise_type {
            NoiseType::White => self.rng.next_bipolar(),
            NoiseType::Pink => self.pink(),
            NoiseType::Crackle => self.crackle(),
        }
    }

    /// Paul Kellet's refined pink noise filter (-3 dB/octave).
    fn pink(&mut self) -> f64 {
        let white = self.rng.next_bipolar();
        let b = &mut self.pink;
        b[0] = 0.99886 * b[0] + white * 0.055_517_9;
        b[1] = 0.99332 * b[1] + white * 0.075_075_9;
        b[2] = 0.96900 * b[2] + white * 0.153_852_0;
        b[3] = 0.86650 * b[3] + white * 0.310_485_6;
        b[4] = 0.55000 * b[4] + white * 0.532_952_2;
        b[5] = -0.7616 * b[5] - white * 0.016_898_0;
        let pink = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362;
        b[6] = white * 0.115_926;
        pink * 0.11
    }

    fn crackle(&mut self) -> f64 {
        if self.rng.next_unipolar() < CRACKLE_PROBABILITY {
            let amplitude = 0.5 + 0.5 * self.rng.next_unipolar();
            self.crackle = if self.rng.next_u32() & 1 == 0 { amplitude } else { -amplitude };
        } else {
            self.crackle *= CRACKLE_DECAY;
        }
        self.crackle
    }

    /// Clear filter memory and restart the sequence from the original seed.
    pub fn reset(&mut self) {
        self.rng = XorShift32::new(self.seed);
        self.pink = [0.0; 7];
        self.crackle = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_noise_is_bounded_and_centred() {
        let mut n = NoiseGenerator::new(1234);
        let mut sum = 0.0;
        for _ in 0..44100 {
            let s = n.next_sample();
            assert!((-1.0..=1.0).contains(&s));
            sum += s;
        }
        let mean = sum / 44100.0;
        assert!(mean.abs() < 0.05, "White noise mean too far from zero: {mean}");
    }

    #[test]
    fn generators_are_independent_of_each_other() {
        let mut a = NoiseGenerator::new(1);
        let mut b = NoiseGenerator::new(2);
        let same = (0..64).filter(|_| a.next_sample() == b.next_sample()).count();
        assert!(same < 4);
    }

    #[test]
    fn reset_replays_sequence() {
        let mut n = NoiseGenerator::new(99);
        n.noise_type = NoiseType::Pink;
        let first: Vec<f64> = (0..32).map(|_| n.next_sample()).collect();
        n.reset();
        let second: Vec<f64> = (0..32).map(|_| n.next_sample()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn pink_noise_is_finite_and_bounded() {
        let mut n = NoiseGenerator::new(7);
        n.noise_type = NoiseType::Pink;
        for _ in 0..100_000 {
            let s = n.next_sample();
            assert!(s.is_finite() && s.abs() < 2.0, "pink sample out of range: {s}");
        }
    }

    #[test]
    fn crackle_is_sparse() {
        let mut n = NoiseGenerator::new(42);
        n.noise_type = NoiseType::Crackle;
        let mut impulses = 0;
        let mut prev = 0.0_f64;
        for _ in 0..100_000 {
            let s = n.next_sample();
            if s.abs() > prev.abs() {
                impulses += 1;
            }
            prev = s;
        }
        // ~0.3% trigger probability
        assert!((150..=500).contains(&impulses), "unexpected impulse count {impulses}");
    }
}
