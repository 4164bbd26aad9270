//! Free-running low frequency oscillator.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::noise::XorShift32;

pub const MIN_LFO_RATE: f64 = 0.01;
pub const MAX_LFO_RATE: f64 = 50.0;
/// Full-scale rate modulation spans ±4 octaves.
const RATE_MOD_OCTAVES: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LfoShape {
    #[default]
    Sine,
    Triangle,
    SawUp,
    SawDown,
    Square,
    SampleAndHold,
}

/// Bipolar LFO whose rate can be modulated every sample.
#[derive(Debug, Clone)]
pub struct Lfo {
    pub shape: LfoShape,
    rate: f64,
    rate_mod: f64,
    phase: f64,
    value: f64,
    held: f64,
    rng: XorShift32,
    seed: u32,
    sample_rate: f64,
}

impl Lfo {
    pub fn new(sample_rate: f64, seed: u32) -> Self {
        Lfo {
            shape: LfoShape::Sine,
            rate: 1.0,
            rate_mod: 0.0,
            phase: 0.0,
            value: 0.0,
            held: 0.0,
            rng: XorShift32::new(seed),
            seed,
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    /// Base rate in Hz, clamped to [0.01, 50].
    pub fn set_rate(&mut self, rate: f64) {
        self.rate = if rate.is_finite() { rate.clamp(MIN_LFO_RATE, MAX_LFO_RATE) } else { 1.0 };
    }

    /// Bipolar modulation amount; ±1 scales the rate by ±4 octaves.
    pub fn set_rate_modulation(&mut self, amount: f64) {
        self.rate_mod = if amount.is_finite() { amount.clamp(-1.0, 1.0) } else { 0.0 };
    }

    pub fn effective_rate(&self) -> f64 {
        (self.rate * (self.rate_mod * RATE_MOD_OCTAVES).exp2()).clamp(MIN_LFO_RATE, MAX_LFO_RATE)
    }

    /// Advance one sample and return the new value in [-1, 1].
    pub fn tick(&mut self) -> f64 {
        let p = self.phase;
        self.value = match self.shape {
            LfoShape::Sine => (TAU * p).sin(),
            LfoShape::Triangle => {
                if p < 0.25 {
                    4.0 * p
                } else if p < 0.75 {
                    2.0 - 4.0 * p
                } else {
                    4.0 * p - 4.0
                }
            }
            LfoShape::SawUp => 2.0 * p - 1.0,
            LfoShape::SawDown => 1.0 - 2.0 * p,
            LfoShape::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoShape::SampleAndHold => self.held,
        };

        self.phase += self.effective_rate() / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
            self.held = self.rng.next_bipolar();
        }
        self.value
    }

    /// Value produced by the last `tick`.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.value = 0.0;
        self.held = 0.0;
        self.rate_mod = 0.0;
        self.rng = XorShift32::new(self.seed);
    }
}
