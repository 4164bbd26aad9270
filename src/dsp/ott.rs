//! OTT: three-band upward/downward compressor.
//!
//! The input is split at 200 Hz and 4 kHz. Each split is two cascaded
//! state-variable low-passes, and the upper band is the input minus the
//! low-passed part, so the three bands always sum back to the input.
//! Each band runs its own peak follower. Above a depth-dependent threshold
//! the band is compressed downward; below it, quiet material is lifted
//! upward, up to a ceiling. The bands are summed back together.

use super::effect::{Effect, blend, clamp_mix};
use super::filter::StateVariableFilter;
use super::finite_or_zero;

const LOW_SPLIT: f64 = 200.0;
const HIGH_SPLIT: f64 = 4000.0;
const CROSSOVER_Q: f64 = 0.707;
/// Downward ratio at full depth.
const DOWNWARD_RATIO: f64 = 4.0;
/// Largest upward boost at full depth, in dB.
const MAX_UPWARD_DB: f64 = 24.0;
/// Levels below this are treated as silence and never boosted.
const FLOOR_DB: f64 = -60.0;
const BASE_ATTACK: f64 = 0.003;
const BASE_RELEASE: f64 = 0.08;

/// Convert linear amplitude to dB.
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 { -120.0 } else { 20.0 * linear.log10() }
}

/// Convert dB to linear amplitude.
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Peak follower plus the gain computer for one band.
#[derive(Debug, Clone)]
struct BandCompressor {
    envelope: f64,
    attack_coef: f64,
    release_coef: f64,
}

impl BandCompressor {
    fn new() -> Self {
        BandCompressor {
            envelope: 0.0,
            attack_coef: 0.0,
            release_coef: 0.0,
        }
    }

    fn set_times(&mut self, attack: f64, release: f64, sample_rate: f64) {
        self.attack_coef = (-1.0 / (attack * sample_rate)).exp();
        self.release_coef = (-1.0 / (release * sample_rate)).exp();
    }

    /// Gain change in dB for a follower level of `level_db`.
    fn gain_db(level_db: f64, depth: f64) -> f64 {
        let threshold = -10.0 - 20.0 * depth;
        if level_db > threshold {
            (threshold - level_db) * (1.0 - 1.0 / DOWNWARD_RATIO) * depth
        } else if level_db > FLOOR_DB {
            ((threshold - level_db) * depth).min(MAX_UPWARD_DB * depth)
        } else {
            0.0
        }
    }

    #[inline]
    fn process(&mut self, input: f64, depth: f64) -> f64 {
        let level = input.abs();
        let coef = if level > self.envelope { self.attack_coef } else { self.release_coef };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;
        let gain = db_to_linear(Self::gain_db(linear_to_db(self.envelope), depth));
        input * gain
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

/// Fourth-order low-pass from two cascaded SVF stages.
#[inline]
fn low_pass(stages: &mut [StateVariableFilter; 2], input: f64) -> f64 {
    let first = stages[0].process(input).low;
    stages[1].process(first).low
}

#[derive(Debug, Clone)]
pub struct Ott {
    low_split: [StateVariableFilter; 2],
    high_split: [StateVariableFilter; 2],
    bands: [BandCompressor; 3],
    sample_rate: f64,

    enabled: bool,
    depth: f64,
    /// Multiplier on attack and release times.
    time: f64,
    mix: f64,
}

impl Ott {
    pub fn new(sample_rate: f64) -> Self {
        let mut ott = Ott {
            low_split: std::array::from_fn(|_| StateVariableFilter::new(sample_rate)),
            high_split: std::array::from_fn(|_| StateVariableFilter::new(sample_rate)),
            bands: [BandCompressor::new(), BandCompressor::new(), BandCompressor::new()],
            sample_rate,
            enabled: false,
            depth: 0.5,
            time: 1.0,
            mix: 1.0,
        };
        ott.configure(sample_rate);
        ott
    }

    /// Create an enabled OTT with specific parameters.
    pub fn with_params(sample_rate: f64, depth: f64, time: f64, mix: f64) -> Self {
        let mut o = Self::new(sample_rate);
        o.set_depth(depth);
        o.set_time(time);
        o.set_mix(mix);
        o.enabled = true;
        o
    }

    fn configure(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for (filters, cutoff) in [
            (&mut self.low_split, LOW_SPLIT),
            (&mut self.high_split, HIGH_SPLIT),
        ] {
            for filter in filters.iter_mut() {
                filter.set_sample_rate(sample_rate);
                filter.set_cutoff_q(cutoff, CROSSOVER_Q);
            }
        }
        self.update_times();
    }

    fn update_times(&mut self) {
        // Lower bands move more slowly.
        for (i, band) in self.bands.iter_mut().enumerate() {
            let scale = self.time * (3 - i) as f64 / 2.0;
            band.set_times(BASE_ATTACK * scale, BASE_RELEASE * scale, self.sample_rate);
        }
    }

    pub fn set_depth(&mut self, depth: f64) {
        self.depth = if depth.is_finite() { depth.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn set_time(&mut self, time: f64) {
        let time = if time.is_finite() { time.clamp(0.1, 10.0) } else { 1.0 };
        if time != self.time {
            self.time = time;
            self.update_times();
        }
    }

    /// Current follower levels in dB, low to high.
    pub fn band_levels(&self) -> [f64; 3] {
        [
            linear_to_db(self.bands[0].envelope),
            linear_to_db(self.bands[1].envelope),
            linear_to_db(self.bands[2].envelope),
        ]
    }

    fn split(&mut self, input: f64) -> [f64; 3] {
        let low = low_pass(&mut self.low_split, input);
        let rest = input - low;
        let mid = low_pass(&mut self.high_split, rest);
        [low, mid, rest - mid]
    }
}

impl Effect for Ott {
    fn name(&self) -> &'static str {
        "ott"
    }

    fn prepare(&mut self, sample_rate: f64, _max_block_size: usize) {
        self.configure(sample_rate);
        self.reset();
    }

    fn process(&mut self, sample: f64) -> f64 {
        let dry = finite_or_zero(sample);
        let bands = self.split(dry);
        let depth = self.depth;
        let wet: f64 = bands
            .iter()
            .zip(self.bands.iter_mut())
            .map(|(&x, band)| band.process(x, depth))
            .sum();

        if !wet.is_finite() {
            log::debug!("ott went non-finite, resetting");
            self.reset();
            return dry;
        }
        blend(dry, wet, self.mix)
    }

    fn reset(&mut self) {
        for filter in self.low_split.iter_mut().chain(self.high_split.iter_mut()) {
            filter.reset();
        }
        for band in &mut self.bands {
            band.reset();
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn mix(&self) -> f64 {
        self.mix
    }

    fn set_mix(&mut self, mix: f64) {
        self.mix = clamp_mix(mix);
    }
}
