//! Chorus effect: LFO-modulated short delay for thickening sound.
//!
//! A 5 ms base delay swings by up to 3 ms under a sine LFO. Reads use
//! linear interpolation between adjacent buffer samples.

use std::f64::consts::TAU;

use super::effect::{Effect, blend, clamp_mix};
use super::finite_or_zero;

/// Base delay time in seconds.
const BASE_DELAY: f64 = 0.005;
/// Modulation depth at full scale, in seconds.
const MAX_DEPTH: f64 = 0.003;
/// Buffer length in seconds.
const BUFFER_SECONDS: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct Chorus {
    buffer: Vec<f64>,
    write_pos: usize,
    sample_rate: f64,
    phase: f64,

    enabled: bool,
    /// LFO rate in Hz.
    rate: f64,
    /// Normalised depth [0, 1].
    depth: f64,
    mix: f64,
}

impl Chorus {
    pub fn new(sample_rate: f64) -> Self {
        let mut chorus = Chorus {
            buffer: Vec::new(),
            write_pos: 0,
            sample_rate,
            phase: 0.0,
            enabled: false,
            rate: 1.0,
            depth: 0.5,
            mix: 0.5,
        };
        chorus.allocate(sample_rate);
        chorus
    }

    /// Create a chorus with specific parameters.
    pub fn with_params(sample_rate: f64, rate: f64, depth: f64, mix: f64) -> Self {
        let mut c = Self::new(sample_rate);
        c.set_rate(rate);
        c.set_depth(depth);
        c.set_mix(mix);
        c.enabled = true;
        c
    }

    fn allocate(&mut self, sample_rate: f64) {
        let size = (sample_rate * BUFFER_SECONDS) as usize + 2;
        self.buffer = vec![0.0; size];
        self.write_pos = 0;
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = if rate.is_finite() { rate.clamp(0.05, 10.0) } else { 1.0 };
    }

    pub fn set_depth(&mut self, depth: f64) {
        self.depth = if depth.is_finite() { depth.clamp(0.0, 1.0) } else { 0.0 };
    }

    /// Read with fractional delay using linear interpolation.
    #[inline]
    fn read_interpolated(buffer: &[f64], write_pos: usize, delay_samples: f64) -> f64 {
        let len = buffer.len();
        let delay_int = delay_samples as usize;
        let frac = delay_samples - delay_int as f64;

        let read_pos_0 = (write_pos + len - delay_int) % len;
        let read_pos_1 = (read_pos_0 + len - 1) % len;

        let s0 = buffer[read_pos_0];
        let s1 = buffer[read_pos_1];
        s0 + frac * (s1 - s0)
    }
}

impl Effect for Chorus {
    fn name(&self) -> &'static str {
        "chorus"
    }

    fn prepare(&mut self, sample_rate: f64, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.allocate(sample_rate);
        self.phase = 0.0;
    }

    fn process(&mut self, sample: f64) -> f64 {
        let dry = finite_or_zero(sample);
        let len = self.buffer.len();
        self.buffer[self.write_pos] = dry;

        let lfo = (TAU * self.phase).sin();
        let delay = (BASE_DELAY + MAX_DEPTH * self.depth * lfo) * self.sample_rate;
        let delay = delay.clamp(1.0, (len - 2) as f64);
        let wet = Self::read_interpolated(&self.buffer, self.write_pos, delay);

        self.write_pos = (self.write_pos + 1) % len;
        self.phase = (self.phase + self.rate / self.sample_rate).fract();

        blend(dry, wet, self.mix)
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.phase = 0.0;
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
