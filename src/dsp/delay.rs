//! Delay effect: feedback delay line with smoothed time and a damped
//! feedback path.
//!
//! The delay time glides exponentially toward its target so automation does
//! not click. Reads use 4-point Hermite interpolation. The feedback path is
//! low-passed and only saturates once it exceeds unity.

use std::f64::consts::TAU;

use super::effect::{Effect, blend, clamp_mix};
use super::finite_or_zero;

/// Longest supported delay in seconds.
pub const MAX_DELAY_SECONDS: f64 = 2.0;
/// Time constant of the delay-time glide, in seconds.
const TIME_SMOOTHING: f64 = 0.05;
const MAX_FEEDBACK: f64 = 0.95;

/// 4-point, 3rd-order Hermite interpolation between `x0` and `x1`.
#[inline]
fn hermite(frac: f64, xm1: f64, x0: f64, x1: f64, x2: f64) -> f64 {
    let c1 = 0.5 * (x1 - xm1);
    let c2 = xm1 - 2.5 * x0 + 2.0 * x1 - 0.5 * x2;
    let c3 = 0.5 * (x2 - xm1) + 1.5 * (x0 - x1);
    ((c3 * frac + c2) * frac + c1) * frac + x0
}

#[derive(Debug, Clone)]
pub struct Delay {
    buffer: Vec<f64>,
    write_pos: usize,
    sample_rate: f64,

    enabled: bool,
    /// Target delay time in seconds.
    time: f64,
    /// Current delay in samples, gliding toward the target.
    current_delay: f64,
    primed: bool,
    smoothing_coef: f64,
    feedback: f64,
    tone: f64,
    tone_coef: f64,
    feedback_state: f64,
    mix: f64,
}

impl Delay {
    pub fn new(sample_rate: f64) -> Self {
        let mut delay = Delay {
            buffer: Vec::new(),
            write_pos: 0,
            sample_rate,
            enabled: false,
            time: 0.25,
            current_delay: 0.0,
            primed: false,
            smoothing_coef: 0.0,
            feedback: 0.35,
            tone: 6000.0,
            tone_coef: 0.0,
            feedback_state: 0.0,
            mix: 0.3,
        };
        delay.allocate(sample_rate);
        delay
    }

    /// Create an enabled delay with specific parameters.
    pub fn with_params(sample_rate: f64, time: f64, feedback: f64, mix: f64) -> Self {
        let mut d = Self::new(sample_rate);
        d.set_time(time);
        d.set_feedback(feedback);
        d.set_mix(mix);
        d.enabled = true;
        d
    }

    fn allocate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let size = (sample_rate * MAX_DELAY_SECONDS) as usize + 4;
        self.buffer = vec![0.0; size];
        self.write_pos = 0;
        self.smoothing_coef = 1.0 - (-1.0 / (TIME_SMOOTHING * sample_rate)).exp();
        self.set_tone(self.tone);
        self.primed = false;
        self.feedback_state = 0.0;
    }

    /// Delay time in seconds, [0.001, 2]. The first sample after `prepare`
    /// jumps straight to it; later changes glide.
    pub fn set_time(&mut self, seconds: f64) {
        self.time = if seconds.is_finite() {
            seconds.clamp(0.001, MAX_DELAY_SECONDS)
        } else {
            0.25
        };
    }

    pub fn set_feedback(&mut self, feedback: f64) {
        self.feedback = if feedback.is_finite() { feedback.clamp(0.0, MAX_FEEDBACK) } else { 0.0 };
    }

    /// Cutoff of the one-pole low-pass in the feedback path, in Hz.
    pub fn set_tone(&mut self, tone: f64) {
        self.tone = if tone.is_finite() { tone.max(20.0) } else { 20_000.0 };
        self.tone_coef = 1.0 - (-TAU * self.tone / self.sample_rate).exp();
    }

    fn target_samples(&self) -> f64 {
        (self.time * self.sample_rate).clamp(2.0, (self.buffer.len() - 3) as f64)
    }

    /// Current (smoothed) delay in samples.
    pub fn current_delay(&self) -> f64 {
        self.current_delay
    }

    #[inline]
    fn tap(&self, delay_int: usize) -> f64 {
        let len = self.buffer.len();
        self.buffer[(self.write_pos + len - delay_int) % len]
    }

    fn read(&self, delay: f64) -> f64 {
        let i = delay as usize;
        let frac = delay - i as f64;
        hermite(frac, self.tap(i - 1), self.tap(i), self.tap(i + 1), self.tap(i + 2))
    }
}

impl Effect for Delay {
    fn name(&self) -> &'static str {
        "delay"
    }

    fn prepare(&mut self, sample_rate: f64, _max_block_size: usize) {
        self.allocate(sample_rate);
    }

    fn process(&mut self, sample: f64) -> f64 {
        let dry = finite_or_zero(sample);
        let target = self.target_samples();
        if self.primed {
            self.current_delay += (target - self.current_delay) * self.smoothing_coef;
        } else {
            self.current_delay = target;
            self.primed = true;
        }
        let delay = self.current_delay.clamp(2.0, (self.buffer.len() - 3) as f64);

        let delayed = self.read(delay);
        self.feedback_state += (delayed - self.feedback_state) * self.tone_coef;
        let mut fed_back = self.feedback_state * self.feedback;
        if fed_back.abs() > 1.0 {
            fed_back = fed_back.tanh();
        }
        let write = dry + fed_back;

        if !(write.is_finite() && delayed.is_finite()) {
            log::debug!("delay line went non-finite, resetting");
            self.reset();
            return dry;
        }

        self.buffer[self.write_pos] = write;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        blend(dry, delayed, self.mix)
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.feedback_state = 0.0;
        self.current_delay = self.target_samples();
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
