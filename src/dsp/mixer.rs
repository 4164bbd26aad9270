//! Mixer output stage: DC blocking, smoothed master gain and soft clipping.

use std::f64::consts::TAU;

use super::finite_or_zero;
use super::smoothing::LinearSmoother;

/// Corner frequency of the DC blocker in Hz.
const DC_CUTOFF: f64 = 5.0;
/// Master-gain ramp time in seconds.
const GAIN_SMOOTHING: f64 = 0.02;

/// First-order high-pass: `y[n] = x[n] - x[n-1] + R * y[n-1]`.
#[derive(Debug, Clone)]
pub struct DcBlocker {
    r: f64,
    x1: f64,
    y1: f64,
}

impl DcBlocker {
    pub fn new(sample_rate: f64) -> Self {
        let mut dc = DcBlocker { r: 0.0, x1: 0.0, y1: 0.0 };
        dc.set_sample_rate(sample_rate);
        dc
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.r = (-TAU * DC_CUTOFF / sample_rate).exp();
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let input = finite_or_zero(input);
        let y = input - self.x1 + self.r * self.y1;
        if !y.is_finite() {
            log::debug!("dc blocker went non-finite, resetting");
            self.reset();
            return 0.0;
        }
        self.x1 = input;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

/// Soft clipper: identity inside [-1, 1], exponential knee outside.
///
/// Continuous with slope 1 at the knee and bounded by ±2.
#[inline]
pub fn soft_clip(x: f64) -> f64 {
    let a = x.abs();
    if a <= 1.0 {
        x
    } else {
        x.signum() * (2.0 - (-(a - 1.0)).exp())
    }
}

/// Final conditioning applied to the summed, effected signal.
#[derive(Debug, Clone)]
pub struct OutputStage {
    dc: DcBlocker,
    gain: LinearSmoother,
    clipped: bool,
}

impl OutputStage {
    pub fn new(sample_rate: f64, master_gain: f64) -> Self {
        let mut gain = LinearSmoother::new(master_gain);
        gain.set_time(GAIN_SMOOTHING, sample_rate);
        OutputStage {
            dc: DcBlocker::new(sample_rate),
            gain,
            clipped: false,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.dc.set_sample_rate(sample_rate);
        self.gain.set_time(GAIN_SMOOTHING, sample_rate);
    }

    pub fn set_master_gain(&mut self, gain: f64) {
        let gain = if gain.is_finite() { gain.clamp(0.0, 2.0) } else { 0.0 };
        self.gain.set_target(gain);
    }

    pub fn master_gain(&self) -> f64 {
        self.gain.current()
    }

    /// DC blocker → master gain → soft clip.
    pub fn process(&mut self, input: f64) -> f64 {
        let x = self.dc.process(input) * self.gain.next_value();
        self.clipped = x.abs() > 1.0;
        soft_clip(x)
    }

    /// Whether the last sample hit the soft clipper.
    pub fn clipped(&self) -> bool {
        self.clipped
    }

    pub fn reset(&mut self) {
        self.dc.reset();
        let target = self.gain.target();
        self.gain.snap(target);
        self.clipped = false;
    }
}
