//! Waveshaping distortion with four modes.

use serde::{Deserialize, Serialize};

use super::effect::{Effect, blend, clamp_mix};
use super::finite_or_zero;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DistortionMode {
    #[default]
    SoftClip,
    HardClip,
    Foldback,
    Bitcrush,
}

/// Triangle fold of `x` back into [-1, 1].
#[inline]
fn fold(x: f64) -> f64 {
    1.0 - ((x + 1.0).rem_euclid(4.0) - 2.0).abs()
}

#[derive(Debug, Clone)]
pub struct Distortion {
    enabled: bool,
    mode: DistortionMode,
    drive: f64,
    mix: f64,
}

impl Distortion {
    pub fn new() -> Self {
        Distortion {
            enabled: false,
            mode: DistortionMode::SoftClip,
            drive: 0.3,
            mix: 1.0,
        }
    }

    pub fn set_mode(&mut self, mode: DistortionMode) {
        self.mode = mode;
    }

    pub fn set_drive(&mut self, drive: f64) {
        self.drive = if drive.is_finite() { drive.clamp(0.0, 1.0) } else { 0.0 };
    }

    /// Pre-gain between 1 and 20.
    fn gain(&self) -> f64 {
        1.0 + 19.0 * self.drive
    }

    /// Shape one sample with output scaled by `1/sqrt(gain)`.
    pub fn shape(&self, x: f64) -> f64 {
        let g = self.gain();
        let driven = x * g;
        let shaped = match self.mode {
            DistortionMode::SoftClip => driven.tanh(),
            DistortionMode::HardClip => driven.clamp(-1.0, 1.0),
            DistortionMode::Foldback => fold(driven),
            DistortionMode::Bitcrush => {
                let bits = 16.0 - 14.0 * self.drive;
                let levels = (bits - 1.0).exp2();
                (driven.clamp(-1.0, 1.0) * levels).round() / levels
            }
        };
        shaped / g.sqrt()
    }
}

impl Default for Distortion {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Distortion {
    fn name(&self) -> &'static str {
        "distortion"
    }

    fn prepare(&mut self, _sample_rate: f64, _max_block_size: usize) {}

    fn process(&mut self, sample: f64) -> f64 {
        let dry = finite_or_zero(sample);
        finite_or_zero(blend(dry, self.shape(dry), self.mix))
    }

    fn reset(&mut self) {}

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
