//! Effect trait and the fixed-order effects chain.
//!
//! Stages run Distortion → Chorus → Delay → Reverb → OTT. A disabled stage
//! passes its input through untouched. Buffers are sized in `prepare` and
//! never reallocated while processing.

use super::chorus::Chorus;
use super::delay::Delay;
use super::distortion::Distortion;
use super::ott::Ott;
use super::reverb::Reverb;
use crate::params::EffectsParams;

/// A mono insert effect.
pub trait Effect {
    /// Short name used in log records.
    fn name(&self) -> &'static str;

    /// Size internal buffers for `sample_rate` and clear all state.
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize);

    /// Process one sample, dry/wet mix included.
    fn process(&mut self, sample: f64) -> f64;

    fn reset(&mut self);

    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    fn mix(&self) -> f64;

    fn set_mix(&mut self, mix: f64);
}

/// Linear dry/wet crossfade.
#[inline]
pub(crate) fn blend(dry: f64, wet: f64, mix: f64) -> f64 {
    dry * (1.0 - mix) + wet * mix
}

/// Clamp a mix amount into [0, 1]; non-finite becomes fully dry.
#[inline]
pub(crate) fn clamp_mix(mix: f64) -> f64 {
    if mix.is_finite() { mix.clamp(0.0, 1.0) } else { 0.0 }
}

#[derive(Debug, Clone)]
pub struct EffectsChain {
    pub distortion: Distortion,
    pub chorus: Chorus,
    pub delay: Delay,
    pub reverb: Reverb,
    pub ott: Ott,
}

impl EffectsChain {
    pub fn new(sample_rate: f64) -> Self {
        EffectsChain {
            distortion: Distortion::new(),
            chorus: Chorus::new(sample_rate),
            delay: Delay::new(sample_rate),
            reverb: Reverb::new(sample_rate),
            ott: Ott::new(sample_rate),
        }
    }

    /// Stages in processing order.
    fn stages_mut(&mut self) -> [&mut dyn Effect; 5] {
        [
            &mut self.distortion,
            &mut self.chorus,
            &mut self.delay,
            &mut self.reverb,
            &mut self.ott,
        ]
    }

    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) {
        for stage in self.stages_mut() {
            log::debug!("preparing {} at {sample_rate} Hz", stage.name());
            stage.prepare(sample_rate, max_block_size);
        }
    }

    pub fn apply_params(&mut self, params: &EffectsParams) {
        let d = &params.distortion;
        self.distortion.set_enabled(d.enabled);
        self.distortion.set_mode(d.mode);
        self.distortion.set_drive(d.drive);
        self.distortion.set_mix(d.mix);

        let c = &params.chorus;
        self.chorus.set_enabled(c.enabled);
        self.chorus.set_rate(c.rate);
        self.chorus.set_depth(c.depth);
        self.chorus.set_mix(c.mix);

        let dl = &params.delay;
        self.delay.set_enabled(dl.enabled);
        self.delay.set_time(dl.time);
        self.delay.set_feedback(dl.feedback);
        self.delay.set_tone(dl.tone);
        self.delay.set_mix(dl.mix);

        let r = &params.reverb;
        self.reverb.set_enabled(r.enabled);
        self.reverb.set_room_size(r.room_size);
        self.reverb.set_damping(r.damping);
        self.reverb.set_pre_delay(r.pre_delay);
        self.reverb.set_mix(r.mix);

        let o = &params.ott;
        self.ott.set_enabled(o.enabled);
        self.ott.set_depth(o.depth);
        self.ott.set_time(o.time);
        self.ott.set_mix(o.mix);
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let mut x = input;
        for stage in self.stages_mut() {
            if stage.is_enabled() {
                x = stage.process(x);
            }
        }
        x
    }

    pub fn reset(&mut self) {
        for stage in self.stages_mut() {
            stage.reset();
        }
    }
}
