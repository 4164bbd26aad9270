//! DSP core: per-sample synthesis, modulation and effects.
//!
//! Everything here runs on the audio thread: buffers are sized in
//! `prepare`/`set_sample_rate` and never resized while processing.

pub mod chorus;
pub mod comb;
pub mod delay;
pub mod distortion;
pub mod effect;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod filter_bank;
pub mod formant;
pub mod lfo;
pub mod mixer;
pub mod modulation;
pub mod noise;
pub mod oscillator;
pub mod ott;
pub mod renderer;
pub mod reverb;
pub mod smoothing;
pub mod spellbook;
pub mod voice;
pub mod voice_manager;

/// Replace NaN/±Inf with silence.
#[inline]
pub(crate) fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}
