//! Per-voice filter selection: SVF taps, formant, comb and notch engines.

use serde::{Deserialize, Serialize};

use super::comb::CombFilter;
use super::filter::{BiquadFilter, BiquadType, StateVariableFilter, SvfMode, clamp_cutoff};
use super::formant::{FormantFilter, Vowel};

/// Filter engine selected for a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Formant,
    Comb,
    Notch,
}

/// Map resonance in [0, 0.99] onto a notch Q in [0.5, 50].
pub fn notch_q(resonance: f64) -> f64 {
    let r = if resonance.is_finite() { resonance.clamp(0.0, 0.99) } else { 0.0 };
    0.5 + (r / 0.99) * 49.5
}

/// All four engines live side by side so switching never allocates.
#[derive(Debug, Clone)]
pub struct VoiceFilter {
    kind: FilterKind,
    svf: StateVariableFilter,
    formant: FormantFilter,
    comb: CombFilter,
    notch: BiquadFilter,
    sample_rate: f64,
}

impl VoiceFilter {
    pub fn new(sample_rate: f64) -> Self {
        VoiceFilter {
            kind: FilterKind::Lowpass,
            svf: StateVariableFilter::new(sample_rate),
            formant: FormantFilter::new(sample_rate),
            comb: CombFilter::new(sample_rate),
            notch: BiquadFilter::new(BiquadType::Notch, sample_rate),
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.svf.set_sample_rate(sample_rate);
        self.formant.set_sample_rate(sample_rate);
        self.comb.set_sample_rate(sample_rate);
        self.notch.set_sample_rate(sample_rate);
    }

    /// Switch engines; the newly selected engine starts from clean state.
    pub fn set_kind(&mut self, kind: FilterKind) {
        if kind != self.kind {
            self.kind = kind;
            self.reset();
        }
    }

    pub fn set_vowel(&mut self, vowel: Vowel) {
        self.formant.set_vowel(vowel);
    }

    pub fn set_drive(&mut self, drive: f64) {
        self.svf.set_drive(drive);
    }

    /// Update cutoff/resonance for the active engine only.
    pub fn set_params(&mut self, cutoff: f64, resonance: f64) {
        let cutoff = clamp_cutoff(cutoff, self.sample_rate);
        match self.kind {
            FilterKind::Lowpass | FilterKind::Highpass | FilterKind::Bandpass => {
                self.svf.set_params(cutoff, resonance)
            }
            FilterKind::Formant => {}
            FilterKind::Comb => self.comb.set_params(cutoff, resonance),
            FilterKind::Notch => {
                self.notch.set_frequency(cutoff);
                self.notch.set_q(notch_q(resonance));
            }
        }
    }

    pub fn process(&mut self, input: f64) -> f64 {
        match self.kind {
            FilterKind::Lowpass => self.svf.process_mode(input, SvfMode::Lowpass),
            FilterKind::Highpass => self.svf.process_mode(input, SvfMode::Highpass),
            FilterKind::Bandpass => self.svf.process_mode(input, SvfMode::Bandpass),
            FilterKind::Formant => self.formant.process(input),
            FilterKind::Comb => self.comb.process(input),
            FilterKind::Notch => self.notch.process(input),
        }
    }

    pub fn reset(&mut self) {
        self.svf.reset();
        self.formant.reset();
        self.comb.reset();
        self.notch.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::noise::NoiseGenerator;

    const ALL_KINDS: [FilterKind; 6] = [
        FilterKind::Lowpass,
        FilterKind::Highpass,
        FilterKind::Bandpass,
        FilterKind::Formant,
        FilterKind::Comb,
        FilterKind::Notch,
    ];

    #[test]
    fn notch_q_range() {
        assert_eq!(notch_q(0.0), 0.5);
        assert!((notch_q(0.99) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn every_engine_survives_garbage_input() {
        for kind in ALL_KINDS {
            let mut f = VoiceFilter::new(44100.0);
            f.set_kind(kind);
            f.set_params(1000.0, 0.99);
            let mut noise = NoiseGenerator::new(3);
            for i in 0..5000 {
                let x = match i % 500 {
                    0 => f64::NAN,
                    1 => f64::INFINITY,
                    2 => f64::NEG_INFINITY,
                    _ => noise.next_sample(),
                };
                let y = f.process(x);
                assert!(y.is_finite(), "{kind:?} produced {y} at sample {i}");
            }
        }
    }

    #[test]
    fn lowpass_tap_passes_dc() {
        let mut f = VoiceFilter::new(44100.0);
        f.set_params(2000.0, 0.0);
        let mut out = 0.0;
        for _ in 0..4410 {
            out = f.process(1.0);
        }
        assert!((out - 1.0).abs() < 1e-3);
    }
}
