//! Recursive filter primitives: an RBJ biquad and a Cytomic state-variable filter.

use std::f64::consts::PI;

use super::finite_or_zero;

/// Lowest cutoff any filter accepts.
pub const MIN_CUTOFF: f64 = 20.0;
/// Highest cutoff any voice filter accepts.
pub const MAX_CUTOFF: f64 = 20_000.0;

/// Clamp a cutoff to [20 Hz, 20 kHz] and to 45% of the sample rate.
pub fn clamp_cutoff(cutoff: f64, sample_rate: f64) -> f64 {
    let upper = MAX_CUTOFF.min(sample_rate * 0.45).max(MIN_CUTOFF);
    if cutoff.is_finite() {
        cutoff.clamp(MIN_CUTOFF, upper)
    } else {
        MIN_CUTOFF
    }
}

/// Biquad response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BiquadType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
}

/// A biquad IIR filter (2nd order).
///
/// Implements the standard Direct Form II Transposed structure.
/// Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub filter_type: BiquadType,
    frequency: f64,
    q: f64,

    // Coefficients
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form II Transposed)
    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(filter_type: BiquadType, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            filter_type,
            frequency: 1000.0,
            q: 0.707, // Butterworth
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let w0 = 2.0 * PI * self.frequency / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * self.q);

        let (b0, b1, b2) = match self.filter_type {
            BiquadType::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            BiquadType::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0)
            }
            BiquadType::Bandpass => (alpha, 0.0, -alpha),
            BiquadType::Notch => (1.0, -2.0 * cos_w0, 1.0),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
        self.dirty = false;
    }

    /// Process a single sample through the filter.
    ///
    /// Non-finite input is treated as silence; a non-finite result clears the
    /// state and yields 0.
    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }
        let input = finite_or_zero(input);

        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;

        if !(output.is_finite() && self.z1.is_finite() && self.z2.is_finite()) {
            log::debug!("biquad state went non-finite, resetting");
            self.reset();
            return 0.0;
        }
        output
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Set frequency (clamped below Nyquist) and mark coefficients dirty.
    pub fn set_frequency(&mut self, freq: f64) {
        let freq = clamp_cutoff(freq, self.sample_rate);
        if freq != self.frequency {
            self.frequency = freq;
            self.dirty = true;
        }
    }

    /// Set Q and mark coefficients dirty.
    pub fn set_q(&mut self, q: f64) {
        let q = if q.is_finite() { q.max(0.1) } else { 0.707 };
        if q != self.q {
            self.q = q;
            self.dirty = true;
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.frequency = clamp_cutoff(self.frequency, sample_rate);
        self.dirty = true;
        self.reset();
    }
}

/// Which tap of the state-variable filter a voice listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvfMode {
    Lowpass,
    Highpass,
    Bandpass,
}

/// All three simultaneous outputs of the state-variable filter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SvfOutputs {
    pub low: f64,
    pub band: f64,
    pub high: f64,
}

/// Trapezoidal-integrated state-variable filter (Cytomic / Simper topology).
///
/// Stable for any cutoff below Nyquist and any positive Q, with a tanh
/// pre-drive stage that is bypassed at zero drive.
#[derive(Debug, Clone)]
pub struct StateVariableFilter {
    cutoff: f64,
    q: f64,
    drive: f64,
    sample_rate: f64,

    k: f64,
    a1: f64,
    a2: f64,
    a3: f64,

    ic1eq: f64,
    ic2eq: f64,
}

impl StateVariableFilter {
    pub fn new(sample_rate: f64) -> Self {
        let mut f = StateVariableFilter {
            cutoff: 1000.0,
            q: 0.707,
            drive: 0.0,
            sample_rate,
            k: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
            ic1eq: 0.0,
            ic2eq: 0.0,
        };
        f.update_coefficients();
        f
    }

    /// Map resonance in [0, 0.99] onto Q in [0.5, 10].
    pub fn resonance_to_q(resonance: f64) -> f64 {
        let r = if resonance.is_finite() { resonance.clamp(0.0, 0.99) } else { 0.0 };
        0.5 + (r / 0.99) * 9.5
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.cutoff = clamp_cutoff(self.cutoff, sample_rate);
        self.update_coefficients();
        self.reset();
    }

    /// Set cutoff (Hz) and resonance ([0, 0.99]).
    pub fn set_params(&mut self, cutoff: f64, resonance: f64) {
        self.set_cutoff_q(cutoff, Self::resonance_to_q(resonance));
    }

    /// Set cutoff and Q directly; coefficients are only recomputed on change.
    pub fn set_cutoff_q(&mut self, cutoff: f64, q: f64) {
        let cutoff = clamp_cutoff(cutoff, self.sample_rate);
        let q = if q.is_finite() { q.clamp(0.5, 50.0) } else { 0.707 };
        if cutoff != self.cutoff || q != self.q {
            self.cutoff = cutoff;
            self.q = q;
            self.update_coefficients();
        }
    }

    /// Pre-filter drive amount in [0, 1].
    pub fn set_drive(&mut self, drive: f64) {
        self.drive = if drive.is_finite() { drive.clamp(0.0, 1.0) } else { 0.0 };
    }

    fn update_coefficients(&mut self) {
        let g = (PI * self.cutoff / self.sample_rate).tan();
        self.k = 1.0 / self.q;
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    /// Process one sample and return all three taps.
    pub fn process(&mut self, input: f64) -> SvfOutputs {
        let mut v0 = finite_or_zero(input);
        if self.drive > 0.0 {
            let gain = 1.0 + self.drive * 9.0;
            v0 = (v0 * gain).tanh() / gain.sqrt();
        }

        let v3 = v0 - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        let out = SvfOutputs {
            low: v2,
            band: v1,
            high: v0 - self.k * v1 - v2,
        };

        if !(out.low.is_finite()
            && out.band.is_finite()
            && out.high.is_finite()
            && self.ic1eq.is_finite()
            && self.ic2eq.is_finite())
        {
            log::debug!("svf state went non-finite at {:.1} Hz, resetting", self.cutoff);
            self.reset();
            return SvfOutputs::default();
        }
        out
    }

    pub fn process_mode(&mut self, input: f64, mode: SvfMode) -> f64 {
        let out = self.process(input);
        match mode {
            SvfMode::Lowpass => out.low,
            SvfMode::Highpass => out.high,
            SvfMode::Bandpass => out.band,
        }
    }

    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::noise::NoiseGenerator;

    fn sine_amplitude(filter: &mut StateVariableFilter, mode: SvfMode, freq: f64) -> f64 {
        let mut max_out = 0.0_f64;
        for i in 0..8820 {
            let t = i as f64 / 44100.0;
            let out = filter.process_mode((2.0 * PI * freq * t).sin(), mode);
            if i > 4410 {
                max_out = max_out.max(out.abs());
            }
        }
        max_out
    }

    #[test]
    fn biquad_lowpass_passes_dc() {
        let mut f = BiquadFilter::new(BiquadType::Lowpass, 44100.0);
        f.set_frequency(5000.0);

        // DC in, DC out
        let mut output = 0.0;
        for _ in 0..1000 {
            output = f.process(1.0);
        }
        assert!((output - 1.0).abs() < 0.001, "Lowpass should pass DC, got {output}");
    }

    #[test]
    fn biquad_notch_removes_centre_frequency() {
        let mut f = BiquadFilter::new(BiquadType::Notch, 44100.0);
        f.set_frequency(1000.0);
        f.set_q(2.0);
        let mut max_out = 0.0_f64;
        for i in 0..44100 {
            let t = i as f64 / 44100.0;
            let out = f.process((2.0 * PI * 1000.0 * t).sin());
            if i > 22050 {
                max_out = max_out.max(out.abs());
            }
        }
        assert!(max_out < 0.01, "Notch should cancel 1 kHz, got {max_out}");
    }

    #[test]
    fn biquad_recovers_from_non_finite_input() {
        let mut f = BiquadFilter::new(BiquadType::Bandpass, 44100.0);
        f.process(1.0);
        assert!(f.process(f64::NAN).is_finite());
        for _ in 0..100 {
            assert!(f.process(0.5).is_finite());
        }
    }

    #[test]
    fn svf_resonance_maps_to_q_range() {
        assert_eq!(StateVariableFilter::resonance_to_q(0.0), 0.5);
        assert!((StateVariableFilter::resonance_to_q(0.99) - 10.0).abs() < 1e-12);
        assert!((StateVariableFilter::resonance_to_q(5.0) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn svf_lowpass_attenuates_high_freq() {
        let mut f = StateVariableFilter::new(44100.0);
        f.set_params(200.0, 0.0);
        let amp = sine_amplitude(&mut f, SvfMode::Lowpass, 10_000.0);
        assert!(amp < 0.01, "Lowpass@200Hz should strongly attenuate 10kHz, got {amp}");
    }

    #[test]
    fn svf_highpass_blocks_dc() {
        let mut f = StateVariableFilter::new(44100.0);
        f.set_params(1000.0, 0.2);
        let mut out = 1.0;
        for _ in 0..4410 {
            out = f.process_mode(1.0, SvfMode::Highpass);
        }
        assert!(out.abs() < 1e-3, "Highpass should block DC, got {out}");
    }

    #[test]
    fn svf_is_stable_under_white_noise() {
        let sr = 44100.0;
        let cutoffs = [20.0, 100.0, 1000.0, 5000.0, 12_000.0, sr * 0.45];
        let resonances = [0.0, 0.5, 0.9, 0.99];
        for &cutoff in &cutoffs {
            for &res in &resonances {
                let mut f = StateVariableFilter::new(sr);
                f.set_params(cutoff, res);
                let mut noise = NoiseGenerator::new(0xC0FFEE);
                for _ in 0..10_000 {
                    let out = f.process(noise.next_sample());
                    assert!(
                        out.low.is_finite() && out.band.is_finite() && out.high.is_finite(),
                        "non-finite output at cutoff {cutoff}, resonance {res}"
                    );
                }
            }
        }
    }

    #[test]
    fn svf_drive_is_bounded() {
        let mut f = StateVariableFilter::new(44100.0);
        f.set_params(20_000.0, 0.0);
        f.set_drive(1.0);
        for _ in 0..1000 {
            let out = f.process_mode(100.0, SvfMode::Lowpass);
            assert!(out.abs() < 1.5, "driven output should be bounded, got {out}");
        }
    }

    #[test]
    fn cutoff_is_clamped() {
        assert_eq!(clamp_cutoff(5.0, 44100.0), 20.0);
        assert!((clamp_cutoff(30_000.0, 44100.0) - 19_845.0).abs() < 1e-6);
        assert_eq!(clamp_cutoff(f64::NAN, 44100.0), 20.0);
    }
}
