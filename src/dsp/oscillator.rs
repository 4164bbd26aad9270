//! Anti-aliased oscillators using PolyBLEP, plus the sub-oscillator.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Triangle,
    #[default]
    Saw,
    Pulse,
}

/// A band-limited oscillator with anti-aliasing (PolyBLEP) on saw and pulse.
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    /// Pulse width in (0, 1); 0.5 is a square.
    pub pulse_width: f64,
    phase: f64,
    phase_inc: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform) -> Self {
        Oscillator {
            waveform,
            pulse_width: 0.5,
            phase: 0.0,
            phase_inc: 0.0,
        }
    }

    /// Set the frequency in Hz for the given sample rate.
    ///
    /// The increment is kept below 0.5 so the PolyBLEP windows never overlap.
    pub fn set_frequency(&mut self, frequency: f64, sample_rate: f64) {
        let inc = frequency / sample_rate;
        self.phase_inc = if inc.is_finite() { inc.clamp(0.0, 0.49) } else { 0.0 };
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn phase_inc(&self) -> f64 {
        self.phase_inc
    }

    /// Generate the next sample and advance the phase.
    pub fn next_sample(&mut self) -> f64 {
        let inc = self.phase_inc;
        let sample = match self.waveform {
            Waveform::Sine => (TAU * self.phase).sin(),
            Waveform::Triangle => self.triangle(),
            Waveform::Saw => self.saw(inc),
            Waveform::Pulse => self.pulse(inc),
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        sample
    }

    /// Naive sawtooth rising from -1 to +1; PolyBLEP smooths the wrap.
    fn saw(&self, inc: f64) -> f64 {
        let naive = 2.0 * self.phase - 1.0;
        naive - poly_blep(self.phase, inc)
    }

    fn pulse(&self, inc: f64) -> f64 {
        let width = self.pulse_width.clamp(0.05, 0.95);
        let mut value = if self.phase < width { 1.0 } else { -1.0 };
        value += poly_blep(self.phase, inc);
        value -= poly_blep((self.phase + 1.0 - width) % 1.0, inc);
        value
    }

    /// Piecewise linear: -1→+1 over [0, 0.5], +1→-1 over [0.5, 1].
    fn triangle(&self) -> f64 {
        if self.phase < 0.5 {
            4.0 * self.phase - 1.0
        } else {
            3.0 - 4.0 * self.phase
        }
    }

    /// Reset oscillator phase.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// PolyBLEP (Polynomial Band-Limited Step) anti-aliasing correction.
///
/// `t` is the phase [0, 1), `dt` is the phase increment per sample.
/// Returns a correction value to subtract from the naive waveform
/// at discontinuities.
pub(crate) fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        // Just after the discontinuity
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        // Just before the next discontinuity
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

/// Pure sine locked one or two octaves below the carrier.
#[derive(Debug, Clone)]
pub struct SubOscillator {
    octave_down: u8,
    phase: f64,
    phase_inc: f64,
}

impl SubOscillator {
    pub fn new() -> Self {
        SubOscillator {
            octave_down: 1,
            phase: 0.0,
            phase_inc: 0.0,
        }
    }

    /// Octave shift below the carrier, clamped to 1 or 2.
    pub fn set_octave(&mut self, octave_down: u8) {
        self.octave_down = octave_down.clamp(1, 2);
    }

    pub fn octave(&self) -> u8 {
        self.octave_down
    }

    pub fn set_carrier_frequency(&mut self, carrier: f64, sample_rate: f64) {
        let freq = carrier / f64::from(1u32 << self.octave_down);
        let inc = freq / sample_rate;
        self.phase_inc = if inc.is_finite() { inc.clamp(0.0, 0.49) } else { 0.0 };
    }

    pub fn next_sample(&mut self) -> f64 {
        let sample = (TAU * self.phase).sin();
        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

impl Default for SubOscillator {
    fn default() -> Self {
        Self::new()
    }
}
