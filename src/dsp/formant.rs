//! Formant filter: three parallel band-passes tuned to a vowel.

use serde::{Deserialize, Serialize};

use super::filter::{BiquadFilter, BiquadType};
use super::finite_or_zero;

/// Vowel selection for the formant engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vowel {
    #[default]
    A,
    E,
    I,
    O,
    U,
}

impl Vowel {
    /// First three formant frequencies in Hz.
    pub fn formants(self) -> [f64; 3] {
        match self {
            Vowel::A => [800.0, 1150.0, 2900.0],
            Vowel::E => [350.0, 2000.0, 2800.0],
            Vowel::I => [270.0, 2140.0, 2950.0],
            Vowel::O => [450.0, 800.0, 2830.0],
            Vowel::U => [325.0, 700.0, 2700.0],
        }
    }
}

/// Bandwidth is 10% of each formant's centre frequency.
const FORMANT_Q: f64 = 10.0;
const FORMANT_GAINS: [f64; 3] = [1.0, 0.7, 0.5];
/// Portion of the unfiltered signal mixed back in.
const DIRECT_GAIN: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct FormantFilter {
    bands: [BiquadFilter; 3],
    vowel: Vowel,
}

impl FormantFilter {
    pub fn new(sample_rate: f64) -> Self {
        let band = || {
            let mut f = BiquadFilter::new(BiquadType::Bandpass, sample_rate);
            f.set_q(FORMANT_Q);
            f
        };
        let mut filter = FormantFilter {
            bands: [band(), band(), band()],
            vowel: Vowel::A,
        };
        filter.retune();
        filter
    }

    pub fn set_vowel(&mut self, vowel: Vowel) {
        if vowel != self.vowel {
            self.vowel = vowel;
            self.retune();
        }
    }

    fn retune(&mut self) {
        for (band, freq) in self.bands.iter_mut().zip(self.vowel.formants()) {
            band.set_frequency(freq);
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        for band in &mut self.bands {
            band.set_sample_rate(sample_rate);
        }
        self.retune();
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let input = finite_or_zero(input);
        let mut out = input * DIRECT_GAIN;
        for (band, gain) in self.bands.iter_mut().zip(FORMANT_GAINS) {
            out += band.process(input) * gain;
        }
        finite_or_zero(out)
    }

    pub fn reset(&mut self) {
        for band in &mut self.bands {
            band.reset();
        }
    }
}
