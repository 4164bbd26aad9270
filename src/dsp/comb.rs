//! Feedback comb filter used as a voice filter engine.

use super::finite_or_zero;

/// Lowest cutoff the comb maps to a delay; sets the buffer length.
const MIN_COMB_FREQ: f64 = 20.0;

#[derive(Debug, Clone)]
pub struct CombFilter {
    buffer: Vec<f64>,
    write_pos: usize,
    delay_samples: usize,
    feedback: f64,
    sample_rate: f64,
}

impl CombFilter {
    pub fn new(sample_rate: f64) -> Self {
        let mut comb = CombFilter {
            buffer: Vec::new(),
            write_pos: 0,
            delay_samples: 1,
            feedback: 0.0,
            sample_rate,
        };
        comb.set_sample_rate(sample_rate);
        comb
    }

    /// Resize the delay line; only called while preparing.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let len = (sample_rate / (MIN_COMB_FREQ + 1.0)).ceil() as usize + 2;
        self.buffer = vec![0.0; len];
        self.write_pos = 0;
        self.delay_samples = self.delay_samples.clamp(1, len - 1);
    }

    /// The delay is one period of `cutoff + 1` Hz; feedback is the resonance.
    pub fn set_params(&mut self, cutoff: f64, resonance: f64) {
        let period = 1.0 / (finite_or_zero(cutoff).max(MIN_COMB_FREQ) + 1.0);
        let samples = (period * self.sample_rate).round() as usize;
        self.delay_samples = samples.clamp(1, self.buffer.len() - 1);
        self.feedback = finite_or_zero(resonance).clamp(-0.99, 0.99);
    }

    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    pub fn feedback(&self) -> f64 {
        self.feedback
    }

    pub fn process(&mut self, input: f64) -> f64 {
        let input = finite_or_zero(input);
        let len = self.buffer.len();
        let read_pos = (self.write_pos + len - self.delay_samples) % len;
        let output = input + self.feedback * self.buffer[read_pos];

        if !output.is_finite() {
            log::debug!("comb feedback went non-finite, resetting");
            self.reset();
            return 0.0;
        }

        self.buffer[self.write_pos] = output;
        self.write_pos = (self.write_pos + 1) % len;
        output
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}
