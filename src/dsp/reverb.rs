//! Reverb effect: Schroeder/Freeverb-style algorithmic reverb.
//!
//! A pre-delay feeds eight parallel damped comb filters whose outputs are
//! averaged, then four allpass filters in series. Delay lengths come from
//! the classic 44.1 kHz tunings scaled to the running sample rate and nudged
//! so the comb lengths stay pairwise coprime.

use super::effect::{Effect, blend, clamp_mix};
use super::finite_or_zero;

// Tuning constants (scaled for 44100 Hz sample rate)
const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];
const ALLPASS_FEEDBACK: f64 = 0.5;
const ROOM_SCALE: f64 = 0.28;
const ROOM_OFFSET: f64 = 0.7;
/// Input gain ahead of the averaged comb bank.
const INPUT_GAIN: f64 = 0.12;
/// Longest pre-delay in seconds.
pub const MAX_PRE_DELAY: f64 = 0.1;

/// A comb filter delay line with damped feedback.
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f64>,
    index: usize,
    feedback: f64,
    damp1: f64,
    damp2: f64,
    filterstore: f64,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            feedback: 0.84,
            damp1: 0.2,
            damp2: 0.8,
            filterstore: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let output = self.buffer[self.index];
        // Low-pass in the feedback path gives the damping.
        self.filterstore = output * self.damp2 + self.filterstore * self.damp1;
        self.buffer[self.index] = input + self.filterstore * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn set_damp(&mut self, damp: f64) {
        self.damp1 = damp;
        self.damp2 = 1.0 - damp;
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filterstore = 0.0;
        self.index = 0;
    }
}

/// An allpass filter delay line.
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f64>,
    index: usize,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let bufout = self.buffer[self.index];
        let output = bufout - input;
        self.buffer[self.index] = input + bufout * ALLPASS_FEEDBACK;
        self.index = (self.index + 1) % self.buffer.len();
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.index = 0;
    }
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Scale the comb tunings to `sample_rate`, bumping each length until it
/// shares no factor with the ones before it.
fn comb_lengths(sample_rate: f64) -> [usize; 8] {
    let scale = sample_rate / 44100.0;
    let mut lengths = [0usize; 8];
    for (i, &tuning) in COMB_TUNING.iter().enumerate() {
        let mut len = ((tuning as f64 * scale).round() as usize).max(2);
        while lengths[..i].iter().any(|&prev| gcd(prev, len) != 1) {
            len += 1;
        }
        lengths[i] = len;
    }
    lengths
}

/// A mono algorithmic reverb.
#[derive(Debug, Clone)]
pub struct Reverb {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
    pre_delay_buffer: Vec<f64>,
    pre_delay_pos: usize,
    pre_delay_samples: usize,
    sample_rate: f64,

    enabled: bool,
    /// Room size (0.0 to 1.0). Affects decay time.
    room_size: f64,
    /// Damping (0.0 to 1.0). Higher = darker sound.
    damping: f64,
    /// Pre-delay in seconds.
    pre_delay: f64,
    mix: f64,
}

impl Reverb {
    pub fn new(sample_rate: f64) -> Self {
        let mut reverb = Self {
            combs: Vec::new(),
            allpasses: Vec::new(),
            pre_delay_buffer: Vec::new(),
            pre_delay_pos: 0,
            pre_delay_samples: 0,
            sample_rate,
            enabled: false,
            room_size: 0.5,
            damping: 0.5,
            pre_delay: 0.0,
            mix: 0.25,
        };
        reverb.allocate(sample_rate);
        reverb
    }

    /// Create an enabled reverb with specific parameters.
    pub fn with_params(sample_rate: f64, room_size: f64, damping: f64, mix: f64) -> Self {
        let mut r = Self::new(sample_rate);
        r.set_room_size(room_size);
        r.set_damping(damping);
        r.set_mix(mix);
        r.enabled = true;
        r
    }

    fn allocate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        let scale = sample_rate / 44100.0;
        self.combs = comb_lengths(sample_rate).into_iter().map(CombFilter::new).collect();
        self.allpasses = ALLPASS_TUNING
            .iter()
            .map(|&t| AllpassFilter::new((t as f64 * scale).round() as usize))
            .collect();
        self.pre_delay_buffer = vec![0.0; (sample_rate * MAX_PRE_DELAY) as usize + 1];
        self.pre_delay_pos = 0;
        self.update_parameters();
    }

    pub fn set_room_size(&mut self, room_size: f64) {
        self.room_size = if room_size.is_finite() { room_size.clamp(0.0, 1.0) } else { 0.5 };
        self.update_parameters();
    }

    pub fn set_damping(&mut self, damping: f64) {
        self.damping = if damping.is_finite() { damping.clamp(0.0, 1.0) } else { 0.5 };
        self.update_parameters();
    }

    /// Pre-delay in seconds, [0, 0.1].
    pub fn set_pre_delay(&mut self, seconds: f64) {
        self.pre_delay = if seconds.is_finite() { seconds.clamp(0.0, MAX_PRE_DELAY) } else { 0.0 };
        self.update_parameters();
    }

    /// Push room size, damping and pre-delay into the delay lines.
    fn update_parameters(&mut self) {
        let feedback = self.room_size * ROOM_SCALE + ROOM_OFFSET;
        for comb in &mut self.combs {
            comb.feedback = feedback;
            comb.set_damp(self.damping);
        }
        let max = self.pre_delay_buffer.len().saturating_sub(1);
        self.pre_delay_samples = ((self.pre_delay * self.sample_rate).round() as usize).min(max);
    }

    fn clear(&mut self) {
        for comb in &mut self.combs {
            comb.clear();
        }
        for allpass in &mut self.allpasses {
            allpass.clear();
        }
        self.pre_delay_buffer.fill(0.0);
        self.pre_delay_pos = 0;
    }
}

impl Effect for Reverb {
    fn name(&self) -> &'static str {
        "reverb"
    }

    fn prepare(&mut self, sample_rate: f64, _max_block_size: usize) {
        self.allocate(sample_rate);
    }

    fn process(&mut self, sample: f64) -> f64 {
        let dry = finite_or_zero(sample);

        let len = self.pre_delay_buffer.len();
        self.pre_delay_buffer[self.pre_delay_pos] = dry;
        let read = (self.pre_delay_pos + len - self.pre_delay_samples) % len;
        let delayed = self.pre_delay_buffer[read];
        self.pre_delay_pos = (self.pre_delay_pos + 1) % len;

        let input = delayed * INPUT_GAIN;
        let mut wet = self.combs.iter_mut().map(|c| c.process(input)).sum::<f64>()
            / self.combs.len() as f64;
        for allpass in &mut self.allpasses {
            wet = allpass.process(wet);
        }

        if !wet.is_finite() {
            log::debug!("reverb tail went non-finite, clearing");
            self.clear();
            return dry;
        }
        blend(dry, wet, self.mix)
    }

    fn reset(&mut self) {
        self.clear();
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
