//! ADSR Envelope generator.

/// Below this level a note-off skips the release stage entirely.
const SILENCE_THRESHOLD: f64 = 1e-4;
/// Absorbs accumulated rounding when a segment lands on its target.
const SEGMENT_EPSILON: f64 = 1e-9;

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// ADSR envelope with linear segments driven by precomputed per-sample rates.
///
/// Release always runs at the full-scale rate `1 / (release * sr)`, so
/// releasing from a partial level finishes sooner than releasing from 1.0.
#[derive(Debug, Clone)]
pub struct Envelope {
    attack: f64,
    decay: f64,
    sustain: f64,
    release: f64,

    attack_rate: f64,
    decay_rate: f64,
    release_rate: f64,

    stage: Stage,
    value: f64,
    sample_rate: f64,
}

impl Envelope {
    pub fn new(sample_rate: f64) -> Self {
        let mut env = Envelope {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
            attack_rate: 0.0,
            decay_rate: 0.0,
            release_rate: 0.0,
            stage: Stage::Idle,
            value: 0.0,
            sample_rate,
        };
        env.update_rates();
        env
    }

    /// Set all four parameters (times in seconds, sustain in [0, 1]).
    pub fn set_params(&mut self, attack: f64, decay: f64, sustain: f64, release: f64) {
        self.attack = attack.max(0.0);
        self.decay = decay.max(0.0);
        self.sustain = sustain.clamp(0.0, 1.0);
        self.release = release.max(0.0);
        self.update_rates();
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_rates();
    }

    fn update_rates(&mut self) {
        // Segments shorter than one sample complete in a single step.
        let samples = |time: f64| (time * self.sample_rate).max(1.0);
        self.attack_rate = 1.0 / samples(self.attack);
        self.decay_rate = (1.0 - self.sustain) / samples(self.decay);
        self.release_rate = 1.0 / samples(self.release);
    }

    /// Enter attack from whatever the current value is.
    pub fn note_on(&mut self) {
        self.stage = Stage::Attack;
    }

    /// Enter release, or go straight to idle when already silent.
    pub fn note_off(&mut self) {
        if self.stage == Stage::Idle {
            return;
        }
        if self.value <= SILENCE_THRESHOLD {
            self.value = 0.0;
            self.stage = Stage::Idle;
        } else {
            self.stage = Stage::Release;
        }
    }

    /// Advance one sample and return the new value in [0, 1].
    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Idle => {
                self.value = 0.0;
            }
            Stage::Attack => {
                self.value += self.attack_rate;
                if self.value >= 1.0 - SEGMENT_EPSILON {
                    self.value = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.value -= self.decay_rate;
                if self.value <= self.sustain + SEGMENT_EPSILON {
                    self.value = self.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => {
                self.value = self.sustain;
            }
            Stage::Release => {
                self.value -= self.release_rate;
                if self.value <= SEGMENT_EPSILON {
                    self.value = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.value = self.value.clamp(0.0, 1.0);
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_idle(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn release_rate(&self) -> f64 {
        self.release_rate
    }

    /// Hard reset to silence.
    pub fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 44100.0;

    fn samples_until_release_done(env: &mut Envelope) -> usize {
        let mut n = 0;
        while !env.is_idle() {
            env.next_sample();
            n += 1;
            assert!(n < 1_000_000, "release never finished");
        }
        n
    }

    #[test]
    fn starts_idle() {
        let env = Envelope::new(SR);
        assert!(env.is_idle());
        assert_eq!(env.value(), 0.0);
    }

    #[test]
    fn attack_reaches_one_on_time() {
        let attack = 0.01;
        let mut env = Envelope::new(SR);
        env.set_params(attack, 0.1, 0.5, 0.1);
        env.note_on();

        let expected = (attack * SR) as i64;
        let mut n = 0_i64;
        loop {
            n += 1;
            if env.next_sample() >= 1.0 {
                break;
            }
            assert!(n < 10 * expected, "attack never completed");
        }
        assert!((n - expected).abs() <= 1, "attack took {n} samples, expected {expected}");
        assert_eq!(env.stage(), Stage::Decay);
    }

    #[test]
    fn sustain_holds() {
        let mut env = Envelope::new(SR);
        env.set_params(0.001, 0.001, 0.6, 0.3);
        env.note_on();

        // Run past attack + decay
        for _ in 0..500 {
            env.next_sample();
        }

        assert_eq!(env.stage(), Stage::Sustain);
        let s = env.next_sample();
        assert!((s - 0.6).abs() < 1e-12, "Should sustain at 0.6, got {s}");
    }

    #[test]
    fn release_rate_does_not_depend_on_start_level() {
        let release = 0.05;
        let mut full = Envelope::new(SR);
        full.set_params(0.001, 0.001, 1.0, release);
        full.note_on();
        for _ in 0..200 {
            full.next_sample();
        }
        let rate_full = full.release_rate();
        full.note_off();
        let full_samples = samples_until_release_done(&mut full);

        let mut partial = Envelope::new(SR);
        partial.set_params(0.001, 0.001, 0.5, release);
        partial.note_on();
        for _ in 0..200 {
            partial.next_sample();
        }
        let rate_partial = partial.release_rate();
        partial.note_off();
        let before = partial.value();
        partial.next_sample();
        let step = before - partial.value();
        let partial_samples = 1 + samples_until_release_done(&mut partial);

        assert_eq!(rate_full, rate_partial);
        assert!((step - rate_full).abs() < 1e-12, "per-sample release step {step} != {rate_full}");
        let expected_full = (release * SR) as i64;
        assert!((full_samples as i64 - expected_full).abs() <= 1);
        // Releasing from half scale at full-scale rate takes half as long.
        assert!((partial_samples as i64 - expected_full / 2).abs() <= 1);
    }

    #[test]
    fn retrigger_keeps_current_value() {
        let mut env = Envelope::new(SR);
        env.set_params(0.01, 0.1, 0.8, 0.2);
        env.note_on();
        for _ in 0..1000 {
            env.next_sample();
        }
        env.note_off();
        for _ in 0..100 {
            env.next_sample();
        }
        let before = env.value();
        env.note_on();
        let after = env.next_sample();
        assert!(after > before, "retrigger should continue upward from {before}, got {after}");
        assert!(after - before < 0.01, "retrigger should not jump");
    }

    #[test]
    fn note_off_near_zero_goes_idle() {
        let mut env = Envelope::new(SR);
        env.set_params(1.0, 0.1, 0.5, 0.5);
        env.note_on();
        env.note_off();
        assert!(env.is_idle());
    }

    #[test]
    fn zero_time_segments_complete_in_one_sample() {
        let mut env = Envelope::new(SR);
        env.set_params(0.0, 0.0, 0.3, 0.0);
        env.note_on();
        assert_eq!(env.next_sample(), 1.0);
        assert_eq!(env.next_sample(), 0.3);
        env.note_off();
        assert_eq!(env.next_sample(), 0.0);
        assert!(env.is_idle());
    }

    #[test]
    fn full_cycle_range() {
        let mut env = Envelope::new(SR);
        env.set_params(0.01, 0.05, 0.5, 0.1);
        env.note_on();

        for _ in 0..10000 {
            let s = env.next_sample();
            assert!((0.0..=1.0).contains(&s), "Envelope out of range: {s}");
        }

        env.note_off();
        for _ in 0..10000 {
            let s = env.next_sample();
            assert!((0.0..=1.0).contains(&s), "Envelope out of range after release: {s}");
        }

        assert!(env.is_idle());
    }
}
