//! Fixed pool of voices with retrigger, first-free allocation and slot-0
//! stealing.

use super::voice::{Voice, VoiceDebug, VoiceModulation};
use crate::params::SynthParams;

pub const MAX_VOICES: usize = 16;

#[derive(Debug, Clone)]
pub struct VoiceManager {
    voices: [Voice; MAX_VOICES],
    debug: VoiceDebug,
}

impl VoiceManager {
    pub fn new(sample_rate: f64) -> Self {
        VoiceManager {
            voices: std::array::from_fn(|i| Voice::new(sample_rate, i)),
            debug: VoiceDebug::default(),
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        for voice in &mut self.voices {
            voice.set_sample_rate(sample_rate);
        }
    }

    /// Fan a parameter snapshot out to every voice.
    pub fn apply_params(&mut self, params: &SynthParams) {
        for voice in &mut self.voices {
            voice.apply_params(params);
        }
    }

    /// Allocate a voice for `note` and return its slot.
    ///
    /// A voice already playing the same note is retriggered in place.
    /// Otherwise the first inactive voice is used, and when every voice is
    /// busy slot 0 is stolen.
    pub fn note_on(&mut self, note: u8, velocity: f64) -> usize {
        let slot = self
            .voices
            .iter()
            .position(|v| v.is_active() && v.note() == note)
            .or_else(|| self.voices.iter().position(|v| !v.is_active()))
            .unwrap_or_else(|| {
                log::trace!("voice pool exhausted, stealing slot 0 for note {note}");
                0
            });
        self.voices[slot].note_on(note, velocity);
        slot
    }

    /// Release every active voice playing `note`.
    pub fn note_off(&mut self, note: u8) {
        for voice in self.voices.iter_mut().filter(|v| v.is_active() && v.note() == note) {
            voice.note_off();
        }
    }

    pub fn all_notes_off(&mut self) {
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            voice.note_off();
        }
    }

    /// Push the same modulation offsets into every active voice.
    pub fn set_modulation(&mut self, modulation: VoiceModulation) {
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            voice.set_modulation(modulation);
        }
    }

    /// Sum one sample from every active voice.
    pub fn process(&mut self) -> f64 {
        let mut sum = 0.0;
        let mut recorded = false;
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            sum += voice.process();
            if !recorded {
                recorded = true;
                self.debug = *voice.debug();
            }
        }
        if !recorded {
            self.debug = VoiceDebug::default();
        }
        sum
    }

    /// The first active voice, if any; this voice feeds the envelope
    /// modulation sources.
    pub fn first_active(&self) -> Option<&Voice> {
        self.voices.iter().find(|v| v.is_active())
    }

    /// Debug values of the first voice processed in the last sample.
    pub fn debug(&self) -> &VoiceDebug {
        &self.debug
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    /// Hard silence: every voice inactive with cleared state.
    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }
        self.debug = VoiceDebug::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::Stage;

    const SR: f64 = 44100.0;

    #[test]
    fn allocates_first_free_voice() {
        let mut vm = VoiceManager::new(SR);
        assert_eq!(vm.note_on(60, 1.0), 0);
        assert_eq!(vm.note_on(64, 1.0), 1);
        assert_eq!(vm.note_on(67, 1.0), 2);
        assert_eq!(vm.active_count(), 3);
    }

    #[test]
    fn same_note_retriggers_in_place() {
        let mut vm = VoiceManager::new(SR);
        vm.note_on(60, 1.0);
        vm.note_on(64, 1.0);
        assert_eq!(vm.note_on(60, 0.5), 0);
        assert_eq!(vm.active_count(), 2);
        assert_eq!(vm.voice(0).map(|v| v.velocity()), Some(0.5));
    }

    #[test]
    fn exhaustion_steals_slot_zero() {
        let mut vm = VoiceManager::new(SR);
        for n in 0..MAX_VOICES as u8 {
            vm.note_on(40 + n, 1.0);
        }
        assert_eq!(vm.active_count(), MAX_VOICES);
        for _ in 0..10_000 {
            vm.process();
        }
        assert_eq!(vm.voice(0).map(|v| v.amp_env.stage()), Some(Stage::Sustain));

        assert_eq!(vm.note_on(100, 1.0), 0);
        assert_eq!(vm.voice(0).map(|v| v.note()), Some(100));
        // The stolen voice restarts its attack.
        assert_eq!(vm.voice(0).map(|v| v.amp_env.stage()), Some(Stage::Attack));
        assert_eq!(vm.active_count(), MAX_VOICES);
    }

    #[test]
    fn released_voices_are_reused() {
        let mut p = SynthParams::default();
        p.amp_env.release = 0.001;
        let mut vm = VoiceManager::new(SR);
        vm.apply_params(&p);
        vm.note_on(60, 1.0);
        vm.note_on(62, 1.0);
        for _ in 0..1000 {
            vm.process();
        }
        vm.note_off(60);
        for _ in 0..1000 {
            vm.process();
        }
        assert_eq!(vm.active_count(), 1);
        assert_eq!(vm.note_on(65, 1.0), 0);
    }

    #[test]
    fn all_notes_off_silences_the_pool() {
        let mut p = SynthParams::default();
        p.amp_env.release = 0.005;
        let mut vm = VoiceManager::new(SR);
        vm.apply_params(&p);
        for n in [48, 52, 55, 59] {
            vm.note_on(n, 0.9);
        }
        for _ in 0..2000 {
            vm.process();
        }
        vm.all_notes_off();
        for _ in 0..1000 {
            vm.process();
        }
        assert_eq!(vm.active_count(), 0);
        assert_eq!(vm.process(), 0.0);
        assert_eq!(*vm.debug(), VoiceDebug::default());
    }

    #[test]
    fn reset_is_immediate() {
        let mut vm = VoiceManager::new(SR);
        vm.note_on(60, 1.0);
        vm.process();
        vm.reset();
        assert_eq!(vm.active_count(), 0);
        assert!(vm.first_active().is_none());
    }
}
