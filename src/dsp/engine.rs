//! Synth engine: note events plus a parameter snapshot in, samples out.
//!
//! Per sample, in this fixed order:
//!
//! 1. write the previous-sample LFO, envelope and Spellbook values and the
//!    current mod wheel and velocity into the modulation source table
//! 2. advance the matrix smoothers
//! 3. apply LFO rate and Spellbook speed modulation
//! 4. tick the LFOs and the Spellbook
//! 5. write their fresh values back into the source table
//! 6. push voice-level modulation into the voice manager
//! 7. sum the active voices
//! 8. run the effects chain
//! 9. DC blocker, master gain, soft clip
//! 10. refresh the debug snapshot

use serde::Serialize;

use super::effect::EffectsChain;
use super::lfo::Lfo;
use super::mixer::OutputStage;
use super::modulation::{
    MAX_CONNECTIONS, ModConnection, ModDestination, ModSource, ModulationMatrix,
};
use super::spellbook::Spellbook;
use super::voice::{FILTER_ENV_RANGE, VoiceModulation};
use super::voice_manager::VoiceManager;
use crate::event::{CC_ALL_NOTES_OFF, CC_MOD_WHEEL, NoteEvent, NoteEventKind};
use crate::params::{MOD_SLOTS, SharedParams, SynthParams};

/// Frequency of A4 (MIDI 69) in Hz.
pub const TUNING_PITCH: f64 = 440.0;
/// Pitch modulation range at full scale, in semitones.
const PITCH_MOD_RANGE: f64 = 12.0;
const LFO1_SEED: u32 = 0x5EED_0001;
const LFO2_SEED: u32 = 0x5EED_0002;

/// Convert a (possibly fractional) MIDI note number to frequency.
///
/// Formula: `440 * 2^((note - 69) / 12)`
pub fn midi_to_frequency(note: f64) -> f64 {
    TUNING_PITCH * ((note - 69.0) / 12.0).exp2()
}

/// Per-sample values for meters and debugging views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub osc1: f64,
    pub osc2: f64,
    pub sub: f64,
    pub noise: f64,
    pub filter_out: f64,
    pub filter_cutoff: f64,
    pub amp_env: f64,
    pub filter_env: f64,
    pub lfo1: f64,
    pub lfo2: f64,
    pub spellbook_x: f64,
    pub spellbook_y: f64,
    pub active_voices: usize,
    /// OTT follower levels in dB, low to high.
    pub ott_levels: [f64; 3],
    pub output: f64,
    /// The last sample went through the soft clipper.
    pub clipped: bool,
    /// A non-finite value was caught since the last `prepare` or `reset`.
    pub nan_detected: bool,
}

pub struct SynthEngine {
    sample_rate: f64,
    max_block_size: usize,
    params: SynthParams,
    voices: VoiceManager,
    matrix: ModulationMatrix,
    lfo1: Lfo,
    lfo2: Lfo,
    spellbook: Spellbook,
    effects: EffectsChain,
    output: OutputStage,
    mod_wheel: f64,
    velocity: f64,
    debug: DebugSnapshot,
}

impl SynthEngine {
    pub fn new(sample_rate: f64) -> Self {
        let params = SynthParams::default();
        let mut engine = SynthEngine {
            sample_rate,
            max_block_size: 0,
            params: params.clone(),
            voices: VoiceManager::new(sample_rate),
            matrix: ModulationMatrix::new(sample_rate),
            lfo1: Lfo::new(sample_rate, LFO1_SEED),
            lfo2: Lfo::new(sample_rate, LFO2_SEED),
            spellbook: Spellbook::new(sample_rate),
            effects: EffectsChain::new(sample_rate),
            output: OutputStage::new(sample_rate, params.master_gain),
            mod_wheel: 0.0,
            velocity: 0.0,
            debug: DebugSnapshot::default(),
        };
        engine.apply(&params);
        engine
    }

    /// Size every buffer for `sample_rate` and return to silence. This is
    /// the only place the engine allocates.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) {
        log::debug!("prepare: {sample_rate} Hz, blocks of up to {max_block_size} samples");
        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.voices.set_sample_rate(sample_rate);
        self.matrix.set_sample_rate(sample_rate);
        self.lfo1.set_sample_rate(sample_rate);
        self.lfo2.set_sample_rate(sample_rate);
        self.spellbook.set_sample_rate(sample_rate);
        self.effects.prepare(sample_rate, max_block_size);
        self.output.set_sample_rate(sample_rate);
        let params = self.params.clone();
        self.apply(&params);
        self.reset();
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn params(&self) -> &SynthParams {
        &self.params
    }

    /// Apply a parameter snapshot. Unchanged snapshots are skipped.
    pub fn set_params(&mut self, params: &SynthParams) {
        if *params == self.params {
            return;
        }
        self.params = params.clone();
        self.apply(params);
    }

    fn apply(&mut self, params: &SynthParams) {
        let p = params.clamped();
        self.voices.apply_params(&p);

        for i in 0..MAX_CONNECTIONS {
            let connection = if i < MOD_SLOTS { p.mod_matrix[i] } else { ModConnection::default() };
            self.matrix.set_connection(i, connection);
        }

        self.lfo1.shape = p.lfo1.shape;
        self.lfo1.set_rate(p.lfo1.rate);
        self.lfo2.shape = p.lfo2.shape;
        self.lfo2.set_rate(p.lfo2.rate);

        let sb = &p.spellbook;
        self.spellbook.shape = sb.shape;
        self.spellbook.set_rate(sb.rate);
        self.spellbook.set_size(sb.size);
        self.spellbook.set_sides(sb.sides);
        self.spellbook.set_active_outputs(sb.outputs);
        self.spellbook.set_speed_spread(sb.speed_spread);

        self.effects.apply_params(&p.effects);
        self.output.set_master_gain(p.master_gain);
    }

    pub fn handle_event(&mut self, event: &NoteEvent) {
        match event.kind {
            NoteEventKind::NoteOn if event.velocity > 0.0 => {
                self.velocity = event.velocity.clamp(0.0, 1.0);
                self.voices.note_on(event.note, self.velocity);
            }
            // Velocity 0 note-on is a note-off.
            NoteEventKind::NoteOn | NoteEventKind::NoteOff => self.voices.note_off(event.note),
            NoteEventKind::AllNotesOff => self.voices.all_notes_off(),
            NoteEventKind::Controller => match event.note {
                CC_MOD_WHEEL => {
                    self.mod_wheel = if event.velocity.is_finite() {
                        event.velocity.clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                }
                CC_ALL_NOTES_OFF => self.voices.all_notes_off(),
                cc => log::trace!("ignoring controller {cc}"),
            },
        }
    }

    fn write_control_sources(&mut self) {
        let (amp, filter) = self
            .voices
            .first_active()
            .map_or((0.0, 0.0), |v| (v.amp_env.value(), v.filter_env.value()));
        self.matrix.set_source_value(ModSource::AmpEnvelope, amp);
        self.matrix.set_source_value(ModSource::FilterEnvelope, filter);
        self.matrix.set_source_value(ModSource::ModWheel, self.mod_wheel);
        self.matrix.set_source_value(ModSource::Velocity, self.velocity);
    }

    fn write_modulator_sources(&mut self) {
        self.matrix.set_source_value(ModSource::Lfo1, self.lfo1.value());
        self.matrix.set_source_value(ModSource::Lfo2, self.lfo2.value());
        for (i, point) in self.spellbook.outputs().iter().enumerate() {
            let i = i as u8;
            self.matrix.set_source_value(ModSource::SpellbookX(i), point.x);
            self.matrix.set_source_value(ModSource::SpellbookY(i), point.y);
        }
    }

    fn voice_modulation(&self) -> VoiceModulation {
        let m = |d| self.matrix.modulation_amount(d);
        VoiceModulation {
            pitch: m(ModDestination::Pitch) * PITCH_MOD_RANGE,
            osc1_level: m(ModDestination::Osc1Level),
            osc2_level: m(ModDestination::Osc2Level),
            sub_level: m(ModDestination::SubLevel),
            noise_level: m(ModDestination::NoiseLevel),
            cutoff: m(ModDestination::FilterCutoff) * FILTER_ENV_RANGE,
            resonance: m(ModDestination::FilterResonance),
            amp: m(ModDestination::AmpLevel),
            ring: m(ModDestination::RingMod),
        }
    }

    /// Produce one output sample.
    pub fn process(&mut self) -> f32 {
        // Previous-sample modulators, current controls.
        self.write_modulator_sources();
        self.write_control_sources();
        self.matrix.update_smoothing();

        self.lfo1.set_rate_modulation(self.matrix.modulation_amount(ModDestination::Lfo1Rate));
        self.lfo2.set_rate_modulation(self.matrix.modulation_amount(ModDestination::Lfo2Rate));
        self.spellbook
            .set_speed_modulation(self.matrix.modulation_amount(ModDestination::SpellbookSpeed));
        self.lfo1.tick();
        self.lfo2.tick();
        self.spellbook.tick();

        // Fresh modulator values feed the voices this sample.
        self.write_modulator_sources();
        let modulation = self.voice_modulation();
        self.voices.set_modulation(modulation);

        let mut x = self.voices.process();
        if !x.is_finite() {
            self.debug.nan_detected = true;
            x = 0.0;
        }
        x = self.effects.process(x);
        if !x.is_finite() {
            log::debug!("effects chain produced a non-finite sample");
            self.debug.nan_detected = true;
            self.effects.reset();
            x = 0.0;
        }
        let y = self.output.process(x);

        self.refresh_debug(y);
        y as f32
    }

    fn refresh_debug(&mut self, output: f64) {
        let v = self.voices.debug();
        let sb = self.spellbook.output(0);
        self.debug = DebugSnapshot {
            osc1: v.osc1,
            osc2: v.osc2,
            sub: v.sub,
            noise: v.noise,
            filter_out: v.filter,
            filter_cutoff: v.cutoff,
            amp_env: v.amp_env,
            filter_env: v.filter_env,
            lfo1: self.lfo1.value(),
            lfo2: self.lfo2.value(),
            spellbook_x: sb.x,
            spellbook_y: sb.y,
            active_voices: self.voices.active_count(),
            ott_levels: self.effects.ott.band_levels(),
            output,
            clipped: self.output.clipped(),
            nan_detected: self.debug.nan_detected,
        };
    }

    /// Render `out.len()` samples, dispatching `events` at their offsets.
    ///
    /// Events must be sorted by `sample_position`. Events at or past the end
    /// of the block are applied after the last sample.
    pub fn process_block(&mut self, events: &[NoteEvent], out: &mut [f32]) {
        let mut next = 0;
        for (i, sample) in out.iter_mut().enumerate() {
            while let Some(event) = events.get(next).filter(|e| e.sample_position <= i) {
                self.handle_event(event);
                next += 1;
            }
            *sample = self.process();
        }
        for event in &events[next..] {
            self.handle_event(event);
        }
    }

    /// Like `process_block`, reading a fresh parameter snapshot each sample.
    pub fn process_block_shared(
        &mut self,
        shared: &SharedParams,
        events: &[NoteEvent],
        out: &mut [f32],
    ) {
        let mut next = 0;
        for (i, sample) in out.iter_mut().enumerate() {
            self.set_params(&shared.load());
            while let Some(event) = events.get(next).filter(|e| e.sample_position <= i) {
                self.handle_event(event);
                next += 1;
            }
            *sample = self.process();
        }
        for event in &events[next..] {
            self.handle_event(event);
        }
    }

    pub fn debug_snapshot(&self) -> &DebugSnapshot {
        &self.debug
    }

    pub fn active_voices(&self) -> usize {
        self.voices.active_count()
    }

    /// Hard reset to silence, keeping the current parameters.
    pub fn reset(&mut self) {
        self.voices.reset();
        self.matrix.reset();
        self.lfo1.reset();
        self.lfo2.reset();
        self.spellbook.reset();
        self.effects.reset();
        self.output.reset();
        self.mod_wheel = 0.0;
        self.velocity = 0.0;
        self.debug = DebugSnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::modulation::ModCurve;
    use approx::assert_relative_eq;
    use crate::dsp::oscillator::Waveform;

    const SR: f64 = 44100.0;

    fn a440_params() -> SynthParams {
        let mut p = SynthParams::default();
        p.osc1.waveform = Waveform::Sine;
        p.osc1.level = 1.0;
        p.amp_env.attack = 0.001;
        p.amp_env.decay = 0.1;
        p.amp_env.sustain = 1.0;
        p.amp_env.release = 0.1;
        p
    }

    fn engine_with(params: &SynthParams) -> SynthEngine {
        let mut engine = SynthEngine::new(SR);
        engine.prepare(SR, 512);
        engine.set_params(params);
        engine
    }

    /// Frequency estimate from linearly interpolated rising zero crossings.
    fn measure_frequency(samples: &[f32], sample_rate: f64) -> f64 {
        let crossings: Vec<f64> = samples
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[0] < 0.0 && w[1] >= 0.0)
            .map(|(i, w)| {
                let (a, b) = (f64::from(w[0]), f64::from(w[1]));
                i as f64 + a / (a - b)
            })
            .collect();
        let first = crossings[0];
        let last = crossings[crossings.len() - 1];
        (crossings.len() - 1) as f64 * sample_rate / (last - first)
    }

    #[test]
    fn midi_69_is_a440() {
        assert!((midi_to_frequency(69.0) - 440.0).abs() < 1e-12);
        assert!((midi_to_frequency(60.0) - 261.6256).abs() < 1e-3);
        assert!((midi_to_frequency(81.0) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn a440_end_to_end() {
        let mut engine = engine_with(&a440_params());
        engine.handle_event(&NoteEvent::note_on(69, 1.0, 0));

        let mut out = vec![0.0f32; 2000];
        engine.process_block(&[], &mut out);
        let freq = measure_frequency(&out[1000..], SR);
        assert!((freq - 440.0).abs() < 4.4, "measured {freq} Hz");
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 2.0));
    }

    #[test]
    fn silence_without_notes() {
        let mut engine = engine_with(&SynthParams::default());
        let mut out = vec![1.0f32; 256];
        engine.process_block(&[], &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(engine.debug_snapshot().active_voices, 0);
    }

    #[test]
    fn events_land_on_their_sample() {
        let mut engine = engine_with(&a440_params());
        let mut out = vec![0.0f32; 128];
        engine.process_block(&[NoteEvent::note_on(69, 1.0, 64)], &mut out);
        assert!(out[..64].iter().all(|&s| s == 0.0));
        assert!(out[65..].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn note_off_releases_to_silence() {
        let mut engine = engine_with(&a440_params());
        let mut out = vec![0.0f32; 4410];
        let events = [NoteEvent::note_on(60, 1.0, 0), NoteEvent::note_off(60, 2000)];
        engine.process_block(&events, &mut out);
        assert_eq!(engine.active_voices(), 1);
        let mut tail = vec![0.0f32; 4410];
        engine.process_block(&[], &mut tail);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn zero_velocity_note_on_releases() {
        let mut engine = engine_with(&a440_params());
        engine.handle_event(&NoteEvent::note_on(60, 1.0, 0));
        engine.process();
        engine.handle_event(&NoteEvent::note_on(60, 0.0, 0));
        for _ in 0..10_000 {
            engine.process();
        }
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn controllers_drive_mod_wheel_and_panic() {
        let mut params = a440_params();
        params.mod_matrix[0] = ModConnection::new(ModSource::ModWheel, ModDestination::Pitch, 1.0);
        let mut engine = engine_with(&params);
        engine.handle_event(&NoteEvent::note_on(57, 1.0, 0));
        engine.handle_event(&NoteEvent::controller(CC_MOD_WHEEL, 1.0, 0));

        let mut out = vec![0.0f32; 4000];
        engine.process_block(&[], &mut out);
        // Mod wheel at full scale lifts 220 Hz by an octave.
        let freq = measure_frequency(&out[1000..], SR);
        assert!((freq - 440.0).abs() < 4.4, "measured {freq} Hz");

        engine.handle_event(&NoteEvent::controller(CC_ALL_NOTES_OFF, 0.0, 0));
        let mut tail = vec![0.0f32; 10_000];
        engine.process_block(&[], &mut tail);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn lfo_rate_modulation_is_applied() {
        let mut params = SynthParams::default();
        params.lfo2.rate = 1.0;
        params.mod_matrix[0] =
            ModConnection::new(ModSource::Velocity, ModDestination::Lfo2Rate, 0.25);
        let mut engine = engine_with(&params);
        engine.handle_event(&NoteEvent::note_on(60, 1.0, 0));
        for _ in 0..10 {
            engine.process();
        }
        // 0.25 of ±4 octaves doubles the rate.
        assert!((engine.lfo2.effective_rate() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn lfo_feedback_is_one_sample_late_and_voices_see_the_fresh_value() {
        let mut params = a440_params();
        params.lfo1.rate = 5.0;
        params.mod_matrix[0] = ModConnection::new(ModSource::Lfo1, ModDestination::Lfo1Rate, 0.5);
        params.mod_matrix[1] =
            ModConnection::new(ModSource::Lfo1, ModDestination::FilterCutoff, 0.1);
        let mut engine = engine_with(&params);
        engine.handle_event(&NoteEvent::note_on(69, 1.0, 0));

        for _ in 0..2000 {
            let previous = engine.lfo1.value();
            engine.process();
            // Rate modulation reads the value from before this tick.
            let expected_rate = 5.0 * (previous * 0.5 * 4.0).exp2();
            assert_relative_eq!(engine.lfo1.effective_rate(), expected_rate, epsilon = 1e-12);
            // Voice destinations read the value after it.
            let expected_cutoff = 8000.0 + engine.lfo1.value() * 0.1 * FILTER_ENV_RANGE;
            let cutoff = engine.debug_snapshot().filter_cutoff;
            assert_relative_eq!(cutoff, expected_cutoff, epsilon = 1e-9);
        }
        assert!(engine.lfo1.value().abs() > 0.1, "LFO never moved");
    }

    #[test]
    fn spellbook_drives_cutoff() {
        let mut params = a440_params();
        params.spellbook.rate = 5.0;
        params.mod_matrix[3] =
            ModConnection::new(ModSource::SpellbookX(0), ModDestination::FilterCutoff, -0.5)
            .with_curve(ModCurve::SCurve);
        let mut engine = engine_with(&params);
        engine.handle_event(&NoteEvent::note_on(60, 1.0, 0));
        let mut cutoffs = Vec::new();
        for _ in 0..SR as usize / 5 {
            engine.process();
            cutoffs.push(engine.debug_snapshot().filter_cutoff);
        }
        let min = cutoffs.iter().cloned().fold(f64::MAX, f64::min);
        let max = cutoffs.iter().cloned().fold(f64::MIN, f64::max);
        assert!(max - min > 5000.0, "cutoff swept {min}..{max}");
    }

    #[test]
    fn shared_params_are_picked_up_per_sample() {
        let shared = SharedParams::new(a440_params());
        let mut engine = SynthEngine::new(SR);
        engine.prepare(SR, 64);
        let mut out = vec![0.0f32; 64];
        engine.process_block_shared(&shared, &[NoteEvent::note_on(69, 1.0, 0)], &mut out);
        assert_eq!(engine.params().osc1.waveform, Waveform::Sine);

        let mut louder = a440_params();
        louder.master_gain = 1.5;
        shared.store(louder);
        engine.process_block_shared(&shared, &[], &mut out);
        assert_eq!(engine.params().master_gain, 1.5);
    }

    #[test]
    fn stolen_voice_keeps_engine_stable() {
        let mut engine = engine_with(&SynthParams::default());
        let events: Vec<NoteEvent> =
            (0..20).map(|n| NoteEvent::note_on(40 + n, 1.0, n as usize)).collect();
        let mut out = vec![0.0f32; 512];
        engine.process_block(&events, &mut out);
        assert_eq!(engine.active_voices(), 16);
        assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 2.0));
    }

    #[test]
    fn debug_snapshot_tracks_voice() {
        let mut engine = engine_with(&a440_params());
        engine.handle_event(&NoteEvent::note_on(69, 1.0, 0));
        for _ in 0..500 {
            engine.process();
        }
        let snap = *engine.debug_snapshot();
        assert_eq!(snap.active_voices, 1);
        assert!((snap.amp_env - 1.0).abs() < 1e-6);
        assert!(!snap.nan_detected);
        let json = serde_json::to_string(&snap).expect("serializes");
        assert!(json.contains("\"ampEnv\""));
    }

    #[test]
    fn prepare_resets_to_silence() {
        let mut engine = engine_with(&a440_params());
        engine.handle_event(&NoteEvent::note_on(69, 1.0, 0));
        engine.process();
        engine.prepare(48000.0, 256);
        assert_eq!(engine.active_voices(), 0);
        assert_eq!(engine.sample_rate(), 48000.0);
        assert_eq!(engine.process(), 0.0);
    }
}
