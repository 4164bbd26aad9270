//! A single note instance: two unison oscillator layers, sub, noise,
//! ring modulation, a selectable filter and two ADSR envelopes.

use super::engine::midi_to_frequency;
use super::envelope::Envelope;
use super::filter::{MAX_CUTOFF, MIN_CUTOFF};
use super::filter_bank::VoiceFilter;
use super::finite_or_zero;
use super::noise::NoiseGenerator;
use super::oscillator::{Oscillator, SubOscillator};
use crate::params::{
    FilterParams, MAX_UNISON, NoiseParams, OscParams, SubParams, SynthParams, UnisonParams,
};

/// Filter-envelope depth at full scale, in Hz.
pub const FILTER_ENV_RANGE: f64 = 10_000.0;
/// Sources at or below this level are left out of the mix normalisation.
const ACTIVE_LEVEL: f64 = 0.01;
/// Output level above which the voice soft-saturates.
const SATURATION_KNEE: f64 = 0.9;
const OUTPUT_LIMIT: f64 = 1.5;

/// Per-voice modulation offsets pushed in by the orchestrator each sample.
///
/// `pitch` is in semitones and `cutoff` in Hz; every other field is a
/// bipolar offset added to the matching normalised parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoiceModulation {
    pub pitch: f64,
    pub osc1_level: f64,
    pub osc2_level: f64,
    pub sub_level: f64,
    pub noise_level: f64,
    pub cutoff: f64,
    pub resonance: f64,
    pub amp: f64,
    pub ring: f64,
}

/// Last values produced by a voice, for the debug snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoiceDebug {
    pub osc1: f64,
    pub osc2: f64,
    pub sub: f64,
    pub noise: f64,
    pub filter: f64,
    pub cutoff: f64,
    pub amp_env: f64,
    pub filter_env: f64,
}

/// Position of unison oscillator `index` out of `count`, in [-1, 1].
///
/// Index 0 is the centre voice. The extras sit at evenly spaced symmetric
/// positions; a single extra alternates sign starting at +1.
pub fn unison_position(index: usize, count: usize) -> f64 {
    if index == 0 || count <= 1 {
        return 0.0;
    }
    let extras = count - 1;
    let j = index - 1;
    if extras == 1 {
        if j % 2 == 0 { 1.0 } else { -1.0 }
    } else {
        -1.0 + 2.0 * j as f64 / (extras - 1) as f64
    }
}

/// One oscillator per unison position, all sharing the layer's settings.
#[derive(Debug, Clone)]
struct OscLayer {
    params: OscParams,
    oscs: [Oscillator; MAX_UNISON],
}

impl OscLayer {
    fn new(params: OscParams) -> Self {
        OscLayer {
            params,
            oscs: std::array::from_fn(|_| Oscillator::new(params.waveform)),
        }
    }

    fn configure(&mut self, params: OscParams) {
        self.params = params;
        for osc in &mut self.oscs {
            osc.waveform = params.waveform;
            osc.pulse_width = params.pulse_width;
        }
    }

    /// Unison sum normalised by `1/sqrt(n)`.
    fn next_sample(&mut self, carrier: f64, unison: &UnisonParams, sample_rate: f64) -> f64 {
        let count = unison.voices.clamp(1, MAX_UNISON);
        let base = carrier * (f64::from(self.params.octave) + self.params.detune / 1200.0).exp2();
        let mut sum = 0.0;
        for (i, osc) in self.oscs.iter_mut().take(count).enumerate() {
            let cents = unison_position(i, count) * unison.spread;
            osc.set_frequency(base * (cents / 1200.0).exp2(), sample_rate);
            sum += osc.next_sample();
        }
        sum / (count as f64).sqrt()
    }

    fn reset(&mut self) {
        for osc in &mut self.oscs {
            osc.reset();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Voice {
    active: bool,
    note: u8,
    velocity: f64,
    base_frequency: f64,

    osc1: OscLayer,
    osc2: OscLayer,
    sub: SubOscillator,
    sub_params: SubParams,
    noise: NoiseGenerator,
    noise_params: NoiseParams,
    ring_mod: f64,
    unison: UnisonParams,

    filter: VoiceFilter,
    filter_params: FilterParams,
    pub amp_env: Envelope,
    pub filter_env: Envelope,

    modulation: VoiceModulation,
    debug: VoiceDebug,
    sample_rate: f64,
}

impl Voice {
    /// `index` seeds the voice's noise generator so voices never share a
    /// random sequence.
    pub fn new(sample_rate: f64, index: usize) -> Self {
        let defaults = SynthParams::default();
        let seed = 0x1234_5677u32.wrapping_add((index as u32).wrapping_mul(0x9E37_79B9)) | 1;
        let mut voice = Voice {
            active: false,
            note: 0,
            velocity: 0.0,
            base_frequency: 0.0,
            osc1: OscLayer::new(defaults.osc1),
            osc2: OscLayer::new(defaults.osc2),
            sub: SubOscillator::new(),
            sub_params: defaults.sub,
            noise: NoiseGenerator::new(seed),
            noise_params: defaults.noise,
            ring_mod: defaults.ring_mod,
            unison: defaults.unison,
            filter: VoiceFilter::new(sample_rate),
            filter_params: defaults.filter,
            amp_env: Envelope::new(sample_rate),
            filter_env: Envelope::new(sample_rate),
            modulation: VoiceModulation::default(),
            debug: VoiceDebug::default(),
            sample_rate,
        };
        voice.apply_params(&defaults);
        voice
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.filter.set_sample_rate(sample_rate);
        self.amp_env.set_sample_rate(sample_rate);
        self.filter_env.set_sample_rate(sample_rate);
    }

    /// Copy the voice-level controls out of a parameter snapshot.
    pub fn apply_params(&mut self, params: &SynthParams) {
        self.osc1.configure(params.osc1);
        self.osc2.configure(params.osc2);
        self.sub_params = params.sub;
        self.sub.set_octave(params.sub.octave);
        self.noise_params = params.noise;
        self.noise.noise_type = params.noise.noise_type;
        self.ring_mod = params.ring_mod;
        self.unison = params.unison;

        self.filter_params = params.filter;
        self.filter.set_kind(params.filter.kind);
        self.filter.set_vowel(params.filter.vowel);
        self.filter.set_drive(params.filter.drive);

        let a = &params.amp_env;
        self.amp_env.set_params(a.attack, a.decay, a.sustain, a.release);
        let f = &params.filter_env;
        self.filter_env.set_params(f.attack, f.decay, f.sustain, f.release);
    }

    /// Start (or retrigger) a note. Velocity is normalised to [0, 1].
    ///
    /// A retrigger keeps oscillator phases and the envelope level so the
    /// note does not click.
    pub fn note_on(&mut self, note: u8, velocity: f64) {
        if !self.active {
            self.reset_state();
        }
        self.active = true;
        self.note = note;
        self.velocity = if velocity.is_finite() { velocity.clamp(0.0, 1.0) } else { 0.0 };
        self.base_frequency = midi_to_frequency(f64::from(note));
        self.modulation = VoiceModulation::default();
        self.amp_env.note_on();
        self.filter_env.note_on();
    }

    pub fn note_off(&mut self) {
        self.amp_env.note_off();
        self.filter_env.note_off();
    }

    pub fn set_modulation(&mut self, modulation: VoiceModulation) {
        self.modulation = modulation;
    }

    pub fn modulation(&self) -> &VoiceModulation {
        &self.modulation
    }

    /// Generate the next sample; inactive voices return exactly 0.
    pub fn process(&mut self) -> f64 {
        if !self.active {
            return 0.0;
        }
        let m = self.modulation;
        let sr = self.sample_rate;
        let carrier = self.base_frequency * (m.pitch / 12.0).exp2();

        let mut sources = 0usize;
        let mut mix = 0.0;

        let osc1_raw = if self.osc1.params.enabled {
            self.osc1.next_sample(carrier, &self.unison, sr)
        } else {
            0.0
        };
        let osc1_level = (self.osc1.params.level + m.osc1_level).clamp(0.0, 1.0);
        if self.osc1.params.enabled {
            mix += osc1_raw * osc1_level;
            sources += usize::from(osc1_level > ACTIVE_LEVEL);
        }

        let osc2_raw = if self.osc2.params.enabled {
            self.osc2.next_sample(carrier, &self.unison, sr)
        } else {
            0.0
        };
        let osc2_level = (self.osc2.params.level + m.osc2_level).clamp(0.0, 1.0);
        if self.osc2.params.enabled {
            mix += osc2_raw * osc2_level;
            sources += usize::from(osc2_level > ACTIVE_LEVEL);
        }

        let mut sub_out = 0.0;
        if self.sub_params.enabled {
            self.sub.set_carrier_frequency(carrier, sr);
            let level = (self.sub_params.level + m.sub_level).clamp(0.0, 1.0);
            sub_out = self.sub.next_sample();
            mix += sub_out * level;
            sources += usize::from(level > ACTIVE_LEVEL);
        }

        let mut noise_out = 0.0;
        if self.noise_params.enabled {
            let level = (self.noise_params.level + m.noise_level).clamp(0.0, 1.0);
            noise_out = self.noise.next_sample();
            mix += noise_out * level;
            sources += usize::from(level > ACTIVE_LEVEL);
        }

        let ring = (self.ring_mod + m.ring).clamp(0.0, 1.0);
        if ring > 0.0 && self.osc1.params.enabled && self.osc2.params.enabled {
            mix = mix * (1.0 - ring) + osc1_raw * osc2_raw * ring;
        }

        if sources > 0 {
            mix /= (sources as f64).sqrt();
        }
        if mix.abs() > 1.0 {
            mix = mix.tanh();
        }

        let filter_env = self.filter_env.next_sample();
        let amp_env = self.amp_env.next_sample();

        let fp = &self.filter_params;
        let cutoff = (fp.cutoff + filter_env * fp.env_amount * FILTER_ENV_RANGE + m.cutoff)
            .clamp(MIN_CUTOFF, MAX_CUTOFF);
        self.filter.set_params(cutoff, fp.resonance + m.resonance);
        let filtered = self.filter.process(mix);

        let gain = (1.0 + m.amp).clamp(0.0, 2.0);
        let mut out = filtered * amp_env * self.velocity * gain;
        if out.abs() > SATURATION_KNEE {
            let excess = out.abs() - SATURATION_KNEE;
            out = out.signum() * (SATURATION_KNEE + excess.tanh());
        }
        let out = finite_or_zero(out).clamp(-OUTPUT_LIMIT, OUTPUT_LIMIT);

        self.debug = VoiceDebug {
            osc1: osc1_raw,
            osc2: osc2_raw,
            sub: sub_out,
            noise: noise_out,
            filter: filtered,
            cutoff,
            amp_env,
            filter_env,
        };

        if self.amp_env.is_idle() {
            self.active = false;
            self.reset_state();
        }
        out
    }

    /// Clear every piece of per-note state.
    fn reset_state(&mut self) {
        self.osc1.reset();
        self.osc2.reset();
        self.sub.reset();
        self.noise.reset();
        self.filter.reset();
        self.amp_env.reset();
        self.filter_env.reset();
        self.modulation = VoiceModulation::default();
    }

    /// Hard reset to silence.
    pub fn reset(&mut self) {
        self.active = false;
        self.reset_state();
        self.debug = VoiceDebug::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn base_frequency(&self) -> f64 {
        self.base_frequency
    }

    pub fn debug(&self) -> &VoiceDebug {
        &self.debug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::Stage;
    use crate::dsp::oscillator::Waveform;

    const SR: f64 = 44100.0;

    fn quick_params() -> SynthParams {
        let mut p = SynthParams::default();
        p.amp_env.attack = 0.001;
        p.amp_env.decay = 0.001;
        p.amp_env.sustain = 0.5;
        p.amp_env.release = 0.01;
        p
    }

    #[test]
    fn unison_positions_are_symmetric() {
        assert_eq!(unison_position(0, 5), 0.0);
        assert_eq!(unison_position(1, 2), 1.0);
        let four: Vec<f64> = (1..5).map(|i| unison_position(i, 5)).collect();
        assert_eq!(four.len(), 4);
        assert!((four[0] + 1.0).abs() < 1e-12);
        assert!((four[3] - 1.0).abs() < 1e-12);
        assert!((four[1] + four[2]).abs() < 1e-12);
    }

    #[test]
    fn voice_produces_sound() {
        let mut v = Voice::new(SR, 0);
        v.note_on(69, 0.8);

        let mut has_nonzero = false;
        for _ in 0..4410 {
            if v.process().abs() > 0.001 {
                has_nonzero = true;
            }
        }
        assert!(has_nonzero, "Voice should produce non-zero output");
        assert!((v.base_frequency() - 440.0).abs() < 1e-9);
    }

    #[test]
    fn voice_deactivates_after_release() {
        let mut v = Voice::new(SR, 0);
        v.apply_params(&quick_params());
        v.note_on(60, 1.0);
        for _ in 0..500 {
            v.process();
        }
        v.note_off();
        assert_eq!(v.amp_env.stage(), Stage::Release);
        for _ in 0..2000 {
            v.process();
        }
        assert!(!v.is_active(), "Voice should be inactive after release");
        assert_eq!(v.process(), 0.0);
        assert_eq!(v.amp_env.value(), 0.0);
    }

    #[test]
    fn inactive_voice_is_silent() {
        let mut v = Voice::new(SR, 3);
        for _ in 0..100 {
            assert_eq!(v.process(), 0.0);
        }
    }

    #[test]
    fn voice_output_is_bounded() {
        let mut p = SynthParams::default();
        p.osc2.enabled = true;
        p.sub.enabled = true;
        p.noise.enabled = true;
        p.unison.voices = 5;
        p.unison.spread = 50.0;
        p.filter.resonance = 0.99;
        p.filter.drive = 1.0;
        let mut v = Voice::new(SR, 0);
        v.apply_params(&p);
        v.note_on(36, 1.0);
        v.set_modulation(VoiceModulation {
            amp: 1.0,
            osc1_level: 1.0,
            ..VoiceModulation::default()
        });
        for _ in 0..44100 {
            let s = v.process();
            assert!(s.is_finite() && s.abs() <= OUTPUT_LIMIT, "out of range: {s}");
        }
    }

    #[test]
    fn note_on_clears_modulation() {
        let mut v = Voice::new(SR, 0);
        v.set_modulation(VoiceModulation {
            pitch: 3.0,
            ..VoiceModulation::default()
        });
        v.note_on(64, 0.5);
        assert_eq!(*v.modulation(), VoiceModulation::default());
    }

    #[test]
    fn retrigger_keeps_envelope_level() {
        let mut v = Voice::new(SR, 0);
        v.apply_params(&quick_params());
        v.note_on(60, 1.0);
        for _ in 0..200 {
            v.process();
        }
        let level = v.amp_env.value();
        v.note_on(60, 1.0);
        assert_eq!(v.amp_env.value(), level);
        assert_eq!(v.amp_env.stage(), Stage::Attack);
    }

    #[test]
    fn pitch_modulation_shifts_by_semitones() {
        let mut p = SynthParams::default();
        p.osc1.waveform = Waveform::Sine;
        p.filter.cutoff = MAX_CUTOFF;
        p.amp_env.attack = 0.0;
        p.amp_env.sustain = 1.0;
        let mut v = Voice::new(SR, 0);
        v.apply_params(&p);
        v.note_on(57, 1.0); // 220 Hz
        v.set_modulation(VoiceModulation {
            pitch: 12.0,
            ..VoiceModulation::default()
        });

        let samples: Vec<f64> = (0..44100).map(|_| v.process()).collect();
        let crossings = samples[4410..]
            .windows(2)
            .filter(|w| w[0] < 0.0 && w[1] >= 0.0)
            .count();
        // 0.9 s at 440 Hz.
        assert!((390..=402).contains(&crossings), "got {crossings} rising crossings");
    }
}
