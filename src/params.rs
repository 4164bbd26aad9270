//! Parameter snapshot types.
//!
//! `SynthParams` is the complete set of controls the core reads each sample.
//! It is plain data: hosts fill it from their own parameter storage, tests
//! build it in code, and the offline/WASM surfaces parse it from JSON.
//! Field names serialize in camelCase to match the web front end.

use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use serde::{Deserialize, Serialize};

use crate::dsp::distortion::DistortionMode;
use crate::dsp::filter::{MAX_CUTOFF, MIN_CUTOFF};
use crate::dsp::filter_bank::FilterKind;
use crate::dsp::formant::Vowel;
use crate::dsp::lfo::{LfoShape, MAX_LFO_RATE, MIN_LFO_RATE};
use crate::dsp::modulation::ModConnection;
use crate::dsp::noise::NoiseType;
use crate::dsp::oscillator::Waveform;
use crate::dsp::spellbook::{MAX_SPELLBOOK_OUTPUTS, SpellShape};
use crate::error::SynthError;

/// Number of user-configurable modulation slots in a snapshot.
pub const MOD_SLOTS: usize = 8;
/// Maximum oscillators stacked per carrier.
pub const MAX_UNISON: usize = 5;

fn clamp_finite(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() { value.clamp(min, max) } else { fallback }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OscParams {
    pub enabled: bool,
    pub waveform: Waveform,
    /// Linear level in [0, 1].
    pub level: f64,
    /// Fine detune in cents, [-100, 100].
    pub detune: f64,
    /// Octave offset, [-3, 3].
    pub octave: i32,
    /// Pulse width for the pulse waveform, [0.05, 0.95].
    pub pulse_width: f64,
}

impl Default for OscParams {
    fn default() -> Self {
        Self {
            enabled: true,
            waveform: Waveform::Saw,
            level: 0.8,
            detune: 0.0,
            octave: 0,
            pulse_width: 0.5,
        }
    }
}

impl OscParams {
    fn clamped(self) -> Self {
        Self {
            level: clamp_finite(self.level, 0.0, 1.0, 0.0),
            detune: clamp_finite(self.detune, -100.0, 100.0, 0.0),
            octave: self.octave.clamp(-3, 3),
            pulse_width: clamp_finite(self.pulse_width, 0.05, 0.95, 0.5),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubParams {
    pub enabled: bool,
    pub level: f64,
    /// Octaves below the carrier: 1 or 2.
    pub octave: u8,
}

impl Default for SubParams {
    fn default() -> Self {
        Self {
            enabled: false,
            level: 0.5,
            octave: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NoiseParams {
    pub enabled: bool,
    pub noise_type: NoiseType,
    pub level: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            enabled: false,
            noise_type: NoiseType::White,
            level: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UnisonParams {
    /// Oscillators per carrier, [1, 5].
    pub voices: usize,
    /// Spread of the outermost unison voices in cents, [0, 100].
    pub spread: f64,
}

impl Default for UnisonParams {
    fn default() -> Self {
        Self {
            voices: 1,
            spread: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterParams {
    pub kind: FilterKind,
    /// Cutoff in Hz, [20, 20000].
    pub cutoff: f64,
    /// Resonance in [0, 0.99]; comb feedback uses [-0.99, 0.99].
    pub resonance: f64,
    /// Pre-filter drive, [0, 1].
    pub drive: f64,
    /// Filter-envelope depth, [-1, 1], scaled to ±10 kHz.
    pub env_amount: f64,
    pub vowel: Vowel,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            kind: FilterKind::Lowpass,
            cutoff: 8000.0,
            resonance: 0.1,
            drive: 0.0,
            env_amount: 0.0,
            vowel: Vowel::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvelopeParams {
    /// Attack time in seconds.
    pub attack: f64,
    /// Decay time in seconds.
    pub decay: f64,
    /// Sustain level [0, 1].
    pub sustain: f64,
    /// Release time in seconds.
    pub release: f64,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

impl EnvelopeParams {
    fn clamped(self) -> Self {
        Self {
            attack: clamp_finite(self.attack, 0.0, 30.0, 0.01),
            decay: clamp_finite(self.decay, 0.0, 30.0, 0.1),
            sustain: clamp_finite(self.sustain, 0.0, 1.0, 0.7),
            release: clamp_finite(self.release, 0.0, 30.0, 0.3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LfoParams {
    pub shape: LfoShape,
    /// Rate in Hz, [0.01, 50].
    pub rate: f64,
}

impl Default for LfoParams {
    fn default() -> Self {
        Self {
            shape: LfoShape::Sine,
            rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpellbookParams {
    pub shape: SpellShape,
    /// Master rate in Hz, [0, 20].
    pub rate: f64,
    /// Output radius, [0, 1].
    pub size: f64,
    /// Sides (polygon) or points (star), [3, 12].
    pub sides: usize,
    /// Active outputs, [1, 16].
    pub outputs: usize,
    /// Speed step between consecutive outputs, [0, 2].
    pub speed_spread: f64,
}

impl Default for SpellbookParams {
    fn default() -> Self {
        Self {
            shape: SpellShape::Circle,
            rate: 0.5,
            size: 1.0,
            sides: 5,
            outputs: 4,
            speed_spread: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DistortionParams {
    pub enabled: bool,
    pub mode: DistortionMode,
    /// Drive in [0, 1].
    pub drive: f64,
    pub mix: f64,
}

impl Default for DistortionParams {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: DistortionMode::SoftClip,
            drive: 0.3,
            mix: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChorusParams {
    pub enabled: bool,
    /// LFO rate in Hz, [0.05, 10].
    pub rate: f64,
    /// Depth in [0, 1], scaled to 3 ms.
    pub depth: f64,
    pub mix: f64,
}

impl Default for ChorusParams {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 1.0,
            depth: 0.5,
            mix: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DelayParams {
    pub enabled: bool,
    /// Delay time in seconds, [0.001, 2].
    pub time: f64,
    /// Feedback in [0, 0.95].
    pub feedback: f64,
    /// Feedback low-pass cutoff in Hz.
    pub tone: f64,
    pub mix: f64,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            enabled: false,
            time: 0.25,
            feedback: 0.35,
            tone: 6000.0,
            mix: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReverbParams {
    pub enabled: bool,
    pub room_size: f64,
    pub damping: f64,
    /// Pre-delay in seconds, [0, 0.1].
    pub pre_delay: f64,
    pub mix: f64,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            enabled: false,
            room_size: 0.5,
            damping: 0.5,
            pre_delay: 0.0,
            mix: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OttParams {
    pub enabled: bool,
    /// Compression depth in [0, 1].
    pub depth: f64,
    /// Scales attack/release times, [0.1, 10].
    pub time: f64,
    pub mix: f64,
}

impl Default for OttParams {
    fn default() -> Self {
        Self {
            enabled: false,
            depth: 0.5,
            time: 1.0,
            mix: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EffectsParams {
    pub distortion: DistortionParams,
    pub chorus: ChorusParams,
    pub delay: DelayParams,
    pub reverb: ReverbParams,
    pub ott: OttParams,
}

/// Every control the core reads, as one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SynthParams {
    pub osc1: OscParams,
    pub osc2: OscParams,
    pub sub: SubParams,
    pub noise: NoiseParams,
    /// Ring-modulation blend in [0, 1].
    pub ring_mod: f64,
    pub unison: UnisonParams,
    pub filter: FilterParams,
    pub amp_env: EnvelopeParams,
    pub filter_env: EnvelopeParams,
    pub lfo1: LfoParams,
    pub lfo2: LfoParams,
    pub spellbook: SpellbookParams,
    pub mod_matrix: [ModConnection; MOD_SLOTS],
    pub effects: EffectsParams,
    /// Linear master gain in [0, 2].
    pub master_gain: f64,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            osc1: OscParams::default(),
            osc2: OscParams {
                enabled: false,
                ..OscParams::default()
            },
            sub: SubParams::default(),
            noise: NoiseParams::default(),
            ring_mod: 0.0,
            unison: UnisonParams::default(),
            filter: FilterParams::default(),
            amp_env: EnvelopeParams::default(),
            filter_env: EnvelopeParams::default(),
            lfo1: LfoParams::default(),
            lfo2: LfoParams::default(),
            spellbook: SpellbookParams::default(),
            mod_matrix: [ModConnection::default(); MOD_SLOTS],
            effects: EffectsParams::default(),
            master_gain: 0.8,
        }
    }
}

impl SynthParams {
    /// Parse a JSON parameter document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, SynthError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SynthError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Bring every field into its documented range. Non-finite values fall
    /// back to the field's default.
    pub fn clamped(&self) -> Self {
        let fx = &self.effects;
        let mut mod_matrix = self.mod_matrix;
        for slot in &mut mod_matrix {
            slot.amount = clamp_finite(slot.amount, -1.0, 1.0, 0.0);
            slot.smoothing = clamp_finite(slot.smoothing, 0.0, 10.0, 0.0);
        }

        Self {
            osc1: self.osc1.clamped(),
            osc2: self.osc2.clamped(),
            sub: SubParams {
                level: clamp_finite(self.sub.level, 0.0, 1.0, 0.0),
                octave: self.sub.octave.clamp(1, 2),
                ..self.sub
            },
            noise: NoiseParams {
                level: clamp_finite(self.noise.level, 0.0, 1.0, 0.0),
                ..self.noise
            },
            ring_mod: clamp_finite(self.ring_mod, 0.0, 1.0, 0.0),
            unison: UnisonParams {
                voices: self.unison.voices.clamp(1, MAX_UNISON),
                spread: clamp_finite(self.unison.spread, 0.0, 100.0, 0.0),
            },
            filter: FilterParams {
                cutoff: clamp_finite(self.filter.cutoff, MIN_CUTOFF, MAX_CUTOFF, MAX_CUTOFF),
                resonance: clamp_finite(self.filter.resonance, -0.99, 0.99, 0.0),
                drive: clamp_finite(self.filter.drive, 0.0, 1.0, 0.0),
                env_amount: clamp_finite(self.filter.env_amount, -1.0, 1.0, 0.0),
                ..self.filter
            },
            amp_env: self.amp_env.clamped(),
            filter_env: self.filter_env.clamped(),
            lfo1: LfoParams {
                rate: clamp_finite(self.lfo1.rate, MIN_LFO_RATE, MAX_LFO_RATE, 1.0),
                ..self.lfo1
            },
            lfo2: LfoParams {
                rate: clamp_finite(self.lfo2.rate, MIN_LFO_RATE, MAX_LFO_RATE, 1.0),
                ..self.lfo2
            },
            spellbook: SpellbookParams {
                rate: clamp_finite(self.spellbook.rate, 0.0, 20.0, 0.0),
                size: clamp_finite(self.spellbook.size, 0.0, 1.0, 0.0),
                sides: self.spellbook.sides.clamp(3, 12),
                outputs: self.spellbook.outputs.clamp(1, MAX_SPELLBOOK_OUTPUTS),
                speed_spread: clamp_finite(self.spellbook.speed_spread, 0.0, 2.0, 0.0),
                ..self.spellbook
            },
            mod_matrix,
            effects: EffectsParams {
                distortion: DistortionParams {
                    drive: clamp_finite(fx.distortion.drive, 0.0, 1.0, 0.0),
                    mix: clamp_finite(fx.distortion.mix, 0.0, 1.0, 0.0),
                    ..fx.distortion
                },
                chorus: ChorusParams {
                    rate: clamp_finite(fx.chorus.rate, 0.05, 10.0, 1.0),
                    depth: clamp_finite(fx.chorus.depth, 0.0, 1.0, 0.0),
                    mix: clamp_finite(fx.chorus.mix, 0.0, 1.0, 0.0),
                    ..fx.chorus
                },
                delay: DelayParams {
                    time: clamp_finite(fx.delay.time, 0.001, 2.0, 0.25),
                    feedback: clamp_finite(fx.delay.feedback, 0.0, 0.95, 0.0),
                    tone: clamp_finite(fx.delay.tone, MIN_CUTOFF, MAX_CUTOFF, MAX_CUTOFF),
                    mix: clamp_finite(fx.delay.mix, 0.0, 1.0, 0.0),
                    ..fx.delay
                },
                reverb: ReverbParams {
                    room_size: clamp_finite(fx.reverb.room_size, 0.0, 1.0, 0.5),
                    damping: clamp_finite(fx.reverb.damping, 0.0, 1.0, 0.5),
                    pre_delay: clamp_finite(fx.reverb.pre_delay, 0.0, 0.1, 0.0),
                    mix: clamp_finite(fx.reverb.mix, 0.0, 1.0, 0.0),
                    ..fx.reverb
                },
                ott: OttParams {
                    depth: clamp_finite(fx.ott.depth, 0.0, 1.0, 0.0),
                    time: clamp_finite(fx.ott.time, 0.1, 10.0, 1.0),
                    mix: clamp_finite(fx.ott.mix, 0.0, 1.0, 0.0),
                    ..fx.ott
                },
            },
            master_gain: clamp_finite(self.master_gain, 0.0, 2.0, 0.8),
        }
    }
}

/// Lock-free, tear-free parameter publication.
///
/// Writers (UI or automation threads) call `store`, which clamps and swaps
/// in a new snapshot. The audio thread calls `load` once per sample and
/// sees either the old or the new snapshot, never a mixture.
#[derive(Debug)]
pub struct SharedParams {
    current: ArcSwap<SynthParams>,
}

impl SharedParams {
    pub fn new(params: SynthParams) -> Self {
        Self {
            current: ArcSwap::from_pointee(params.clamped()),
        }
    }

    pub fn store(&self, params: SynthParams) {
        self.current.store(Arc::new(params.clamped()));
    }

    /// Cheap, wait-free read for the audio thread.
    #[inline]
    pub fn load(&self) -> Guard<Arc<SynthParams>> {
        self.current.load()
    }

    /// Owned snapshot for non-real-time readers.
    pub fn snapshot(&self) -> Arc<SynthParams> {
        self.current.load_full()
    }
}

impl Default for SharedParams {
    fn default() -> Self {
        Self::new(SynthParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::modulation::{ModDestination, ModSource};

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{ "filter": { "cutoff": 1200.0 }, "masterGain": 0.5 }"#;
        let params = SynthParams::from_json(json).expect("valid document");
        assert_eq!(params.filter.cutoff, 1200.0);
        assert_eq!(params.filter.resonance, FilterParams::default().resonance);
        assert_eq!(params.master_gain, 0.5);
        assert_eq!(params.osc1, OscParams::default());
    }

    #[test]
    fn json_roundtrip_keeps_mod_routes() {
        let mut params = SynthParams::default();
        params.mod_matrix[2] =
            ModConnection::new(ModSource::SpellbookY(3), ModDestination::FilterCutoff, -0.4);
        let json = params.to_json().expect("serializes");
        let back = SynthParams::from_json(&json).expect("parses");
        assert_eq!(back, params);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = SynthParams::from_json("{ not json").unwrap_err();
        assert!(matches!(err, SynthError::Params(_)));
    }

    #[test]
    fn clamped_brings_values_into_range() {
        let mut p = SynthParams::default();
        p.filter.cutoff = 1.0e6;
        p.filter.resonance = 3.0;
        p.unison.voices = 12;
        p.amp_env.sustain = f64::NAN;
        p.master_gain = -1.0;
        p.mod_matrix[0].amount = -7.0;
        p.effects.delay.time = 9.0;
        p.effects.reverb.pre_delay = 1.0;

        let c = p.clamped();
        assert_eq!(c.filter.cutoff, MAX_CUTOFF);
        assert_eq!(c.filter.resonance, 0.99);
        assert_eq!(c.unison.voices, MAX_UNISON);
        assert_eq!(c.amp_env.sustain, 0.7);
        assert_eq!(c.master_gain, 0.0);
        assert_eq!(c.mod_matrix[0].amount, -1.0);
        assert_eq!(c.effects.delay.time, 2.0);
        assert_eq!(c.effects.reverb.pre_delay, 0.1);
    }

    #[test]
    fn shared_params_publish_clamped_snapshots() {
        let shared = SharedParams::default();
        let mut p = SynthParams::default();
        p.master_gain = 10.0;
        shared.store(p);
        assert_eq!(shared.load().master_gain, 2.0);
        assert_eq!(shared.snapshot().master_gain, 2.0);
    }

    #[test]
    fn shared_params_are_readable_across_threads() {
        let shared = Arc::new(SharedParams::default());
        let writer = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                for i in 0..100 {
                    let mut p = SynthParams::default();
                    p.filter.cutoff = 100.0 + i as f64;
                    p.filter.resonance = (100.0 + i as f64) / 1000.0;
                    shared.store(p);
                }
            })
        };
        for _ in 0..1000 {
            let p = shared.load();
            // Fields written together are always seen together.
            if p.filter.cutoff != FilterParams::default().cutoff {
                assert_eq!(p.filter.resonance, p.filter.cutoff / 1000.0);
            }
        }
        writer.join().expect("writer thread");
    }
}
