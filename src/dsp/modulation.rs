//! Modulation matrix.
//!
//! Routes modulation sources (LFOs, envelopes, controllers, Spellbook
//! outputs) to destinations through a fixed number of connection slots.
//! Each slot shapes its source with a curve and scales it by a smoothed
//! amount; destinations receive the sum of every slot that targets them.
//!
//! Source values live in a fixed table written by the engine once or twice
//! per sample. All operations are allocation-free.

use serde::{Deserialize, Serialize};

use super::smoothing::LinearSmoother;
use super::spellbook::MAX_SPELLBOOK_OUTPUTS;

/// Number of connection slots in the matrix.
pub const MAX_CONNECTIONS: usize = 16;

/// Constant for the logarithmic curve; chosen so the curve maps 1 → 1.
const LOG_CURVE_K: f64 = 9.0;

/// Modulation source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModSource {
    #[default]
    None,
    Lfo1,
    Lfo2,
    AmpEnvelope,
    FilterEnvelope,
    ModWheel,
    Velocity,
    /// X coordinate of a Spellbook output (index 0-15).
    SpellbookX(u8),
    /// Y coordinate of a Spellbook output (index 0-15).
    SpellbookY(u8),
}

/// Size of the source value table.
pub const NUM_SOURCES: usize = 7 + 2 * MAX_SPELLBOOK_OUTPUTS;

impl ModSource {
    /// Slot in the source table; `None` and out-of-range Spellbook indices
    /// have no slot.
    pub fn index(self) -> Option<usize> {
        let spellbook = |i: u8| (usize::from(i) < MAX_SPELLBOOK_OUTPUTS).then_some(usize::from(i));
        match self {
            ModSource::None => None,
            ModSource::Lfo1 => Some(1),
            ModSource::Lfo2 => Some(2),
            ModSource::AmpEnvelope => Some(3),
            ModSource::FilterEnvelope => Some(4),
            ModSource::ModWheel => Some(5),
            ModSource::Velocity => Some(6),
            ModSource::SpellbookX(i) => spellbook(i).map(|i| 7 + 2 * i),
            ModSource::SpellbookY(i) => spellbook(i).map(|i| 8 + 2 * i),
        }
    }
}

/// Modulation destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModDestination {
    #[default]
    None,
    /// Voice pitch, ±12 semitones at full scale.
    Pitch,
    Osc1Level,
    Osc2Level,
    SubLevel,
    NoiseLevel,
    /// Filter cutoff offset, ±10 kHz at full scale.
    FilterCutoff,
    FilterResonance,
    AmpLevel,
    RingMod,
    Lfo1Rate,
    Lfo2Rate,
    SpellbookSpeed,
}

/// Shaping applied to a source value before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModCurve {
    #[default]
    Linear,
    Exponential,
    Logarithmic,
    SCurve,
    Sine,
}

impl ModCurve {
    /// Apply the curve to a value in [-1, 1]. Every curve is odd-symmetric
    /// and maps 0 → 0 and ±1 → ±1.
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        let x = if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 };
        match self {
            ModCurve::Linear => x,
            ModCurve::Exponential => x * x.abs(),
            ModCurve::Logarithmic => {
                x.signum() * (x.abs() * LOG_CURVE_K).ln_1p() / LOG_CURVE_K.ln_1p()
            }
            ModCurve::SCurve => {
                let u = (x + 1.0) * 0.5;
                let s = u * u * (3.0 - 2.0 * u);
                2.0 * s - 1.0
            }
            ModCurve::Sine => (x * std::f64::consts::FRAC_PI_2).sin(),
        }
    }
}

/// One routing slot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModConnection {
    pub source: ModSource,
    pub destination: ModDestination,
    /// Signed amount in [-1, 1].
    pub amount: f64,
    pub curve: ModCurve,
    /// Time in seconds for amount changes to settle; 0 snaps.
    pub smoothing: f64,
}

impl ModConnection {
    pub fn new(source: ModSource, destination: ModDestination, amount: f64) -> Self {
        ModConnection {
            source,
            destination,
            amount,
            curve: ModCurve::Linear,
            smoothing: 0.0,
        }
    }

    pub fn with_curve(mut self, curve: ModCurve) -> Self {
        self.curve = curve;
        self
    }

    pub fn with_smoothing(mut self, seconds: f64) -> Self {
        self.smoothing = seconds;
        self
    }

    /// A slot without a source or destination contributes nothing.
    pub fn is_active(&self) -> bool {
        self.source != ModSource::None && self.destination != ModDestination::None
    }
}

#[derive(Debug, Clone)]
struct Slot {
    connection: ModConnection,
    amount: LinearSmoother,
}

/// Fixed-size many-to-many routing table.
#[derive(Debug, Clone)]
pub struct ModulationMatrix {
    slots: [Slot; MAX_CONNECTIONS],
    sources: [f64; NUM_SOURCES],
    sample_rate: f64,
}

impl ModulationMatrix {
    pub fn new(sample_rate: f64) -> Self {
        let slot = Slot {
            connection: ModConnection::default(),
            amount: LinearSmoother::new(0.0),
        };
        ModulationMatrix {
            slots: std::array::from_fn(|_| slot.clone()),
            sources: [0.0; NUM_SOURCES],
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for slot in &mut self.slots {
            slot.amount.set_time(slot.connection.smoothing, sample_rate);
        }
    }

    /// Configure one slot; out-of-range indices are ignored.
    ///
    /// Changing the source or destination of a slot snaps its amount so the
    /// new route never inherits a ramp from the old one.
    pub fn set_connection(&mut self, index: usize, connection: ModConnection) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        let amount = if connection.amount.is_finite() {
            connection.amount.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let smoothing = if connection.smoothing.is_finite() {
            connection.smoothing.clamp(0.0, 10.0)
        } else {
            0.0
        };
        let rerouted = slot.connection.source != connection.source
            || slot.connection.destination != connection.destination;

        slot.connection = ModConnection {
            amount,
            smoothing,
            ..connection
        };
        slot.amount.set_time(smoothing, self.sample_rate);
        if rerouted {
            slot.amount.snap(amount);
        } else {
            slot.amount.set_target(amount);
        }
    }

    pub fn connection(&self, index: usize) -> Option<&ModConnection> {
        self.slots.get(index).map(|s| &s.connection)
    }

    /// Write the current value of a source.
    #[inline]
    pub fn set_source_value(&mut self, source: ModSource, value: f64) {
        if let Some(i) = source.index() {
            self.sources[i] = if value.is_finite() { value } else { 0.0 };
        }
    }

    pub fn source_value(&self, source: ModSource) -> f64 {
        source.index().map_or(0.0, |i| self.sources[i])
    }

    /// Advance every slot's amount smoother by one sample.
    pub fn update_smoothing(&mut self) {
        for slot in &mut self.slots {
            slot.amount.next_value();
        }
    }

    /// Sum of `curve(source) * smoothed_amount` over active slots targeting
    /// `destination`.
    pub fn modulation_amount(&self, destination: ModDestination) -> f64 {
        if destination == ModDestination::None {
            return 0.0;
        }
        self.slots
            .iter()
            .filter(|s| s.connection.is_active() && s.connection.destination == destination)
            .map(|s| {
                let value = self.source_value(s.connection.source);
                s.connection.curve.apply(value) * s.amount.current()
            })
            .sum()
    }

    /// Zero the source table and settle every smoother on its target.
    pub fn reset(&mut self) {
        self.sources = [0.0; NUM_SOURCES];
        for slot in &mut self.slots {
            let target = slot.amount.target();
            slot.amount.snap(target);
        }
    }
}
