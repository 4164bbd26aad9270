//! Note events consumed by the engine.

use serde::{Deserialize, Serialize};

/// Controller number for the modulation wheel.
pub const CC_MOD_WHEEL: u8 = 1;
/// Controller number for all-notes-off.
pub const CC_ALL_NOTES_OFF: u8 = 123;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoteEventKind {
    NoteOn,
    NoteOff,
    AllNotesOff,
    /// `note` carries the controller number, `velocity` the normalised value.
    Controller,
}

/// A note or controller event at a sample offset.
///
/// Velocity is normalised to [0, 1]. For block processing the position is
/// relative to the start of the block; for offline rendering it is absolute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    pub kind: NoteEventKind,
    #[serde(default)]
    pub note: u8,
    #[serde(default)]
    pub velocity: f64,
    #[serde(default)]
    pub sample_position: usize,
}

impl NoteEvent {
    pub fn note_on(note: u8, velocity: f64, sample_position: usize) -> Self {
        NoteEvent {
            kind: NoteEventKind::NoteOn,
            note,
            velocity,
            sample_position,
        }
    }

    pub fn note_off(note: u8, sample_position: usize) -> Self {
        NoteEvent {
            kind: NoteEventKind::NoteOff,
            note,
            velocity: 0.0,
            sample_position,
        }
    }

    pub fn all_notes_off(sample_position: usize) -> Self {
        NoteEvent {
            kind: NoteEventKind::AllNotesOff,
            note: 0,
            velocity: 0.0,
            sample_position,
        }
    }

    pub fn controller(number: u8, value: f64, sample_position: usize) -> Self {
        NoteEvent {
            kind: NoteEventKind::Controller,
            note: number,
            velocity: value,
            sample_position,
        }
    }

    /// Map a 7-bit MIDI velocity onto [0, 1].
    pub fn midi_velocity(velocity: u8) -> f64 {
        f64::from(velocity.min(127)) / 127.0
    }
}
