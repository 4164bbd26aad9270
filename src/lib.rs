pub mod dsp;
pub mod error;
pub mod event;
pub mod params;

use crate::error::SynthError;
use crate::event::NoteEvent;
use crate::params::SynthParams;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the spellcore version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

fn from_js(params: JsValue, events: JsValue) -> Result<(SynthParams, Vec<NoteEvent>), SynthError> {
    let params: SynthParams = serde_wasm_bindgen::from_value(params)?;
    let events: Vec<NoteEvent> = serde_wasm_bindgen::from_value(events)?;
    Ok((params, events))
}

fn to_js(e: SynthError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// WASM-exposed: render a parameter object and an event array to mono f32
/// samples for AudioWorklet playback.
#[wasm_bindgen]
pub fn render_samples(
    params: JsValue,
    events: JsValue,
    sample_rate: f64,
    num_samples: usize,
) -> Result<Vec<f32>, JsValue> {
    let (params, events) = from_js(params, events).map_err(to_js)?;
    dsp::renderer::render(&params, &events, sample_rate, num_samples).map_err(to_js)
}

/// WASM-exposed: render to a 16-bit mono WAV byte array.
#[wasm_bindgen]
pub fn render_wav(
    params: JsValue,
    events: JsValue,
    sample_rate: u32,
    num_samples: usize,
) -> Result<Vec<u8>, JsValue> {
    let (params, events) = from_js(params, events).map_err(to_js)?;
    dsp::renderer::render_wav(&params, &events, sample_rate, num_samples).map_err(to_js)
}

/// Parameter document in pretty JSON, with every field at its default.
pub fn default_params_json() -> Result<String, SynthError> {
    SynthParams::default().to_json()
}
