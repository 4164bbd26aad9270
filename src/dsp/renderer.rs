//! Offline renderer: a parameter snapshot and a list of note events in,
//! mono samples or WAV bytes out.

use super::engine::SynthEngine;
use crate::error::SynthError;
use crate::event::NoteEvent;
use crate::params::SynthParams;

/// Samples rendered per engine call.
const BLOCK_SIZE: usize = 128;

/// Render `num_samples` mono samples. Event positions are absolute sample
/// offsets and may arrive in any order.
pub fn render(
    params: &SynthParams,
    events: &[NoteEvent],
    sample_rate: f64,
    num_samples: usize,
) -> Result<Vec<f32>, SynthError> {
    if !sample_rate.is_finite() || sample_rate <= 0.0 {
        return Err(SynthError::SampleRate(sample_rate));
    }
    if let Some(e) = events.iter().find(|e| e.sample_position > num_samples) {
        return Err(SynthError::EventOutOfRange {
            position: e.sample_position,
            length: num_samples,
        });
    }

    let mut sorted = events.to_vec();
    sorted.sort_by_key(|e| e.sample_position);

    let mut engine = SynthEngine::new(sample_rate);
    engine.prepare(sample_rate, BLOCK_SIZE);
    engine.set_params(params);

    let mut out = vec![0.0f32; num_samples];
    let mut block_events = Vec::with_capacity(sorted.len());
    let mut next = 0;
    for (b, block) in out.chunks_mut(BLOCK_SIZE).enumerate() {
        let start = b * BLOCK_SIZE;
        let end = start + block.len();
        block_events.clear();
        while let Some(e) = sorted.get(next).filter(|e| e.sample_position < end) {
            block_events.push(NoteEvent {
                sample_position: e.sample_position - start,
                ..*e
            });
            next += 1;
        }
        engine.process_block(&block_events, block);
    }

    log::debug!(
        "rendered {num_samples} samples at {sample_rate} Hz, {} events",
        sorted.len()
    );
    Ok(out)
}

/// Render to a 16-bit mono PCM WAV file.
pub fn render_wav(
    params: &SynthParams,
    events: &[NoteEvent],
    sample_rate: u32,
    num_samples: usize,
) -> Result<Vec<u8>, SynthError> {
    let samples = render(params, events, f64::from(sample_rate), num_samples)?;
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();
    Ok(encode_wav(&pcm, sample_rate, 1))
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}
