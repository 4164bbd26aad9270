use thiserror::Error;

/// Errors from the non-real-time surfaces: parameter parsing, offline
/// rendering and the WASM boundary. The per-sample path never fails.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("invalid parameter document: {0}")]
    Params(#[from] serde_json::Error),

    #[error("sample rate must be positive and finite, got {0}")]
    SampleRate(f64),

    #[error("event at sample {position} is past the render length of {length} samples")]
    EventOutOfRange { position: usize, length: usize },

    #[error("JS value conversion failed: {0}")]
    Js(#[from] serde_wasm_bindgen::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let e = SynthError::SampleRate(-1.0);
        assert_eq!(e.to_string(), "sample rate must be positive and finite, got -1");

        let e = SynthError::EventOutOfRange {
            position: 100,
            length: 10,
        };
        assert!(e.to_string().contains("100"));
    }

    #[test]
    fn json_errors_convert() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let e: SynthError = parse.unwrap_err().into();
        assert!(matches!(e, SynthError::Params(_)));
        assert!(e.to_string().starts_with("invalid parameter document"));
    }
}
