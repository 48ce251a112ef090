//! SheGuard Neural – Audio normalization and ONNX sound-event classification
//!
//! # Architecture
//!
//! ```text
//! Encoded bytes (.wav/.webm/.ogg/.mp3/.flac) + format hint
//!     │
//!     ▼
//! ┌──────────┐    ┌───────────┐    ┌────────────┐    ┌─────────────┐
//! │ Decoder  │───▶│ Resampler │───▶│ Windowing  │───▶│ Classifier  │
//! │Symphonia │    │  Rubato   │    │ 0.975s/48% │    │  ORT/YAMNet │
//! └──────────┘    └───────────┘    └────────────┘    └─────────────┘
//!   mono f32         16 kHz          score windows     [windows, classes]
//! ```
//!
//! The output of this crate is a [`inference::ScoreMatrix`]; reducing it to a
//! judgment happens in the `sheguard` crate.

pub mod decoder;
pub mod inference;
pub mod models;
pub mod resampler;
pub mod windowing;

pub use decoder::{decode_to_waveform, Waveform, TARGET_SAMPLE_RATE};
pub use inference::{OnnxClassifier, ScoreMatrix, SoundClassifier};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NeuralError {
    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("Resampler error: {0}")]
    Resampler(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Model error: {0}")]
    Model(#[from] models::ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NeuralError {
    /// True when the failure came from the caller's audio rather than from
    /// the classifier or the host.
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            NeuralError::Decoder(_) | NeuralError::UnsupportedSampleRate(_)
        )
    }
}
