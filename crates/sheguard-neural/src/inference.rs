//! ONNX inference using ORT (ONNX Runtime)
//!
//! Wraps a YAMNet export behind the [`SoundClassifier`] trait: a waveform goes
//! in, a `[windows, classes]` score matrix comes out.

use std::path::Path;

use ndarray::{Array2, ArrayView2};
use ort::inputs;
use ort::session::{builder::SessionBuilder, Session};
use ort::value::Value;
use parking_lot::Mutex;

use crate::decoder::{Waveform, TARGET_SAMPLE_RATE};
use crate::models::{load_class_map, ModelArtifacts, ModelManager};
use crate::windowing::FixedStrideWindower;
use crate::NeuralError;

/// Per-window class scores, shape `[windows, classes]`.
///
/// Always holds at least one window and one class; every score is finite and
/// in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    scores: Array2<f32>,
}

impl ScoreMatrix {
    pub fn new(mut scores: Array2<f32>) -> Result<Self, NeuralError> {
        let (windows, classes) = scores.dim();
        if windows == 0 || classes == 0 {
            return Err(NeuralError::Inference(format!(
                "Score matrix must be non-empty, got {}x{}",
                windows, classes
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(NeuralError::Inference(
                "Score matrix contains non-finite values".into(),
            ));
        }
        scores.mapv_inplace(|s| s.clamp(0.0, 1.0));
        Ok(Self { scores })
    }

    /// Build from one `Vec` per window; all rows must be the same width.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, NeuralError> {
        let windows = rows.len();
        let classes = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != classes) {
            return Err(NeuralError::Inference("Ragged score rows".into()));
        }
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let scores = Array2::from_shape_vec((windows, classes), flat)
            .map_err(|e| NeuralError::Inference(e.to_string()))?;
        Self::new(scores)
    }

    pub fn num_windows(&self) -> usize {
        self.scores.nrows()
    }

    pub fn num_classes(&self) -> usize {
        self.scores.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.scores.view()
    }
}

/// A pretrained multi-class sound-event classifier.
///
/// Implementations are loaded once and shared; `scores` may be called from
/// many threads at the same time.
pub trait SoundClassifier: Send + Sync {
    /// Class vocabulary in score-column order
    fn labels(&self) -> &[String];

    /// Score a 16 kHz mono waveform. Must yield at least one window, even for
    /// waveforms shorter than the model's analysis window.
    fn scores(&self, waveform: &Waveform) -> Result<ScoreMatrix, NeuralError>;
}

/// YAMNet running on ONNX Runtime
pub struct OnnxClassifier {
    session: Mutex<Session>,
    labels: Vec<String>,
    windower: FixedStrideWindower,
}

impl OnnxClassifier {
    /// Load from a model directory prepared by `ModelManager::setup_models`.
    ///
    /// Offline only; artifacts are checksum-verified before use.
    pub fn load(model_dir: &Path) -> Result<Self, NeuralError> {
        let artifacts = ModelManager::from_dir(model_dir).artifacts_offline()?;
        Self::from_artifacts(&artifacts)
    }

    pub fn from_artifacts(artifacts: &ModelArtifacts) -> Result<Self, NeuralError> {
        let labels = load_class_map(&artifacts.class_map)?;

        // Global ORT environment; a second init is harmless.
        let _ = ort::init().with_name("sheguard").commit();

        // intra_threads=1: requests already run on separate blocking threads
        let session = SessionBuilder::new()?
            .with_intra_threads(1)?
            .commit_from_file(&artifacts.model)?;

        tracing::info!(
            "YAMNet model loaded from {:?} ({} classes)",
            artifacts.model,
            labels.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            labels,
            windower: FixedStrideWindower::yamnet(TARGET_SAMPLE_RATE),
        })
    }

    fn run_window(session: &mut Session, window: &[f32]) -> Result<Vec<f32>, NeuralError> {
        let input = Value::from_array((vec![window.len()], window.to_vec()))?;
        let outputs = session.run(inputs![input])?;
        let (_, scores) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(scores.to_vec())
    }
}

impl SoundClassifier for OnnxClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn scores(&self, waveform: &Waveform) -> Result<ScoreMatrix, NeuralError> {
        if waveform.sample_rate() != TARGET_SAMPLE_RATE {
            return Err(NeuralError::Inference(format!(
                "Classifier expects {} Hz audio, got {} Hz",
                TARGET_SAMPLE_RATE,
                waveform.sample_rate()
            )));
        }

        let num_classes = self.labels.len();
        let samples = waveform.samples();
        let mut ranges = self.windower.segment(samples.len());
        if ranges.is_empty() {
            // Empty input still gets one (silent) window.
            ranges.push(0..0);
        }

        let mut window = vec![0.0f32; self.windower.window_size];
        let mut flat = Vec::with_capacity(ranges.len() * num_classes);
        let mut frames = 0;
        let mut session = self.session.lock();

        for range in ranges {
            // Zero-pad short windows to the model's fixed input length
            window.fill(0.0);
            window[..range.len()].copy_from_slice(&samples[range]);

            // A runtime panic (e.g. shape mismatch) must not take the worker down.
            let scores = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                Self::run_window(&mut session, &window)
            }))
            .map_err(|_| NeuralError::Inference("Inference panicked".to_string()))??;

            if scores.is_empty() || scores.len() % num_classes != 0 {
                return Err(NeuralError::Inference(format!(
                    "Invalid output shape: {} elements is not a multiple of {} classes",
                    scores.len(),
                    num_classes
                )));
            }
            frames += scores.len() / num_classes;
            flat.extend_from_slice(&scores);
        }
        drop(session);

        tracing::debug!(
            "Scored {:.2}s of audio into {} frame(s)",
            waveform.duration_secs(),
            frames
        );

        let scores = Array2::from_shape_vec((frames, num_classes), flat)
            .map_err(|e| NeuralError::Inference(e.to_string()))?;
        ScoreMatrix::new(scores)
    }
}
