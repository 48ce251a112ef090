//! End-to-end analysis: bytes → waveform → scores → decision.

use std::time::Instant;

use sheguard_neural::{decode_to_waveform, Waveform, TARGET_SAMPLE_RATE};

use crate::classifier::SharedClassifier;
use crate::decision::{decide, Decision, DecisionConfig};
use crate::error::AnalyzeError;
use crate::response::{AnalysisRequest, AnalysisResponse, HealthResponse, SelfTestResponse};
use crate::settings::Settings;

/// Self-test tone: 1 s of A4 at full scale.
pub const SELF_TEST_FREQUENCY_HZ: f32 = 440.0;
pub const SELF_TEST_DURATION_SECS: f32 = 1.0;

/// Danger-sound analyzer
///
/// Create one per process and share it (e.g. behind an `Arc`); every
/// request is independent and only the classifier handle is shared.
pub struct Analyzer {
    classifier: SharedClassifier,
    config: DecisionConfig,
}

impl Analyzer {
    pub fn new(classifier: SharedClassifier, config: DecisionConfig) -> Self {
        Self { classifier, config }
    }

    /// ONNX-backed analyzer; the model loads on first use or `warm_up`.
    pub fn from_settings(settings: &Settings, model_dir: Option<std::path::PathBuf>) -> Self {
        let model_dir = settings.resolve_model_dir(model_dir);
        tracing::debug!("Model directory: {:?}", model_dir);
        Self::new(SharedClassifier::onnx(model_dir), settings.decision.clone())
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Startup hook: load the classifier now instead of on the first request.
    pub async fn warm_up(&self) -> Result<(), AnalyzeError> {
        self.classifier.get_or_init().await.map(|_| ())
    }

    /// Never triggers a model load.
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".to_string(),
            model_loaded: self.classifier.is_initialized(),
        }
    }

    /// Classify encoded audio. `format_hint` is tried first, then
    /// auto-detection.
    pub async fn classify(
        &self,
        audio_bytes: Vec<u8>,
        format_hint: &str,
    ) -> Result<Decision, AnalyzeError> {
        let hint = format_hint.to_string();
        let waveform = tokio::task::spawn_blocking(move || {
            decode_to_waveform(&audio_bytes, Some(&hint), TARGET_SAMPLE_RATE)
        })
        .await??;

        self.classify_waveform(waveform).await
    }

    /// Classify an already-normalized 16 kHz waveform.
    pub async fn classify_waveform(&self, waveform: Waveform) -> Result<Decision, AnalyzeError> {
        if waveform.sample_rate() != TARGET_SAMPLE_RATE {
            return Err(AnalyzeError::Decode(format!(
                "Waveform must be {} Hz, got {} Hz",
                TARGET_SAMPLE_RATE,
                waveform.sample_rate()
            )));
        }

        let classifier = self.classifier.get_or_init().await?;
        let config = self.config.clone();
        let duration = waveform.duration_secs();
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            let scores = classifier.scores(&waveform)?;
            let decision = decide(&scores, classifier.labels(), &config)?;
            Ok::<_, AnalyzeError>(decision)
        })
        .await
        .map_err(AnalyzeError::from)
        .and_then(|r| r);

        match &result {
            Ok(decision) => tracing::info!(
                "Analyzed {:.2}s in {:.2?}: danger={} level={} confidence={:.3}",
                duration,
                started.elapsed(),
                decision.danger_detected,
                decision.emergency_level,
                decision.confidence
            ),
            Err(e) => tracing::error!("Analysis of {:.2}s clip failed: {}", duration, e),
        }
        result
    }

    /// Decode a base64 request body and classify it.
    pub async fn analyze_request(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisResponse, AnalyzeError> {
        let (bytes, format) = request.into_parts()?;
        let decision = self.classify(bytes, &format).await?;
        Ok(AnalysisResponse::from(decision))
    }

    /// Run the pipeline on a locally generated tone.
    pub async fn self_test(&self) -> Result<SelfTestResponse, AnalyzeError> {
        let tone = Waveform::tone(
            SELF_TEST_FREQUENCY_HZ,
            SELF_TEST_DURATION_SECS,
            TARGET_SAMPLE_RATE,
            1.0,
        );
        let result = self.classify_waveform(tone).await?;
        Ok(SelfTestResponse {
            message: "Test completed".to_string(),
            result,
        })
    }
}
