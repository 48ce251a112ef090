//! Stable request/response shapes for whatever transport sits on top.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::decision::{Decision, Detection, EmergencyLevel};
use crate::error::{AnalyzeError, ErrorKind};

fn default_format() -> String {
    "webm".to_string()
}

/// Analysis request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Base64-encoded audio; a `data:<mime>;base64,` prefix is tolerated
    pub audio_data: String,

    /// Container hint such as "wav" or "webm" (default: "webm")
    #[serde(default = "default_format")]
    pub audio_format: String,
}

impl AnalysisRequest {
    /// Decode the payload into raw bytes and the format hint.
    pub fn into_parts(self) -> Result<(Vec<u8>, String), AnalyzeError> {
        let payload = match self.audio_data.split_once(";base64,") {
            Some((prefix, data)) if prefix.starts_with("data:") => data,
            _ => self.audio_data.as_str(),
        };
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| AnalyzeError::InvalidPayload(format!("audio_data is not base64: {}", e)))?;
        Ok((bytes, self.audio_format))
    }
}

/// Analysis response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub danger_detected: bool,
    pub confidence: f32,
    pub detected_classes: Vec<Detection>,
    /// Full decision, including the ranked predictions
    pub analysis_details: Decision,
    pub emergency_level: EmergencyLevel,
}

impl From<Decision> for AnalysisResponse {
    fn from(decision: Decision) -> Self {
        Self {
            danger_detected: decision.danger_detected,
            confidence: decision.confidence,
            detected_classes: decision.detected_classes.clone(),
            emergency_level: decision.emergency_level,
            analysis_details: decision,
        }
    }
}

/// Liveness probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

/// Synthetic tone self-test result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfTestResponse {
    pub message: String,
    pub result: Decision,
}

/// Error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
    pub status: u16,
}

impl From<&AnalyzeError> for ErrorResponse {
    fn from(err: &AnalyzeError) -> Self {
        let kind = err.kind();
        Self {
            error: err.public_message(),
            kind,
            status: kind.status_code(),
        }
    }
}
