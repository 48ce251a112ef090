//! Request-scoped error taxonomy
//!
//! Every failure is either the caller's fault (`bad_input`) or ours
//! (`server_error`). Server-side detail stays in the logs; only
//! [`AnalyzeError::public_message`] crosses the boundary.

use serde::{Deserialize, Serialize};
use sheguard_neural::NeuralError;
use thiserror::Error;

use crate::decision::DecisionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadInput,
    ServerError,
}

impl ErrorKind {
    /// HTTP-style status a transport layer should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::BadInput => 400,
            ErrorKind::ServerError => 500,
        }
    }
}

#[derive(Error, Debug)]
pub enum AnalyzeError {
    /// Malformed, truncated or unsupported audio
    #[error("Error processing audio: {0}")]
    Decode(String),

    /// Request body could not be turned into audio bytes
    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    #[error("Analysis failed: {0}")]
    Inference(String),
}

impl AnalyzeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalyzeError::Decode(_) | AnalyzeError::InvalidPayload(_) => ErrorKind::BadInput,
            AnalyzeError::ClassifierUnavailable(_) | AnalyzeError::Inference(_) => {
                ErrorKind::ServerError
            }
        }
    }

    /// Message safe to hand to a client.
    pub fn public_message(&self) -> String {
        match self {
            AnalyzeError::Decode(_) | AnalyzeError::InvalidPayload(_) => self.to_string(),
            AnalyzeError::ClassifierUnavailable(_) => "Classifier unavailable".to_string(),
            AnalyzeError::Inference(_) => "Analysis failed".to_string(),
        }
    }
}

impl From<NeuralError> for AnalyzeError {
    fn from(err: NeuralError) -> Self {
        if err.is_bad_input() {
            AnalyzeError::Decode(err.to_string())
        } else {
            AnalyzeError::Inference(err.to_string())
        }
    }
}

impl From<DecisionError> for AnalyzeError {
    fn from(err: DecisionError) -> Self {
        AnalyzeError::Inference(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AnalyzeError {
    fn from(err: tokio::task::JoinError) -> Self {
        AnalyzeError::Inference(format!("Worker task failed: {}", err))
    }
}
