//! SheGuard: danger-sound detection for short audio clips
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Caller (CLI here; HTTP or mobile bridge elsewhere)   │
//! │        classify(bytes, format_hint) / self_test / health    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   sheguard_neural: decode (Symphonia) → 16 kHz mono (Rubato)│
//! │   → YAMNet windows (ORT) → ScoreMatrix [windows, classes]   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   decision: mean per class → top 10 → danger classes > 0.3  │
//! │   → emergency level (low / medium / high / critical)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod classifier;
pub mod decision;
pub mod error;
pub mod pipeline;
pub mod response;
pub mod settings;

pub use classifier::SharedClassifier;
pub use decision::{Decision, DecisionConfig, Detection, EmergencyLevel, Prediction};
pub use error::{AnalyzeError, ErrorKind};
pub use pipeline::Analyzer;
pub use response::{AnalysisRequest, AnalysisResponse, ErrorResponse, HealthResponse};
pub use settings::Settings;
