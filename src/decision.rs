//! Aggregation & decision engine
//!
//! Reduces a `[windows, classes]` score matrix to one judgment:
//!
//! 1. mean score per class over all windows
//! 2. stable descending rank, keep the top `top_k` (10)
//! 3. danger classes among those top `top_k` scoring above the detection
//!    threshold become detections
//! 4. the highest detection confidence picks the emergency level
//!
//! Danger classes ranked outside the top `top_k` are never reported, however
//! high they score.

use std::cmp::Ordering;
use std::fmt;

use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};
use sheguard_neural::ScoreMatrix;
use thiserror::Error;

/// Class labels treated as safety-relevant.
pub const DANGER_CLASSES: &[&str] = &[
    "Screaming",
    "Shout",
    "Gunshot, gunfire",
    "Crying, sobbing",
    "Alarm",
    "Speech",
];

pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.3;
pub const DEFAULT_TOP_K: usize = 10;

#[derive(Error, Debug, PartialEq)]
pub enum DecisionError {
    #[error("Score matrix has {classes} classes but the vocabulary has {labels} labels")]
    LabelMismatch { classes: usize, labels: usize },

    #[error("Invalid decision config: {0}")]
    InvalidConfig(String),
}

/// Severity tiers, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl EmergencyLevel {
    /// Map the maximum triggered confidence to a tier.
    ///
    /// Breakpoints are exclusive and checked from the top down, so exactly
    /// 0.8 is `High`, not `Critical`.
    pub fn from_confidence(confidence: f32, thresholds: &SeverityThresholds) -> Self {
        if confidence > thresholds.critical {
            EmergencyLevel::Critical
        } else if confidence > thresholds.high {
            EmergencyLevel::High
        } else if confidence > thresholds.medium {
            EmergencyLevel::Medium
        } else {
            EmergencyLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyLevel::Low => "low",
            EmergencyLevel::Medium => "medium",
            EmergencyLevel::High => "high",
            EmergencyLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for EmergencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower (exclusive) bounds of the medium, high and critical tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    pub medium: f32,
    pub high: f32,
    pub critical: f32,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            medium: 0.4,
            high: 0.6,
            critical: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// A danger class must score strictly above this to count
    pub detection_threshold: f32,
    /// Size of the ranking; also bounds which classes can trigger danger
    pub top_k: usize,
    pub severity: SeverityThresholds,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            severity: SeverityThresholds::default(),
        }
    }
}

impl DecisionConfig {
    pub fn validate(&self) -> Result<(), DecisionError> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if !in_unit(self.detection_threshold) {
            return Err(DecisionError::InvalidConfig(format!(
                "detection_threshold {} outside [0, 1]",
                self.detection_threshold
            )));
        }
        if self.top_k == 0 {
            return Err(DecisionError::InvalidConfig("top_k must be > 0".into()));
        }
        let s = &self.severity;
        if !(in_unit(s.medium) && in_unit(s.high) && in_unit(s.critical)) {
            return Err(DecisionError::InvalidConfig(
                "severity thresholds must lie in [0, 1]".into(),
            ));
        }
        if !(s.medium < s.high && s.high < s.critical) {
            return Err(DecisionError::InvalidConfig(format!(
                "severity thresholds must ascend, got {}/{}/{}",
                s.medium, s.high, s.critical
            )));
        }
        Ok(())
    }
}

/// A danger class that crossed the detection threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class: String,
    pub confidence: f32,
}

/// One entry of the ranked class list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub danger_detected: bool,
    /// Highest detection confidence, 0.0 without detections
    pub confidence: f32,
    pub detected_classes: Vec<Detection>,
    pub emergency_level: EmergencyLevel,
    /// Top `top_k` classes by mean score, best first
    pub all_predictions: Vec<Prediction>,
}

pub fn is_danger_class(label: &str) -> bool {
    DANGER_CLASSES.contains(&label)
}

/// Mean score of every class over the time axis.
pub fn mean_scores(scores: &ScoreMatrix) -> Array1<f32> {
    let view = scores.view();
    view.sum_axis(Axis(0)) / view.nrows() as f32
}

/// Indices of the `top_k` highest means, best first.
///
/// The sort is stable, so equal scores keep vocabulary order.
pub fn rank(means: &[f32], top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..means.len()).collect();
    order.sort_by(|&a, &b| means[b].partial_cmp(&means[a]).unwrap_or(Ordering::Equal));
    order.truncate(top_k);
    order
}

pub fn decide(
    scores: &ScoreMatrix,
    labels: &[String],
    config: &DecisionConfig,
) -> Result<Decision, DecisionError> {
    if scores.num_classes() != labels.len() {
        return Err(DecisionError::LabelMismatch {
            classes: scores.num_classes(),
            labels: labels.len(),
        });
    }

    let means = mean_scores(scores);
    let means = means.as_slice().unwrap_or_default();
    let ranked = rank(means, config.top_k);

    let mut detected_classes = Vec::new();
    let mut max_confidence = 0.0f32;

    for &index in &ranked {
        let confidence = means[index];
        if is_danger_class(&labels[index]) && confidence > config.detection_threshold {
            detected_classes.push(Detection {
                class: labels[index].clone(),
                confidence,
            });
            max_confidence = max_confidence.max(confidence);
        }
    }

    let all_predictions = ranked
        .iter()
        .map(|&i| Prediction {
            class: labels[i].clone(),
            confidence: means[i],
        })
        .collect();

    Ok(Decision {
        danger_detected: !detected_classes.is_empty(),
        confidence: max_confidence,
        detected_classes,
        emergency_level: EmergencyLevel::from_confidence(max_confidence, &config.severity),
        all_predictions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Vocabulary of 12 filler classes plus the given extras at the end.
    fn vocab_with(extra: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = (0..12).map(|i| format!("Filler {}", i)).collect();
        v.extend(extra.iter().map(|s| s.to_string()));
        v
    }

    #[test]
    fn severity_tiers() {
        let t = SeverityThresholds::default();
        assert_eq!(EmergencyLevel::from_confidence(0.85, &t), EmergencyLevel::Critical);
        assert_eq!(EmergencyLevel::from_confidence(0.65, &t), EmergencyLevel::High);
        assert_eq!(EmergencyLevel::from_confidence(0.45, &t), EmergencyLevel::Medium);
        assert_eq!(EmergencyLevel::from_confidence(0.1, &t), EmergencyLevel::Low);
        assert_eq!(EmergencyLevel::from_confidence(0.0, &t), EmergencyLevel::Low);
    }

    #[test]
    fn severity_breakpoints_are_exclusive() {
        let t = SeverityThresholds::default();
        assert_eq!(EmergencyLevel::from_confidence(0.8, &t), EmergencyLevel::High);
        assert_eq!(EmergencyLevel::from_confidence(0.6, &t), EmergencyLevel::Medium);
        assert_eq!(EmergencyLevel::from_confidence(0.4, &t), EmergencyLevel::Low);
    }

    #[test]
    fn level_serializes_lowercase_and_orders() {
        assert_eq!(serde_json::to_string(&EmergencyLevel::Critical).unwrap(), "\"critical\"");
        assert!(EmergencyLevel::Low < EmergencyLevel::Medium);
        assert!(EmergencyLevel::High < EmergencyLevel::Critical);
    }

    #[test]
    fn mean_is_window_order_invariant() {
        let rows = vec![
            vec![0.9, 0.1, 0.3],
            vec![0.2, 0.4, 0.6],
            vec![0.5, 0.5, 0.0],
        ];
        let mut reversed = rows.clone();
        reversed.reverse();
        let mut rotated = rows.clone();
        rotated.rotate_left(1);

        let a = mean_scores(&ScoreMatrix::from_rows(rows).unwrap());
        let b = mean_scores(&ScoreMatrix::from_rows(reversed).unwrap());
        let c = mean_scores(&ScoreMatrix::from_rows(rotated).unwrap());
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-6);
            assert!((a[i] - c[i]).abs() < 1e-6);
        }
        assert!((a[0] - 1.6 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn rank_is_stable_on_ties() {
        let means = [0.2, 0.5, 0.2, 0.5, 0.1];
        assert_eq!(rank(&means, 10), vec![1, 3, 0, 2, 4]);
        assert_eq!(rank(&means, 2), vec![1, 3]);
    }

    #[test]
    fn detects_danger_and_picks_max_confidence() {
        let vocab = labels(&["Music", "Screaming", "Speech", "Dog"]);
        let scores = ScoreMatrix::from_rows(vec![
            vec![0.1, 0.9, 0.3, 0.05],
            vec![0.1, 0.8, 0.5, 0.05],
        ])
        .unwrap();

        let d = decide(&scores, &vocab, &DecisionConfig::default()).unwrap();
        assert!(d.danger_detected);
        assert!((d.confidence - 0.85).abs() < 1e-6);
        assert_eq!(d.emergency_level, EmergencyLevel::Critical);
        assert_eq!(d.detected_classes.len(), 2);
        assert_eq!(d.detected_classes[0].class, "Screaming");
        assert_eq!(d.detected_classes[1].class, "Speech");
        assert_eq!(d.all_predictions.len(), 4);
        assert_eq!(d.all_predictions[0].class, "Screaming");
    }

    #[test]
    fn threshold_is_exclusive() {
        let vocab = labels(&["Alarm", "Music"]);
        let scores = ScoreMatrix::from_rows(vec![vec![0.3, 0.2]]).unwrap();
        let d = decide(&scores, &vocab, &DecisionConfig::default()).unwrap();
        assert!(!d.danger_detected);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.emergency_level, EmergencyLevel::Low);
    }

    #[test]
    fn weak_detection_stays_low() {
        let vocab = labels(&["Shout", "Music"]);
        let scores = ScoreMatrix::from_rows(vec![vec![0.35, 0.2]]).unwrap();
        let d = decide(&scores, &vocab, &DecisionConfig::default()).unwrap();
        assert!(d.danger_detected);
        assert_eq!(d.emergency_level, EmergencyLevel::Low);
    }

    #[test]
    fn danger_outside_top_ten_is_ignored() {
        let vocab = vocab_with(&["Gunshot, gunfire"]);
        // 12 fillers at 0.9 push the gunshot (0.85) to rank 13.
        let mut row = vec![0.9f32; 12];
        row.push(0.85);
        let scores = ScoreMatrix::from_rows(vec![row]).unwrap();

        let d = decide(&scores, &vocab, &DecisionConfig::default()).unwrap();
        assert!(!d.danger_detected);
        assert_eq!(d.confidence, 0.0);
        assert!(d.detected_classes.is_empty());
        assert_eq!(d.emergency_level, EmergencyLevel::Low);
        assert_eq!(d.all_predictions.len(), 10);
        assert!(d.all_predictions.iter().all(|p| p.class.starts_with("Filler")));
    }

    #[test]
    fn danger_inside_top_ten_triggers() {
        let vocab = vocab_with(&["Gunshot, gunfire"]);
        let mut row = vec![0.1f32; 12];
        row.push(0.7);
        let scores = ScoreMatrix::from_rows(vec![row]).unwrap();

        let d = decide(&scores, &vocab, &DecisionConfig::default()).unwrap();
        assert!(d.danger_detected);
        assert_eq!(d.emergency_level, EmergencyLevel::High);
        assert_eq!(d.all_predictions[0].class, "Gunshot, gunfire");
    }

    #[test]
    fn label_mismatch_is_an_error() {
        let scores = ScoreMatrix::from_rows(vec![vec![0.1, 0.2]]).unwrap();
        let err = decide(&scores, &labels(&["Speech"]), &DecisionConfig::default()).unwrap_err();
        assert_eq!(err, DecisionError::LabelMismatch { classes: 2, labels: 1 });
    }

    #[test]
    fn config_validation() {
        assert!(DecisionConfig::default().validate().is_ok());

        let mut cfg = DecisionConfig::default();
        cfg.top_k = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = DecisionConfig::default();
        cfg.severity.high = 0.9;
        assert!(cfg.validate().is_err());

        let mut cfg = DecisionConfig::default();
        cfg.detection_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }
}
