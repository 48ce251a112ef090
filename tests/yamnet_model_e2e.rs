//! Runs against a real YAMNet export staged with `sheguard setup-models`.
//!
//! ```bash
//! SHEGUARD_MODEL_DIR=./models cargo test --test yamnet_model_e2e -- --ignored
//! ```

use std::path::PathBuf;

use sheguard::{Analyzer, EmergencyLevel, Settings};
use sheguard_neural::{OnnxClassifier, SoundClassifier, Waveform};

fn model_dir() -> PathBuf {
    PathBuf::from(
        std::env::var("SHEGUARD_MODEL_DIR").expect("set SHEGUARD_MODEL_DIR to a staged model dir"),
    )
}

#[test]
#[ignore = "needs a staged YAMNet model; run with SHEGUARD_MODEL_DIR=... --ignored"]
fn short_tone_is_padded_to_one_window() {
    let classifier = OnnxClassifier::load(&model_dir()).unwrap();
    assert_eq!(classifier.labels().len(), 521);

    let scores = classifier
        .scores(&Waveform::tone(440.0, 0.25, 16_000, 0.5))
        .unwrap();
    assert_eq!(scores.num_windows(), 1);
    assert_eq!(scores.num_classes(), 521);
}

#[tokio::test]
#[ignore = "needs a staged YAMNet model; run with SHEGUARD_MODEL_DIR=... --ignored"]
async fn pure_tone_baseline_is_not_danger() {
    let analyzer = Analyzer::from_settings(&Settings::default(), Some(model_dir()));
    analyzer.warm_up().await.unwrap();
    assert!(analyzer.health().model_loaded);

    let response = analyzer.self_test().await.unwrap();
    assert!(!response.result.danger_detected, "{:?}", response.result);
    assert_eq!(response.result.emergency_level, EmergencyLevel::Low);
    assert_eq!(response.result.all_predictions.len(), 10);
}
