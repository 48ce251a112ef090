//! Analyzer settings
//!
//! Defaults reproduce the stock behavior exactly: threshold 0.3, top 10,
//! severity breakpoints 0.4/0.6/0.8. A JSON file can override any subset:
//!
//! ```json
//! { "model_dir": "/srv/models", "detection_threshold": 0.35,
//!   "severity": { "critical": 0.85 } }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sheguard_neural::models::ModelManager;
use thiserror::Error;

use crate::decision::{DecisionConfig, DecisionError};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid settings file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Invalid(#[from] DecisionError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding `yamnet.onnx`, the class map and its manifest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,

    #[serde(flatten)]
    pub decision: DecisionConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let bytes = std::fs::read(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_slice(&bytes).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.decision.validate()?;
        Ok(())
    }

    /// Model directory, highest priority first: explicit override,
    /// `SHEGUARD_MODEL_DIR`, the settings file, then the XDG cache
    /// (`./models` without a home directory).
    pub fn resolve_model_dir(&self, explicit: Option<PathBuf>) -> PathBuf {
        self.pick_model_dir(explicit.or_else(ModelManager::env_dir))
    }

    fn pick_model_dir(&self, overridden: Option<PathBuf>) -> PathBuf {
        overridden
            .or_else(|| self.model_dir.clone())
            .unwrap_or_else(ModelManager::cache_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::SeverityThresholds;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_stock_behavior() {
        let s = Settings::default();
        assert_eq!(s.decision.detection_threshold, 0.3);
        assert_eq!(s.decision.top_k, 10);
        assert_eq!(s.decision.severity, SeverityThresholds::default());
        assert!(s.model_dir.is_none());
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sheguard.json");
        std::fs::write(
            &path,
            r#"{ "model_dir": "/srv/models", "detection_threshold": 0.35, "severity": { "critical": 0.85 } }"#,
        )
        .unwrap();

        let s = Settings::load(&path).unwrap();
        assert_eq!(s.model_dir, Some(PathBuf::from("/srv/models")));
        assert_eq!(s.decision.detection_threshold, 0.35);
        assert_eq!(s.decision.top_k, 10);
        assert_eq!(s.decision.severity.critical, 0.85);
        assert_eq!(s.decision.severity.high, 0.6);
    }

    #[test]
    fn invalid_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");

        std::fs::write(&path, r#"{ "top_k": 0 }"#).unwrap();
        assert!(matches!(Settings::load(&path), Err(SettingsError::Invalid(_))));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(SettingsError::Parse { .. })));

        assert!(matches!(
            Settings::load(&dir.path().join("missing.json")),
            Err(SettingsError::Io { .. })
        ));
    }

    #[test]
    fn explicit_model_dir_wins() {
        let s = Settings {
            model_dir: Some(PathBuf::from("from-file")),
            ..Settings::default()
        };
        assert_eq!(
            s.resolve_model_dir(Some(PathBuf::from("from-cli"))),
            PathBuf::from("from-cli")
        );
    }

    #[test]
    fn env_override_beats_settings_file() {
        let s = Settings {
            model_dir: Some(PathBuf::from("from-file")),
            ..Settings::default()
        };
        // `resolve_model_dir` folds the env var into the override slot.
        assert_eq!(
            s.pick_model_dir(Some(PathBuf::from("from-env"))),
            PathBuf::from("from-env")
        );
        assert_eq!(s.pick_model_dir(None), PathBuf::from("from-file"));
        assert_eq!(
            Settings::default().pick_model_dir(None),
            ModelManager::cache_dir()
        );
    }
}
