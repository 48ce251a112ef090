use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// AudioSet display names in YAMNet output order.
pub const YAMNET_CLASS_MAP_URL: &str =
    "https://raw.githubusercontent.com/tensorflow/models/master/research/audioset/yamnet/yamnet_class_map.csv";
/// Environment override for the model directory.
pub const MODEL_DIR_ENV: &str = "SHEGUARD_MODEL_DIR";
const MODEL_FILE: &str = "yamnet.onnx";
const CLASS_MAP_FILE: &str = "yamnet_class_map.csv";
const MANIFEST_FILE: &str = "model-manifest.json";

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("Required model file missing: {0}")]
    ModelMissing(PathBuf),
    #[error("No download URL configured for {0}")]
    NoSource(PathBuf),
    #[error("Model manifest missing: {0}")]
    ManifestMissing(PathBuf),
    #[error("Model manifest invalid at {path:?}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },
    #[error("Class map invalid at {path:?}: {reason}")]
    ClassMapInvalid { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelManifest {
    version: u32,
    model_sha256: String,
    class_map_sha256: String,
}

/// Where `setup_models` fetches artifacts that are not already staged.
#[derive(Debug, Clone)]
pub struct ModelSources {
    /// YAMNet ONNX export; `None` means the file must be placed by hand.
    pub model_url: Option<String>,
    pub class_map_url: String,
}

impl Default for ModelSources {
    fn default() -> Self {
        Self {
            model_url: None,
            class_map_url: YAMNET_CLASS_MAP_URL.to_string(),
        }
    }
}

/// Verified artifact paths, ready to load.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub model: PathBuf,
    pub class_map: PathBuf,
}

pub struct ModelManager {
    root: PathBuf,
}

impl ModelManager {
    pub fn from_dir(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default model directory: `SHEGUARD_MODEL_DIR`, then the XDG cache.
    /// `SHEGUARD_MODEL_DIR`, when set and non-empty.
    pub fn env_dir() -> Option<PathBuf> {
        std::env::var_os(MODEL_DIR_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    /// XDG cache location, or `./models` when no home directory is known.
    pub fn cache_dir() -> PathBuf {
        if let Some(dirs) = ProjectDirs::from("org", "sheguard", "sheguard") {
            dirs.cache_dir().join("models")
        } else {
            PathBuf::from("models")
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    fn model_path(&self) -> PathBuf {
        self.root.join(MODEL_FILE)
    }

    #[inline]
    fn class_map_path(&self) -> PathBuf {
        self.root.join(CLASS_MAP_FILE)
    }

    #[inline]
    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn load_manifest(&self) -> Result<ModelManifest, ModelError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Err(ModelError::ManifestMissing(path));
        }
        let bytes = fs::read(&path)?;
        serde_json::from_slice(&bytes).map_err(|e| ModelError::ManifestInvalid {
            path,
            reason: e.to_string(),
        })
    }

    fn write_manifest(&self, manifest: &ModelManifest) -> Result<(), ModelError> {
        let path = self.manifest_path();
        let tmp_path = self.root.join(format!("{}.tmp", MANIFEST_FILE));
        let payload =
            serde_json::to_vec_pretty(manifest).map_err(|e| ModelError::ManifestInvalid {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let mut file = File::create(&tmp_path)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &path)?;
        sync_parent_dir(&path)?;
        Ok(())
    }

    fn verify_expected_hash(&self, path: &Path, expected: &str) -> Result<(), ModelError> {
        let actual = compute_sha256(path)?;
        if actual == expected {
            Ok(())
        } else {
            Err(ModelError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: expected.to_string(),
                actual,
            })
        }
    }

    fn ensure_verified(&self, path: PathBuf, expected: &str) -> Result<PathBuf, ModelError> {
        if !path.exists() {
            return Err(ModelError::ModelMissing(path));
        }
        self.verify_expected_hash(&path, expected)?;
        Ok(path)
    }

    /// Resolve both artifacts without network side effects.
    pub fn artifacts_offline(&self) -> Result<ModelArtifacts, ModelError> {
        let manifest = self.load_manifest()?;
        Ok(ModelArtifacts {
            model: self.ensure_verified(self.model_path(), &manifest.model_sha256)?,
            class_map: self.ensure_verified(self.class_map_path(), &manifest.class_map_sha256)?,
        })
    }

    /// Download missing artifacts and pin their hashes.
    ///
    /// Trust on first use: hashes are captured into a local manifest and
    /// strictly enforced on every subsequent offline load.
    pub fn setup_models(&self, sources: &ModelSources) -> Result<ModelArtifacts, ModelError> {
        fs::create_dir_all(&self.root)?;
        let model_path = self.model_path();
        let class_map_path = self.class_map_path();

        if !model_path.exists() {
            let url = sources
                .model_url
                .as_deref()
                .ok_or_else(|| ModelError::NoSource(model_path.clone()))?;
            tracing::info!("Downloading model artifact {} -> {:?}", url, model_path);
            self.download_file(url, &model_path)?;
        }
        if !class_map_path.exists() {
            tracing::info!(
                "Downloading model artifact {} -> {:?}",
                sources.class_map_url,
                class_map_path
            );
            self.download_file(&sources.class_map_url, &class_map_path)?;
        }

        // Reject a bad class map before pinning it.
        load_class_map(&class_map_path)?;

        let manifest = ModelManifest {
            version: 1,
            model_sha256: compute_sha256(&model_path)?,
            class_map_sha256: compute_sha256(&class_map_path)?,
        };
        self.write_manifest(&manifest)?;

        self.artifacts_offline()
    }

    fn download_file(&self, url: &str, dest: &Path) -> Result<(), ModelError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let tmp_path = dest.with_extension("tmp");
        let mut response = client.get(url).send()?.error_for_status()?;
        let mut file = File::create(&tmp_path)?;
        response.copy_to(&mut file)?;
        file.sync_all()?;
        fs::rename(&tmp_path, dest)?;
        sync_parent_dir(dest)?;
        Ok(())
    }
}

/// Parse a YAMNet class map (`index,mid,display_name`) into display names
/// ordered by index.
pub fn load_class_map(path: &Path) -> Result<Vec<String>, ModelError> {
    let content = fs::read_to_string(path)?;
    parse_class_map(&content).map_err(|reason| ModelError::ClassMapInvalid {
        path: path.to_path_buf(),
        reason,
    })
}

fn parse_class_map(content: &str) -> Result<Vec<String>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut labels = Vec::with_capacity(521);
    for record in reader.deserialize::<(usize, String, String)>() {
        let (index, _mid, display_name) = record.map_err(|e| e.to_string())?;
        if index != labels.len() {
            return Err(format!(
                "index {} out of order (expected {})",
                index,
                labels.len()
            ));
        }
        labels.push(display_name);
    }

    if labels.is_empty() {
        return Err("empty class map".to_string());
    }
    Ok(labels)
}

fn compute_sha256(path: &Path) -> Result<String, ModelError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn sync_parent_dir(path: &Path) -> Result<(), ModelError> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CLASS_MAP: &str = "index,mid,display_name\n\
        0,/m/09x0r,Speech\n\
        1,/m/03qc9zr,Screaming\n\
        2,/m/032s66,\"Gunshot, gunfire\"\n";

    fn write_dummy_models(root: &Path) {
        fs::write(root.join(MODEL_FILE), b"onnx-bytes").unwrap();
        fs::write(root.join(CLASS_MAP_FILE), CLASS_MAP).unwrap();
    }

    #[test]
    fn class_map_handles_quoted_commas() {
        let labels = parse_class_map(CLASS_MAP).unwrap();
        assert_eq!(labels, vec!["Speech", "Screaming", "Gunshot, gunfire"]);
    }

    #[test]
    fn class_map_rejects_gaps_and_empty() {
        assert!(parse_class_map("index,mid,display_name\n").is_err());
        assert!(parse_class_map("index,mid,display_name\n0,/m/a,A\n2,/m/b,B\n").is_err());
        assert!(parse_class_map("index,mid,display_name\n0,A\n").is_err());
        assert!(parse_class_map("index,mid,display_name\nzero,/m/a,A\n").is_err());
    }

    #[test]
    fn class_map_tolerates_crlf_and_escaped_quotes() {
        let labels =
            parse_class_map("index,mid,display_name\r\n0,/m/a,\"Say \"\"hi\"\"\"\r\n1,/m/b,B\r\n")
                .unwrap();
        assert_eq!(labels, vec!["Say \"hi\"", "B"]);
    }

    #[test]
    fn offline_load_requires_manifest() {
        let dir = tempdir().unwrap();
        write_dummy_models(dir.path());
        let manager = ModelManager::from_dir(dir.path());

        let err = manager.artifacts_offline().unwrap_err();
        assert!(matches!(err, ModelError::ManifestMissing(_)));
    }

    #[test]
    fn setup_pins_staged_files_and_detects_tampering() {
        let dir = tempdir().unwrap();
        write_dummy_models(dir.path());
        let manager = ModelManager::from_dir(dir.path());

        // Both files are staged, so no network access happens.
        let artifacts = manager.setup_models(&ModelSources::default()).unwrap();
        assert_eq!(artifacts.model, dir.path().join(MODEL_FILE));
        assert!(manager.artifacts_offline().is_ok());

        fs::write(dir.path().join(MODEL_FILE), b"tampered").unwrap();
        let err = manager.artifacts_offline().unwrap_err();
        assert!(matches!(err, ModelError::ChecksumMismatch { .. }));
    }

    #[test]
    fn setup_without_model_source_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CLASS_MAP_FILE), CLASS_MAP).unwrap();
        let manager = ModelManager::from_dir(dir.path());

        let err = manager.setup_models(&ModelSources::default()).unwrap_err();
        assert!(matches!(err, ModelError::NoSource(_)));
    }
}
