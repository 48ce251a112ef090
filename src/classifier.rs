//! Process-wide classifier handle
//!
//! # Lifecycle
//!
//! The classifier is expensive to load, so it is built at most once and then
//! shared read-only by every request:
//!
//! - `get_or_init()` is the only way in. Callers that arrive while a load is
//!   running wait for that load and share its outcome, success or failure.
//! - A failed load leaves the cell empty. Requests that arrive after the
//!   failure was reported start a fresh attempt.
//! - Once loaded, the handle lives until the process exits.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use sheguard_neural::{NeuralError, OnnxClassifier, SoundClassifier};
use tokio::sync::{Mutex, OnceCell};

use crate::error::AnalyzeError;

type Loader = dyn Fn() -> Result<Arc<dyn SoundClassifier>, NeuralError> + Send + Sync;

pub struct SharedClassifier {
    cell: OnceCell<Arc<dyn SoundClassifier>>,
    /// Init guard; holds the failure of the last finished attempt.
    last_failure: Mutex<Option<String>>,
    /// Finished load attempts. Bumped under `last_failure`.
    attempts: AtomicU64,
    loader: Arc<Loader>,
}

impl SharedClassifier {
    /// Lazily populated holder; `loader` runs on the blocking pool.
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn SoundClassifier>, NeuralError> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            last_failure: Mutex::new(None),
            attempts: AtomicU64::new(0),
            loader: Arc::new(loader),
        }
    }

    /// YAMNet from a prepared model directory.
    pub fn onnx(model_dir: PathBuf) -> Self {
        Self::new(move || {
            let classifier = OnnxClassifier::load(&model_dir)?;
            Ok(Arc::new(classifier) as Arc<dyn SoundClassifier>)
        })
    }

    /// Holder that is initialized from the start.
    pub fn ready(classifier: Arc<dyn SoundClassifier>) -> Self {
        Self {
            cell: OnceCell::new_with(Some(classifier)),
            last_failure: Mutex::new(None),
            attempts: AtomicU64::new(0),
            loader: Arc::new(|| {
                Err(NeuralError::Inference("classifier was provided pre-loaded".into()))
            }),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    pub async fn get_or_init(&self) -> Result<Arc<dyn SoundClassifier>, AnalyzeError> {
        if let Some(classifier) = self.cell.get() {
            return Ok(classifier.clone());
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut last_failure = self.last_failure.lock().await;

        if let Some(classifier) = self.cell.get() {
            return Ok(classifier.clone());
        }
        // An attempt finished while we queued: report its outcome instead of
        // loading again.
        if self.attempts.load(Ordering::Acquire) != seen {
            let reason = last_failure
                .clone()
                .unwrap_or_else(|| "classifier load failed".to_string());
            return Err(AnalyzeError::ClassifierUnavailable(reason));
        }

        let outcome = self.load().await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(classifier) => {
                *last_failure = None;
                if self.cell.set(classifier.clone()).is_err() {
                    tracing::warn!("Sound classifier was already initialized");
                }
                Ok(classifier)
            }
            Err(reason) => {
                *last_failure = Some(reason.clone());
                Err(AnalyzeError::ClassifierUnavailable(reason))
            }
        }
    }

    async fn load(&self) -> Result<Arc<dyn SoundClassifier>, String> {
        let loader = self.loader.clone();
        let started = Instant::now();
        tracing::info!("Loading sound classifier...");

        match tokio::task::spawn_blocking(move || loader()).await {
            Ok(Ok(classifier)) => {
                tracing::info!(
                    "Sound classifier ready in {:.2?} ({} classes)",
                    started.elapsed(),
                    classifier.labels().len()
                );
                Ok(classifier)
            }
            Ok(Err(e)) => {
                tracing::error!("Sound classifier failed to load: {}", e);
                Err(e.to_string())
            }
            Err(e) => {
                tracing::error!("Sound classifier loader task failed: {}", e);
                Err(format!("loader task failed: {}", e))
            }
        }
    }
}
