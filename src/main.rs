//! SheGuard CLI
//!
//! Detects danger sounds (screaming, gunfire, alarms, ...) in audio clips.
//!
//! # Usage
//!
//! ```bash
//! # Stage the model once (class map is fetched automatically)
//! sheguard setup-models --model-dir ./models --model-url https://example.org/yamnet.onnx
//!
//! # Analyze a clip; the format hint defaults to the file extension
//! sheguard --model-dir ./models classify --input clip.webm
//!
//! # Analyze a JSON request body {"audio_data": "<base64>", "audio_format": "wav"}
//! sheguard --model-dir ./models request --input body.json
//!
//! # Synthetic 440 Hz tone through the full pipeline
//! sheguard --model-dir ./models self-test
//! ```
//!
//! Results are printed as JSON on stdout; logs go to stderr. Analysis
//! failures print an error body and exit with 2 (bad input) or 3 (server
//! error).

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use sheguard::{AnalysisRequest, AnalysisResponse, AnalyzeError, Analyzer, ErrorKind, ErrorResponse, Settings};
use sheguard_neural::models::{ModelManager, ModelSources, YAMNET_CLASS_MAP_URL};

#[derive(Parser)]
#[command(name = "sheguard")]
#[command(about = "Detect danger sounds in audio clips")]
#[command(version)]
struct Cli {
    /// Model directory (yamnet.onnx, class map, manifest)
    #[arg(long, global = true, env = "SHEGUARD_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the detection threshold (default 0.3)
    #[arg(long, global = true)]
    threshold: Option<f32>,

    /// Override the number of ranked predictions (default 10)
    #[arg(long, global = true)]
    top_k: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an audio file
    Classify {
        /// Audio file (wav, webm, ogg, mp3, flac, ...)
        #[arg(short, long)]
        input: PathBuf,

        /// Format hint; defaults to the file extension
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Analyze a JSON request body with base64 audio
    Request {
        /// JSON file: {"audio_data": "<base64>", "audio_format": "wav"}
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Run a synthetic 440 Hz tone through the pipeline
    SelfTest,

    /// Report whether the classifier is loaded
    Health {
        /// Load the classifier first (startup hook)
        #[arg(long)]
        warm: bool,
    },

    /// Download and pin model artifacts ahead of serving
    SetupModels {
        /// YAMNet ONNX export to fetch when yamnet.onnx is not already staged
        #[arg(long)]
        model_url: Option<String>,

        /// Class map CSV
        #[arg(long, default_value = YAMNET_CLASS_MAP_URL)]
        class_map_url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs on stderr; stdout carries JSON only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(threshold) = cli.threshold {
        settings.decision.detection_threshold = threshold;
    }
    if let Some(top_k) = cli.top_k {
        settings.decision.top_k = top_k;
    }
    settings.validate()?;

    match cli.command {
        Commands::SetupModels {
            model_url,
            class_map_url,
        } => {
            let model_dir = settings.resolve_model_dir(cli.model_dir);
            tracing::info!("Setting up models in {:?}", model_dir);
            let sources = ModelSources {
                model_url,
                class_map_url,
            };
            let dir = model_dir.clone();
            tokio::task::spawn_blocking(move || ModelManager::from_dir(dir).setup_models(&sources))
                .await??;
            println!("Models downloaded and verified in {:?}", model_dir);
        }

        Commands::Classify { input, format } => {
            let bytes = std::fs::read(&input)
                .with_context(|| format!("reading audio file {:?}", input))?;
            let format = format
                .or_else(|| {
                    input
                        .extension()
                        .and_then(|e| e.to_str())
                        .map(str::to_string)
                })
                .unwrap_or_default();

            let analyzer = Analyzer::from_settings(&settings, cli.model_dir);
            match analyzer.classify(bytes, &format).await {
                Ok(decision) => emit(&AnalysisResponse::from(decision))?,
                Err(e) => fail(&e)?,
            }
        }

        Commands::Request { input } => {
            let body = std::fs::read(&input)
                .with_context(|| format!("reading request body {:?}", input))?;
            let request: AnalysisRequest = match serde_json::from_slice(&body) {
                Ok(request) => request,
                Err(e) => return fail(&AnalyzeError::InvalidPayload(e.to_string())),
            };

            let analyzer = Analyzer::from_settings(&settings, cli.model_dir);
            match analyzer.analyze_request(request).await {
                Ok(response) => emit(&response)?,
                Err(e) => fail(&e)?,
            }
        }

        Commands::SelfTest => {
            let analyzer = Analyzer::from_settings(&settings, cli.model_dir);
            match analyzer.self_test().await {
                Ok(response) => emit(&response)?,
                Err(e) => fail(&e)?,
            }
        }

        Commands::Health { warm } => {
            let analyzer = Analyzer::from_settings(&settings, cli.model_dir);
            if warm {
                if let Err(e) = analyzer.warm_up().await {
                    tracing::warn!("Classifier warm-up failed: {}", e);
                }
            }
            emit(&analyzer.health())?;
        }
    }

    Ok(())
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the error body and exit with a code matching its kind.
fn fail(err: &AnalyzeError) -> anyhow::Result<()> {
    tracing::error!("{}", err);
    emit(&ErrorResponse::from(err))?;
    let code = match err.kind() {
        ErrorKind::BadInput => 2,
        ErrorKind::ServerError => 3,
    };
    std::process::exit(code);
}
