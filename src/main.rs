//! Flood Alert Service - Prediction API
//!
//! Loads the trained risk classifier and countdown regressor from the
//! models directory and serves them over HTTP:
//! 1. Reads flood_alert.toml (or built-in defaults)
//! 2. Loads today's dated artifacts, falling back to the undated ones
//! 3. Answers /predict, /predict_time, /batch_predict and friends
//!
//! Models are produced by the `train_classifier` and `train_regressor`
//! binaries; POST /reload_models picks up a fresh pair without a restart.
//!
//! Usage:
//!   cargo run --release                          # Serve on the configured port
//!   cargo run --release -- --port 5001           # Override the port
//!   cargo run --release -- --models-dir ./models # Override the artifact directory
//!   cargo run --release -- --config other.toml   # Alternate configuration file
//!
//! Environment:
//!   RUST_LOG - log filter (default: info)

use flood_alert_service::config::{load_config, load_config_from};
use flood_alert_service::endpoint;
use flood_alert_service::serving::PredictionService;
use flood_alert_service::serving::registry::ModelRegistry;
use flood_alert_service::store::ArtifactStore;
use std::env;
use std::path::PathBuf;

fn usage(program: &str) -> String {
    format!(
        "Usage: {} [--port PORT] [--models-dir DIR] [--config FILE]",
        program
    )
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🌊 Flood Alert Service");
    println!("======================\n");

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let mut port: Option<u16> = None;
    let mut models_dir: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args.get(i + 1);
        match (flag, value) {
            ("--port", Some(v)) => match v.parse() {
                Ok(p) => port = Some(p),
                Err(_) => {
                    eprintln!("Error: --port requires a port number, got '{}'", v);
                    std::process::exit(1);
                }
            },
            ("--models-dir", Some(v)) => models_dir = Some(PathBuf::from(v)),
            ("--config", Some(v)) => config_path = Some(PathBuf::from(v)),
            ("--port" | "--models-dir" | "--config", None) => {
                eprintln!("Error: {} requires a value", flag);
                eprintln!("{}", usage(&args[0]));
                std::process::exit(1);
            }
            _ => {
                eprintln!("Unknown argument: {}", flag);
                eprintln!("{}", usage(&args[0]));
                std::process::exit(1);
            }
        }
        i += 2;
    }

    // Load configuration
    println!("⚙️  Loading configuration...");
    let loaded = match &config_path {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    let mut config = match loaded {
        Ok(c) => c,
        Err(e) => {
            eprintln!("\n❌ Configuration error: {}\n", e);
            std::process::exit(1);
        }
    };
    if let Some(p) = port {
        config.serving.port = p;
    }
    if let Some(dir) = models_dir {
        config.serving.models_dir = dir;
    }
    println!("✓ Configuration loaded\n");

    // Load model artifacts
    println!("📦 Loading models from {}...", config.serving.models_dir.display());
    let mut registry = ModelRegistry::new(ArtifactStore::new(config.serving.models_dir.clone()));
    let report = registry.reload();
    let mark = |loaded: bool| if loaded { "✓" } else { "✗" };
    println!("   {} classifier", mark(report.classifier_loaded));
    println!("   {} regressor", mark(report.regressor_loaded));
    for err in &report.errors {
        println!("   ⚠️  {}", err);
    }
    if !report.classifier_loaded || !report.regressor_loaded {
        println!("   Missing models answer 503 until trained and reloaded (POST /reload_models)");
    }
    println!();

    let port = config.serving.port;
    let service = PredictionService::new(config, registry);
    if let Err(e) = endpoint::start_endpoint_server(port, service) {
        eprintln!("\n❌ {}\n", e);
        std::process::exit(1);
    }
}
