/// Shared command-line driver for the `train_classifier` and
/// `train_regressor` binaries.
///
/// Both binaries take the same flags and differ only in the model they fit:
///
///   --today              Train on today's rows and save a dated artifact
///   --ensure-schema      Create sensor_data first if it is missing
///   --synthetic ROWS     Train on simulated readings instead of the database
///   --seed N             Seed for --synthetic (default: training.seed)
///   --config FILE        Alternate configuration file
///   --models-dir DIR     Override serving.models_dir

use crate::config::{AppConfig, ConfigError, load_config, load_config_from};
use crate::db::{ReadingWindow, connect_with_validation, ensure_schema, fetch_readings};
use crate::model::SensorReading;
use crate::simulate::synthetic_history;
use crate::store::{ArtifactStore, ModelKind};
use crate::training::{TrainingError, TrainingReport, train_and_save};
use chrono::Utc;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainArgs {
    pub today: bool,
    pub ensure_schema: bool,
    pub synthetic_rows: Option<usize>,
    pub seed: Option<u64>,
    pub config_path: Option<PathBuf>,
    pub models_dir: Option<PathBuf>,
}

pub fn usage(program: &str) -> String {
    format!(
        "Usage: {} [--today] [--ensure-schema] [--synthetic ROWS] [--seed N] [--config FILE] [--models-dir DIR]",
        program
    )
}

/// Parses everything after the program name.
pub fn parse_train_args(args: &[String]) -> Result<TrainArgs, String> {
    let mut parsed = TrainArgs::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} requires a value", flag))
        };
        match arg.as_str() {
            "--today" => parsed.today = true,
            "--ensure-schema" => parsed.ensure_schema = true,
            "--synthetic" => {
                let v = value("--synthetic")?;
                parsed.synthetic_rows = Some(
                    v.parse()
                        .map_err(|_| format!("--synthetic expects a row count, got '{}'", v))?,
                );
            }
            "--seed" => {
                let v = value("--seed")?;
                parsed.seed = Some(v.parse().map_err(|_| format!("--seed expects an integer, got '{}'", v))?);
            }
            "--config" => parsed.config_path = Some(PathBuf::from(value("--config")?)),
            "--models-dir" => parsed.models_dir = Some(PathBuf::from(value("--models-dir")?)),
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    if parsed.synthetic_rows.is_some() && parsed.ensure_schema {
        return Err("--ensure-schema has no effect with --synthetic".to_string());
    }
    Ok(parsed)
}

impl TrainArgs {
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        let mut config = match &self.config_path {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        if let Some(dir) = &self.models_dir {
            config.serving.models_dir = dir.clone();
        }
        Ok(config)
    }

    pub fn window(&self) -> ReadingWindow {
        if self.today {
            ReadingWindow::Today
        } else {
            ReadingWindow::Historical
        }
    }
}

fn load_readings(args: &TrainArgs, config: &AppConfig) -> Result<Vec<SensorReading>, TrainingError> {
    if let Some(rows) = args.synthetic_rows {
        let seed = args.seed.unwrap_or(config.training.seed);
        println!("🎲 Simulating {} readings (seed {})...", rows, seed);
        return Ok(synthetic_history(rows, seed, Utc::now()));
    }

    println!("📊 Connecting to database...");
    let mut client = connect_with_validation()?;
    if args.ensure_schema {
        ensure_schema(&mut client)?;
    }
    println!("✓ Connected\n");

    println!("📥 Fetching {:?} readings...", args.window());
    Ok(fetch_readings(&mut client, args.window())?)
}

/// Loads readings, trains `kind` and saves it.
pub fn run_training(kind: ModelKind, args: &TrainArgs, config: &AppConfig) -> Result<TrainingReport, TrainingError> {
    let readings = load_readings(args, config)?;
    println!("✓ {} readings\n", readings.len());

    let store = ArtifactStore::new(config.serving.models_dir.clone());
    let date = args.today.then(|| chrono::Local::now().date_naive());

    println!("🌲 Training {}...", kind);
    train_and_save(kind, &readings, config, &store, date)
}

pub fn print_report(report: &TrainingReport) {
    println!("\n✓ Saved {} to {}", report.kind, report.path.display());
    println!("   Samples:    {}", report.n_samples);
    println!(
        "   Split:      {} train / {} test",
        report.metrics.train_rows, report.metrics.test_rows
    );
    println!(
        "   Ensemble:   {} trees, max depth {} (grown {:.1}, {:.1} leaves per tree)",
        report.metrics.n_trees,
        report.metrics.max_depth,
        report.metrics.mean_tree_depth,
        report.metrics.mean_leaves
    );
    if let Some(acc) = report.metrics.accuracy {
        println!("   Accuracy:   {:.2}%", acc * 100.0);
    }
    if let Some(rmse) = report.metrics.rmse {
        println!("   RMSE:       {:.2} s", rmse);
    }

    if !report.metrics.label_counts.is_empty() {
        println!("\n   Label distribution:");
        for (label, count) in &report.metrics.label_counts {
            println!("     {:<16} {}", label.as_str(), count);
        }
    }

    println!("\n   Feature importances:");
    for (name, importance) in &report.importances {
        println!("     {:<20} {:.4}", name, importance);
    }

    for warning in &report.metrics.warnings {
        println!("\n   ⚠️  {}", warning);
    }
}

/// Entry point shared by both training binaries.
pub fn main_for(kind: ModelKind, title: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🌊 {}", title);
    println!("{}\n", "=".repeat(title.chars().count() + 3));

    let argv: Vec<String> = std::env::args().collect();
    let program = argv.first().map(String::as_str).unwrap_or("train");
    let args = match parse_train_args(argv.get(1..).unwrap_or(&[])) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", usage(program));
            std::process::exit(1);
        }
    };

    let config = match args.load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("\n❌ Configuration error: {}\n", e);
            std::process::exit(1);
        }
    };

    match run_training(kind, &args, &config) {
        Ok(report) => {
            print_report(&report);
            println!("\n✅ Done. POST /reload_models to serve the new {}.", kind);
        }
        Err(e) => {
            eprintln!("\n❌ Training failed: {}\n", e);
            std::process::exit(1);
        }
    }
}
