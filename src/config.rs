/// Service configuration loader - parses flood_alert.toml
///
/// Separates thresholds, danger-index weights and training parameters from
/// code, making it easy to tune the warning rules or ensemble sizes without
/// recompiling the service. Every field has a default, so a partial file
/// (or no file at all) is valid.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "flood_alert.toml";

// ---------------------------------------------------------------------------
// Configuration sections
// ---------------------------------------------------------------------------

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub features: FeatureConfig,
    pub labels: LabelThresholds,
    pub training: TrainingConfig,
    pub serving: ServingConfig,
}

/// Feature engineering parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    /// Additive guard for ratio denominators
    pub epsilon: f64,
    /// Rows in the rolling `b_trend` window
    pub trend_window: usize,
    pub danger_weights: DangerWeights,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            trend_window: 5,
            danger_weights: DangerWeights::default(),
        }
    }
}

/// Weights of the composite danger index
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DangerWeights {
    pub upstream_level: f64,
    pub downstream_level: f64,
    pub rate_of_change: f64,
    pub absolute_change: f64,
    pub level_gap: f64,
}

impl Default for DangerWeights {
    fn default() -> Self {
        Self {
            upstream_level: 0.2,
            downstream_level: 0.3,
            rate_of_change: 10.0,
            absolute_change: 2.0,
            level_gap: 0.5,
        }
    }
}

/// Thresholds used by the ordered label rules (cm, cm/s, seconds)
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabelThresholds {
    pub sudden_rise_rate: f64,
    pub countdown_imminent_secs: f64,
    pub countdown_near_secs: f64,
    pub upstream_danger_level: f64,
    pub upstream_high_level: f64,
    pub upstream_warning_level: f64,
    pub downstream_high_level: f64,
    pub gap_warning: f64,
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            sudden_rise_rate: 0.5,
            countdown_imminent_secs: 30.0,
            countdown_near_secs: 60.0,
            upstream_danger_level: 28.0,
            upstream_high_level: 25.0,
            upstream_warning_level: 20.0,
            downstream_high_level: 25.0,
            gap_warning: 5.0,
        }
    }
}

/// Training pipeline parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    /// Abort below this many raw rows
    pub min_rows: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub classifier_trees: usize,
    pub regressor_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Row count at which the base ensemble sizes apply unscaled
    pub full_capacity_rows: usize,
    pub min_trees: usize,
    pub min_depth: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_rows: 50,
            test_fraction: 0.2,
            seed: 42,
            classifier_trees: 100,
            regressor_trees: 200,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            full_capacity_rows: 1000,
            min_trees: 10,
            min_depth: 3,
        }
    }
}

/// Prediction API parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServingConfig {
    pub port: u16,
    /// Directory holding the model artifacts
    pub models_dir: PathBuf,
    pub time_levels: TimeLevelBuckets,
}

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            port: 5001,
            models_dir: PathBuf::from("."),
            time_levels: TimeLevelBuckets::default(),
        }
    }
}

/// Upper bounds (inclusive, seconds) for the countdown warning buckets
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeLevelBuckets {
    pub danger_max_secs: f64,
    pub high_warning_max_secs: f64,
    pub warning_max_secs: f64,
}

impl Default for TimeLevelBuckets {
    fn default() -> Self {
        Self {
            danger_max_secs: 30.0,
            high_warning_max_secs: 60.0,
            warning_max_secs: 120.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Loads configuration from `flood_alert.toml` in the working directory.
///
/// A missing file is not an error: defaults are used and a warning logged.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = Path::new(DEFAULT_CONFIG_PATH);
    if !path.exists() {
        log::warn!("{} not found, using built-in defaults", DEFAULT_CONFIG_PATH);
        return Ok(AppConfig::default());
    }
    load_config_from(path)
}

/// Loads and validates configuration from an explicit path.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

fn parse_config(contents: &str) -> Result<AppConfig, toml::de::Error> {
    toml::from_str(contents)
}

impl AppConfig {
    /// Rejects values that would make the pipelines misbehave silently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.features.epsilon > 0.0) {
            return Err(ConfigError::Invalid("features.epsilon must be > 0".into()));
        }
        if self.features.trend_window == 0 {
            return Err(ConfigError::Invalid("features.trend_window must be >= 1".into()));
        }

        let t = &self.training;
        if !(t.test_fraction > 0.0 && t.test_fraction < 1.0) {
            return Err(ConfigError::Invalid(
                "training.test_fraction must be between 0 and 1".into(),
            ));
        }
        if t.min_rows < 2 {
            return Err(ConfigError::Invalid("training.min_rows must be >= 2".into()));
        }
        if t.classifier_trees == 0 || t.regressor_trees == 0 || t.min_trees == 0 {
            return Err(ConfigError::Invalid("tree counts must be >= 1".into()));
        }
        if t.max_depth == 0 || t.min_depth == 0 {
            return Err(ConfigError::Invalid("tree depths must be >= 1".into()));
        }

        let b = &self.serving.time_levels;
        if !(b.danger_max_secs < b.high_warning_max_secs
            && b.high_warning_max_secs < b.warning_max_secs)
        {
            return Err(ConfigError::Invalid(
                "serving.time_levels must be strictly ascending: danger < high_warning < warning"
                    .into(),
            ));
        }

        Ok(())
    }
}
