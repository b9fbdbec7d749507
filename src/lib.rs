/// flood_alert_service: two-sensor river flood early-warning service.
///
/// # Module structure
///
/// ```text
/// flood_alert_service
/// ├── model       — shared data types (SensorReading, FeatureRow, RiskLabel, …)
/// ├── config      — service configuration loader (flood_alert.toml)
/// ├── db          — PostgreSQL access to the sensor_data table
/// ├── simulate    — seeded two-sensor flood simulator for tests and dry runs
/// ├── analysis
/// │   ├── features — feature engineering, shared by training and serving
/// │   └── labels   — ordered first-match risk label rules
/// ├── ensemble
/// │   ├── tree     — CART decision tree (classification + regression)
/// │   └── forest   — bootstrap random forest with feature importances
/// ├── store       — model artifact envelope + dated/undated JSON files
/// ├── training    — classifier and regressor training pipelines
/// ├── cli         — shared driver for the train_* binaries
/// ├── serving
/// │   ├── request   — lenient request field coercion
/// │   ├── narrative — notification texts, risk factors, time buckets
/// │   └── registry  — loaded models behind a swappable snapshot
/// └── endpoint    — HTTP routing and the tiny_http server loop
/// ```

/// Public modules
pub mod analysis;
pub mod cli;
pub mod config;
pub mod db;
pub mod endpoint;
pub mod ensemble;
pub mod model;
pub mod serving;
pub mod simulate;
pub mod store;
pub mod training;
