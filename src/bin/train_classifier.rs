//! Risk Classifier Training
//!
//! Fits the four-level flood risk classifier from sensor history and saves
//! it to the models directory (flood_model.json, or flood_model_<date>.json
//! with --today).
//!
//! Usage:
//!   cargo run --bin train_classifier                       # All history in sensor_data
//!   cargo run --bin train_classifier -- --today            # Today's rows, dated artifact
//!   cargo run --bin train_classifier -- --synthetic 5000   # Simulated readings, no database
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use flood_alert_service::cli;
use flood_alert_service::store::ModelKind;

fn main() {
    cli::main_for(ModelKind::Classifier, "Risk Classifier Training");
}
