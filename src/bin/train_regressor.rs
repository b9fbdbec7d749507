//! Countdown Regressor Training
//!
//! Fits the time-to-danger regressor (seconds until upstream sensor A
//! reaches danger) and saves it to the models directory (time_model.json,
//! or time_model_<date>.json with --today).
//!
//! Usage:
//!   cargo run --bin train_regressor                        # All history in sensor_data
//!   cargo run --bin train_regressor -- --today             # Today's rows, dated artifact
//!   cargo run --bin train_regressor -- --synthetic 5000    # Simulated readings, no database
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use flood_alert_service::cli;
use flood_alert_service::store::ModelKind;

fn main() {
    cli::main_for(ModelKind::Regressor, "Countdown Regressor Training");
}
