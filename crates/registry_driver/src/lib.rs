//! # Listener Registry Driver
//!
//! Command-line driver that exercises `listener_registry` at scale: a
//! fan-out over tens of thousands of normal and deferred listeners, and
//! repeated add/remove churn mixing strong and weak registrations.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run both workloads with default configuration
//! registry-driver
//!
//! # Specify custom configuration
//! registry-driver --config bench.toml
//!
//! # Override workload sizes
//! registry-driver --listeners 100000 --deferred 0 --workload fanout
//!
//! # JSON logging
//! registry-driver --json-logs
//! ```
//!
//! ## Configuration
//!
//! The driver loads configuration from a TOML file (default: `registry.toml`).
//! If the file doesn't exist, a default configuration will be created.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod workload;

use app::Application;
use cli::CliArgs;
use config::DriverConfig;
use tracing::error;

pub use config::{LoggingSettings, WorkloadSettings};
pub use error::DriverError;
pub use workload::{ChurnReport, FanoutReport, WorkloadKind};

/// Parses arguments, sets up logging and runs the selected workloads.
pub fn init() -> Result<(), DriverError> {
    let args = CliArgs::parse();

    let mut config = DriverConfig::load_from_file(&args.config_path)?;
    config.apply_overrides(&args);

    logging::setup_logging(&config.logging, args.json_logs)?;

    let app = Application::new(config, args.workload).inspect_err(|e| {
        error!("❌ Failed to start driver: {e}");
    })?;

    for report in app.run()? {
        println!("{report}");
    }
    Ok(())
}
