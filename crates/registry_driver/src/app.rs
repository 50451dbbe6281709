//! Main application logic.
//!
//! `Application` owns the merged configuration and runs the selected
//! workloads in order, printing each report as JSON.

use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::logging::display_banner;
use crate::workload::{self, WorkloadKind};
use serde::Serialize;
use tracing::info;

pub struct Application {
    config: DriverConfig,
    workload: WorkloadKind,
}

impl Application {
    /// Validates `config`, which already carries any CLI overrides.
    pub fn new(config: DriverConfig, workload: WorkloadKind) -> Result<Self, DriverError> {
        config.validate()?;
        info!("✅ Configuration loaded and validated successfully");

        Ok(Self { config, workload })
    }

    /// Configuration the workloads run with
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Runs the selected workloads, returning their JSON reports.
    pub fn run(&self) -> Result<Vec<String>, DriverError> {
        display_banner();
        self.log_configuration_summary();

        let mut reports = Vec::new();
        if self.workload.includes_fanout() {
            let report = workload::fanout(&self.config.workload, &self.config.registry)?;
            reports.push(render("fanout", &report)?);
        }
        if self.workload.includes_churn() {
            let report = workload::churn(&self.config.workload, &self.config.registry)?;
            reports.push(render("churn", &report)?);
        }

        info!("🏁 {} workload(s) completed", reports.len());
        Ok(reports)
    }

    fn log_configuration_summary(&self) {
        let workload = &self.config.workload;
        info!("📋 Configuration Summary:");
        info!("  - Compaction ratio: {}", self.config.registry.compaction_ratio);
        info!(
            "  - Listeners: {} normal / {} deferred",
            workload.normal_listeners, workload.deferred_listeners
        );
        info!(
            "  - Churn: {} rounds, {:.0}% weak",
            workload.churn_rounds,
            workload.weak_fraction * 100.0
        );
    }
}

#[derive(Serialize)]
struct Rendered<'a, T: Serialize> {
    workload: &'a str,
    report: &'a T,
}

fn render<T: Serialize>(name: &str, report: &T) -> Result<String, DriverError> {
    Ok(serde_json::to_string_pretty(&Rendered {
        workload: name,
        report,
    })?)
}
