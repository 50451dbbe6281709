//! Command-line interface handling for the registry driver.
//!
//! Flags given here override the matching settings of the configuration file.

use crate::workload::WorkloadKind;
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

const DEFAULT_CONFIG_PATH: &str = "registry.toml";

/// Command line arguments parsed from user input.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Optional override for the number of normal listeners
    pub listeners: Option<usize>,
    /// Optional override for the number of deferred listeners
    pub deferred: Option<usize>,
    /// Optional override for the number of churn rounds
    pub rounds: Option<usize>,
    /// Which workloads to run
    pub workload: WorkloadKind,
}

impl CliArgs {
    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    /// Parses an explicit argument list.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&Self::command().try_get_matches_from(args)?))
    }

    fn command() -> Command {
        Command::new("Listener Registry Driver")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Drives a listener registry through dispatch and churn workloads")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value(DEFAULT_CONFIG_PATH),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("listeners")
                    .short('n')
                    .long("listeners")
                    .value_name("COUNT")
                    .help("Number of normal listeners to register")
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                Arg::new("deferred")
                    .short('d')
                    .long("deferred")
                    .value_name("COUNT")
                    .help("Number of deferred listeners to register")
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                Arg::new("rounds")
                    .short('r')
                    .long("rounds")
                    .value_name("COUNT")
                    .help("Number of add/remove churn rounds")
                    .value_parser(clap::value_parser!(usize)),
            )
            .arg(
                Arg::new("workload")
                    .short('w')
                    .long("workload")
                    .value_name("NAME")
                    .help("Workload to run (fanout, churn, all)")
                    .value_parser(["fanout", "churn", "all"])
                    .default_value("all"),
            )
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        let workload = match matches.get_one::<String>("workload").map(String::as_str) {
            Some("fanout") => WorkloadKind::Fanout,
            Some("churn") => WorkloadKind::Churn,
            _ => WorkloadKind::All,
        };

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_CONFIG_PATH),
            ),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            listeners: matches.get_one::<usize>("listeners").copied(),
            deferred: matches.get_one::<usize>("deferred").copied(),
            rounds: matches.get_one::<usize>("rounds").copied(),
            workload,
        }
    }
}
