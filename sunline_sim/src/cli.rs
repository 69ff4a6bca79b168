// sunline_sim/src/cli.rs

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Closed-loop simulator for the switching sunline filters.
///
/// Runs one scenario file against a spinning spacecraft with a coarse sun
/// sensor array and reports how well the estimator tracked the sun.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(
        short,
        long,
        default_value = "assets/scenarios/00_spinning_eight_css.toml"
    )]
    pub scenario: PathBuf,

    /// Which estimator to drive.
    #[arg(short, long, value_enum, default_value_t = EstimatorKind::Sekf)]
    pub estimator: EstimatorKind,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Write the run summary as TOML to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// List the scenarios found next to `--scenario` and exit.
    #[arg(long, default_value_t = false)]
    pub list: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EstimatorKind {
    /// Switching extended/classical Kalman filter.
    Sekf,
    /// Unscented Kalman filter.
    Ukf,
}

/// Initializes the global logger. An unknown level falls back to `info`.
pub fn init_logger(log_level: &str) -> Result<(), log::SetLoggerError> {
    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .format_target(false)
        .try_init()
}
