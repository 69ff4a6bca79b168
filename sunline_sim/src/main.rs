// sunline_sim/src/main.rs

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use sunline_sim::cli::{init_logger, Cli};
use sunline_sim::config::{list_scenarios, load_scenario};
use sunline_sim::runner::{run_scenario, write_report};
use sunline_sim::SimError;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logger(&cli.log_level) {
        eprintln!("failed to initialize logger: {e}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), SimError> {
    if cli.list {
        let dir = cli.scenario.parent().unwrap_or(Path::new("."));
        for path in list_scenarios(dir) {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = load_scenario(&cli.scenario)?;
    let summary = run_scenario(&config, cli.estimator)?;

    println!(
        "{}: {} cycles, final heading error {:.3} deg (mean {:.3}, max {:.3}), {} frame switches",
        summary.estimator,
        summary.cycles,
        summary.final_heading_error_deg,
        summary.mean_heading_error_deg,
        summary.max_heading_error_deg,
        summary.frame_switches
    );

    if let Some(path) = &cli.report {
        write_report(&summary, path)?;
    }
    info!("Done.");
    Ok(())
}
