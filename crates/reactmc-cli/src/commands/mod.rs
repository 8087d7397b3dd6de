pub mod run;
pub mod temper;

use crate::error::{CliError, Result};
use reactmc::workflows::simulate::SimulationResult;
use std::path::Path;
use tracing::info;

/// Writes the report and final configuration of one simulation as TOML.
pub(crate) fn write_result(result: &SimulationResult, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(result).map_err(|e| CliError::Report {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    std::fs::write(path, content).map_err(|e| CliError::Report {
        path: path.to_path_buf(),
        source: e.into(),
    })?;
    info!(path = %path.display(), "Report written.");
    Ok(())
}

pub(crate) fn print_summary(result: &SimulationResult) {
    let report = &result.report;
    match report.rank {
        Some(rank) => println!("Replica {}:", rank),
        None => println!("Simulation summary:"),
    }
    println!(
        "  {} sweeps, {} steps, energy {:.4} kT (initial {:.4} kT, drift {:.2e})",
        report.sweeps, report.steps, report.energy, report.initial_energy, report.drift
    );
    for species in &report.species {
        println!("  {:<16} {:>8} active", species.molecule, species.active);
    }
    for mv in &report.moves {
        println!(
            "  {:<24} {:>10} trials, acceptance {:.3}",
            mv.name, mv.trials, mv.acceptance
        );
    }
}
