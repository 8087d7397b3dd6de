use super::{print_summary, write_result};
use crate::cli::RunArgs;
use crate::config::PartialSimulationConfig;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use reactmc::{engine::progress::ProgressReporter, workflows};
use tracing::info;

pub fn run(args: RunArgs) -> Result<()> {
    let partial_config = PartialSimulationConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args.overrides, args.seed)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting Monte Carlo simulation ({} sweeps)...", config.sweeps);
    let result = workflows::simulate::run(&config, &reporter)?;
    print_summary(&result);

    if let Some(output) = &args.output {
        write_result(&result, output)?;
        println!("✓ Report written to: {}", output.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Overrides;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn run_writes_a_toml_report() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("topology.toml"),
            r#"
            [[atoms]]
            name = "X"
            dp = 2.0

            [[molecules]]
            name = "gas"
            atoms = ["X"]
            atomic = true
            "#,
        )
        .unwrap();
        let config_path = dir.path().join("sim.toml");
        fs::write(
            &config_path,
            r#"
            topology = "topology.toml"
            sweeps = 5

            [cell]
            type = "cuboid"
            lengths = [20.0, 20.0, 20.0]

            [[insert]]
            molecule = "gas"
            groups = 4
            active = 4

            [[moves]]
            type = "atomic-translate-rotate"
            molecule = "gas"
            "#,
        )
        .unwrap();
        let output = dir.path().join("report.toml");

        run(RunArgs {
            config: config_path,
            output: Some(output.clone()),
            seed: Some(3),
            overrides: Overrides::default(),
        })
        .unwrap();

        let content = fs::read_to_string(output).unwrap();
        let parsed: toml::Table = toml::from_str(&content).unwrap();
        assert_eq!(parsed["report"]["sweeps"].as_integer(), Some(5));
        assert!(parsed["snapshot"]["particles"].as_array().is_some());
    }
}
