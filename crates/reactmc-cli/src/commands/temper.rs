use super::{print_summary, write_result};
use crate::cli::TemperArgs;
use crate::config::PartialSimulationConfig;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use reactmc::{engine::config::SimulationConfig, engine::progress::ProgressReporter, workflows};
use std::path::{Path, PathBuf};
use tracing::info;

pub fn run(args: TemperArgs) -> Result<()> {
    let configs = args
        .configs
        .iter()
        .map(|path| PartialSimulationConfig::from_file(path)?.merge_with_cli(&args.overrides, None))
        .collect::<Result<Vec<SimulationConfig>>>()?;
    info!(replicas = configs.len(), "Loaded replica configurations.");

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting parallel tempering with {} replicas...", configs.len());
    let results = workflows::temper::run(&configs, &reporter)?;

    for (rank, result) in results.iter().enumerate() {
        print_summary(result);
        if let Some(prefix) = &args.output {
            let path = replica_output_path(prefix, rank);
            write_result(result, &path)?;
            println!("✓ Replica {} report written to: {}", rank, path.display());
        }
    }
    Ok(())
}

/// `<prefix>-<rank>.toml`, next to the prefix.
fn replica_output_path(prefix: &Path, rank: usize) -> PathBuf {
    let stem = prefix
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "replica".to_string());
    prefix.with_file_name(format!("{}-{}.toml", stem, rank))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_paths_append_rank_to_prefix() {
        assert_eq!(
            replica_output_path(Path::new("out/replica"), 2),
            PathBuf::from("out/replica-2.toml")
        );
        assert_eq!(replica_output_path(Path::new("t"), 0), PathBuf::from("t-0.toml"));
    }
}
