use super::simulate::{self, SimulationResult};
use crate::core::models::topology::Topology;
use crate::engine::config::{ConfigError, SimulationConfig, TemperingConfig};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::replica::{ChannelLink, ReplicaLink};
use crate::engine::simulation::Simulation;
use std::thread;
use tracing::{error, info, instrument};

/// Runs one simulation per configuration on its own thread, exchanging
/// configurations between neighbouring replicas.
///
/// Results are returned in replica order. Only the first replica reports
/// sampling progress.
#[instrument(skip_all, name = "temper_workflow", fields(replicas = configs.len()))]
pub fn run(configs: &[SimulationConfig], reporter: &ProgressReporter) -> Result<Vec<SimulationResult>, EngineError> {
    let (sweeps, tempering) = shared_settings(configs)?;

    reporter.report(Progress::PhaseStart { name: "Preparation" });
    let links = ChannelLink::mesh(configs.len());
    let mut simulations: Vec<Simulation> = Vec::with_capacity(configs.len());
    for (config, link) in configs.iter().zip(links) {
        let topology = Topology::load(&config.topology_path)?;
        let boxed: Box<dyn ReplicaLink> = Box::new(link);
        simulations.push(simulate::build_replica(config, topology, Some(boxed))?);
    }
    reporter.report(Progress::PhaseFinish);
    reporter.report(Progress::Message(format!(
        "{} replicas linked, exchanging every {} sweeps",
        simulations.len(),
        tempering.interval
    )));
    info!(
        replicas = simulations.len(),
        sweeps,
        interval = tempering.interval,
        "Starting replica exchange."
    );

    let silent = ProgressReporter::new();
    let outcomes: Vec<Result<SimulationResult, EngineError>> = thread::scope(|scope| {
        let handles: Vec<_> = simulations
            .into_iter()
            .enumerate()
            .map(|(rank, mut simulation)| {
                let reporter = if rank == 0 { reporter } else { &silent };
                scope.spawn(move || simulate::execute(&mut simulation, sweeps, reporter))
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(EngineError::Internal(format!("replica {} panicked", rank))))
            })
            .collect()
    });

    collect(outcomes)
}

fn shared_settings(configs: &[SimulationConfig]) -> Result<(u64, TemperingConfig), ConfigError> {
    let first = configs.first().ok_or(ConfigError::Invalid {
        parameter: "replicas",
        reason: "at least one replica configuration is required".to_string(),
    })?;
    let tempering = first.tempering.ok_or(ConfigError::MissingParameter("tempering"))?;
    for (rank, config) in configs.iter().enumerate().skip(1) {
        if config.sweeps != first.sweeps {
            return Err(ConfigError::Invalid {
                parameter: "sweeps",
                reason: format!(
                    "replica {} runs {} sweeps, replica 0 runs {}",
                    rank, config.sweeps, first.sweeps
                ),
            });
        }
        if config.tempering != Some(tempering) {
            return Err(ConfigError::Invalid {
                parameter: "tempering",
                reason: format!("replica {} does not share the exchange interval and seed of replica 0", rank),
            });
        }
    }
    Ok((first.sweeps, tempering))
}

/// Keeps results in replica order; a replica's own failure wins over the
/// broken links it leaves behind on its partners.
fn collect(outcomes: Vec<Result<SimulationResult, EngineError>>) -> Result<Vec<SimulationResult>, EngineError> {
    let mut results = Vec::with_capacity(outcomes.len());
    let mut failure: Option<EngineError> = None;
    for (rank, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                error!(rank, error = %e, "Replica failed.");
                let replace = match &failure {
                    None => true,
                    Some(EngineError::Exchange(_)) => !matches!(e, EngineError::Exchange(_)),
                    Some(_) => false,
                };
                if replace {
                    failure = Some(e);
                }
            }
        }
    }
    match failure {
        Some(e) => Err(e),
        None => Ok(results),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utils::geometry::{Cell, VolumeMethod};
    use crate::engine::config::{EnergySpec, InsertSpec, MoveSpec, SimulationConfigBuilder};
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;

    const TOPOLOGY: &str = r#"
        [[atoms]]
        name = "X"
        dp = 3.0

        [[molecules]]
        name = "gas"
        atoms = ["X"]
        atomic = true
    "#;

    fn config(path: &Path, temperature: f64, seed: u64, sweeps: u64) -> SimulationConfig {
        SimulationConfigBuilder::new()
            .topology_path(path.to_path_buf())
            .temperature(temperature)
            .cell(Cell::cube(25.0))
            .insert(InsertSpec {
                molecule: "gas".to_string(),
                groups: 3,
                active: 3,
            })
            .energy(EnergySpec::Isobaric { pressure: 0.02 })
            .add_move(MoveSpec::AtomicTranslateRotate {
                molecule: "gas".to_string(),
                dir: [1.0; 3],
                weight: 3.0,
            })
            .add_move(MoveSpec::Volume {
                dv: 0.1,
                method: VolumeMethod::Isotropic,
                weight: 1.0,
            })
            .seed(seed)
            .sweeps(sweeps)
            .tempering(TemperingConfig {
                interval: 2,
                exchange_seed: 99,
            })
            .drift_tolerance(1e-8)
            .build()
            .unwrap()
    }

    fn topology_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TOPOLOGY.as_bytes()).unwrap();
        file
    }

    #[test]
    fn replicas_exchange_in_lock_step() {
        let file = topology_file();
        let configs: Vec<SimulationConfig> = (0..3)
            .map(|i| config(file.path(), 298.15, 10 + i, 40))
            .collect();
        let results = run(&configs, &ProgressReporter::new()).unwrap();
        assert_eq!(results.len(), 3);
        for (rank, result) in results.iter().enumerate() {
            assert_eq!(result.report.rank, Some(rank));
            let exchange = result
                .report
                .moves
                .iter()
                .find(|m| m.name == "parallel-tempering")
                .unwrap();
            assert_eq!(exchange.trials, 20);
            // Identical Hamiltonians accept every exchange that has a partner.
            assert_eq!(exchange.accepted + exchange.skipped, exchange.trials);
            assert!(result.report.drift.abs() < 1e-8);
        }
    }

    #[test]
    fn mismatched_sweeps_are_rejected() {
        let file = topology_file();
        let configs = vec![config(file.path(), 298.15, 1, 10), config(file.path(), 298.15, 2, 12)];
        assert!(matches!(
            run(&configs, &ProgressReporter::new()),
            Err(EngineError::Config {
                source: ConfigError::Invalid { parameter: "sweeps", .. }
            })
        ));
    }

    #[test]
    fn mismatched_exchange_seeds_are_rejected() {
        let file = topology_file();
        let mut second = config(file.path(), 298.15, 2, 10);
        second.tempering = Some(TemperingConfig {
            interval: 2,
            exchange_seed: 100,
        });
        let configs = vec![config(file.path(), 298.15, 1, 10), second];
        assert!(matches!(
            run(&configs, &ProgressReporter::new()),
            Err(EngineError::Config {
                source: ConfigError::Invalid { parameter: "tempering", .. }
            })
        ));
    }

    #[test]
    fn empty_replica_list_is_rejected() {
        assert!(matches!(
            run(&[], &ProgressReporter::new()),
            Err(EngineError::Config {
                source: ConfigError::Invalid { parameter: "replicas", .. }
            })
        ));
    }

    #[test]
    fn own_failures_win_over_broken_links() {
        let outcomes = vec![
            Err(EngineError::Exchange("partner hung up".to_string())),
            Err(EngineError::invariant(5, None, "drift")),
        ];
        assert!(matches!(collect(outcomes), Err(EngineError::Invariant { step: 5, .. })));
    }
}
