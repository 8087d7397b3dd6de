use crate::cli::Overrides;
use crate::error::{CliError, Result};
use reactmc::core::utils::geometry::Cell;
use reactmc::engine::config::{self as core_config, EnergySpec, InsertSpec, MoveSpec, SimulationConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone, Copy)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialChecksConfig {
    invariant_interval: Option<u64>,
    drift_tolerance: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone, Copy)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialTemperingConfig {
    interval: Option<u64>,
    exchange_seed: Option<u64>,
}

/// Simulation settings as written in a TOML file, before CLI overrides.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialSimulationConfig {
    /// Resolved against the directory of the config file when relative.
    topology: Option<PathBuf>,
    temperature: Option<f64>,
    relative_permittivity: Option<f64>,
    cell: Option<Cell>,
    seed: Option<u64>,
    sweeps: Option<u64>,
    ideal_term: Option<bool>,
    adjust_interval: Option<u64>,
    checks: Option<PartialChecksConfig>,
    tempering: Option<PartialTemperingConfig>,
    #[serde(default)]
    insert: Vec<InsertSpec>,
    #[serde(default)]
    energy: Vec<EnergySpec>,
    #[serde(default)]
    moves: Vec<MoveSpec>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl PartialSimulationConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let mut partial: Self = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        partial.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(partial)
    }

    pub fn merge_with_cli(mut self, overrides: &Overrides, seed: Option<u64>) -> Result<SimulationConfig> {
        self.apply_set_values(&overrides.set_values)?;

        let topology = self
            .topology
            .ok_or_else(|| CliError::Config("`topology` is required.".to_string()))?;
        let topology_path = if topology.is_relative() {
            self.base_dir.join(topology)
        } else {
            topology
        };
        let cell = self
            .cell
            .ok_or_else(|| CliError::Config("`cell` section is required.".to_string()))?;
        let sweeps = overrides
            .sweeps
            .or(self.sweeps)
            .ok_or_else(|| CliError::Config("`sweeps` is required either in the config file or via --sweeps.".to_string()))?;

        let mut builder = core_config::SimulationConfigBuilder::new()
            .topology_path(topology_path)
            .cell(cell)
            .sweeps(sweeps);
        if let Some(temperature) = self.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(epsilon_r) = self.relative_permittivity {
            builder = builder.relative_permittivity(epsilon_r);
        }
        if let Some(seed) = seed.or(self.seed) {
            builder = builder.seed(seed);
        }
        if let Some(enabled) = self.ideal_term {
            builder = builder.ideal_term(enabled);
        }
        if let Some(trials) = self.adjust_interval {
            builder = builder.adjust_interval(trials);
        }
        if let Some(checks) = self.checks {
            if let Some(sweeps) = checks.invariant_interval {
                builder = builder.invariant_interval(sweeps);
            }
            if let Some(tolerance) = checks.drift_tolerance {
                builder = builder.drift_tolerance(tolerance);
            }
        }
        if let Some(tempering) = self.tempering {
            builder = builder.tempering(Self::merge_tempering(tempering)?);
        }
        for insertion in self.insert {
            builder = builder.insert(insertion);
        }
        for term in self.energy {
            builder = builder.energy(term);
        }
        for spec in self.moves {
            builder = builder.add_move(spec);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn merge_tempering(partial: PartialTemperingConfig) -> Result<core_config::TemperingConfig> {
        Ok(core_config::TemperingConfig {
            interval: partial.interval.unwrap_or(1),
            exchange_seed: partial.exchange_seed.ok_or_else(|| {
                CliError::Config("`tempering` requires `exchange-seed`, identical for every replica".to_string())
            })?,
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value) = kv_pair.split_once('=').ok_or_else(|| {
                CliError::Config(format!("Invalid --set format: '{}'. Expected KEY=VALUE.", kv_pair))
            })?;

            match key {
                "topology" => self.topology = Some(PathBuf::from(value)),
                "temperature" => self.temperature = Some(parse(key, value)?),
                "relative-permittivity" => self.relative_permittivity = Some(parse(key, value)?),
                "seed" => self.seed = Some(parse(key, value)?),
                "sweeps" => self.sweeps = Some(parse(key, value)?),
                "ideal-term" => self.ideal_term = Some(parse(key, value)?),
                "adjust-interval" => self.adjust_interval = Some(parse(key, value)?),
                "checks.invariant-interval" => {
                    self.checks.get_or_insert_with(Default::default).invariant_interval = Some(parse(key, value)?)
                }
                "checks.drift-tolerance" => {
                    self.checks.get_or_insert_with(Default::default).drift_tolerance = Some(parse(key, value)?)
                }
                "tempering.interval" => {
                    self.tempering.get_or_insert_with(Default::default).interval = Some(parse(key, value)?)
                }
                "tempering.exchange-seed" => {
                    self.tempering.get_or_insert_with(Default::default).exchange_seed = Some(parse(key, value)?)
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use once_cell::sync::Lazy;
    use reactmc::core::forcefield::nonbonded::PairPotential;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    const BASE: &str = r#"
        topology = "topology.toml"
        temperature = 300.0
        sweeps = 100
        seed = 4

        [cell]
        type = "cuboid"
        lengths = [40.0, 40.0, 40.0]

        [checks]
        drift-tolerance = 1e-8

        [[insert]]
        molecule = "salt"
        groups = 50
        active = 10

        [[energy]]
        type = "nonbonded"
        potential = "lennard-jones-coulomb"
        cutoff = 15.0

        [[moves]]
        type = "atomic-translate-rotate"
        molecule = "salt"
        weight = 10.0

        [[moves]]
        type = "speciation"
    "#;

    fn write_config_file(name: &str, content: &str) -> PathBuf {
        let file_path = TEST_DIR.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn run_overrides(args: &[&str]) -> (Overrides, Option<u64>) {
        let mut argv = vec!["reactmc", "run", "-c", "unused.toml"];
        argv.extend_from_slice(args);
        match Cli::parse_from(argv).command {
            Commands::Run(run) => (run.overrides, run.seed),
            Commands::Temper(_) => panic!("Expected 'run' subcommand"),
        }
    }

    #[test]
    fn load_from_file_and_merge_with_defaults() {
        let path = write_config_file("defaults.toml", BASE);
        let (overrides, seed) = run_overrides(&[]);
        let config = PartialSimulationConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&overrides, seed)
            .unwrap();

        assert_eq!(config.topology_path, TEST_DIR.path().join("topology.toml"));
        assert_eq!(config.temperature, 300.0);
        assert_eq!(config.relative_permittivity, 78.4);
        assert_eq!(config.sweeps, 100);
        assert_eq!(config.seed, 4);
        assert_eq!(config.drift_tolerance, 1e-8);
        assert_eq!(config.invariant_interval, 100);
        assert_eq!(config.insertions.len(), 1);
        assert_eq!(
            config.energy[0],
            EnergySpec::Nonbonded {
                potential: PairPotential::LennardJonesCoulomb,
                cutoff: Some(15.0),
            }
        );
        assert_eq!(config.moves.len(), 2);
        assert!(config.tempering.is_none());
    }

    #[test]
    fn cli_args_override_file_values() {
        let path = write_config_file("override.toml", BASE);
        let (overrides, seed) = run_overrides(&["--sweeps", "7", "--seed", "99"]);
        let config = PartialSimulationConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&overrides, seed)
            .unwrap();
        assert_eq!(config.sweeps, 7);
        assert_eq!(config.seed, 99);
    }

    #[test]
    fn set_values_override_file_and_defaults() {
        let path = write_config_file("set.toml", BASE);
        let (overrides, seed) = run_overrides(&[
            "-S",
            "temperature=310",
            "-S",
            "checks.invariant-interval=5",
            "-S",
            "tempering.exchange-seed=11",
        ]);
        let config = PartialSimulationConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&overrides, seed)
            .unwrap();
        assert_eq!(config.temperature, 310.0);
        assert_eq!(config.invariant_interval, 5);
        assert_eq!(
            config.tempering,
            Some(core_config::TemperingConfig {
                interval: 1,
                exchange_seed: 11,
            })
        );
    }

    #[test]
    fn unsupported_set_key_is_rejected() {
        let path = write_config_file("bad_key.toml", BASE);
        let (overrides, seed) = run_overrides(&["-S", "moves=none"]);
        let result = PartialSimulationConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&overrides, seed);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("moves")));
    }

    #[test]
    fn missing_cell_returns_error() {
        let path = write_config_file(
            "no_cell.toml",
            r#"
            topology = "t.toml"
            sweeps = 1
            [[moves]]
            type = "speciation"
            "#,
        );
        let (overrides, seed) = run_overrides(&[]);
        let result = PartialSimulationConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&overrides, seed);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("cell")));
    }

    #[test]
    fn unknown_fields_are_parse_errors() {
        let path = write_config_file("unknown.toml", "topology = \"t.toml\"\ntemprature = 300.0\n");
        assert!(matches!(
            PartialSimulationConfig::from_file(&path),
            Err(CliError::FileParsing { .. })
        ));
    }

    #[test]
    fn tempering_without_seed_is_rejected() {
        let content = format!("{}\n[tempering]\ninterval = 2\n", BASE);
        let path = write_config_file("tempering.toml", &content);
        let (overrides, seed) = run_overrides(&[]);
        let result = PartialSimulationConfig::from_file(&path)
            .unwrap()
            .merge_with_cli(&overrides, seed);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("exchange-seed")));
    }
}
