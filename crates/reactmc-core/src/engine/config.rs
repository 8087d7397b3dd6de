use crate::core::forcefield::nonbonded::PairPotential;
use crate::core::forcefield::params::Conditions;
use crate::core::utils::geometry::{Cell, VolumeMethod};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{parameter}': {reason}")]
    Invalid {
        parameter: &'static str,
        reason: String,
    },
}

fn invalid(parameter: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        parameter,
        reason: reason.into(),
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_dir() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

/// Molecules placed in the cell before the first step.
///
/// For molecular kinds `groups` copies are created and the first `active` of
/// them are switched on. For atomic kinds a single group with `groups` slots is
/// created, `active` of which hold particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct InsertSpec {
    pub molecule: String,
    pub groups: usize,
    pub active: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum EnergySpec {
    Nonbonded {
        potential: PairPotential,
        #[serde(default)]
        cutoff: Option<f64>,
    },
    Bonded,
    /// Pressure as an ideal-gas concentration in mol/l.
    Isobaric { pressure: f64 },
    ContainerOverlap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum MoveSpec {
    /// Displaces single atoms by the `dp`/`dprot` of their atom kind.
    AtomicTranslateRotate {
        molecule: String,
        #[serde(default = "default_dir")]
        dir: [f64; 3],
        #[serde(default = "default_weight")]
        weight: f64,
    },
    TranslateRotate {
        molecule: String,
        dp: f64,
        dprot: f64,
        #[serde(default = "default_dir")]
        dir: [f64; 3],
        #[serde(default = "default_weight")]
        weight: f64,
    },
    Volume {
        dv: f64,
        #[serde(default)]
        method: VolumeMethod,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    /// Displaces the charge of one particle.
    Charge {
        index: usize,
        dq: f64,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    /// Moves charge between two atoms of the same molecule.
    ChargeTransfer {
        molecule: String,
        dq: f64,
        #[serde(default)]
        charge_range: Option<[f64; 2]>,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    ConformationSwap {
        molecule: String,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    /// Reflects a molecule through a reference point.
    QuadrantJump {
        molecule: String,
        #[serde(default = "default_dir")]
        dir: [f64; 3],
        /// Slot range whose mass center is the reference; the cell origin otherwise.
        #[serde(default)]
        index: Option<[usize; 2]>,
        #[serde(default = "default_weight")]
        weight: f64,
    },
    Speciation {
        #[serde(default = "default_weight")]
        weight: f64,
    },
}

impl MoveSpec {
    pub fn weight(&self) -> f64 {
        match self {
            MoveSpec::AtomicTranslateRotate { weight, .. }
            | MoveSpec::TranslateRotate { weight, .. }
            | MoveSpec::Volume { weight, .. }
            | MoveSpec::Charge { weight, .. }
            | MoveSpec::ChargeTransfer { weight, .. }
            | MoveSpec::ConformationSwap { weight, .. }
            | MoveSpec::QuadrantJump { weight, .. }
            | MoveSpec::Speciation { weight } => *weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TemperingConfig {
    /// Sweeps between exchange attempts.
    pub interval: u64,
    /// Seed of the acceptance stream; must be identical on every replica.
    pub exchange_seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub topology_path: PathBuf,
    pub temperature: f64,
    pub relative_permittivity: f64,
    pub cell: Cell,
    pub insertions: Vec<InsertSpec>,
    pub energy: Vec<EnergySpec>,
    pub moves: Vec<MoveSpec>,
    pub seed: u64,
    pub sweeps: u64,
    pub tempering: Option<TemperingConfig>,
    /// Adds the ideal-gas term of speciation moves to the acceptance test.
    pub ideal_term: bool,
    /// Sweeps between invariant checks.
    pub invariant_interval: u64,
    /// Largest relative energy drift tolerated at a checkpoint.
    pub drift_tolerance: f64,
    /// Trials between adjustments of a move's displacement parameter.
    pub adjust_interval: u64,
}

impl SimulationConfig {
    pub fn conditions(&self) -> Conditions {
        Conditions {
            temperature: self.temperature,
            relative_permittivity: self.relative_permittivity,
        }
    }
}

#[derive(Default)]
pub struct SimulationConfigBuilder {
    topology_path: Option<PathBuf>,
    temperature: Option<f64>,
    relative_permittivity: Option<f64>,
    cell: Option<Cell>,
    insertions: Vec<InsertSpec>,
    energy: Vec<EnergySpec>,
    moves: Vec<MoveSpec>,
    seed: Option<u64>,
    sweeps: Option<u64>,
    tempering: Option<TemperingConfig>,
    ideal_term: Option<bool>,
    invariant_interval: Option<u64>,
    drift_tolerance: Option<f64>,
    adjust_interval: Option<u64>,
}

impl SimulationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topology_path(mut self, path: PathBuf) -> Self {
        self.topology_path = Some(path);
        self
    }
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
    pub fn relative_permittivity(mut self, epsilon_r: f64) -> Self {
        self.relative_permittivity = Some(epsilon_r);
        self
    }
    pub fn cell(mut self, cell: Cell) -> Self {
        self.cell = Some(cell);
        self
    }
    pub fn insert(mut self, insertion: InsertSpec) -> Self {
        self.insertions.push(insertion);
        self
    }
    pub fn energy(mut self, term: EnergySpec) -> Self {
        self.energy.push(term);
        self
    }
    pub fn add_move(mut self, spec: MoveSpec) -> Self {
        self.moves.push(spec);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn sweeps(mut self, sweeps: u64) -> Self {
        self.sweeps = Some(sweeps);
        self
    }
    pub fn tempering(mut self, tempering: TemperingConfig) -> Self {
        self.tempering = Some(tempering);
        self
    }
    pub fn ideal_term(mut self, enabled: bool) -> Self {
        self.ideal_term = Some(enabled);
        self
    }
    pub fn invariant_interval(mut self, sweeps: u64) -> Self {
        self.invariant_interval = Some(sweeps);
        self
    }
    pub fn drift_tolerance(mut self, tolerance: f64) -> Self {
        self.drift_tolerance = Some(tolerance);
        self
    }
    pub fn adjust_interval(mut self, trials: u64) -> Self {
        self.adjust_interval = Some(trials);
        self
    }

    pub fn build(self) -> Result<SimulationConfig, ConfigError> {
        let config = SimulationConfig {
            topology_path: self
                .topology_path
                .ok_or(ConfigError::MissingParameter("topology_path"))?,
            temperature: self.temperature.unwrap_or(298.15),
            relative_permittivity: self.relative_permittivity.unwrap_or(78.4),
            cell: self.cell.ok_or(ConfigError::MissingParameter("cell"))?,
            insertions: self.insertions,
            energy: self.energy,
            moves: self.moves,
            seed: self.seed.unwrap_or(0),
            sweeps: self.sweeps.ok_or(ConfigError::MissingParameter("sweeps"))?,
            tempering: self.tempering,
            ideal_term: self.ideal_term.unwrap_or(false),
            invariant_interval: self.invariant_interval.unwrap_or(100),
            drift_tolerance: self.drift_tolerance.unwrap_or(1e-6),
            adjust_interval: self.adjust_interval.unwrap_or(100),
        };
        validate(&config)?;
        Ok(config)
    }
}

fn positive(parameter: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(parameter, format!("must be positive and finite, got {}", value)))
    }
}

fn validate(config: &SimulationConfig) -> Result<(), ConfigError> {
    positive("temperature", config.temperature)?;
    positive("relative_permittivity", config.relative_permittivity)?;
    positive("cell", config.cell.volume())?;
    positive("drift_tolerance", config.drift_tolerance)?;
    if config.moves.is_empty() {
        return Err(invalid("moves", "at least one move is required"));
    }
    for spec in &config.moves {
        positive("moves.weight", spec.weight())?;
    }
    for insertion in &config.insertions {
        if insertion.active > insertion.groups {
            return Err(invalid(
                "insertions",
                format!(
                    "'{}' activates {} of only {} slots",
                    insertion.molecule, insertion.active, insertion.groups
                ),
            ));
        }
    }
    if config.invariant_interval == 0 {
        return Err(invalid("invariant_interval", "must be at least one sweep"));
    }
    if config.adjust_interval == 0 {
        return Err(invalid("adjust_interval", "must be at least one trial"));
    }
    if let Some(tempering) = &config.tempering {
        if tempering.interval == 0 {
            return Err(invalid("tempering.interval", "must be at least one sweep"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> SimulationConfigBuilder {
        SimulationConfigBuilder::new()
            .topology_path(PathBuf::from("topology.toml"))
            .cell(Cell::cube(10.0))
            .sweeps(10)
            .add_move(MoveSpec::Speciation { weight: 1.0 })
    }

    #[test]
    fn build_applies_defaults() {
        let config = minimal().build().unwrap();
        assert_eq!(config.temperature, 298.15);
        assert_eq!(config.relative_permittivity, 78.4);
        assert!(!config.ideal_term);
        assert_eq!(config.invariant_interval, 100);
        assert!(config.tempering.is_none());
    }

    #[test]
    fn missing_topology_is_reported() {
        let result = SimulationConfigBuilder::new()
            .cell(Cell::cube(10.0))
            .sweeps(1)
            .build();
        assert_eq!(result, Err(ConfigError::MissingParameter("topology_path")));
    }

    #[test]
    fn non_positive_temperature_is_invalid() {
        let result = minimal().temperature(0.0).build();
        assert!(matches!(result, Err(ConfigError::Invalid { parameter: "temperature", .. })));
    }

    #[test]
    fn zero_move_weight_is_invalid() {
        let result = minimal()
            .add_move(MoveSpec::ConformationSwap {
                molecule: "m".to_string(),
                weight: 0.0,
            })
            .build();
        assert!(matches!(result, Err(ConfigError::Invalid { parameter: "moves.weight", .. })));
    }

    #[test]
    fn empty_move_list_is_invalid() {
        let result = SimulationConfigBuilder::new()
            .topology_path(PathBuf::from("t.toml"))
            .cell(Cell::cube(10.0))
            .sweeps(1)
            .build();
        assert!(matches!(result, Err(ConfigError::Invalid { parameter: "moves", .. })));
    }

    #[test]
    fn over_activated_insertion_is_invalid() {
        let result = minimal()
            .insert(InsertSpec {
                molecule: "salt".to_string(),
                groups: 2,
                active: 3,
            })
            .build();
        assert!(matches!(result, Err(ConfigError::Invalid { parameter: "insertions", .. })));
    }

    #[test]
    fn move_specs_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Moves {
            moves: Vec<MoveSpec>,
        }
        let content = r#"
            [[moves]]
            type = "translate-rotate"
            molecule = "protein"
            dp = 2.0
            dprot = 0.5

            [[moves]]
            type = "volume"
            dv = 0.1
            method = "isochoric"
            weight = 0.5
        "#;
        let parsed: Moves = toml::from_str(content).unwrap();
        assert_eq!(parsed.moves.len(), 2);
        assert_eq!(parsed.moves[0].weight(), 1.0);
        assert!(matches!(
            parsed.moves[1],
            MoveSpec::Volume {
                method: VolumeMethod::Isochoric,
                ..
            }
        ));
    }
}
