use crate::core::forcefield::bonded::Bonded;
use crate::core::forcefield::external::{ContainerOverlap, Isobaric};
use crate::core::forcefield::nonbonded::Nonbonded;
use crate::core::forcefield::params::SystemTables;
use crate::core::forcefield::term::Hamiltonian;
use crate::core::models::space::{ConfigurationSnapshot, Space};
use crate::core::models::topology::Topology;
use crate::engine::config::{ConfigError, EnergySpec, MoveSpec, SimulationConfig};
use crate::engine::error::EngineError;
use crate::engine::moves::Move;
use crate::engine::moves::charge::{ChargeMove, ChargeTransfer};
use crate::engine::moves::conformation::ConformationSwap;
use crate::engine::moves::quadrant::QuadrantJump;
use crate::engine::moves::speciation::SpeciationMove;
use crate::engine::moves::tempering::ParallelTempering;
use crate::engine::moves::translate::{AtomicTranslateRotate, TranslateRotate};
use crate::engine::moves::volume::VolumeMove;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::propagator::Propagator;
use crate::engine::replica::ReplicaLink;
use crate::engine::simulation::{Simulation, SimulationReport};
use crate::engine::utils::sampling::Random;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub report: SimulationReport,
    pub snapshot: ConfigurationSnapshot,
}

#[instrument(skip_all, name = "simulate_workflow")]
pub fn run(config: &SimulationConfig, reporter: &ProgressReporter) -> Result<SimulationResult, EngineError> {
    reporter.report(Progress::PhaseStart { name: "Preparation" });
    info!(path = %config.topology_path.display(), "Loading topology.");
    let topology = Topology::load(&config.topology_path)?;
    let mut simulation = build(config, topology)?;
    reporter.report(Progress::PhaseFinish);

    execute(&mut simulation, config.sweeps, reporter)
}

/// Assembles a ready-to-run simulation from a configuration and a loaded topology.
pub fn build(config: &SimulationConfig, topology: Topology) -> Result<Simulation, EngineError> {
    build_replica(config, topology, None)
}

/// Like [`build`], optionally joining a set of replicas through `link`.
pub fn build_replica(
    config: &SimulationConfig,
    topology: Topology,
    link: Option<Box<dyn ReplicaLink>>,
) -> Result<Simulation, EngineError> {
    let mut tables = SystemTables::new(topology, config.conditions());
    let mut rng = Random::seed_from_u64(config.seed);

    let space = build_space(config, &tables, &mut rng)?;
    let hamiltonian = build_hamiltonian(config, &mut tables);
    let propagator = build_propagator(config, &tables, &space)?;
    info!(
        particles = space.particles.len(),
        groups = space.groups.len(),
        terms = hamiltonian.len(),
        moves = propagator.len(),
        "System assembled."
    );

    let mut simulation = Simulation::new(tables, space, hamiltonian, propagator, rng.r#gen())?
        .with_ideal_term(config.ideal_term)
        .with_checks(config.invariant_interval, config.drift_tolerance);

    if let Some(link) = link {
        let tempering = config
            .tempering
            .ok_or(ConfigError::MissingParameter("tempering"))?;
        simulation = simulation.with_exchanger(
            ParallelTempering::new(link, tempering.exchange_seed),
            tempering.interval,
        );
    }
    Ok(simulation)
}

/// Runs `sweeps` sweeps and collects the final report and configuration.
pub fn execute(
    simulation: &mut Simulation,
    sweeps: u64,
    reporter: &ProgressReporter,
) -> Result<SimulationResult, EngineError> {
    reporter.report(Progress::PhaseStart { name: "Sampling" });
    simulation.run(sweeps, reporter)?;
    reporter.report(Progress::PhaseFinish);

    let report = simulation.report();
    info!(
        energy = report.energy,
        drift = report.drift,
        steps = report.steps,
        "Simulation complete."
    );
    Ok(SimulationResult {
        report,
        snapshot: simulation.snapshot(),
    })
}

fn build_space(config: &SimulationConfig, tables: &SystemTables, rng: &mut Random) -> Result<Space, EngineError> {
    let topology = &tables.topology;
    let mut space = Space::new(config.cell);
    for insertion in &config.insertions {
        let molecule = topology
            .find_molecule(&insertion.molecule)
            .ok_or_else(|| EngineError::UnknownSpecies(insertion.molecule.clone()))?;
        if topology.molecules()[molecule].atomic {
            space.insert_atomic(topology, molecule, insertion.groups, insertion.active, rng)?;
        } else {
            space.insert_molecules(topology, molecule, insertion.groups, insertion.active, rng)?;
        }
        debug!(
            molecule = %insertion.molecule,
            slots = insertion.groups,
            active = insertion.active,
            "Inserted species."
        );
    }
    Ok(space)
}

fn build_hamiltonian(config: &SimulationConfig, tables: &mut SystemTables) -> Hamiltonian {
    let mut hamiltonian = Hamiltonian::new();
    for spec in &config.energy {
        match spec {
            EnergySpec::Nonbonded { potential, cutoff } => {
                let table = tables.add_mixed_table();
                hamiltonian.push(Box::new(Nonbonded::new(table, *potential, *cutoff)));
            }
            EnergySpec::Bonded => hamiltonian.push(Box::new(Bonded)),
            EnergySpec::Isobaric { pressure } => hamiltonian.push(Box::new(Isobaric::from_molar(*pressure))),
            EnergySpec::ContainerOverlap => hamiltonian.push(Box::new(ContainerOverlap)),
        }
    }
    hamiltonian
}

fn build_propagator(config: &SimulationConfig, tables: &SystemTables, space: &Space) -> Result<Propagator, EngineError> {
    let topology = &tables.topology;
    let adjust = config.adjust_interval;
    let bond_correction = config.energy.iter().any(|e| matches!(e, EnergySpec::Bonded));
    let mut propagator = Propagator::new();
    for spec in &config.moves {
        let mv: Box<dyn Move> = match spec {
            MoveSpec::AtomicTranslateRotate { molecule, dir, .. } => {
                Box::new(AtomicTranslateRotate::new(topology, molecule, *dir, adjust)?)
            }
            MoveSpec::TranslateRotate {
                molecule, dp, dprot, dir, ..
            } => Box::new(TranslateRotate::new(topology, molecule, *dp, *dprot, *dir, adjust)?),
            MoveSpec::Volume { dv, method, .. } => Box::new(VolumeMove::new(space, *dv, *method, adjust)?),
            MoveSpec::Charge { index, dq, .. } => Box::new(ChargeMove::new(space, *index, *dq, adjust)?),
            MoveSpec::ChargeTransfer {
                molecule,
                dq,
                charge_range,
                ..
            } => Box::new(ChargeTransfer::new(topology, molecule, *dq, *charge_range, adjust)?),
            MoveSpec::ConformationSwap { molecule, .. } => Box::new(ConformationSwap::new(topology, molecule)?),
            MoveSpec::QuadrantJump {
                molecule, dir, index, ..
            } => Box::new(QuadrantJump::new(topology, space, molecule, *dir, *index)?),
            MoveSpec::Speciation { .. } => Box::new(SpeciationMove::new(topology, space, bond_correction)?),
        };
        propagator.push(mv, spec.weight())?;
    }
    Ok(propagator)
}
