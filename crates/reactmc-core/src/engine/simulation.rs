use super::error::EngineError;
use super::moves::tempering::ParallelTempering;
use super::moves::{Move, MoveReport};
use super::progress::{Progress, ProgressReporter};
use super::propagator::Propagator;
use super::state::State;
use super::utils::sampling::{Random, ideal_term, metropolis};
use crate::core::forcefield::params::SystemTables;
use crate::core::forcefield::term::{Hamiltonian, TermEnergy};
use crate::core::models::space::{ConfigurationSnapshot, Space};
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, instrument, trace, warn};

/// Tolerance on cached mass centers, in Å.
const MASS_CENTER_TOLERANCE: f64 = 1e-6;

/// Running comparison between the incrementally accumulated energy and a full
/// recomputation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftTracker {
    pub initial: f64,
    pub accumulated: f64,
}

impl DriftTracker {
    fn new(initial: f64) -> Self {
        Self {
            initial,
            accumulated: 0.0,
        }
    }

    /// Relative drift of `current` against `initial + accumulated`.
    pub fn relative(&self, current: f64) -> f64 {
        ((current - self.initial) - self.accumulated) / current.abs().max(1.0)
    }
}

/// Everything a single move attempt touches, apart from the move itself.
#[derive(Debug)]
struct Chain {
    tables: SystemTables,
    old: State,
    trial: State,
    rng: Random,
    drift: DriftTracker,
    ideal_term: bool,
    step: u64,
}

impl Chain {
    fn attempt(&mut self, mv: &mut dyn Move) -> Result<bool, EngineError> {
        let step = self.step;
        let mut change = mv
            .perform(&mut self.trial.space, &self.tables, &mut self.rng)
            .map_err(|e| e.at_step(step))?;

        if change.is_empty() {
            mv.reject(&change).map_err(|e| e.at_step(step))?;
            trace!(step, mv = mv.name(), "nothing to propose");
            return Ok(false);
        }
        change.sort_and_merge();
        change
            .validate(&self.trial.space)
            .map_err(|e| EngineError::from(e).at_step(step))?;

        let u_old = self.old.energy(&self.tables, &change);
        let u_new = self.trial.energy(&self.tables, &change);
        let du = u_new - u_old;
        let bias = mv.bias(&change, u_old, u_new).map_err(|e| e.at_step(step))?;
        let ideal = if self.ideal_term {
            ideal_term(&self.old.space, &self.trial.space, &change)
        } else {
            0.0
        };
        let total = du + bias + ideal;

        let accepted = match mv.joint_decision(total).map_err(|e| e.at_step(step))? {
            Some(decision) => decision,
            None => metropolis(total, &mut self.rng),
        };

        if accepted {
            self.old.sync_from(&self.trial, &change);
            if du.is_finite() {
                self.drift.accumulated += du;
            } else {
                warn!(step, mv = mv.name(), u_old, u_new, "accepted a move with a non-finite energy change");
                self.drift = DriftTracker::new(self.old.energy_full(&self.tables));
            }
            mv.accept(&change).map_err(|e| e.at_step(step))?;
        } else {
            self.trial.sync_from(&self.old, &change);
            mv.reject(&change).map_err(|e| e.at_step(step))?;
        }
        trace!(step, mv = mv.name(), du, bias, ideal, accepted, "move attempt");
        Ok(accepted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeciesCount {
    pub molecule: String,
    pub active: usize,
}

/// Summary of a finished or running simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<usize>,
    pub steps: u64,
    pub sweeps: u64,
    pub volume: f64,
    pub initial_energy: f64,
    pub energy: f64,
    pub drift: f64,
    pub terms: Vec<TermEnergy>,
    pub species: Vec<SpeciesCount>,
    pub moves: Vec<MoveReport>,
}

/// Metropolis Monte Carlo driver over an accepted and a trial configuration.
#[derive(Debug)]
pub struct Simulation {
    chain: Chain,
    propagator: Propagator,
    exchanger: Option<(ParallelTempering, u64)>,
    invariant_interval: u64,
    drift_tolerance: f64,
    sweeps: u64,
}

impl Simulation {
    pub fn new(
        tables: SystemTables,
        space: Space,
        hamiltonian: Hamiltonian,
        propagator: Propagator,
        seed: u64,
    ) -> Result<Self, EngineError> {
        if let Some(name) = hamiltonian.incompatible_term(&tables) {
            return Err(EngineError::Initialization(format!(
                "energy term '{}' refers to a pair table missing from the system tables",
                name
            )));
        }
        let old = State::new(space, hamiltonian);
        let initial = old.energy_full(&tables);
        if !initial.is_finite() {
            return Err(EngineError::Initialization(format!(
                "initial configuration has a non-finite energy ({})",
                initial
            )));
        }
        let trial = old.clone();
        Ok(Self {
            chain: Chain {
                tables,
                old,
                trial,
                rng: Random::seed_from_u64(seed),
                drift: DriftTracker::new(initial),
                ideal_term: false,
                step: 0,
            },
            propagator,
            exchanger: None,
            invariant_interval: 100,
            drift_tolerance: 1e-6,
            sweeps: 0,
        })
    }

    /// Attempts a replica exchange every `interval` sweeps.
    pub fn with_exchanger(mut self, exchanger: ParallelTempering, interval: u64) -> Self {
        self.exchanger = Some((exchanger, interval.max(1)));
        self
    }

    pub fn with_ideal_term(mut self, enabled: bool) -> Self {
        self.chain.ideal_term = enabled;
        self
    }

    pub fn with_checks(mut self, invariant_interval: u64, drift_tolerance: f64) -> Self {
        self.invariant_interval = invariant_interval.max(1);
        self.drift_tolerance = drift_tolerance;
        self
    }

    pub fn tables(&self) -> &SystemTables {
        &self.chain.tables
    }

    /// The accepted configuration.
    pub fn state(&self) -> &State {
        &self.chain.old
    }

    pub fn trial(&self) -> &State {
        &self.chain.trial
    }

    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    pub fn steps(&self) -> u64 {
        self.chain.step
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    pub fn energy(&self) -> f64 {
        self.chain.old.energy_full(&self.chain.tables)
    }

    pub fn drift(&self) -> f64 {
        self.chain.drift.relative(self.energy())
    }

    /// One move attempt drawn from the propagator.
    pub fn step(&mut self) -> Result<bool, EngineError> {
        let index = self
            .propagator
            .sample(&mut self.chain.rng)
            .ok_or_else(|| EngineError::Internal("propagator has no moves".to_string()))?;
        let mv = self
            .propagator
            .get_mut(index)
            .ok_or_else(|| EngineError::Internal(format!("sampled move {} does not exist", index)))?;
        let accepted = self.chain.attempt(mv)?;
        self.chain.step += 1;
        Ok(accepted)
    }

    pub fn sweep(&mut self) -> Result<(), EngineError> {
        for _ in 0..self.propagator.attempts_per_sweep() {
            self.step()?;
        }
        self.sweeps += 1;
        Ok(())
    }

    /// Replica exchange with the current partner; a no-op without an exchanger.
    pub fn exchange(&mut self) -> Result<bool, EngineError> {
        let Some((exchanger, _)) = self.exchanger.as_mut() else {
            return Ok(false);
        };
        self.chain.attempt(exchanger)
    }

    #[instrument(skip_all, name = "simulation_run", fields(sweeps = sweeps))]
    pub fn run(&mut self, sweeps: u64, reporter: &ProgressReporter) -> Result<(), EngineError> {
        info!(
            moves = self.propagator.len(),
            attempts_per_sweep = self.propagator.attempts_per_sweep(),
            energy = self.chain.drift.initial,
            "Starting Monte Carlo run."
        );
        reporter.report(Progress::TaskStart { total_steps: sweeps });
        for _ in 0..sweeps {
            self.sweep()?;
            let sweeps_done = self.sweeps;
            if self.exchanger.as_ref().is_some_and(|(_, interval)| sweeps_done % interval == 0) {
                self.exchange()?;
            }
            if self.sweeps % self.invariant_interval == 0 {
                self.check_invariants()?;
                debug!(
                    sweep = self.sweeps,
                    energy = self.energy(),
                    drift = self.drift(),
                    "checkpoint"
                );
                reporter.report(Progress::StatusUpdate {
                    text: format!("E = {:.4} kT", self.energy()),
                });
            }
            reporter.report(Progress::TaskIncrement);
        }
        self.check_invariants()?;
        reporter.report(Progress::TaskFinish);
        info!(energy = self.energy(), drift = self.drift(), "Monte Carlo run finished.");
        Ok(())
    }

    /// Structural checks on the accepted copy, agreement of the two copies and
    /// the energy drift.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        let step = self.chain.step;
        self.chain
            .old
            .space
            .check_invariants(&self.chain.tables.topology, MASS_CENTER_TOLERANCE)
            .map_err(|e| EngineError::from_space(step, e))?;
        if self.chain.old.space != self.chain.trial.space {
            return Err(EngineError::invariant(
                step,
                None,
                "trial configuration differs from the accepted configuration between moves",
            ));
        }
        self.check_drift(self.drift_tolerance)
    }

    pub fn check_drift(&self, tolerance: f64) -> Result<(), EngineError> {
        let drift = self.drift();
        if drift.abs() > tolerance {
            warn!(step = self.chain.step, drift, tolerance, "energy drift above tolerance");
            return Err(EngineError::invariant(
                self.chain.step,
                None,
                format!("relative energy drift {:.3e} exceeds {:.3e}", drift, tolerance),
            ));
        }
        Ok(())
    }

    pub fn report(&self) -> SimulationReport {
        let tables = &self.chain.tables;
        let space = &self.chain.old.space;
        let mut moves = self.propagator.reports();
        if let Some((exchanger, _)) = &self.exchanger {
            moves.push(exchanger.report());
        }
        SimulationReport {
            rank: self.exchanger.as_ref().map(|(e, _)| e.rank()),
            steps: self.chain.step,
            sweeps: self.sweeps,
            volume: space.cell.volume(),
            initial_energy: self.chain.drift.initial,
            energy: self.energy(),
            drift: self.drift(),
            terms: self.chain.old.breakdown(tables),
            species: tables
                .topology
                .molecules()
                .iter()
                .enumerate()
                .map(|(id, kind)| SpeciesCount {
                    molecule: kind.name.clone(),
                    active: space.count_active_molecules(id),
                })
                .collect(),
            moves,
        }
    }

    pub fn snapshot(&self) -> ConfigurationSnapshot {
        self.chain.old.space.snapshot()
    }
}
