//! # Moves Module
//!
//! Monte Carlo moves perturb the trial configuration and describe what they
//! touched as a [`Change`]. They never evaluate energies and never roll back
//! the configuration themselves; the simulation driver does both.
//!
//! ## Protocol
//!
//! Every move cycles through the same states:
//!
//! 1. **Idle → Proposed** - [`Move::perform`] counts the trial and mutates the trial copy
//! 2. **Bias** - [`Move::bias`] adds corrections that no energy term can express
//! 3. **Decision** - Metropolis, or [`Move::joint_decision`] for moves that decide with a partner
//! 4. **Proposed → Idle** - [`Move::accept`] or [`Move::reject`] updates the bookkeeping
//!
//! A move that cannot find a legal perturbation returns an empty [`Change`]
//! without touching the configuration. The driver rejects it without computing
//! any energy.
//!
//! ## Catalogue
//!
//! - [`translate`] - Single-atom and rigid-molecule displacements
//! - [`volume`] - Cell scaling for the isobaric ensemble
//! - [`charge`] - Charge displacement and intramolecular charge transfer
//! - [`conformation`] - Swapping a molecule's internal structure from a weighted library
//! - [`quadrant`] - Reflection of a molecule through a reference point
//! - [`speciation`] - Reaction-ensemble activation and deactivation
//! - [`tempering`] - Replica exchange with a partner simulation
//!
//! Moves that displace something tune their step size towards an acceptance
//! ratio between 20 % and 40 % and record the squared displacement of every
//! attempt.

pub mod charge;
pub mod conformation;
pub mod quadrant;
pub mod speciation;
pub mod tempering;
pub mod translate;
pub mod volume;

use crate::core::forcefield::params::SystemTables;
use crate::core::models::change::Change;
use crate::core::models::space::Space;
use crate::core::utils::average::Average;
use crate::engine::error::EngineError;
use crate::engine::utils::sampling::Random;
use nalgebra::Vector3;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovePhase {
    #[default]
    Idle,
    Proposed,
}

/// Acceptance ratios the step size is tuned towards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AcceptanceWindow {
    pub min: f64,
    pub max: f64,
}

impl Default for AcceptanceWindow {
    fn default() -> Self {
        Self { min: 0.2, max: 0.4 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveStatistics {
    pub trials: u64,
    pub accepted: u64,
    /// Proposals that found nothing to do.
    pub skipped: u64,
    /// Current step size; only meaningful for tuned moves.
    pub dp: f64,
    pub target: AcceptanceWindow,
    pub msqd: Average,
    adjust_interval: Option<u64>,
    window_trials: u64,
    window_accepted: u64,
    phase: MovePhase,
}

impl MoveStatistics {
    /// Statistics for a move without a tunable step size.
    pub fn new() -> Self {
        Self {
            trials: 0,
            accepted: 0,
            skipped: 0,
            dp: 0.0,
            target: AcceptanceWindow::default(),
            msqd: Average::new(),
            adjust_interval: None,
            window_trials: 0,
            window_accepted: 0,
            phase: MovePhase::Idle,
        }
    }

    /// Statistics whose step size `dp` is adjusted every `adjust_interval` trials.
    pub fn tuned(dp: f64, adjust_interval: u64) -> Self {
        Self {
            dp,
            adjust_interval: Some(adjust_interval.max(1)),
            ..Self::new()
        }
    }

    pub fn phase(&self) -> MovePhase {
        self.phase
    }

    pub fn acceptance(&self) -> f64 {
        if self.trials == 0 {
            0.0
        } else {
            self.accepted as f64 / self.trials as f64
        }
    }

    fn begin(&mut self) -> Result<(), EngineError> {
        if self.phase == MovePhase::Proposed {
            return Err(EngineError::Internal(
                "move proposed again before the previous proposal was resolved".to_string(),
            ));
        }
        self.phase = MovePhase::Proposed;
        self.trials += 1;
        Ok(())
    }

    fn finish(&mut self, accepted: bool, skipped: bool) -> Result<(), EngineError> {
        if self.phase != MovePhase::Proposed {
            return Err(EngineError::Internal(
                "move accepted or rejected without a pending proposal".to_string(),
            ));
        }
        self.phase = MovePhase::Idle;
        if accepted {
            self.accepted += 1;
        }
        if skipped {
            self.skipped += 1;
        }
        self.window_trials += 1;
        self.window_accepted += u64::from(accepted);
        self.adjust();
        Ok(())
    }

    fn adjust(&mut self) {
        let Some(interval) = self.adjust_interval else {
            return;
        };
        if self.window_trials < interval {
            return;
        }
        let ratio = self.window_accepted as f64 / self.window_trials as f64;
        if ratio < self.target.min {
            self.dp *= 0.95;
        } else if ratio > self.target.max {
            self.dp *= 1.05;
        }
        self.window_trials = 0;
        self.window_accepted = 0;
    }
}

impl Default for MoveStatistics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionReport {
    pub reaction: String,
    pub attempts: u64,
    pub acceptance: f64,
    pub reservoir: i64,
}

/// Summary of a move for the simulation report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveReport {
    pub name: String,
    pub trials: u64,
    pub accepted: u64,
    pub skipped: u64,
    pub acceptance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msqd: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<ReactionReport>,
}

impl MoveReport {
    pub fn from_statistics(name: &str, statistics: &MoveStatistics) -> Self {
        Self {
            name: name.to_string(),
            trials: statistics.trials,
            accepted: statistics.accepted,
            skipped: statistics.skipped,
            acceptance: statistics.acceptance(),
            dp: statistics.adjust_interval.map(|_| statistics.dp),
            msqd: (statistics.msqd.count() > 0).then(|| statistics.msqd.mean()),
            reactions: Vec::new(),
        }
    }
}

pub trait Move: Send {
    fn name(&self) -> &str;

    fn statistics(&self) -> &MoveStatistics;

    fn statistics_mut(&mut self) -> &mut MoveStatistics;

    /// Perturbs the trial configuration and returns what was touched.
    fn propose(
        &mut self,
        space: &mut Space,
        tables: &SystemTables,
        rng: &mut Random,
    ) -> Result<Change, EngineError>;

    fn perform(
        &mut self,
        space: &mut Space,
        tables: &SystemTables,
        rng: &mut Random,
    ) -> Result<Change, EngineError> {
        self.statistics_mut().begin()?;
        self.propose(space, tables, rng)
    }

    /// Additive correction to the reduced energy change of the pending proposal.
    fn bias(&mut self, _change: &Change, _u_old: f64, _u_new: f64) -> Result<f64, EngineError> {
        Ok(0.0)
    }

    /// Lets a move take the acceptance decision itself; `None` defers to Metropolis.
    fn joint_decision(&mut self, _energy_change: f64) -> Result<Option<bool>, EngineError> {
        Ok(None)
    }

    fn accept(&mut self, change: &Change) -> Result<(), EngineError> {
        self.statistics_mut().finish(true, false)?;
        self.on_accept(change)
    }

    fn reject(&mut self, change: &Change) -> Result<(), EngineError> {
        self.statistics_mut().finish(false, change.is_empty())?;
        self.on_reject(change)
    }

    fn on_accept(&mut self, _change: &Change) -> Result<(), EngineError> {
        Ok(())
    }

    fn on_reject(&mut self, _change: &Change) -> Result<(), EngineError> {
        Ok(())
    }

    fn report(&self) -> MoveReport {
        MoveReport::from_statistics(self.name(), self.statistics())
    }
}

/// Uniform offset in `[-0.5, 0.5)` along each axis, scaled per axis.
pub(crate) fn random_displacement(rng: &mut Random, scale: f64, dir: &Vector3<f64>) -> Vector3<f64> {
    let offset = Vector3::new(
        rng.r#gen::<f64>() - 0.5,
        rng.r#gen::<f64>() - 0.5,
        rng.r#gen::<f64>() - 0.5,
    );
    offset.component_mul(dir) * scale
}

pub(crate) fn pick<T: Copy>(items: &[T], rng: &mut Random) -> Option<T> {
    items.choose(rng).copied()
}
