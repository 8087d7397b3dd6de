use super::{Move, MoveStatistics, pick};
use crate::core::forcefield::params::SystemTables;
use crate::core::models::change::{Change, GroupChange};
use crate::core::models::space::{Selection, Space};
use crate::core::models::topology::Topology;
use crate::engine::error::EngineError;
use crate::engine::utils::sampling::Random;
use rand::Rng;
use rand::seq::index;

/// Random displacement of the charge of one particle.
#[derive(Debug)]
pub struct ChargeMove {
    index: usize,
    name: String,
    pending: f64,
    statistics: MoveStatistics,
}

impl ChargeMove {
    pub fn new(space: &Space, index: usize, dq: f64, adjust_interval: u64) -> Result<Self, EngineError> {
        if index >= space.particles.len() {
            return Err(EngineError::Initialization(format!(
                "charge move targets particle {} but only {} exist",
                index,
                space.particles.len()
            )));
        }
        Ok(Self {
            index,
            name: format!("charge:{}", index),
            pending: 0.0,
            statistics: MoveStatistics::tuned(dq, adjust_interval),
        })
    }
}

impl Move for ChargeMove {
    fn name(&self) -> &str {
        &self.name
    }

    fn statistics(&self) -> &MoveStatistics {
        &self.statistics
    }

    fn statistics_mut(&mut self) -> &mut MoveStatistics {
        &mut self.statistics
    }

    fn propose(
        &mut self,
        space: &mut Space,
        _tables: &SystemTables,
        rng: &mut Random,
    ) -> Result<Change, EngineError> {
        self.pending = 0.0;
        let dq = self.statistics.dp;
        if dq <= 0.0 || !space.is_active(self.index) {
            return Ok(Change::new());
        }
        let Some(group) = space.group_of(self.index) else {
            return Ok(Change::new());
        };
        let delta = dq * (rng.r#gen::<f64>() - 0.5);
        space.particles[self.index].charge += delta;
        self.pending = delta * delta;

        let relative = self.index - space.groups[group].begin;
        let mut change = Change::new();
        change.push(GroupChange::with_atoms(group, vec![relative]));
        Ok(change)
    }

    fn on_accept(&mut self, _change: &Change) -> Result<(), EngineError> {
        self.statistics.msqd.push(self.pending);
        Ok(())
    }

    fn on_reject(&mut self, _change: &Change) -> Result<(), EngineError> {
        self.statistics.msqd.push(0.0);
        Ok(())
    }
}

/// Moves charge between two active atoms of the same molecule, keeping the
/// molecule's net charge constant.
///
/// With a charge range, proposals that would push either atom outside it are
/// skipped.
#[derive(Debug)]
pub struct ChargeTransfer {
    molecule: usize,
    name: String,
    range: Option<[f64; 2]>,
    pending: f64,
    statistics: MoveStatistics,
}

impl ChargeTransfer {
    pub fn new(
        topology: &Topology,
        molecule: &str,
        dq: f64,
        range: Option<[f64; 2]>,
        adjust_interval: u64,
    ) -> Result<Self, EngineError> {
        let id = topology
            .find_molecule(molecule)
            .ok_or_else(|| EngineError::UnknownSpecies(molecule.to_string()))?;
        if let Some([min, max]) = range {
            if !(min <= max) {
                return Err(EngineError::Initialization(format!(
                    "charge range [{}, {}] of '{}' is empty",
                    min, max, molecule
                )));
            }
        }
        Ok(Self {
            molecule: id,
            name: format!("charge-transfer:{}", molecule),
            range,
            pending: 0.0,
            statistics: MoveStatistics::tuned(dq, adjust_interval),
        })
    }

    fn in_range(&self, charge: f64) -> bool {
        self.range.is_none_or(|[min, max]| (min..=max).contains(&charge))
    }
}

impl Move for ChargeTransfer {
    fn name(&self) -> &str {
        &self.name
    }

    fn statistics(&self) -> &MoveStatistics {
        &self.statistics
    }

    fn statistics_mut(&mut self) -> &mut MoveStatistics {
        &mut self.statistics
    }

    fn propose(
        &mut self,
        space: &mut Space,
        _tables: &SystemTables,
        rng: &mut Random,
    ) -> Result<Change, EngineError> {
        self.pending = 0.0;
        let dq = self.statistics.dp;
        let candidates: Vec<usize> = space
            .find_molecules(self.molecule, Selection::Active)
            .into_iter()
            .filter(|&g| space.groups[g].len() >= 2)
            .collect();
        let Some(group) = pick(&candidates, rng) else {
            return Ok(Change::new());
        };
        if dq <= 0.0 {
            return Ok(Change::new());
        }
        let g = &space.groups[group];
        let pair = index::sample(rng, g.len(), 2);
        let (a, b) = (pair.index(0), pair.index(1));
        let (ia, ib) = (g.to_absolute(a), g.to_absolute(b));
        let delta = dq * (rng.r#gen::<f64>() - 0.5);
        let qa = space.particles[ia].charge + delta;
        let qb = space.particles[ib].charge - delta;
        if !(self.in_range(qa) && self.in_range(qb)) {
            return Ok(Change::new());
        }
        space.particles[ia].charge = qa;
        space.particles[ib].charge = qb;
        self.pending = delta * delta;

        let mut change = Change::new();
        change.push(GroupChange::with_atoms(group, vec![a, b]));
        Ok(change)
    }

    fn on_accept(&mut self, _change: &Change) -> Result<(), EngineError> {
        self.statistics.msqd.push(self.pending);
        Ok(())
    }

    fn on_reject(&mut self, _change: &Change) -> Result<(), EngineError> {
        self.statistics.msqd.push(0.0);
        Ok(())
    }
}
