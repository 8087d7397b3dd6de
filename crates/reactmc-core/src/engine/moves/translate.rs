use super::{Move, MoveStatistics, pick, random_displacement};
use crate::core::forcefield::params::SystemTables;
use crate::core::models::change::{Change, GroupChange};
use crate::core::models::space::{Selection, Space};
use crate::core::models::topology::Topology;
use crate::core::utils::geometry;
use crate::engine::error::EngineError;
use crate::engine::utils::sampling::Random;
use nalgebra::Vector3;
use rand::Rng;

fn molecule_id(topology: &Topology, name: &str) -> Result<usize, EngineError> {
    topology
        .find_molecule(name)
        .ok_or_else(|| EngineError::UnknownSpecies(name.to_string()))
}

/// Displaces and rotates single atoms of a molecule kind.
///
/// Step sizes come from the atom kinds; `dp` of the statistics is a common
/// scale factor that starts at one and is tuned. Atoms inside molecular
/// groups move relative to their partners, so the group's mass center is
/// refreshed after each displacement.
#[derive(Debug)]
pub struct AtomicTranslateRotate {
    molecule: usize,
    name: String,
    dir: Vector3<f64>,
    pending: f64,
    statistics: MoveStatistics,
}

impl AtomicTranslateRotate {
    pub fn new(topology: &Topology, molecule: &str, dir: [f64; 3], adjust_interval: u64) -> Result<Self, EngineError> {
        Ok(Self {
            molecule: molecule_id(topology, molecule)?,
            name: format!("atomic-translate-rotate:{}", molecule),
            dir: Vector3::from(dir),
            pending: 0.0,
            statistics: MoveStatistics::tuned(1.0, adjust_interval),
        })
    }
}

impl Move for AtomicTranslateRotate {
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
        tables: &SystemTables,
        rng: &mut Random,
    ) -> Result<Change, EngineError> {
        self.pending = 0.0;
        let groups = space.find_molecules(self.molecule, Selection::Active);
        let Some(group) = pick(&groups, rng) else {
            return Ok(Change::new());
        };
        let g = &space.groups[group];
        let index = rng.gen_range(g.active_range());
        let relative = index - g.begin;
        let atomic = g.atomic;

        let particle = &space.particles[index];
        let Some(kind) = tables.topology.atom(particle.kind) else {
            return Err(EngineError::Internal(format!(
                "particle {} has unknown atom kind {}",
                index, particle.kind
            )));
        };
        let scale = self.statistics.dp;
        let (dp, dprot) = (kind.dp * scale, kind.dprot * scale);
        if dp <= 0.0 && dprot <= 0.0 {
            return Ok(Change::new());
        }

        let displacement = random_displacement(rng, dp, &self.dir);
        let cell = space.cell;
        let particle = &mut space.particles[index];
        particle.pos += displacement;
        cell.wrap(&mut particle.pos);
        if dprot > 0.0 && particle.ext.is_some() {
            particle.rotate(&geometry::random_rotation(rng, dprot));
        }
        if !atomic {
            let center = space.mass_center(group, &tables.topology);
            space.groups[group].mass_center = center;
        }
        self.pending = displacement.norm_squared();

        let mut record = GroupChange::with_atoms(group, vec![relative]);
        record.internal = !atomic;
        let mut change = Change::new();
        change.push(record);
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

/// Rigid translation and rotation of whole molecules about their mass center.
#[derive(Debug)]
pub struct TranslateRotate {
    molecule: usize,
    name: String,
    dir: Vector3<f64>,
    dprot: f64,
    pending: f64,
    statistics: MoveStatistics,
}

impl TranslateRotate {
    pub fn new(
        topology: &Topology,
        molecule: &str,
        dp: f64,
        dprot: f64,
        dir: [f64; 3],
        adjust_interval: u64,
    ) -> Result<Self, EngineError> {
        let id = molecule_id(topology, molecule)?;
        if topology.molecules()[id].atomic {
            return Err(EngineError::Initialization(format!(
                "molecule '{}' is atomic and cannot be moved as a rigid body",
                molecule
            )));
        }
        Ok(Self {
            molecule: id,
            name: format!("translate-rotate:{}", molecule),
            dir: Vector3::from(dir),
            dprot,
            pending: 0.0,
            statistics: MoveStatistics::tuned(dp, adjust_interval),
        })
    }
}

impl Move for TranslateRotate {
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
        let groups = space.find_molecules(self.molecule, Selection::Active);
        let Some(group) = pick(&groups, rng) else {
            return Ok(Change::new());
        };
        let dp = self.statistics.dp;
        if dp <= 0.0 && self.dprot <= 0.0 {
            return Ok(Change::new());
        }
        let displacement = random_displacement(rng, dp, &self.dir);
        space.translate_group(group, &displacement);
        if self.dprot > 0.0 {
            space.rotate_group(group, &geometry::random_rotation(rng, self.dprot));
        }
        self.pending = displacement.norm_squared();

        let mut change = Change::new();
        change.push(GroupChange::whole(group));
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
