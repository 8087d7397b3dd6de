use super::{Move, MoveStatistics, pick};
use crate::core::forcefield::params::SystemTables;
use crate::core::models::change::{Change, GroupChange};
use crate::core::models::space::{Selection, Space};
use crate::core::models::topology::Topology;
use crate::core::utils::geometry;
use crate::engine::error::EngineError;
use crate::engine::utils::sampling::{Random, weighted_index};
use rand::distributions::{Distribution, WeightedIndex};
use std::f64::consts::PI;

/// Replaces the internal structure of a molecule with one drawn from its
/// weighted conformation library.
///
/// The new conformation keeps the old mass center and gets a random
/// orientation.
#[derive(Debug)]
pub struct ConformationSwap {
    molecule: usize,
    name: String,
    distribution: WeightedIndex<f64>,
    statistics: MoveStatistics,
}

impl ConformationSwap {
    pub fn new(topology: &Topology, molecule: &str) -> Result<Self, EngineError> {
        let id = topology
            .find_molecule(molecule)
            .ok_or_else(|| EngineError::UnknownSpecies(molecule.to_string()))?;
        let kind = &topology.molecules()[id];
        if kind.atomic || kind.conformations.is_empty() {
            return Err(EngineError::Initialization(format!(
                "molecule '{}' has no conformation library",
                molecule
            )));
        }
        let distribution = weighted_index(&kind.conformation_weights())
            .map_err(|e| EngineError::Initialization(format!("conformations of '{}': {}", molecule, e)))?;
        Ok(Self {
            molecule: id,
            name: format!("conformation-swap:{}", molecule),
            distribution,
            statistics: MoveStatistics::new(),
        })
    }
}

impl Move for ConformationSwap {
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
        let groups = space.find_molecules(self.molecule, Selection::Active);
        let Some(group) = pick(&groups, rng) else {
            return Ok(Change::new());
        };
        let Some(center) = space.groups[group].mass_center else {
            return Err(EngineError::invariant(
                0,
                Some(group),
                "active molecule has no cached mass center",
            ));
        };
        let conformation = self.distribution.sample(rng);
        let rotation = geometry::random_rotation(rng, 2.0 * PI);
        space.groups[group].conformation = conformation;
        space.place_molecule(group, center, &rotation, &tables.topology)?;

        let mut record = GroupChange::whole(group);
        record.internal = true;
        let mut change = Change::new();
        change.push(record);
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::params::Conditions;
    use crate::core::models::topology::{AtomKind, Conformation, MoleculeKind};
    use crate::core::utils::geometry::Cell;
    use nalgebra::Point3;
    use rand::SeedableRng;

    fn tables() -> SystemTables {
        let mut topology = Topology::new();
        let a = topology.add_atom(AtomKind::new("A")).unwrap();
        let straight = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)];
        let bent = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(1.0, 1.0, 0.0)];
        topology
            .add_molecule(
                MoleculeKind::molecular("chain", vec![a, a, a], straight.clone()).with_conformations(vec![
                    Conformation {
                        weight: 1.0,
                        positions: straight,
                    },
                    Conformation {
                        weight: 3.0,
                        positions: bent,
                    },
                ]),
            )
            .unwrap();
        topology
            .add_molecule(MoleculeKind::molecular(
                "rigid",
                vec![a],
                vec![Point3::origin()],
            ))
            .unwrap();
        SystemTables::new(topology, Conditions::default())
    }

    #[test]
    fn swap_keeps_the_mass_center() {
        let tables = tables();
        let mut rng = Random::seed_from_u64(21);
        let mut space = Space::new(Cell::cube(20.0));
        space.insert_molecules(&tables.topology, 0, 1, 1, &mut rng).unwrap();
        let center = space.groups[0].mass_center.unwrap();
        let mut mv = ConformationSwap::new(&tables.topology, "chain").unwrap();

        let mut bent = 0;
        for _ in 0..400 {
            let change = mv.perform(&mut space, &tables, &mut rng).unwrap();
            assert!(change.groups[0].internal);
            mv.accept(&change).unwrap();
            bent += space.groups[0].conformation;
            assert!(space.cell.sqdist(&space.groups[0].mass_center.unwrap(), &center) < 1e-18);
        }
        space.check_invariants(&tables.topology, 1e-9).unwrap();
        let fraction = bent as f64 / 400.0;
        assert!((fraction - 0.75).abs() < 0.1);
    }

    #[test]
    fn molecules_without_a_library_are_rejected() {
        let tables = tables();
        assert!(matches!(
            ConformationSwap::new(&tables.topology, "rigid"),
            Err(EngineError::Initialization(_))
        ));
    }
}
