use super::{Move, MoveStatistics, pick};
use crate::core::forcefield::params::SystemTables;
use crate::core::models::change::{Change, GroupChange};
use crate::core::models::space::{Selection, Space};
use crate::core::models::topology::Topology;
use crate::core::utils::geometry;
use crate::engine::error::EngineError;
use crate::engine::utils::sampling::Random;
use nalgebra::{Point3, Vector3};
use rand::Rng;
use std::ops::Range;

/// Mirrors a molecule (or a single atom of an atomic kind) through a reference
/// point along the enabled axes.
///
/// The reference is the mass center of a fixed slot range, or the cell origin.
/// Jumping twice returns to the start, so the move is its own inverse.
#[derive(Debug)]
pub struct QuadrantJump {
    molecule: usize,
    name: String,
    dir: Vector3<f64>,
    reference: Option<Range<usize>>,
    statistics: MoveStatistics,
}

impl QuadrantJump {
    pub fn new(
        topology: &Topology,
        space: &Space,
        molecule: &str,
        dir: [f64; 3],
        index: Option<[usize; 2]>,
    ) -> Result<Self, EngineError> {
        let id = topology
            .find_molecule(molecule)
            .ok_or_else(|| EngineError::UnknownSpecies(molecule.to_string()))?;
        let reference = match index {
            Some([first, last]) if first <= last && last < space.particles.len() => Some(first..last + 1),
            Some([first, last]) => {
                return Err(EngineError::Initialization(format!(
                    "quadrant jump reference [{}, {}] is not a valid slot range",
                    first, last
                )));
            }
            None => None,
        };
        Ok(Self {
            molecule: id,
            name: format!("quadrant-jump:{}", molecule),
            dir: Vector3::from(dir),
            reference,
            statistics: MoveStatistics::new(),
        })
    }

    fn reference_point(&self, space: &Space, topology: &Topology) -> Point3<f64> {
        let Some(range) = &self.reference else {
            return Point3::origin();
        };
        let positions: Vec<Point3<f64>> = space.particles[range.clone()].iter().map(|p| p.pos).collect();
        let masses: Vec<f64> = space.particles[range.clone()]
            .iter()
            .map(|p| topology.atom(p.kind).map_or(1.0, |a| a.mass))
            .collect();
        geometry::mass_center(&positions, &masses, &space.cell).unwrap_or_else(Point3::origin)
    }
}

impl Move for QuadrantJump {
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
        let reference = self.reference_point(space, &tables.topology);
        let g = &space.groups[group];
        let mut change = Change::new();

        if g.atomic {
            let index = rng.gen_range(g.active_range());
            let relative = index - g.begin;
            let arm = space.cell.boundary_vector(&reference, &space.particles[index].pos);
            let particle = &mut space.particles[index];
            particle.pos += arm.component_mul(&self.dir) * 2.0;
            space.cell.wrap(&mut particle.pos);
            change.push(GroupChange::with_atoms(group, vec![relative]));
        } else {
            let Some(cm) = g.mass_center else {
                return Err(EngineError::invariant(
                    0,
                    Some(group),
                    "active molecule has no cached mass center",
                ));
            };
            let arm = space.cell.boundary_vector(&reference, &cm);
            space.translate_group(group, &(arm.component_mul(&self.dir) * 2.0));
            change.push(GroupChange::whole(group));
        }
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::params::Conditions;
    use crate::core::models::topology::{AtomKind, MoleculeKind};
    use crate::core::utils::geometry::Cell;
    use rand::SeedableRng;

    fn setup() -> (Space, SystemTables, Random) {
        let mut topology = Topology::new();
        let a = topology.add_atom(AtomKind::new("A")).unwrap();
        topology.add_molecule(MoleculeKind::atomic("ion", vec![a])).unwrap();
        topology
            .add_molecule(MoleculeKind::molecular(
                "dimer",
                vec![a, a],
                vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            ))
            .unwrap();
        let mut rng = Random::seed_from_u64(8);
        let mut space = Space::new(Cell::cube(40.0));
        space.insert_atomic(&topology, 0, 1, 1, &mut rng).unwrap();
        space.insert_molecules(&topology, 1, 1, 1, &mut rng).unwrap();
        (space, SystemTables::new(topology, Conditions::default()), rng)
    }

    #[test]
    fn atom_is_mirrored_through_the_origin() {
        let (mut space, tables, mut rng) = setup();
        space.particles[0].pos = Point3::new(3.0, -2.0, 5.0);
        let mut mv = QuadrantJump::new(&tables.topology, &space, "ion", [1.0, 1.0, 0.0], None).unwrap();
        mv.perform(&mut space, &tables, &mut rng).unwrap();
        assert!((space.particles[0].pos - Point3::new(-3.0, 2.0, 5.0)).norm() < 1e-12);
    }

    #[test]
    fn jumping_twice_restores_the_molecule() {
        let (mut space, tables, mut rng) = setup();
        let before = space.clone();
        let mut mv = QuadrantJump::new(&tables.topology, &space, "dimer", [1.0, 1.0, 1.0], Some([0, 0])).unwrap();
        for _ in 0..2 {
            let change = mv.perform(&mut space, &tables, &mut rng).unwrap();
            mv.accept(&change).unwrap();
        }
        for (a, b) in space.particles.iter().zip(&before.particles) {
            assert!(space.cell.sqdist(&a.pos, &b.pos) < 1e-18);
        }
        space.check_invariants(&tables.topology, 1e-9).unwrap();
    }

    #[test]
    fn invalid_reference_range_is_rejected() {
        let (space, tables, _) = setup();
        assert!(QuadrantJump::new(&tables.topology, &space, "dimer", [1.0; 3], Some([2, 5])).is_err());
    }
}
