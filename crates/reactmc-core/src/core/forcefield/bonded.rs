use super::params::SystemTables;
use super::potentials;
use super::term::EnergyTerm;
use crate::core::models::change::Change;
use crate::core::models::space::Space;
use crate::core::models::topology::{Bond, Topology};

/// Bond energy of one active molecular group; zero for atomic or empty groups.
pub fn group_bond_energy(space: &Space, topology: &Topology, group: usize) -> f64 {
    let Some(g) = space.groups.get(group) else {
        return 0.0;
    };
    if g.atomic || !g.is_full() {
        return 0.0;
    }
    let Some(kind) = topology.molecule(g.molecule) else {
        return 0.0;
    };
    kind.bonds
        .iter()
        .map(|bond| match *bond {
            Bond::Harmonic { index: [a, b], k, req } => {
                let r = space
                    .cell
                    .sqdist(&space.particles[g.to_absolute(a)].pos, &space.particles[g.to_absolute(b)].pos)
                    .sqrt();
                potentials::harmonic(r, k, req)
            }
        })
        .sum()
}

/// Intramolecular bonds of active molecular groups.
#[derive(Debug, Clone, Default)]
pub struct Bonded;

impl EnergyTerm for Bonded {
    fn name(&self) -> &str {
        "bonded"
    }

    fn energy(&self, space: &Space, tables: &SystemTables, change: &Change) -> f64 {
        if change.is_global() {
            return (0..space.groups.len())
                .map(|g| group_bond_energy(space, &tables.topology, g))
                .sum();
        }
        change
            .groups
            .iter()
            .map(|record| group_bond_energy(space, &tables.topology, record.group))
            .sum()
    }

    fn box_clone(&self) -> Box<dyn EnergyTerm> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::params::Conditions;
    use crate::core::models::change::GroupChange;
    use crate::core::models::topology::{AtomKind, MoleculeKind};
    use crate::core::utils::geometry::Cell;
    use nalgebra::Point3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn system() -> (Space, SystemTables) {
        let mut topology = Topology::new();
        let a = topology.add_atom(AtomKind::new("A")).unwrap();
        topology
            .add_molecule(
                MoleculeKind::molecular("dimer", vec![a, a], vec![Point3::origin(), Point3::new(2.0, 0.0, 0.0)])
                    .with_bonds(vec![Bond::Harmonic {
                        index: [0, 1],
                        k: 4.0,
                        req: 1.0,
                    }]),
            )
            .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut space = Space::new(Cell::cube(20.0));
        space.insert_molecules(&topology, 0, 2, 1, &mut rng).unwrap();
        (space, SystemTables::new(topology, Conditions::default()))
    }

    #[test]
    fn stretched_bond_energy() {
        let (space, tables) = system();
        assert!((group_bond_energy(&space, &tables.topology, 0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn inactive_molecules_have_no_bond_energy() {
        let (space, tables) = system();
        assert_eq!(group_bond_energy(&space, &tables.topology, 1), 0.0);
        assert!((Bonded.energy(&space, &tables, &Change::everything()) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn only_changed_groups_are_evaluated() {
        let (space, tables) = system();
        let mut change = Change::new();
        change.push(GroupChange::whole(1));
        assert_eq!(Bonded.energy(&space, &tables, &change), 0.0);
        change.push(GroupChange::whole(0));
        assert!(Bonded.energy(&space, &tables, &change) > 0.0);
    }
}
