use super::params::SystemTables;
use super::term::EnergyTerm;
use crate::core::models::change::Change;
use crate::core::models::reaction::MOLAR;
use crate::core::models::space::Space;

/// Pressure term of the isothermal-isobaric ensemble, `βPV - (N + 1) ln V`.
///
/// `N` counts independently moving bodies: active atoms of atomic groups plus
/// active molecules.
#[derive(Debug, Clone)]
pub struct Isobaric {
    /// `βP` in Å⁻³.
    pressure: f64,
}

impl Isobaric {
    /// Pressure given as the ideal-gas concentration in mol/l that would exert it.
    pub fn from_molar(pressure: f64) -> Self {
        Self {
            pressure: pressure * MOLAR,
        }
    }
}

impl EnergyTerm for Isobaric {
    fn name(&self) -> &str {
        "isobaric"
    }

    fn energy(&self, space: &Space, _: &SystemTables, change: &Change) -> f64 {
        if !(change.is_global() || change.dn) {
            return 0.0;
        }
        let volume = space.cell.volume();
        let bodies = space.count_bodies() as f64;
        self.pressure * volume - (bodies + 1.0) * volume.ln()
    }

    fn box_clone(&self) -> Box<dyn EnergyTerm> {
        Box::new(self.clone())
    }
}

/// Forbids active particles outside a non-periodic container.
#[derive(Debug, Clone, Default)]
pub struct ContainerOverlap;

impl EnergyTerm for ContainerOverlap {
    fn name(&self) -> &str {
        "container-overlap"
    }

    fn energy(&self, space: &Space, _: &SystemTables, change: &Change) -> f64 {
        let outside = |i: usize| space.is_active(i) && space.cell.is_outside(&space.particles[i].pos);
        let overlap = if change.is_global() {
            space.active_particles().any(|i| space.cell.is_outside(&space.particles[i].pos))
        } else {
            change.touched_particles(space).into_iter().any(outside)
        };
        if overlap { f64::INFINITY } else { 0.0 }
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
    use crate::core::models::topology::{AtomKind, MoleculeKind, Topology};
    use crate::core::utils::geometry::{Cell, VolumeMethod};
    use nalgebra::Point3;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn system(cell: Cell) -> (Space, SystemTables) {
        let mut topology = Topology::new();
        let a = topology.add_atom(AtomKind::new("A")).unwrap();
        topology
            .add_molecule(MoleculeKind::atomic("gas", vec![a]))
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut space = Space::new(cell);
        space.insert_atomic(&topology, 0, 5, 4, &mut rng).unwrap();
        (space, SystemTables::new(topology, Conditions::default()))
    }

    #[test]
    fn isobaric_energy_follows_volume_and_count() {
        let (space, tables) = system(Cell::cube(10.0));
        let term = Isobaric::from_molar(1.0);
        let expected = MOLAR * 1000.0 - 5.0 * 1000f64.ln();
        assert!((term.energy(&space, &tables, &Change::everything()) - expected).abs() < 1e-9);
    }

    #[test]
    fn isobaric_ignores_plain_displacements() {
        let (space, tables) = system(Cell::cube(10.0));
        let mut change = Change::new();
        change.push(GroupChange::with_atoms(0, vec![0]));
        assert_eq!(Isobaric::from_molar(1.0).energy(&space, &tables, &change), 0.0);
    }

    #[test]
    fn isobaric_difference_after_volume_change() {
        let (old, tables) = system(Cell::cube(10.0));
        let mut trial = old.clone();
        trial.cell.set_volume(2000.0, VolumeMethod::Isotropic).unwrap();
        let mut change = Change::everything();
        change.volume_change = true;
        let term = Isobaric::from_molar(0.0);
        let du = term.energy(&trial, &tables, &change) - term.energy(&old, &tables, &change);
        assert!((du + 5.0 * 2f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn container_overlap_in_a_sphere() {
        let (mut space, tables) = system(Cell::Sphere { radius: 5.0 });
        assert_eq!(ContainerOverlap.energy(&space, &tables, &Change::everything()), 0.0);
        space.particles[2].pos = Point3::new(6.0, 0.0, 0.0);
        let mut change = Change::new();
        change.push(GroupChange::with_atoms(0, vec![2]));
        assert_eq!(ContainerOverlap.energy(&space, &tables, &change), f64::INFINITY);
    }

    #[test]
    fn inactive_particles_may_sit_outside() {
        let (mut space, tables) = system(Cell::Sphere { radius: 5.0 });
        space.particles[4].pos = Point3::new(6.0, 0.0, 0.0);
        assert_eq!(ContainerOverlap.energy(&space, &tables, &Change::everything()), 0.0);
    }
}
