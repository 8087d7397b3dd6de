use super::change::Change;
use super::group::{Group, GroupError};
use super::particle::Particle;
use super::topology::Topology;
use crate::core::utils::geometry::{self, Cell};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpaceError {
    #[error("Invalid group layout: {0}")]
    Layout(String),
    #[error("Molecule id {0} does not exist in the topology")]
    UnknownMolecule(usize),
    #[error("Group {group}: {source}")]
    Group {
        group: usize,
        #[source]
        source: GroupError,
    },
    #[error("Group {group}: cached mass center deviates by {deviation:.3e} Å from its particles")]
    MassCenter { group: usize, deviation: f64 },
    #[error("Group {group}: {message}")]
    Corrupted { group: usize, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Groups with at least one active particle.
    Active,
    /// Groups with no active particles.
    Inactive,
}

/// Particles partitioned into groups inside a cell.
///
/// Group boundaries and capacities are fixed once the space is built; only the
/// active size of each group changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Space {
    pub particles: Vec<Particle>,
    pub groups: Vec<Group>,
    pub cell: Cell,
    owner: Vec<usize>,
}

impl Space {
    pub fn new(cell: Cell) -> Self {
        Self {
            particles: Vec::new(),
            groups: Vec::new(),
            cell,
            owner: Vec::new(),
        }
    }

    /// Assembles a space from explicit parts, checking that the groups tile the
    /// particle vector without gaps or overlaps.
    pub fn from_parts(particles: Vec<Particle>, groups: Vec<Group>, cell: Cell) -> Result<Self, SpaceError> {
        let mut owner = Vec::with_capacity(particles.len());
        for (index, group) in groups.iter().enumerate() {
            if group.begin != owner.len() {
                return Err(SpaceError::Layout(format!(
                    "group {} begins at {} but the previous group ends at {}",
                    index,
                    group.begin,
                    owner.len()
                )));
            }
            owner.extend(std::iter::repeat_n(index, group.capacity()));
        }
        if owner.len() != particles.len() {
            return Err(SpaceError::Layout(format!(
                "groups cover {} slots but there are {} particles",
                owner.len(),
                particles.len()
            )));
        }
        Ok(Self {
            particles,
            groups,
            cell,
            owner,
        })
    }

    /// Appends `count` copies of a molecular kind, the first `active` of them switched on.
    pub fn insert_molecules<R: Rng + ?Sized>(
        &mut self,
        topology: &Topology,
        molecule: usize,
        count: usize,
        active: usize,
        rng: &mut R,
    ) -> Result<Vec<usize>, SpaceError> {
        let kind = topology
            .molecule(molecule)
            .ok_or(SpaceError::UnknownMolecule(molecule))?;
        let mut inserted = Vec::with_capacity(count);
        for n in 0..count {
            let begin = self.particles.len();
            let capacity = kind.atoms.len();
            for &atom in &kind.atoms {
                let atom_kind = &topology.atoms()[atom];
                self.particles
                    .push(Particle::from_kind(atom, atom_kind, Point3::origin()));
            }
            let size = if n < active { capacity } else { 0 };
            let index = self.groups.len();
            self.groups.push(Group::new(molecule, begin, capacity, size, false));
            self.owner.extend(std::iter::repeat_n(index, capacity));
            let center = self.cell.random_position(rng);
            let rotation = geometry::random_rotation(rng, 2.0 * std::f64::consts::PI);
            self.place_molecule(index, center, &rotation, topology)?;
            inserted.push(index);
        }
        Ok(inserted)
    }

    /// Appends one atomic group of the given capacity; particle kinds cycle
    /// through the molecule's atom list.
    pub fn insert_atomic<R: Rng + ?Sized>(
        &mut self,
        topology: &Topology,
        molecule: usize,
        capacity: usize,
        active: usize,
        rng: &mut R,
    ) -> Result<usize, SpaceError> {
        let kind = topology
            .molecule(molecule)
            .ok_or(SpaceError::UnknownMolecule(molecule))?;
        if active > capacity {
            return Err(SpaceError::Layout(format!(
                "cannot activate {} of {} slots for '{}'",
                active, capacity, kind.name
            )));
        }
        let begin = self.particles.len();
        for &atom in kind.atoms.iter().cycle().take(capacity) {
            let pos = self.cell.random_position(rng);
            self.particles
                .push(Particle::from_kind(atom, &topology.atoms()[atom], pos));
        }
        let index = self.groups.len();
        self.groups
            .push(Group::new(molecule, begin, capacity, active, true));
        self.owner.extend(std::iter::repeat_n(index, capacity));
        Ok(index)
    }

    /// Puts the group's current conformation at `center` with the given
    /// orientation and refreshes the cached mass center.
    pub fn place_molecule(
        &mut self,
        group: usize,
        center: Point3<f64>,
        rotation: &UnitQuaternion<f64>,
        topology: &Topology,
    ) -> Result<(), SpaceError> {
        let g = &self.groups[group];
        let kind = topology
            .molecule(g.molecule)
            .ok_or(SpaceError::UnknownMolecule(g.molecule))?;
        let structure = kind.conformation(g.conformation);
        let masses = topology.masses(g.molecule);
        let total_mass: f64 = masses.iter().sum();
        let reference = if total_mass > 0.0 {
            structure
                .iter()
                .zip(&masses)
                .fold(Vector3::zeros(), |acc, (p, m)| acc + p.coords * *m)
                / total_mass
        } else {
            Vector3::zeros()
        };
        let range = g.range();
        for (slot, local) in range.zip(structure) {
            let mut pos = center + rotation * (local.coords - reference);
            self.cell.wrap(&mut pos);
            let particle = &mut self.particles[slot];
            particle.pos = pos;
            particle.rotate(rotation);
        }
        let mut center = center;
        self.cell.wrap(&mut center);
        let g = &mut self.groups[group];
        g.mass_center = if g.tracks_mass_center() { Some(center) } else { None };
        Ok(())
    }

    /// Translates every active particle of a group and its cached mass center.
    pub fn translate_group(&mut self, group: usize, displacement: &Vector3<f64>) {
        let g = &mut self.groups[group];
        for particle in &mut self.particles[g.active_range()] {
            particle.pos += displacement;
            self.cell.wrap(&mut particle.pos);
        }
        if let Some(cm) = g.mass_center.as_mut() {
            *cm += displacement;
            self.cell.wrap(cm);
        }
    }

    /// Rotates the active particles of a molecular group about its mass center.
    pub fn rotate_group(&mut self, group: usize, rotation: &UnitQuaternion<f64>) {
        let g = &self.groups[group];
        let Some(cm) = g.mass_center else {
            return;
        };
        for particle in &mut self.particles[g.active_range()] {
            let arm = self.cell.boundary_vector(&particle.pos, &cm);
            particle.pos = cm + rotation * arm;
            self.cell.wrap(&mut particle.pos);
            particle.rotate(rotation);
        }
    }

    #[inline]
    pub fn group_of(&self, particle: usize) -> Option<usize> {
        self.owner.get(particle).copied()
    }

    #[inline]
    pub fn is_active(&self, particle: usize) -> bool {
        self.group_of(particle)
            .is_some_and(|g| self.groups[g].contains_active(particle))
    }

    pub fn active_particles(&self) -> impl Iterator<Item = usize> + '_ {
        self.groups.iter().flat_map(|g| g.active_range())
    }

    pub fn find_molecules(&self, molecule: usize, selection: Selection) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.molecule == molecule)
            .filter(|(_, g)| match selection {
                Selection::All => true,
                Selection::Active => !g.is_empty(),
                Selection::Inactive => g.is_empty(),
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Absolute indices of active particles of an atom kind.
    pub fn find_atoms(&self, atom: usize) -> Vec<usize> {
        self.active_particles()
            .filter(|&i| self.particles[i].kind == atom)
            .collect()
    }

    /// Active particles for atomic kinds, active molecules otherwise.
    pub fn count_active_molecules(&self, molecule: usize) -> usize {
        self.groups
            .iter()
            .filter(|g| g.molecule == molecule)
            .map(|g| if g.atomic { g.len() } else { usize::from(!g.is_empty()) })
            .sum()
    }

    /// Number of independently moving bodies: atoms of atomic groups plus whole molecules.
    pub fn count_bodies(&self) -> usize {
        self.groups
            .iter()
            .map(|g| if g.atomic { g.len() } else { usize::from(!g.is_empty()) })
            .sum()
    }

    /// Mass center of the active particles of a group, honouring periodic images.
    pub fn mass_center(&self, group: usize, topology: &Topology) -> Option<Point3<f64>> {
        let g = self.groups.get(group)?;
        let range = g.active_range();
        let positions: Vec<Point3<f64>> = self.particles[range.clone()].iter().map(|p| p.pos).collect();
        let masses: Vec<f64> = self.particles[range]
            .iter()
            .map(|p| topology.atom(p.kind).map_or(1.0, |a| a.mass))
            .collect();
        geometry::mass_center(&positions, &masses, &self.cell)
    }

    pub fn update_mass_centers(&mut self, topology: &Topology) {
        for i in 0..self.groups.len() {
            let cm = if self.groups[i].tracks_mass_center() {
                self.mass_center(i, topology)
            } else {
                None
            };
            self.groups[i].mass_center = cm;
        }
    }

    /// Copies the region described by `change` from `other` into `self`.
    ///
    /// Untouched particles and groups are left bit-identical. A global change
    /// copies everything.
    pub fn sync_from(&mut self, other: &Space, change: &Change) {
        if change.is_global() {
            self.particles.clone_from(&other.particles);
            self.groups.clone_from(&other.groups);
            self.owner.clone_from(&other.owner);
            self.cell = other.cell;
            return;
        }
        for record in &change.groups {
            let source = &other.groups[record.group];
            let target = &mut self.groups[record.group];
            target.clone_from(source);
            if record.all {
                let range = source.range();
                self.particles[range.clone()].clone_from_slice(&other.particles[range]);
            } else {
                for &atom in &record.atoms {
                    let index = source.to_absolute(atom);
                    self.particles[index].clone_from(&other.particles[index]);
                }
            }
        }
    }

    /// Verifies the structural invariants and the cached mass centers.
    pub fn check_invariants(&self, topology: &Topology, tolerance: f64) -> Result<(), SpaceError> {
        for (index, group) in self.groups.iter().enumerate() {
            if group.len() > group.capacity() {
                return Err(SpaceError::Corrupted {
                    group: index,
                    message: format!("size {} exceeds capacity {}", group.len(), group.capacity()),
                });
            }
            if group.range().end > self.particles.len() {
                return Err(SpaceError::Corrupted {
                    group: index,
                    message: "slot range extends past the particle vector".to_string(),
                });
            }
            if !group.tracks_mass_center() {
                continue;
            }
            let (Some(cached), Some(actual)) = (group.mass_center, self.mass_center(index, topology)) else {
                return Err(SpaceError::Corrupted {
                    group: index,
                    message: "active molecule has no mass center".to_string(),
                });
            };
            let deviation = self.cell.sqdist(&cached, &actual).sqrt();
            if deviation > tolerance {
                return Err(SpaceError::MassCenter { group: index, deviation });
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> ConfigurationSnapshot {
        ConfigurationSnapshot {
            cell: self.cell,
            volume: self.cell.volume(),
            groups: self
                .groups
                .iter()
                .map(|g| GroupRecord {
                    molecule: g.molecule,
                    begin: g.begin,
                    size: g.len(),
                    capacity: g.capacity(),
                    atomic: g.atomic,
                })
                .collect(),
            particles: self
                .particles
                .iter()
                .enumerate()
                .map(|(i, p)| ParticleRecord {
                    kind: p.kind,
                    pos: [p.pos.x, p.pos.y, p.pos.z],
                    charge: p.charge,
                    active: self.is_active(i),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticleRecord {
    pub kind: usize,
    pub pos: [f64; 3],
    pub charge: f64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupRecord {
    pub molecule: usize,
    pub begin: usize,
    pub size: usize,
    pub capacity: usize,
    pub atomic: bool,
}

/// Read-only view of a configuration for analysis and output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigurationSnapshot {
    pub cell: Cell,
    pub volume: f64,
    pub groups: Vec<GroupRecord>,
    pub particles: Vec<ParticleRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::change::GroupChange;
    use crate::core::models::topology::{AtomKind, MoleculeKind};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn topology() -> Topology {
        let mut topology = Topology::new();
        let a = topology.add_atom(AtomKind::new("A").with_mass(2.0)).unwrap();
        let b = topology.add_atom(AtomKind::new("B").with_charge(-1.0)).unwrap();
        topology
            .add_molecule(MoleculeKind::atomic("ions", vec![a, b]))
            .unwrap();
        topology
            .add_molecule(MoleculeKind::molecular(
                "dimer",
                vec![a, a],
                vec![Point3::origin(), Point3::new(2.0, 0.0, 0.0)],
            ))
            .unwrap();
        topology
    }

    fn space(rng: &mut StdRng) -> (Space, Topology) {
        let topology = topology();
        let mut space = Space::new(Cell::cube(30.0));
        space.insert_atomic(&topology, 0, 6, 3, rng).unwrap();
        space.insert_molecules(&topology, 1, 3, 2, rng).unwrap();
        (space, topology)
    }

    #[test]
    fn insertion_builds_contiguous_groups() {
        let mut rng = StdRng::seed_from_u64(1);
        let (space, _) = space(&mut rng);
        assert_eq!(space.particles.len(), 12);
        assert_eq!(space.groups.len(), 4);
        assert_eq!(space.groups[1].begin, 6);
        assert_eq!(space.group_of(7), Some(1));
        assert_eq!(space.group_of(11), Some(3));
        assert!(space.is_active(2));
        assert!(!space.is_active(3));
        assert!(!space.is_active(10));
        assert_eq!(space.active_particles().count(), 7);
    }

    #[test]
    fn atomic_kinds_cycle_through_the_atom_list() {
        let mut rng = StdRng::seed_from_u64(2);
        let (space, _) = space(&mut rng);
        let kinds: Vec<usize> = space.particles[0..4].iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![0, 1, 0, 1]);
        assert_eq!(space.particles[1].charge, -1.0);
    }

    #[test]
    fn selections_and_counts() {
        let mut rng = StdRng::seed_from_u64(3);
        let (space, _) = space(&mut rng);
        assert_eq!(space.find_molecules(1, Selection::All), vec![1, 2, 3]);
        assert_eq!(space.find_molecules(1, Selection::Active), vec![1, 2]);
        assert_eq!(space.find_molecules(1, Selection::Inactive), vec![3]);
        assert_eq!(space.find_atoms(1), vec![1]);
        assert_eq!(space.count_active_molecules(0), 3);
        assert_eq!(space.count_active_molecules(1), 2);
        assert_eq!(space.count_bodies(), 5);
    }

    #[test]
    fn placed_molecules_have_consistent_mass_centers() {
        let mut rng = StdRng::seed_from_u64(4);
        let (space, topology) = space(&mut rng);
        space.check_invariants(&topology, 1e-6).unwrap();
        assert!(space.groups[3].mass_center.is_none());
        let g = &space.groups[1];
        let d = space
            .cell
            .sqdist(&space.particles[g.begin].pos, &space.particles[g.begin + 1].pos);
        assert!((d.sqrt() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn translation_and_rotation_keep_mass_center_consistent() {
        let mut rng = StdRng::seed_from_u64(5);
        let (mut space, topology) = space(&mut rng);
        space.translate_group(1, &Vector3::new(14.0, -3.0, 29.0));
        space.rotate_group(1, &geometry::random_rotation(&mut rng, 3.0));
        space.check_invariants(&topology, 1e-6).unwrap();
    }

    #[test]
    fn stale_mass_center_is_an_invariant_violation() {
        let mut rng = StdRng::seed_from_u64(6);
        let (mut space, topology) = space(&mut rng);
        let g = space.groups[2].begin;
        space.particles[g].pos.x += 1.0;
        assert!(matches!(
            space.check_invariants(&topology, 1e-6),
            Err(SpaceError::MassCenter { group: 2, .. })
        ));
    }

    #[test]
    fn sync_copies_only_the_changed_region() {
        let mut rng = StdRng::seed_from_u64(7);
        let (old, _) = space(&mut rng);
        let mut trial = old.clone();
        trial.particles[1].pos = Point3::new(1.0, 1.0, 1.0);
        trial.particles[4].pos = Point3::new(2.0, 2.0, 2.0);
        trial.groups[0].activate(1).unwrap();

        let mut change = Change::new();
        change.push(GroupChange::with_atoms(0, vec![1]));
        let mut synced = old.clone();
        synced.sync_from(&trial, &change);

        assert_eq!(synced.particles[1], trial.particles[1]);
        assert_eq!(synced.particles[4], old.particles[4]);
        assert_eq!(synced.groups[0].len(), 4);
    }

    #[test]
    fn global_sync_copies_the_cell() {
        let mut rng = StdRng::seed_from_u64(8);
        let (old, _) = space(&mut rng);
        let mut trial = old.clone();
        trial
            .cell
            .set_volume(2.0 * old.cell.volume(), geometry::VolumeMethod::Isotropic)
            .unwrap();
        let mut synced = old.clone();
        synced.sync_from(&trial, &Change::everything());
        assert_eq!(synced, trial);
    }

    #[test]
    fn from_parts_rejects_gaps() {
        let particles = vec![Particle::new(0, Point3::origin(), 0.0); 3];
        let groups = vec![Group::new(0, 0, 1, 1, true), Group::new(0, 2, 1, 1, true)];
        assert!(matches!(
            Space::from_parts(particles, groups, Cell::cube(5.0)),
            Err(SpaceError::Layout(_))
        ));
    }

    #[test]
    fn snapshot_reports_activation() {
        let mut rng = StdRng::seed_from_u64(9);
        let (space, _) = space(&mut rng);
        let snapshot = space.snapshot();
        assert_eq!(snapshot.particles.len(), 12);
        assert_eq!(snapshot.particles.iter().filter(|p| p.active).count(), 7);
        assert_eq!(snapshot.groups[0].size, 3);
        assert!((snapshot.volume - 27000.0).abs() < 1e-9);
    }
}
