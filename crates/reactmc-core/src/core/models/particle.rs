use super::topology::AtomKind;
use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Orientation-dependent attributes carried by anisotropic particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleExtension {
    /// Point dipole moment in e·Å.
    pub dipole: Vector3<f64>,
    /// Traceless quadrupole moment in e·Å².
    pub quadrupole: Matrix3<f64>,
}

impl ParticleExtension {
    pub fn rotate(&mut self, q: &UnitQuaternion<f64>) {
        self.dipole = q * self.dipole;
        let r = q.to_rotation_matrix();
        self.quadrupole = r.matrix() * self.quadrupole * r.matrix().transpose();
    }
}

/// A single interaction site.
///
/// A particle is owned by exactly one group and lives in a fixed storage slot of
/// the [`Space`](super::space::Space); whether it takes part in the simulation is
/// decided by the owning group's active size, not by the particle itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Index of the atom kind in the topology.
    pub kind: usize,
    /// Position in Angstroms.
    pub pos: Point3<f64>,
    /// Charge in elementary charge units.
    pub charge: f64,
    /// Optional anisotropic properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<Box<ParticleExtension>>,
}

impl Particle {
    pub fn new(kind: usize, pos: Point3<f64>, charge: f64) -> Self {
        Self {
            kind,
            pos,
            charge,
            ext: None,
        }
    }

    /// Creates a particle carrying the default properties of an atom kind.
    pub fn from_kind(kind_id: usize, kind: &AtomKind, pos: Point3<f64>) -> Self {
        Self::new(kind_id, pos, kind.charge)
    }

    /// Replaces the identity of the particle while keeping its position.
    pub fn relabel(&mut self, kind_id: usize, kind: &AtomKind) {
        self.kind = kind_id;
        self.charge = kind.charge;
        self.ext = None;
    }

    pub fn rotate(&mut self, q: &UnitQuaternion<f64>) {
        if let Some(ext) = self.ext.as_mut() {
            ext.rotate(q);
        }
    }
}
