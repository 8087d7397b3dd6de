use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};
use rand::Rng;
use rand_distr::{Distribution, UnitSphere};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Cell volume must be positive and finite, got {0}")]
    InvalidVolume(f64),
    #[error("Volume scaling method {method:?} is not supported by a {cell} cell")]
    UnsupportedScaling {
        method: VolumeMethod,
        cell: &'static str,
    },
}

/// How a volume change is distributed over the cell axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeMethod {
    /// All three axes are scaled by the same factor.
    #[default]
    Isotropic,
    /// Only x and y are scaled; z is kept fixed.
    Xy,
    /// The xy-plane is scaled while z is compressed to keep the volume constant.
    Isochoric,
}

/// Simulation container and its boundary conditions.
///
/// A cuboid is periodic in all directions and centered at the origin, so wrapped
/// coordinates lie in `[-L/2, L/2)`. A sphere has no periodic images; particles
/// leaving it are penalised by the container-overlap energy term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum Cell {
    Cuboid { lengths: Vector3<f64> },
    Sphere { radius: f64 },
}

impl Cell {
    pub fn cube(side: f64) -> Self {
        Cell::Cuboid {
            lengths: Vector3::repeat(side),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Cell::Cuboid { .. } => "cuboid",
            Cell::Sphere { .. } => "sphere",
        }
    }

    /// Minimum-image vector pointing from `b` to `a`.
    #[inline]
    pub fn boundary_vector(&self, a: &Point3<f64>, b: &Point3<f64>) -> Vector3<f64> {
        let mut d = a - b;
        if let Cell::Cuboid { lengths } = self {
            for i in 0..3 {
                d[i] -= lengths[i] * (d[i] / lengths[i]).round();
            }
        }
        d
    }

    #[inline]
    pub fn sqdist(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        self.boundary_vector(a, b).norm_squared()
    }

    /// Folds a position back into the primary cell.
    #[inline]
    pub fn wrap(&self, p: &mut Point3<f64>) {
        if let Cell::Cuboid { lengths } = self {
            for i in 0..3 {
                p[i] -= lengths[i] * (p[i] / lengths[i]).round();
            }
        }
    }

    pub fn volume(&self) -> f64 {
        match self {
            Cell::Cuboid { lengths } => lengths.x * lengths.y * lengths.z,
            Cell::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
        }
    }

    pub fn is_outside(&self, p: &Point3<f64>) -> bool {
        match self {
            Cell::Cuboid { .. } => false,
            Cell::Sphere { radius } => p.coords.norm_squared() > radius * radius,
        }
    }

    /// Resizes the cell and returns the per-axis factors that positions must be
    /// scaled by to follow it.
    pub fn set_volume(
        &mut self,
        new_volume: f64,
        method: VolumeMethod,
    ) -> Result<Vector3<f64>, GeometryError> {
        if !(new_volume.is_finite() && new_volume > 0.0) {
            return Err(GeometryError::InvalidVolume(new_volume));
        }
        let ratio = new_volume / self.volume();
        let cell_name = self.kind_name();
        match self {
            Cell::Cuboid { lengths } => {
                let scale = match method {
                    VolumeMethod::Isotropic => Vector3::repeat(ratio.cbrt()),
                    VolumeMethod::Xy => {
                        let s = ratio.sqrt();
                        Vector3::new(s, s, 1.0)
                    }
                    VolumeMethod::Isochoric => {
                        let s = ratio.sqrt();
                        Vector3::new(s, s, 1.0 / ratio)
                    }
                };
                lengths.component_mul_assign(&scale);
                Ok(scale)
            }
            Cell::Sphere { radius } => match method {
                VolumeMethod::Isotropic => {
                    let s = ratio.cbrt();
                    *radius *= s;
                    Ok(Vector3::repeat(s))
                }
                other => Err(GeometryError::UnsupportedScaling {
                    method: other,
                    cell: cell_name,
                }),
            },
        }
    }

    /// Uniformly distributed position inside the cell.
    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Point3<f64> {
        match self {
            Cell::Cuboid { lengths } => Point3::new(
                lengths.x * (rng.r#gen::<f64>() - 0.5),
                lengths.y * (rng.r#gen::<f64>() - 0.5),
                lengths.z * (rng.r#gen::<f64>() - 0.5),
            ),
            Cell::Sphere { radius } => loop {
                let p = Point3::new(
                    2.0 * radius * (rng.r#gen::<f64>() - 0.5),
                    2.0 * radius * (rng.r#gen::<f64>() - 0.5),
                    2.0 * radius * (rng.r#gen::<f64>() - 0.5),
                );
                if p.coords.norm_squared() <= radius * radius {
                    break p;
                }
            },
        }
    }
}

/// Mass-weighted center of a set of positions, unwrapped around the first one.
pub fn mass_center(positions: &[Point3<f64>], masses: &[f64], cell: &Cell) -> Option<Point3<f64>> {
    let reference = *positions.first()?;
    let mut weighted = Vector3::zeros();
    let mut total_mass = 0.0;
    for (pos, &mass) in positions.iter().zip(masses) {
        weighted += cell.boundary_vector(pos, &reference) * mass;
        total_mass += mass;
    }
    if total_mass <= 0.0 {
        return None;
    }
    let mut center = reference + weighted / total_mass;
    cell.wrap(&mut center);
    Some(center)
}

pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Unit<Vector3<f64>> {
    let [x, y, z]: [f64; 3] = UnitSphere.sample(rng);
    Unit::new_normalize(Vector3::new(x, y, z))
}

/// Rotation about a random axis by an angle drawn uniformly from
/// `[-max_angle/2, max_angle/2)`.
pub fn random_rotation<R: Rng + ?Sized>(rng: &mut R, max_angle: f64) -> UnitQuaternion<f64> {
    let axis = random_unit_vector(rng);
    let angle = max_angle * (rng.r#gen::<f64>() - 0.5);
    UnitQuaternion::from_axis_angle(&axis, angle)
}
