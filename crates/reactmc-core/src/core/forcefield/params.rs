use crate::core::models::topology::{AtomKind, Topology};
use serde::{Deserialize, Serialize};

/// Molar gas constant in kJ/(mol·K).
pub const GAS_CONSTANT: f64 = 8.314_462_618e-3;
/// `e² / (4π ε0 kB)` in Å·K; divided by `εr T` it gives the Bjerrum length.
const BJERRUM_NUMERATOR: f64 = 167_101.0;

/// Thermodynamic conditions folded into every interaction constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    /// Temperature in Kelvin.
    pub temperature: f64,
    pub relative_permittivity: f64,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            temperature: 298.15,
            relative_permittivity: 78.4,
        }
    }
}

impl Conditions {
    /// Bjerrum length in Angstroms.
    pub fn bjerrum_length(&self) -> f64 {
        BJERRUM_NUMERATOR / (self.relative_permittivity * self.temperature)
    }

    /// `RT` in kJ/mol.
    pub fn thermal_energy(&self) -> f64 {
        GAS_CONSTANT * self.temperature
    }
}

/// Mixed parameters for one pair of atom kinds, in reduced units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PairParams {
    /// Squared mixed diameter in Å².
    pub sigma_sq: f64,
    /// Four times the mixed well depth in kT.
    pub epsilon4: f64,
}

/// Dense symmetric matrix of pair parameters indexed by atom kind.
#[derive(Debug, Clone, PartialEq)]
pub struct PairMatrix {
    size: usize,
    data: Vec<PairParams>,
}

impl PairMatrix {
    /// Lorentz-Berthelot mixing: arithmetic mean of diameters, geometric mean
    /// of well depths. Well depths are converted from kJ/mol to kT.
    pub fn lorentz_berthelot(atoms: &[AtomKind], conditions: &Conditions) -> Self {
        let size = atoms.len();
        let rt = conditions.thermal_energy();
        let mut data = vec![PairParams::default(); size * size];
        for (i, a) in atoms.iter().enumerate() {
            for (j, b) in atoms.iter().enumerate() {
                let sigma = 0.5 * (a.sigma + b.sigma);
                let epsilon = (a.epsilon * b.epsilon).sqrt() / rt;
                data[i * size + j] = PairParams {
                    sigma_sq: sigma * sigma,
                    epsilon4: 4.0 * epsilon,
                };
            }
        }
        Self { size, data }
    }

    #[inline]
    pub fn get(&self, a: usize, b: usize) -> PairParams {
        self.data[a * self.size + b]
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Handle to a table stored in a [`ParameterArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairTableId(usize);

/// Owner of all pair-parameter tables; energy terms refer to tables by handle,
/// so cloning a term never duplicates a table.
#[derive(Debug, Clone, Default)]
pub struct ParameterArena {
    tables: Vec<PairMatrix>,
}

impl ParameterArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: PairMatrix) -> PairTableId {
        self.tables.push(table);
        PairTableId(self.tables.len() - 1)
    }

    pub fn get(&self, id: PairTableId) -> Option<&PairMatrix> {
        self.tables.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Read-only tables shared by energy terms and moves.
#[derive(Debug, Clone)]
pub struct SystemTables {
    pub topology: Topology,
    pub parameters: ParameterArena,
    pub conditions: Conditions,
}

impl SystemTables {
    pub fn new(topology: Topology, conditions: Conditions) -> Self {
        Self {
            topology,
            parameters: ParameterArena::new(),
            conditions,
        }
    }

    /// Registers a Lorentz-Berthelot table for the current topology.
    pub fn add_mixed_table(&mut self) -> PairTableId {
        let table = PairMatrix::lorentz_berthelot(self.topology.atoms(), &self.conditions);
        self.parameters.insert(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn bjerrum_length_in_water_at_room_temperature() {
        let lb = Conditions::default().bjerrum_length();
        assert!((lb - 7.1487).abs() < 1e-3);
    }

    #[test]
    fn lorentz_berthelot_mixes_symmetrically() {
        let atoms = vec![
            AtomKind::new("A").with_lennard_jones(2.0, 1.0),
            AtomKind::new("B").with_lennard_jones(4.0, 4.0),
        ];
        let conditions = Conditions::default();
        let table = PairMatrix::lorentz_berthelot(&atoms, &conditions);
        let ab = table.get(0, 1);
        assert_eq!(ab, table.get(1, 0));
        assert!((ab.sigma_sq - 9.0).abs() < TOLERANCE);
        assert!((ab.epsilon4 - 8.0 / conditions.thermal_energy()).abs() < TOLERANCE);
    }

    #[test]
    fn temperature_is_folded_into_well_depths() {
        let atoms = vec![AtomKind::new("A").with_lennard_jones(1.0, 1.0)];
        let cold = Conditions {
            temperature: 150.0,
            ..Default::default()
        };
        let hot = Conditions {
            temperature: 300.0,
            ..Default::default()
        };
        let cold = PairMatrix::lorentz_berthelot(&atoms, &cold).get(0, 0);
        let hot = PairMatrix::lorentz_berthelot(&atoms, &hot).get(0, 0);
        assert!((cold.epsilon4 - 2.0 * hot.epsilon4).abs() < TOLERANCE);
    }

    #[test]
    fn arena_hands_out_stable_ids() {
        let mut arena = ParameterArena::new();
        let atoms = vec![AtomKind::new("A")];
        let first = arena.insert(PairMatrix::lorentz_berthelot(&atoms, &Conditions::default()));
        let second = arena.insert(PairMatrix::lorentz_berthelot(&[], &Conditions::default()));
        assert_ne!(first, second);
        assert_eq!(arena.get(first).unwrap().len(), 1);
        assert!(arena.get(second).unwrap().is_empty());
    }
}
