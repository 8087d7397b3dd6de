use super::reaction::{ReactionData, ReactionSpec};
use nalgebra::Point3;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Unknown species '{0}'")]
    UnknownSpecies(String),
    #[error("Species name '{0}' is defined more than once")]
    DuplicateSpecies(String),
    #[error("Invalid reaction '{reaction}': {reason}")]
    InvalidReaction { reaction: String, reason: String },
    #[error("Invalid molecule '{molecule}': {reason}")]
    InvalidMolecule { molecule: String, reason: String },
}

/// Static properties of an atom kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AtomKind {
    pub name: String,
    /// Molar mass in g/mol.
    #[serde(default = "default_mass")]
    pub mass: f64,
    /// Default charge in elementary charges.
    #[serde(default)]
    pub charge: f64,
    /// Lennard-Jones / hard-sphere diameter in Angstroms.
    #[serde(default)]
    pub sigma: f64,
    /// Lennard-Jones well depth in kJ/mol.
    #[serde(default)]
    pub epsilon: f64,
    /// Translational displacement parameter in Angstroms.
    #[serde(default)]
    pub dp: f64,
    /// Rotational displacement parameter in radians.
    #[serde(default)]
    pub dprot: f64,
    /// Activity in mol/l, used when the kind takes part in reactions.
    #[serde(default)]
    pub activity: f64,
    /// Implicit species are never simulated explicitly; only their activity enters reactions.
    #[serde(default)]
    pub implicit: bool,
}

fn default_mass() -> f64 {
    1.0
}

impl AtomKind {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mass: default_mass(),
            charge: 0.0,
            sigma: 0.0,
            epsilon: 0.0,
            dp: 0.0,
            dprot: 0.0,
            activity: 0.0,
            implicit: false,
        }
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_lennard_jones(mut self, sigma: f64, epsilon: f64) -> Self {
        self.sigma = sigma;
        self.epsilon = epsilon;
        self
    }

    pub fn with_displacement(mut self, dp: f64, dprot: f64) -> Self {
        self.dp = dp;
        self.dprot = dprot;
        self
    }

    pub fn implicit_with_activity(mut self, activity: f64) -> Self {
        self.implicit = true;
        self.activity = activity;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum Bond {
    /// `u = k/2 (r - req)^2`, with `k` in kT/Å² and `req` in Å.
    Harmonic { index: [usize; 2], k: f64, req: f64 },
}

impl Bond {
    pub fn indices(&self) -> [usize; 2] {
        match self {
            Bond::Harmonic { index, .. } => *index,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conformation {
    pub weight: f64,
    pub positions: Vec<Point3<f64>>,
}

/// A molecule kind: either a loose collection of atoms (`atomic`) or a
/// rigid/flexible molecule with a reference structure.
#[derive(Debug, Clone, PartialEq)]
pub struct MoleculeKind {
    pub name: String,
    pub atoms: Vec<usize>,
    pub atomic: bool,
    pub bonds: Vec<Bond>,
    /// Reference positions relative to the molecule's origin.
    pub structure: Vec<Point3<f64>>,
    pub conformations: Vec<Conformation>,
    pub activity: f64,
    pub implicit: bool,
}

impl MoleculeKind {
    pub fn atomic(name: &str, atoms: Vec<usize>) -> Self {
        Self {
            name: name.to_string(),
            atoms,
            atomic: true,
            bonds: Vec::new(),
            structure: Vec::new(),
            conformations: Vec::new(),
            activity: 0.0,
            implicit: false,
        }
    }

    pub fn molecular(name: &str, atoms: Vec<usize>, structure: Vec<Point3<f64>>) -> Self {
        Self {
            name: name.to_string(),
            atoms,
            atomic: false,
            bonds: Vec::new(),
            structure,
            conformations: Vec::new(),
            activity: 0.0,
            implicit: false,
        }
    }

    pub fn with_bonds(mut self, bonds: Vec<Bond>) -> Self {
        self.bonds = bonds;
        self
    }

    pub fn with_conformations(mut self, conformations: Vec<Conformation>) -> Self {
        self.conformations = conformations;
        self
    }

    /// Relative positions of conformation `index`; the reference structure when
    /// no conformation library is defined.
    pub fn conformation(&self, index: usize) -> &[Point3<f64>] {
        self.conformations
            .get(index)
            .map(|c| c.positions.as_slice())
            .unwrap_or(&self.structure)
    }

    pub fn conformation_weights(&self) -> Vec<f64> {
        self.conformations.iter().map(|c| c.weight).collect()
    }

    fn validate(&self) -> Result<(), TopologyError> {
        let fail = |reason: String| TopologyError::InvalidMolecule {
            molecule: self.name.clone(),
            reason,
        };
        if self.atoms.is_empty() {
            return Err(fail("no atoms listed".to_string()));
        }
        if self.implicit && !(self.activity > 0.0) {
            return Err(fail("implicit molecules need a positive activity".to_string()));
        }
        if self.atomic {
            if !self.bonds.is_empty() {
                return Err(fail("atomic molecules cannot have bonds".to_string()));
            }
            return Ok(());
        }
        if self.structure.len() != self.atoms.len() {
            return Err(fail(format!(
                "structure has {} positions for {} atoms",
                self.structure.len(),
                self.atoms.len()
            )));
        }
        for (i, conformation) in self.conformations.iter().enumerate() {
            if conformation.positions.len() != self.atoms.len() {
                return Err(fail(format!("conformation {} has the wrong number of positions", i)));
            }
            if !(conformation.weight.is_finite() && conformation.weight > 0.0) {
                return Err(fail(format!("conformation {} has a non-positive weight", i)));
            }
        }
        for bond in &self.bonds {
            let [a, b] = bond.indices();
            if a == b || a >= self.atoms.len() || b >= self.atoms.len() {
                return Err(fail(format!("bond {:?} is out of range", bond.indices())));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConformation {
    #[serde(default = "default_weight")]
    weight: f64,
    positions: Vec<[f64; 3]>,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMolecule {
    name: String,
    atoms: Vec<String>,
    #[serde(default)]
    atomic: bool,
    #[serde(default)]
    bonds: Vec<Bond>,
    #[serde(default)]
    structure: Vec<[f64; 3]>,
    #[serde(default)]
    conformations: Vec<RawConformation>,
    #[serde(default)]
    activity: f64,
    #[serde(default)]
    implicit: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTopology {
    #[serde(default)]
    atoms: Vec<AtomKind>,
    #[serde(default)]
    molecules: Vec<RawMolecule>,
    #[serde(default)]
    reactions: Vec<ReactionSpec>,
}

fn to_point(p: &[f64; 3]) -> Point3<f64> {
    Point3::new(p[0], p[1], p[2])
}

/// Species table: atom kinds, molecule kinds and the reactions between them.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    atoms: Vec<AtomKind>,
    molecules: Vec<MoleculeKind>,
    reactions: Vec<ReactionData>,
    atom_index: HashMap<String, usize>,
    molecule_index: HashMap<String, usize>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let content = std::fs::read_to_string(path).map_err(|e| TopologyError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.to_string_lossy())
    }

    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, TopologyError> {
        let raw: RawTopology = toml::from_str(content).map_err(|e| TopologyError::Toml {
            path: origin.to_string(),
            source: e,
        })?;

        let mut topology = Self::new();
        for atom in raw.atoms {
            topology.add_atom(atom)?;
        }
        for raw_molecule in raw.molecules {
            let atoms = raw_molecule
                .atoms
                .iter()
                .map(|name| {
                    topology
                        .find_atom(name)
                        .ok_or_else(|| TopologyError::UnknownSpecies(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let mut structure: Vec<Point3<f64>> = raw_molecule.structure.iter().map(to_point).collect();
            if structure.is_empty() && !raw_molecule.atomic && atoms.len() == 1 {
                structure.push(Point3::origin());
            }
            let molecule = MoleculeKind {
                name: raw_molecule.name,
                atoms,
                atomic: raw_molecule.atomic,
                bonds: raw_molecule.bonds,
                structure,
                conformations: raw_molecule
                    .conformations
                    .iter()
                    .map(|c| Conformation {
                        weight: c.weight,
                        positions: c.positions.iter().map(to_point).collect(),
                    })
                    .collect(),
                activity: raw_molecule.activity,
                implicit: raw_molecule.implicit,
            };
            topology.add_molecule(molecule)?;
        }
        for spec in &raw.reactions {
            topology.add_reaction(spec)?;
        }
        Ok(topology)
    }

    pub fn add_atom(&mut self, atom: AtomKind) -> Result<usize, TopologyError> {
        if self.atom_index.contains_key(&atom.name) {
            return Err(TopologyError::DuplicateSpecies(atom.name));
        }
        if atom.implicit && !(atom.activity > 0.0) {
            return Err(TopologyError::InvalidMolecule {
                molecule: atom.name,
                reason: "implicit atoms need a positive activity".to_string(),
            });
        }
        let id = self.atoms.len();
        self.atom_index.insert(atom.name.clone(), id);
        self.atoms.push(atom);
        Ok(id)
    }

    pub fn add_molecule(&mut self, molecule: MoleculeKind) -> Result<usize, TopologyError> {
        if self.molecule_index.contains_key(&molecule.name) {
            return Err(TopologyError::DuplicateSpecies(molecule.name));
        }
        if let Some(&bad) = molecule.atoms.iter().find(|&&a| a >= self.atoms.len()) {
            return Err(TopologyError::InvalidMolecule {
                molecule: molecule.name,
                reason: format!("atom id {} does not exist", bad),
            });
        }
        molecule.validate()?;
        let id = self.molecules.len();
        self.molecule_index.insert(molecule.name.clone(), id);
        self.molecules.push(molecule);
        Ok(id)
    }

    pub fn add_reaction(&mut self, spec: &ReactionSpec) -> Result<usize, TopologyError> {
        let reaction = ReactionData::from_spec(spec, self)?;
        self.reactions.push(reaction);
        Ok(self.reactions.len() - 1)
    }

    pub fn atoms(&self) -> &[AtomKind] {
        &self.atoms
    }

    pub fn molecules(&self) -> &[MoleculeKind] {
        &self.molecules
    }

    pub fn reactions(&self) -> &[ReactionData] {
        &self.reactions
    }

    pub fn atom(&self, id: usize) -> Option<&AtomKind> {
        self.atoms.get(id)
    }

    pub fn molecule(&self, id: usize) -> Option<&MoleculeKind> {
        self.molecules.get(id)
    }

    pub fn find_atom(&self, name: &str) -> Option<usize> {
        self.atom_index.get(name).copied()
    }

    pub fn find_molecule(&self, name: &str) -> Option<usize> {
        self.molecule_index.get(name).copied()
    }

    /// The atomic molecule kind that stores explicit particles of `atom`.
    pub fn atomic_molecule_for(&self, atom: usize) -> Option<usize> {
        self.molecules
            .iter()
            .position(|m| m.atomic && m.atoms.contains(&atom))
    }

    pub fn masses(&self, molecule: usize) -> Vec<f64> {
        self.molecules
            .get(molecule)
            .map(|m| m.atoms.iter().map(|&a| self.atoms[a].mass).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TOPOLOGY: &str = r#"
        [[atoms]]
        name = "Na"
        mass = 22.99
        charge = 1.0
        sigma = 3.0
        epsilon = 0.5
        dp = 1.0

        [[atoms]]
        name = "Cl"
        mass = 35.45
        charge = -1.0
        sigma = 4.0

        [[atoms]]
        name = "O"
        sigma = 2.0

        [[atoms]]
        name = "H"
        implicit = true
        activity = 1e-7

        [[molecules]]
        name = "salt"
        atoms = ["Na", "Cl"]
        atomic = true

        [[molecules]]
        name = "dimer"
        atoms = ["O", "O"]
        structure = [[0.0, 0.0, 0.0], [1.5, 0.0, 0.0]]
        bonds = [{ type = "harmonic", index = [0, 1], k = 10.0, req = 1.5 }]
        conformations = [
            { weight = 2.0, positions = [[0.0, 0.0, 0.0], [1.5, 0.0, 0.0]] },
            { positions = [[0.0, 0.0, 0.0], [0.0, 1.5, 0.0]] },
        ]

        [[reactions]]
        equation = "Na = Cl"
        ln_k = 1.0
    "#;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_resolves_names_to_ids() {
        let file = write_temp(TOPOLOGY);
        let topology = Topology::load(file.path()).unwrap();

        assert_eq!(topology.atoms().len(), 4);
        assert_eq!(topology.find_atom("Cl"), Some(1));
        let dimer = topology.find_molecule("dimer").unwrap();
        let kind = topology.molecule(dimer).unwrap();
        assert_eq!(kind.atoms, vec![2, 2]);
        assert_eq!(kind.bonds.len(), 1);
        assert_eq!(kind.conformation_weights(), vec![2.0, 1.0]);
        assert_eq!(kind.conformation(1)[1], Point3::new(0.0, 1.5, 0.0));
        assert_eq!(topology.reactions().len(), 1);
    }

    #[test]
    fn atomic_molecule_lookup_finds_the_storing_group_kind() {
        let topology = Topology::from_toml_str(TOPOLOGY, "inline").unwrap();
        let na = topology.find_atom("Na").unwrap();
        assert_eq!(topology.atomic_molecule_for(na), topology.find_molecule("salt"));
        let o = topology.find_atom("O").unwrap();
        assert_eq!(topology.atomic_molecule_for(o), None);
    }

    #[test]
    fn masses_follow_atom_order() {
        let topology = Topology::from_toml_str(TOPOLOGY, "inline").unwrap();
        let salt = topology.find_molecule("salt").unwrap();
        assert_eq!(topology.masses(salt), vec![22.99, 35.45]);
    }

    #[test]
    fn single_atom_molecule_gets_an_origin_structure() {
        let content = r#"
            [[atoms]]
            name = "A"
            [[molecules]]
            name = "mono"
            atoms = ["A"]
        "#;
        let topology = Topology::from_toml_str(content, "inline").unwrap();
        assert_eq!(topology.molecule(0).unwrap().structure, vec![Point3::origin()]);
    }

    #[test]
    fn unknown_atom_in_molecule_is_an_error() {
        let content = r#"
            [[molecules]]
            name = "ghost"
            atoms = ["X"]
            atomic = true
        "#;
        let result = Topology::from_toml_str(content, "inline");
        assert!(matches!(result, Err(TopologyError::UnknownSpecies(name)) if name == "X"));
    }

    #[test]
    fn structure_size_mismatch_is_rejected() {
        let content = r#"
            [[atoms]]
            name = "A"
            [[molecules]]
            name = "pair"
            atoms = ["A", "A"]
            structure = [[0.0, 0.0, 0.0]]
        "#;
        assert!(matches!(
            Topology::from_toml_str(content, "inline"),
            Err(TopologyError::InvalidMolecule { .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut topology = Topology::new();
        topology.add_atom(AtomKind::new("A")).unwrap();
        assert!(matches!(
            topology.add_atom(AtomKind::new("A")),
            Err(TopologyError::DuplicateSpecies(_))
        ));
    }

    #[test]
    fn implicit_atom_without_activity_is_rejected() {
        let mut topology = Topology::new();
        let mut atom = AtomKind::new("H");
        atom.implicit = true;
        assert!(topology.add_atom(atom).is_err());
    }

    #[test]
    fn malformed_toml_reports_origin() {
        let err = Topology::from_toml_str("[[atoms]\nname=", "broken.toml").unwrap_err();
        assert!(matches!(err, TopologyError::Toml { path, .. } if path == "broken.toml"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Topology::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, TopologyError::Io { .. }));
    }
}
