use super::topology::{Topology, TopologyError};
use serde::Deserialize;
use std::f64::consts::LN_10;

/// One mol/l expressed as a number density in Å⁻³.
pub const MOLAR: f64 = 6.02214076e-4;

/// Reaction entry as written in a topology file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactionSpec {
    /// Equation such as `"HA = H + A"`; either side may be empty.
    pub equation: String,
    #[serde(default)]
    pub ln_k: Option<f64>,
    #[serde(default)]
    pub pk: Option<f64>,
    #[serde(default)]
    pub canonic: bool,
    #[serde(default)]
    pub reservoir: i64,
    #[serde(default)]
    pub swap: bool,
}

impl ReactionSpec {
    pub fn new(equation: &str, ln_k: f64) -> Self {
        Self {
            equation: equation.to_string(),
            ln_k: Some(ln_k),
            pk: None,
            canonic: false,
            reservoir: 0,
            swap: false,
        }
    }

    pub fn swap(mut self) -> Self {
        self.swap = true;
        self
    }

    pub fn canonic(mut self, reservoir: i64) -> Self {
        self.canonic = true;
        self.reservoir = reservoir;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Participant {
    /// Explicit atoms stored in the dedicated atomic group of their kind.
    Atom(usize),
    /// Whole molecules; for atomic molecule kinds one unit is one particle slot.
    Molecule(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A reversible reaction between explicit species.
///
/// `ln_k` already contains the activities of implicit species (as number
/// densities), so only the explicit participants are listed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionData {
    pub name: String,
    pub ln_k: f64,
    pub reactants: Vec<(Participant, usize)>,
    pub products: Vec<(Participant, usize)>,
    pub swap: bool,
    pub canonic: bool,
    pub reservoir: i64,
}

impl ReactionData {
    pub fn from_spec(spec: &ReactionSpec, topology: &Topology) -> Result<Self, TopologyError> {
        let name = spec.equation.trim().to_string();
        let fail = |reason: &str| TopologyError::InvalidReaction {
            reaction: name.clone(),
            reason: reason.to_string(),
        };

        let mut ln_k = match (spec.ln_k, spec.pk) {
            (Some(ln_k), None) => ln_k,
            (None, Some(pk)) => -pk * LN_10,
            (Some(_), Some(_)) => return Err(fail("give either ln_k or pk, not both")),
            (None, None) => return Err(fail("an equilibrium constant (ln_k or pk) is required")),
        };
        if !ln_k.is_finite() {
            return Err(fail("equilibrium constant must be finite"));
        }

        let (left, right) = name
            .split_once('=')
            .ok_or_else(|| fail("expected '=' between reactants and products"))?;
        let mut reactants = Vec::new();
        let mut products = Vec::new();
        for (side, sign, out) in [(left, 1.0, &mut reactants), (right, -1.0, &mut products)] {
            for (species, count) in parse_side(side).map_err(|reason| fail(&reason))? {
                match resolve(&species, spec.swap, topology)? {
                    Resolved::Implicit(activity) => {
                        ln_k += sign * count as f64 * (activity * MOLAR).ln()
                    }
                    Resolved::Explicit(participant) => merge(out, participant, count),
                }
            }
        }

        if reactants.is_empty() && products.is_empty() {
            return Err(fail("reaction has no explicit species"));
        }
        if spec.swap {
            let single_atom = |list: &[(Participant, usize)]| {
                matches!(list, [(Participant::Atom(_), 1)])
            };
            if !(single_atom(&reactants) && single_atom(&products)) {
                return Err(fail("swap reactions need exactly one explicit atom on each side"));
            }
        } else {
            for &(participant, _) in reactants.iter().chain(&products) {
                if let Participant::Atom(atom) = participant {
                    if topology.atomic_molecule_for(atom).is_none() {
                        return Err(fail(&format!(
                            "atom '{}' is not stored in any atomic molecule",
                            topology.atoms()[atom].name
                        )));
                    }
                }
            }
        }

        Ok(Self {
            name,
            ln_k,
            reactants,
            products,
            swap: spec.swap,
            canonic: spec.canonic,
            reservoir: spec.reservoir,
        })
    }

    pub fn to_add(&self, direction: Direction) -> &[(Participant, usize)] {
        match direction {
            Direction::Forward => &self.products,
            Direction::Backward => &self.reactants,
        }
    }

    pub fn to_remove(&self, direction: Direction) -> &[(Participant, usize)] {
        match direction {
            Direction::Forward => &self.reactants,
            Direction::Backward => &self.products,
        }
    }

    /// `ln K` seen from the given direction.
    pub fn ln_k(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Forward => self.ln_k,
            Direction::Backward => -self.ln_k,
        }
    }

    /// A canonic reaction cannot proceed forward once its reservoir is empty.
    pub fn is_exhausted(&self, direction: Direction) -> bool {
        self.canonic && direction == Direction::Forward && self.reservoir <= 0
    }

    pub fn record_accepted(&mut self, direction: Direction) -> Result<(), String> {
        self.reservoir += match direction {
            Direction::Forward => -1,
            Direction::Backward => 1,
        };
        if self.canonic && self.reservoir < 0 {
            return Err(format!(
                "reservoir of reaction '{}' became negative ({})",
                self.name, self.reservoir
            ));
        }
        Ok(())
    }
}

enum Resolved {
    Explicit(Participant),
    Implicit(f64),
}

fn resolve(name: &str, swap: bool, topology: &Topology) -> Result<Resolved, TopologyError> {
    let as_atom = || {
        topology.find_atom(name).map(|id| {
            let atom = &topology.atoms()[id];
            if atom.implicit {
                Resolved::Implicit(atom.activity)
            } else {
                Resolved::Explicit(Participant::Atom(id))
            }
        })
    };
    let as_molecule = || {
        topology.find_molecule(name).map(|id| {
            let molecule = &topology.molecules()[id];
            if molecule.implicit {
                Resolved::Implicit(molecule.activity)
            } else {
                Resolved::Explicit(Participant::Molecule(id))
            }
        })
    };
    let resolved = if swap {
        as_atom().or_else(as_molecule)
    } else {
        as_molecule().or_else(as_atom)
    };
    resolved.ok_or_else(|| TopologyError::UnknownSpecies(name.to_string()))
}

fn merge(list: &mut Vec<(Participant, usize)>, participant: Participant, count: usize) {
    match list.iter_mut().find(|(p, _)| *p == participant) {
        Some((_, n)) => *n += count,
        None => list.push((participant, count)),
    }
}

fn parse_side(side: &str) -> Result<Vec<(String, usize)>, String> {
    let side = side.trim();
    if side.is_empty() || side == "∅" {
        return Ok(Vec::new());
    }
    side.split('+')
        .map(|term| {
            let parts: Vec<&str> = term.split_whitespace().collect();
            match parts.as_slice() {
                [species] => Ok((species.to_string(), 1)),
                [count, species] => count
                    .parse::<usize>()
                    .ok()
                    .filter(|&n| n > 0)
                    .map(|n| (species.to_string(), n))
                    .ok_or_else(|| format!("invalid stoichiometric coefficient '{}'", count)),
                _ => Err(format!("cannot parse term '{}'", term.trim())),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::topology::{AtomKind, MoleculeKind};
    use nalgebra::Point3;

    fn topology() -> Topology {
        let mut topology = Topology::new();
        let a = topology.add_atom(AtomKind::new("A")).unwrap();
        topology
            .add_atom(AtomKind::new("H").implicit_with_activity(1e-7))
            .unwrap();
        let b = topology.add_atom(AtomKind::new("B")).unwrap();
        let c = topology.add_atom(AtomKind::new("C")).unwrap();
        topology
            .add_molecule(MoleculeKind::atomic("ions", vec![a, b]))
            .unwrap();
        topology
            .add_molecule(MoleculeKind::molecular("HA", vec![c], vec![Point3::origin()]))
            .unwrap();
        topology
    }

    #[test]
    fn parses_molecules_atoms_and_implicit_species() {
        let topology = topology();
        let reaction = ReactionData::from_spec(&ReactionSpec::new("HA = H + A", 2.0), &topology).unwrap();
        let ha = topology.find_molecule("HA").unwrap();
        let a = topology.find_atom("A").unwrap();
        assert_eq!(reaction.reactants, vec![(Participant::Molecule(ha), 1)]);
        assert_eq!(reaction.products, vec![(Participant::Atom(a), 1)]);
        assert!((reaction.ln_k - (2.0 - (1e-7 * MOLAR).ln())).abs() < 1e-12);
    }

    #[test]
    fn implicit_reactant_activity_is_added() {
        let topology = topology();
        let reaction = ReactionData::from_spec(&ReactionSpec::new("H + A = HA", 0.0), &topology).unwrap();
        assert!((reaction.ln_k - (1e-7 * MOLAR).ln()).abs() < 1e-12);
    }

    #[test]
    fn pk_is_converted_to_ln_k() {
        let topology = topology();
        let mut spec = ReactionSpec::new("HA = A", 0.0);
        spec.ln_k = None;
        spec.pk = Some(4.0);
        let reaction = ReactionData::from_spec(&spec, &topology).unwrap();
        assert!((reaction.ln_k + 4.0 * LN_10).abs() < 1e-12);
    }

    #[test]
    fn stoichiometric_coefficients_are_merged() {
        let topology = topology();
        let reaction = ReactionData::from_spec(&ReactionSpec::new("2 A + A = HA", 0.0), &topology).unwrap();
        assert_eq!(reaction.reactants.len(), 1);
        assert_eq!(reaction.reactants[0].1, 3);
    }

    #[test]
    fn empty_side_is_allowed() {
        let topology = topology();
        let reaction = ReactionData::from_spec(&ReactionSpec::new("A = ", 0.0), &topology).unwrap();
        assert!(reaction.products.is_empty());
        assert_eq!(reaction.to_remove(Direction::Forward).len(), 1);
        assert!(reaction.to_add(Direction::Forward).is_empty());
        assert_eq!(reaction.to_add(Direction::Backward).len(), 1);
    }

    #[test]
    fn unknown_species_is_reported() {
        let topology = topology();
        let err = ReactionData::from_spec(&ReactionSpec::new("A = Z", 0.0), &topology).unwrap_err();
        assert!(matches!(err, TopologyError::UnknownSpecies(name) if name == "Z"));
    }

    #[test]
    fn swap_requires_single_atoms() {
        let topology = topology();
        assert!(ReactionData::from_spec(&ReactionSpec::new("A = B", 0.0).swap(), &topology).is_ok());
        let err = ReactionData::from_spec(&ReactionSpec::new("A = B + B", 0.0).swap(), &topology);
        assert!(matches!(err, Err(TopologyError::InvalidReaction { .. })));
    }

    #[test]
    fn atom_without_atomic_group_is_rejected() {
        let topology = topology();
        let err = ReactionData::from_spec(&ReactionSpec::new("C = A", 0.0), &topology);
        assert!(matches!(err, Err(TopologyError::InvalidReaction { .. })));
    }

    #[test]
    fn missing_or_duplicate_constant_is_rejected() {
        let topology = topology();
        let mut spec = ReactionSpec::new("A = B", 0.0);
        spec.pk = Some(1.0);
        assert!(ReactionData::from_spec(&spec, &topology).is_err());
        spec.ln_k = None;
        spec.pk = None;
        assert!(ReactionData::from_spec(&spec, &topology).is_err());
    }

    #[test]
    fn canonic_reservoir_blocks_forward_when_empty() {
        let topology = topology();
        let spec = ReactionSpec::new("A = B", 0.0).canonic(1);
        let mut reaction = ReactionData::from_spec(&spec, &topology).unwrap();
        assert!(!reaction.is_exhausted(Direction::Forward));
        reaction.record_accepted(Direction::Forward).unwrap();
        assert!(reaction.is_exhausted(Direction::Forward));
        assert!(!reaction.is_exhausted(Direction::Backward));
        assert!(reaction.record_accepted(Direction::Forward).is_err());
    }

    #[test]
    fn direction_flips_sign_of_ln_k() {
        let topology = topology();
        let reaction = ReactionData::from_spec(&ReactionSpec::new("A = B", 1.5), &topology).unwrap();
        assert_eq!(reaction.ln_k(Direction::Forward), 1.5);
        assert_eq!(reaction.ln_k(Direction::Backward), -1.5);
    }
}
