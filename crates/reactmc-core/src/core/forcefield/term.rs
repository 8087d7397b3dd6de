use super::params::SystemTables;
use crate::core::models::change::Change;
use crate::core::models::space::Space;
use serde::Serialize;
use std::fmt::Debug;

/// A contribution to the Hamiltonian evaluated over the region named by a [`Change`].
///
/// For a partial change the returned value only has to contain the interactions
/// involving the touched particles, but evaluating the same change on the
/// accepted and on the trial configuration must give the same difference as a
/// full recomputation. Global changes (`everything` or a volume change) must be
/// evaluated over the whole system. Forbidden configurations return
/// `f64::INFINITY`.
pub trait EnergyTerm: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn energy(&self, space: &Space, tables: &SystemTables, change: &Change) -> f64;

    /// Whether every parameter table the term refers to exists in `tables`.
    fn is_compatible(&self, _tables: &SystemTables) -> bool {
        true
    }

    fn box_clone(&self) -> Box<dyn EnergyTerm>;
}

impl Clone for Box<dyn EnergyTerm> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermEnergy {
    pub name: String,
    pub energy: f64,
}

/// Ordered sum of energy terms.
#[derive(Debug, Clone, Default)]
pub struct Hamiltonian {
    terms: Vec<Box<dyn EnergyTerm>>,
}

impl Hamiltonian {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, term: Box<dyn EnergyTerm>) {
        self.terms.push(term);
    }

    pub fn terms(&self) -> &[Box<dyn EnergyTerm>] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Energy of the region named by `change`; exactly zero for an empty change.
    pub fn energy(&self, space: &Space, tables: &SystemTables, change: &Change) -> f64 {
        if change.is_empty() {
            return 0.0;
        }
        let mut total = 0.0;
        for term in &self.terms {
            total += term.energy(space, tables, change);
            if total == f64::INFINITY {
                break;
            }
        }
        total
    }

    /// Name of the first term whose parameter tables are missing from `tables`.
    pub fn incompatible_term(&self, tables: &SystemTables) -> Option<&str> {
        self.terms
            .iter()
            .find(|term| !term.is_compatible(tables))
            .map(|term| term.name())
    }

    pub fn energy_full(&self, space: &Space, tables: &SystemTables) -> f64 {
        self.energy(space, tables, &Change::everything())
    }

    /// Per-term contributions of the full system.
    pub fn breakdown(&self, space: &Space, tables: &SystemTables) -> Vec<TermEnergy> {
        let everything = Change::everything();
        self.terms
            .iter()
            .map(|term| TermEnergy {
                name: term.name().to_string(),
                energy: term.energy(space, tables, &everything),
            })
            .collect()
    }
}
