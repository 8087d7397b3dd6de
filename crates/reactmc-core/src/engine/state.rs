use crate::core::forcefield::params::SystemTables;
use crate::core::forcefield::term::{Hamiltonian, TermEnergy};
use crate::core::models::change::Change;
use crate::core::models::space::Space;

/// A configuration together with the Hamiltonian that scores it.
///
/// The driver keeps two of these, the accepted copy and the trial copy, and
/// moves only ever mutate the trial.
#[derive(Debug, Clone)]
pub struct State {
    pub space: Space,
    pub hamiltonian: Hamiltonian,
}

impl State {
    pub fn new(space: Space, hamiltonian: Hamiltonian) -> Self {
        Self { space, hamiltonian }
    }

    /// Energy of the region named by `change`, in kT.
    pub fn energy(&self, tables: &SystemTables, change: &Change) -> f64 {
        self.hamiltonian.energy(&self.space, tables, change)
    }

    pub fn energy_full(&self, tables: &SystemTables) -> f64 {
        self.hamiltonian.energy_full(&self.space, tables)
    }

    pub fn breakdown(&self, tables: &SystemTables) -> Vec<TermEnergy> {
        self.hamiltonian.breakdown(&self.space, tables)
    }

    /// Copies the configuration region named by `change` from `other`.
    pub fn sync_from(&mut self, other: &State, change: &Change) {
        self.space.sync_from(&other.space, change);
    }
}
