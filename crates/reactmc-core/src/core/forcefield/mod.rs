//! # Force Field Module
//!
//! Energy evaluation for Monte Carlo moves. Every energy term consumes a
//! [`Change`](crate::core::models::change::Change) and returns the energy of the
//! region it names, so the cost of evaluating a move scales with what the move
//! touched rather than with the system size.
//!
//! ## Overview
//!
//! All energies are in units of kT. The thermodynamic conditions (temperature
//! and relative permittivity) are folded into the interaction constants when the
//! parameter tables are built, which means two replicas at different
//! temperatures have different Hamiltonians even if their terms are identical.
//!
//! The terms shipped here are deliberately simple:
//!
//! - **Pair interactions** - Lennard-Jones, plain Coulomb through the Bjerrum length, hard spheres
//! - **Bonds** - Harmonic bonds inside molecular groups
//! - **External terms** - Isobaric `PV` work and container overlap for non-periodic cells
//!
//! ## Key Components
//!
//! - [`term`] - The [`term::EnergyTerm`] trait and the [`term::Hamiltonian`] that sums terms
//! - [`params`] - Conditions, Lorentz-Berthelot pair tables and the arena that owns them
//! - [`nonbonded`] - Pairwise interactions between active particles
//! - [`bonded`] - Harmonic bond energy of molecular groups
//! - [`external`] - Pressure and container terms
//!
//! ## Usage
//!
//! ```ignore
//! use reactmc::core::forcefield::{nonbonded::*, params::SystemTables, term::Hamiltonian};
//!
//! let mut tables = SystemTables::new(topology, conditions);
//! let table = tables.add_mixed_table();
//! let mut hamiltonian = Hamiltonian::new();
//! hamiltonian.push(Box::new(Nonbonded::new(table, PairPotential::LennardJones, None)));
//! let du = hamiltonian.energy(&trial, &tables, &change) - hamiltonian.energy(&old, &tables, &change);
//! ```

pub mod bonded;
pub mod external;
pub mod nonbonded;
pub mod params;
pub(crate) mod potentials;
pub mod term;
