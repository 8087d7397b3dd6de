//! # Core Module
//!
//! Stateless building blocks of the Monte Carlo engine: the particle
//! configuration, the species table, the geometry of the simulation cell and the
//! energy terms.
//!
//! ## Architecture
//!
//! - **Configuration State** ([`models`]) - Particles, groups, changes, topology and reactions
//! - **Energy Calculations** ([`forcefield`]) - Energy terms, pair tables and the Hamiltonian
//! - **Geometry and Statistics** ([`utils`]) - Cell shapes, minimum image, random orientations, running averages
//!
//! Nothing in this layer keeps simulation state between calls; the engine owns
//! the configurations and decides when they change.

pub mod forcefield;
pub mod models;
pub mod utils;
