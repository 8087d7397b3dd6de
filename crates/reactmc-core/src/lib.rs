//! # reactmc Core Library
//!
//! A Metropolis Monte Carlo engine for molecular systems with incremental
//! energy evaluation, reaction-ensemble moves and replica exchange.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture with a clear separation of concerns:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Space`, `Group`,
//!   `Change`, `Topology`), geometry and the Hamiltonian with its energy terms.
//!
//! - **[`engine`]: The Logic Core.** The stateful sampling layer: the accepted
//!   and trial configurations, the move catalogue, the weighted propagator,
//!   the acceptance loop and the links between replicas.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together to
//!   run a single simulation or a set of tempered replicas from a configuration.
//!
//! Energies are reduced by the thermal energy (kT) throughout; lengths are in
//! Angstroms.

pub mod core;
pub mod engine;
pub mod workflows;
