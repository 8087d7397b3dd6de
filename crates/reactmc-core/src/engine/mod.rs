//! # Engine Module
//!
//! This module implements the Metropolis Monte Carlo engine: the acceptance
//! loop over an accepted and a trial configuration, the move catalogue, the
//! weighted propagator and replica exchange between simulations.
//!
//! ## Overview
//!
//! Every step draws one move from the [`propagator`], lets it perturb the
//! trial copy and describe the touched region as a
//! [`Change`](crate::core::models::change::Change). The energy difference is
//! evaluated over that region only, combined with the move's bias and decided
//! with the Metropolis criterion. The same `Change` then copies the region in
//! the accepted direction, so both copies agree after every step.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Typed simulation settings and their builder
//! - **State** ([`state`]) - A configuration paired with its Hamiltonian
//! - **Moves** ([`moves`]) - The move protocol and every concrete move
//! - **Propagator** ([`propagator`]) - Weighted random choice of the next move
//! - **Driver** ([`simulation`]) - The acceptance loop, drift tracking and reports
//! - **Replicas** ([`replica`]) - Links between simulations and the exchange payload
//! - **Progress Monitoring** ([`progress`]) - Progress events for front ends
//! - **Error Handling** ([`error`]) - Engine-specific error types
//!
//! ## Key Capabilities
//!
//! - **Incremental energies** restricted to the particles a move touched
//! - **Reaction ensemble** moves that activate and deactivate reserved slots
//! - **Parallel tempering** with a shared acceptance stream across replicas
//! - **Self-tuning step sizes** for displacement, volume and charge moves
//! - **Periodic invariant checks** on layout, mass centers and energy drift

pub mod config;
pub mod error;
pub mod moves;
pub mod progress;
pub mod propagator;
pub mod replica;
pub mod simulation;
pub mod state;
pub mod utils;
