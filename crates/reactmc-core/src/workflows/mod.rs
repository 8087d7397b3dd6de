//! # Workflows Module
//!
//! High-level entry points that turn a [`SimulationConfig`](crate::engine::config::SimulationConfig)
//! into a finished run.
//!
//! ## Overview
//!
//! Workflows load the topology, place the initial molecules, assemble the
//! Hamiltonian and the move catalogue, run the requested number of sweeps and
//! return the final report together with a snapshot of the accepted
//! configuration. Progress is reported through a
//! [`ProgressReporter`](crate::engine::progress::ProgressReporter).
//!
//! ## Architecture
//!
//! - **Single simulation** ([`simulate`]) - One Metropolis chain
//! - **Replica exchange** ([`temper`]) - One chain per configuration on its own
//!   thread, linked for parallel tempering
//!
//! Setup problems are returned before any sampling starts. Failures during
//! sampling abort the run and are returned as the first error of the failing
//! replica.

pub mod simulate;
pub mod temper;
