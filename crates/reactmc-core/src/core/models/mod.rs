//! # Core Models Module
//!
//! Data structures describing a particle configuration and the species it is
//! made of.
//!
//! ## Overview
//!
//! A configuration is a flat vector of particles partitioned into groups. Every
//! group owns a fixed slot range; its active particles always form a prefix of
//! that range, so particles can be switched on and off without reallocating.
//! Moves describe what they touched with a [`change::Change`], and the same
//! value is used to bound energy evaluation and to copy state between the
//! accepted and the trial configuration.
//!
//! ## Key Components
//!
//! - [`particle`] - Single interaction site with position, charge and optional orientation data
//! - [`group`] - Slot range with capacity and active size
//! - [`space`] - Complete configuration: particles, groups, cell and the apply-diff operation
//! - [`change`] - Structured description of what a move touched
//! - [`topology`] - Atom and molecule kinds loaded from TOML
//! - [`reaction`] - Reversible reactions between explicit and implicit species
//!
//! ## Usage
//!
//! ```ignore
//! use reactmc::core::models::{space::Space, topology::Topology};
//!
//! let topology = Topology::load(Path::new("topology.toml"))?;
//! let mut space = Space::new(Cell::cube(50.0));
//! space.insert_atomic(&topology, salt, 100, 40, &mut rng)?;
//! ```

pub mod change;
pub mod group;
pub mod particle;
pub mod reaction;
pub mod space;
pub mod topology;
