//! Small numerical helpers shared by the models, the energy terms and the moves.
//!
//! - [`geometry`] - Simulation cells, minimum-image distances and random orientations
//! - [`average`] - Running averages for move and reaction statistics

pub mod average;
pub mod geometry;
