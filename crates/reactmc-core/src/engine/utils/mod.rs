//! Helpers shared by the moves and the simulation driver: the random number
//! generator type, the Metropolis criterion and weighted sampling.

pub mod sampling;
