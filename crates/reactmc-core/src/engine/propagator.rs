use super::config::ConfigError;
use super::moves::{Move, MoveReport};
use super::utils::sampling::{Random, weighted_index};
use rand::distributions::{Distribution, WeightedIndex};

/// Weighted catalogue of moves.
///
/// Each call to [`Propagator::sample`] picks a move independently with
/// probability proportional to its weight.
#[derive(Default)]
pub struct Propagator {
    moves: Vec<Box<dyn Move>>,
    weights: Vec<f64>,
    distribution: Option<WeightedIndex<f64>>,
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.moves.iter().map(|m| m.name()).collect();
        f.debug_struct("Propagator")
            .field("moves", &names)
            .field("weights", &self.weights)
            .finish()
    }
}

impl Propagator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mv: Box<dyn Move>, weight: f64) -> Result<(), ConfigError> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(ConfigError::Invalid {
                parameter: "weight",
                reason: format!("move '{}' has weight {}, expected a positive number", mv.name(), weight),
            });
        }
        let mut weights = self.weights.clone();
        weights.push(weight);
        let distribution = weighted_index(&weights).map_err(|e| ConfigError::Invalid {
            parameter: "weight",
            reason: e.to_string(),
        })?;
        self.moves.push(mv);
        self.weights = weights;
        self.distribution = Some(distribution);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Index of the next move to attempt, or `None` for an empty catalogue.
    pub fn sample(&self, rng: &mut Random) -> Option<usize> {
        self.distribution.as_ref().map(|d| d.sample(rng))
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Move + 'static)> {
        self.moves.get_mut(index).map(|m| m.as_mut())
    }

    /// Number of move attempts that make up one sweep.
    pub fn attempts_per_sweep(&self) -> u64 {
        let total: f64 = self.weights.iter().sum();
        (total.round() as u64).max(1)
    }

    pub fn reports(&self) -> Vec<MoveReport> {
        self.moves.iter().map(|m| m.report()).collect()
    }
}
