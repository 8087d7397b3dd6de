use crate::core::models::change::Change;
use crate::core::models::space::Space;
use rand::{distributions::WeightedIndex, prelude::*};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::instrument;

/// Random number generator owned by every simulation.
pub type Random = StdRng;

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("Weight list is empty, cannot perform sampling")]
    EmptyWeights,
    #[error("Failed to create weighted distribution: {source}")]
    DistributionError {
        #[from]
        source: rand::distributions::WeightedError,
    },
}

/// Builds a distribution over indices proportional to `weights`.
pub fn weighted_index(weights: &[f64]) -> Result<WeightedIndex<f64>, SamplingError> {
    if weights.is_empty() {
        return Err(SamplingError::EmptyWeights);
    }
    Ok(WeightedIndex::new(weights)?)
}

/// Metropolis criterion on a reduced energy change.
///
/// Exactly one uniform number is drawn per call so that replicas sharing a
/// stream stay in step regardless of the outcome.
#[inline]
pub fn metropolis<R: Rng + ?Sized>(energy_change: f64, rng: &mut R) -> bool {
    let u: f64 = rng.r#gen();
    if energy_change.is_nan() {
        return false;
    }
    if energy_change == f64::INFINITY {
        return false;
    }
    if energy_change == f64::NEG_INFINITY {
        return true;
    }
    u.ln() < -energy_change
}

/// `ln(n_old! / n_new!)` without evaluating either factorial.
fn ln_factorial_ratio(n_old: usize, n_new: usize) -> f64 {
    if n_new > n_old {
        -((n_old + 1)..=n_new).map(|k| (k as f64).ln()).sum::<f64>()
    } else {
        ((n_new + 1)..=n_old).map(|k| (k as f64).ln()).sum::<f64>()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Species {
    Molecule(usize),
    Atom(usize),
}

fn count(space: &Space, species: Species) -> usize {
    match species {
        Species::Molecule(id) => space.count_active_molecules(id),
        Species::Atom(id) => space.find_atoms(id).len(),
    }
}

/// Ideal-gas contribution to a particle-number change,
/// `-Σ [ln(N_old!/N_new!) + (N_new - N_old) ln V]` over the touched species.
///
/// Returns zero for changes that keep every count fixed.
#[instrument(level = "trace", skip_all)]
pub fn ideal_term(old: &Space, trial: &Space, change: &Change) -> f64 {
    if !change.dn {
        return 0.0;
    }
    let mut species = BTreeSet::new();
    for record in &change.groups {
        let group = &trial.groups[record.group];
        if group.atomic {
            // Atomic groups may mix kinds; each atom kind is its own ideal species.
            if record.dn_atomic {
                for state in [old, trial] {
                    for i in group.range() {
                        species.insert(Species::Atom(state.particles[i].kind));
                    }
                }
            }
        } else {
            species.insert(Species::Molecule(group.molecule));
        }
        if record.dn_swap {
            for state in [old, trial] {
                let g = &state.groups[record.group];
                for &atom in &record.atoms {
                    species.insert(Species::Atom(state.particles[g.to_absolute(atom)].kind));
                }
            }
        }
    }
    let ln_volume = trial.cell.volume().ln();
    species
        .into_iter()
        .map(|s| {
            let (n_old, n_new) = (count(old, s), count(trial, s));
            if n_old == n_new {
                return 0.0;
            }
            let dn = n_new as f64 - n_old as f64;
            -(ln_factorial_ratio(n_old, n_new) + dn * ln_volume)
        })
        .sum()
}
