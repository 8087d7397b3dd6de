use super::params::{PairMatrix, PairTableId, SystemTables};
use super::potentials;
use super::term::EnergyTerm;
use crate::core::models::change::Change;
use crate::core::models::space::Space;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairPotential {
    LennardJones,
    Coulomb,
    HardSphere,
    LennardJonesCoulomb,
}

/// Pairwise interactions between active particles.
///
/// Pairs inside the same molecular (non-atomic) group are excluded.
#[derive(Debug, Clone)]
pub struct Nonbonded {
    table: PairTableId,
    potential: PairPotential,
    cutoff_sq: f64,
}

impl Nonbonded {
    pub fn new(table: PairTableId, potential: PairPotential, cutoff: Option<f64>) -> Self {
        Self {
            table,
            potential,
            cutoff_sq: cutoff.map_or(f64::INFINITY, |c| c * c),
        }
    }

    #[inline]
    fn excluded(space: &Space, i: usize, j: usize) -> bool {
        match (space.group_of(i), space.group_of(j)) {
            (Some(a), Some(b)) => a == b && !space.groups[a].atomic,
            _ => true,
        }
    }

    #[inline]
    fn pair(&self, space: &Space, table: &PairMatrix, bjerrum: f64, i: usize, j: usize) -> f64 {
        let (a, b) = (&space.particles[i], &space.particles[j]);
        let r_sq = space.cell.sqdist(&a.pos, &b.pos);
        if r_sq > self.cutoff_sq {
            return 0.0;
        }
        let params = table.get(a.kind, b.kind);
        match self.potential {
            PairPotential::LennardJones => potentials::lennard_jones(r_sq, params.sigma_sq, params.epsilon4),
            PairPotential::Coulomb => potentials::coulomb(r_sq.sqrt(), a.charge * b.charge, bjerrum),
            PairPotential::HardSphere => potentials::hard_sphere(r_sq, params.sigma_sq),
            PairPotential::LennardJonesCoulomb => {
                let lj = potentials::lennard_jones(r_sq, params.sigma_sq, params.epsilon4);
                if lj == f64::INFINITY {
                    return lj;
                }
                lj + potentials::coulomb(r_sq.sqrt(), a.charge * b.charge, bjerrum)
            }
        }
    }

    fn full(&self, space: &Space, table: &PairMatrix, bjerrum: f64) -> f64 {
        let active: Vec<usize> = space.active_particles().collect();
        let mut sum = 0.0;
        for (i, j) in active.iter().copied().tuple_combinations() {
            if Self::excluded(space, i, j) {
                continue;
            }
            sum += self.pair(space, table, bjerrum, i, j);
            if sum == f64::INFINITY {
                return sum;
            }
        }
        sum
    }

    /// Interactions of the touched set `S` with everything else, plus pairs within `S`.
    fn partial(&self, space: &Space, table: &PairMatrix, bjerrum: f64, change: &Change) -> f64 {
        let touched: Vec<usize> = change
            .touched_particles(space)
            .into_iter()
            .filter(|&i| space.is_active(i))
            .collect();
        if touched.is_empty() {
            return 0.0;
        }
        let mut in_set = vec![false; space.particles.len()];
        for &i in &touched {
            in_set[i] = true;
        }
        let mut sum = 0.0;
        for (n, &i) in touched.iter().enumerate() {
            for j in space.active_particles().filter(|&j| !in_set[j]) {
                if !Self::excluded(space, i, j) {
                    sum += self.pair(space, table, bjerrum, i, j);
                }
            }
            for &j in &touched[n + 1..] {
                if !Self::excluded(space, i, j) {
                    sum += self.pair(space, table, bjerrum, i, j);
                }
            }
            if sum == f64::INFINITY {
                return sum;
            }
        }
        sum
    }
}

impl EnergyTerm for Nonbonded {
    fn name(&self) -> &str {
        match self.potential {
            PairPotential::LennardJones => "lennard-jones",
            PairPotential::Coulomb => "coulomb",
            PairPotential::HardSphere => "hard-sphere",
            PairPotential::LennardJonesCoulomb => "lennard-jones+coulomb",
        }
    }

    fn energy(&self, space: &Space, tables: &SystemTables, change: &Change) -> f64 {
        let Some(table) = tables.parameters.get(self.table) else {
            return f64::INFINITY;
        };
        let bjerrum = tables.conditions.bjerrum_length();
        if change.is_global() {
            self.full(space, table, bjerrum)
        } else {
            self.partial(space, table, bjerrum, change)
        }
    }

    fn is_compatible(&self, tables: &SystemTables) -> bool {
        tables.parameters.get(self.table).is_some()
    }

    fn box_clone(&self) -> Box<dyn EnergyTerm> {
        Box::new(self.clone())
    }
}
