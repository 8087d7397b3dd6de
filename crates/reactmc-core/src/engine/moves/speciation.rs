use super::{Move, MoveReport, MoveStatistics, ReactionReport, pick};
use crate::core::forcefield::bonded::group_bond_energy;
use crate::core::forcefield::params::SystemTables;
use crate::core::models::change::{Change, GroupChange};
use crate::core::models::reaction::{Direction, Participant, ReactionData};
use crate::core::models::space::{Selection, Space};
use crate::core::models::topology::Topology;
use crate::core::utils::average::Average;
use crate::core::utils::geometry;
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use crate::engine::utils::sampling::Random;
use rand::Rng;
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::trace;

fn group_error(group: usize, error: impl std::fmt::Display) -> EngineError {
    EngineError::Internal(format!("group {}: {}", group, error))
}

/// Reaction-ensemble move.
///
/// Each proposal draws a reaction and a direction uniformly, then removes the
/// reactants and inserts the products in the trial configuration. Atoms live
/// in the single atomic group of their molecule kind; removing one swaps it
/// with the last active slot before shrinking the group, so the active
/// particles stay a contiguous prefix. Molecules are switched on and off as
/// whole groups.
///
/// The bias is `-ln K` in the direction of the reaction. With bond correction
/// enabled the internal bond energy of inserted and deleted molecules is
/// removed from the acceptance test, since it is part of the molecule's
/// chemical potential.
#[derive(Debug)]
pub struct SpeciationMove {
    reactions: Vec<ReactionData>,
    acceptance: Vec<Average>,
    atomic_groups: HashMap<usize, usize>,
    bond_correction: bool,
    pending: Option<(usize, Direction)>,
    bias: f64,
    forward: u64,
    statistics: MoveStatistics,
}

impl SpeciationMove {
    pub fn new(topology: &Topology, space: &Space, bond_correction: bool) -> Result<Self, EngineError> {
        let reactions = topology.reactions().to_vec();
        if reactions.is_empty() {
            return Err(ConfigError::Invalid {
                parameter: "reactions",
                reason: "a speciation move needs at least one reaction".to_string(),
            }
            .into());
        }
        let mut atomic_groups = HashMap::new();
        for reaction in reactions.iter().filter(|r| !r.swap) {
            for &(participant, _) in reaction.reactants.iter().chain(&reaction.products) {
                let molecule = match participant {
                    Participant::Atom(atom) => topology.atomic_molecule_for(atom).ok_or_else(|| {
                        EngineError::UnknownSpecies(topology.atoms()[atom].name.clone())
                    })?,
                    Participant::Molecule(m) if topology.molecules()[m].atomic => m,
                    Participant::Molecule(_) => continue,
                };
                let groups = space.find_molecules(molecule, Selection::All);
                if groups.len() != 1 {
                    return Err(ConfigError::Invalid {
                        parameter: "reactions",
                        reason: format!(
                            "reaction '{}' needs exactly one group of atomic molecule '{}', found {}",
                            reaction.name,
                            topology.molecules()[molecule].name,
                            groups.len()
                        ),
                    }
                    .into());
                }
                atomic_groups.insert(molecule, groups[0]);
            }
        }
        Ok(Self {
            acceptance: vec![Average::new(); reactions.len()],
            reactions,
            atomic_groups,
            bond_correction,
            pending: None,
            bias: 0.0,
            forward: 0,
            statistics: MoveStatistics::new(),
        })
    }

    pub fn reactions(&self) -> &[ReactionData] {
        &self.reactions
    }

    /// Fraction of proposals that ran a reaction forward.
    pub fn forward_fraction(&self) -> f64 {
        if self.statistics.trials == 0 {
            0.0
        } else {
            self.forward as f64 / self.statistics.trials as f64
        }
    }

    fn atomic_group(&self, topology: &Topology, participant: Participant) -> Option<usize> {
        let molecule = match participant {
            Participant::Atom(atom) => topology.atomic_molecule_for(atom)?,
            Participant::Molecule(m) => m,
        };
        self.atomic_groups.get(&molecule).copied()
    }

    fn is_feasible(&self, space: &Space, topology: &Topology, reaction: &ReactionData, direction: Direction) -> bool {
        let mut net: HashMap<usize, i64> = HashMap::new();
        for &(participant, n) in reaction.to_remove(direction) {
            match (self.atomic_group(topology, participant), participant) {
                (Some(g), Participant::Atom(atom)) => {
                    let present = space.groups[g]
                        .active_range()
                        .filter(|&i| space.particles[i].kind == atom)
                        .count();
                    if present < n {
                        return false;
                    }
                    *net.entry(g).or_default() -= n as i64;
                }
                (Some(g), Participant::Molecule(_)) => {
                    if space.groups[g].len() < n {
                        return false;
                    }
                    *net.entry(g).or_default() -= n as i64;
                }
                (None, Participant::Molecule(m)) => {
                    if space.find_molecules(m, Selection::Active).len() < n {
                        return false;
                    }
                }
                (None, Participant::Atom(_)) => return false,
            }
        }
        for &(participant, n) in reaction.to_add(direction) {
            match (self.atomic_group(topology, participant), participant) {
                (Some(g), _) => *net.entry(g).or_default() += n as i64,
                (None, Participant::Molecule(m)) => {
                    if space.find_molecules(m, Selection::Inactive).len() < n {
                        return false;
                    }
                }
                (None, Participant::Atom(_)) => return false,
            }
        }
        net.iter().all(|(&g, &delta)| {
            let group = &space.groups[g];
            let size = group.len() as i64 + delta;
            size >= 0 && size <= group.capacity() as i64
        })
    }

    fn swap(
        &self,
        space: &mut Space,
        topology: &Topology,
        reaction: &ReactionData,
        direction: Direction,
        rng: &mut Random,
        change: &mut Change,
    ) -> Result<bool, EngineError> {
        let (&[(Participant::Atom(source), _)], &[(Participant::Atom(target), _)]) =
            (reaction.to_remove(direction), reaction.to_add(direction))
        else {
            return Err(EngineError::Internal(format!(
                "swap reaction '{}' does not pair two atoms",
                reaction.name
            )));
        };
        let Some(index) = pick(&space.find_atoms(source), rng) else {
            return Ok(false);
        };
        let Some(group) = space.group_of(index) else {
            return Err(EngineError::Internal(format!("particle {} has no group", index)));
        };
        space.particles[index].relabel(target, &topology.atoms()[target]);
        if space.groups[group].tracks_mass_center() {
            let center = space.mass_center(group, topology);
            space.groups[group].mass_center = center;
        }
        let mut record = GroupChange::with_atoms(group, vec![index - space.groups[group].begin]);
        record.dn_swap = true;
        change.push(record);
        Ok(true)
    }

    /// Deactivates the reactants and returns the bond energy they carried.
    fn remove(
        &self,
        space: &mut Space,
        topology: &Topology,
        reaction: &ReactionData,
        direction: Direction,
        rng: &mut Random,
        change: &mut Change,
    ) -> Result<f64, EngineError> {
        let mut bond_energy = 0.0;
        for &(participant, n) in reaction.to_remove(direction) {
            match self.atomic_group(topology, participant) {
                Some(g) => {
                    let mut atoms = Vec::with_capacity(2 * n);
                    for _ in 0..n {
                        let group = &space.groups[g];
                        let candidates: Vec<usize> = group
                            .active_range()
                            .filter(|&i| match participant {
                                Participant::Atom(atom) => space.particles[i].kind == atom,
                                Participant::Molecule(_) => true,
                            })
                            .collect();
                        let Some(index) = pick(&candidates, rng) else {
                            return Err(group_error(g, "no particle left to remove"));
                        };
                        let last = group.active_range().end - 1;
                        let begin = group.begin;
                        space.particles.swap(index, last);
                        space.groups[g].deactivate(1).map_err(|e| group_error(g, e))?;
                        atoms.push(index - begin);
                        atoms.push(last - begin);
                    }
                    let mut record = GroupChange::with_atoms(g, atoms);
                    record.dn_atomic = true;
                    change.push(record);
                }
                None => {
                    let Participant::Molecule(molecule) = participant else {
                        return Err(EngineError::Internal(format!(
                            "atom of reaction '{}' has no atomic group",
                            reaction.name
                        )));
                    };
                    for _ in 0..n {
                        let active = space.find_molecules(molecule, Selection::Active);
                        let Some(g) = pick(&active, rng) else {
                            return Err(EngineError::Internal(format!(
                                "no active molecule of kind {} left to remove",
                                molecule
                            )));
                        };
                        if self.bond_correction {
                            bond_energy += group_bond_energy(space, topology, g);
                        }
                        let size = space.groups[g].len();
                        space.groups[g].deactivate(size).map_err(|e| group_error(g, e))?;
                        change.push(GroupChange::whole(g));
                    }
                }
            }
        }
        Ok(bond_energy)
    }

    /// Activates the products and returns the bond energy they carry.
    fn insert(
        &self,
        space: &mut Space,
        topology: &Topology,
        reaction: &ReactionData,
        direction: Direction,
        rng: &mut Random,
        change: &mut Change,
    ) -> Result<f64, EngineError> {
        let mut bond_energy = 0.0;
        for &(participant, n) in reaction.to_add(direction) {
            match self.atomic_group(topology, participant) {
                Some(g) => {
                    let mut atoms = Vec::with_capacity(n);
                    for _ in 0..n {
                        let slot = space.groups[g].activate(1).map_err(|e| group_error(g, e))?.start;
                        let pos = space.cell.random_position(rng);
                        let particle = &mut space.particles[slot];
                        if let Participant::Atom(atom) = participant {
                            particle.relabel(atom, &topology.atoms()[atom]);
                        }
                        particle.pos = pos;
                        atoms.push(slot - space.groups[g].begin);
                    }
                    let mut record = GroupChange::with_atoms(g, atoms);
                    record.dn_atomic = true;
                    change.push(record);
                }
                None => {
                    let Participant::Molecule(molecule) = participant else {
                        return Err(EngineError::Internal(format!(
                            "atom of reaction '{}' has no atomic group",
                            reaction.name
                        )));
                    };
                    for _ in 0..n {
                        let inactive = space.find_molecules(molecule, Selection::Inactive);
                        let Some(g) = pick(&inactive, rng) else {
                            return Err(EngineError::Internal(format!(
                                "no free slot for a molecule of kind {}",
                                molecule
                            )));
                        };
                        let capacity = space.groups[g].capacity();
                        space.groups[g].activate(capacity).map_err(|e| group_error(g, e))?;
                        let center = space.cell.random_position(rng);
                        let rotation = geometry::random_rotation(rng, 2.0 * PI);
                        space.place_molecule(g, center, &rotation, topology)?;
                        if self.bond_correction {
                            bond_energy += group_bond_energy(space, topology, g);
                        }
                        change.push(GroupChange::whole(g));
                    }
                }
            }
        }
        Ok(bond_energy)
    }
}

impl Move for SpeciationMove {
    fn name(&self) -> &str {
        "speciation"
    }

    fn statistics(&self) -> &MoveStatistics {
        &self.statistics
    }

    fn statistics_mut(&mut self) -> &mut MoveStatistics {
        &mut self.statistics
    }

    fn propose(
        &mut self,
        space: &mut Space,
        tables: &SystemTables,
        rng: &mut Random,
    ) -> Result<Change, EngineError> {
        self.bias = 0.0;
        let index = rng.gen_range(0..self.reactions.len());
        let direction = if rng.r#gen::<bool>() {
            Direction::Forward
        } else {
            Direction::Backward
        };
        self.pending = Some((index, direction));
        if direction == Direction::Forward {
            self.forward += 1;
        }

        let topology = &tables.topology;
        let reaction = &self.reactions[index];
        // Swaps relabel an active atom wherever it lives and need no atomic group.
        let feasible = !reaction.is_exhausted(direction)
            && (reaction.swap || self.is_feasible(space, topology, reaction, direction));
        if !feasible {
            trace!(reaction = %reaction.name, ?direction, "reaction infeasible");
            return Ok(Change::new());
        }

        let mut change = Change::new();
        let bond_energy = if reaction.swap {
            if !self.swap(space, topology, reaction, direction, rng, &mut change)? {
                trace!(reaction = %reaction.name, ?direction, "no atom to swap");
                return Ok(Change::new());
            }
            0.0
        } else {
            let removed = self.remove(space, topology, reaction, direction, rng, &mut change)?;
            let inserted = self.insert(space, topology, reaction, direction, rng, &mut change)?;
            removed - inserted
        };
        change.dn = true;
        change.sort_and_merge();

        self.bias = -reaction.ln_k(direction) + bond_energy;
        Ok(change)
    }

    fn bias(&mut self, _change: &Change, _u_old: f64, _u_new: f64) -> Result<f64, EngineError> {
        Ok(self.bias)
    }

    fn on_accept(&mut self, _change: &Change) -> Result<(), EngineError> {
        let Some((index, direction)) = self.pending.take() else {
            return Ok(());
        };
        self.acceptance[index].push(1.0);
        self.reactions[index]
            .record_accepted(direction)
            .map_err(|message| EngineError::invariant(0, None, message))
    }

    fn on_reject(&mut self, _change: &Change) -> Result<(), EngineError> {
        if let Some((index, _)) = self.pending.take() {
            self.acceptance[index].push(0.0);
        }
        Ok(())
    }

    fn report(&self) -> MoveReport {
        let mut report = MoveReport::from_statistics(self.name(), &self.statistics);
        report.reactions = self
            .reactions
            .iter()
            .zip(&self.acceptance)
            .map(|(reaction, acceptance)| ReactionReport {
                reaction: reaction.name.clone(),
                attempts: acceptance.count(),
                acceptance: acceptance.mean(),
                reservoir: reaction.reservoir,
            })
            .collect();
        report
    }
}
