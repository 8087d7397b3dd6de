use super::space::Space;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChangeError {
    #[error("Change references group {group}, but the configuration has {count} groups")]
    UnknownGroup { group: usize, count: usize },
    #[error("Change references atom {atom} of group {group}, whose capacity is {capacity}")]
    AtomOutOfRange {
        group: usize,
        atom: usize,
        capacity: usize,
    },
}

/// What a move did to one group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupChange {
    pub group: usize,
    /// Every slot of the group may have changed.
    pub all: bool,
    /// Intramolecular distances changed.
    pub internal: bool,
    /// The active size of an atomic group changed.
    pub dn_atomic: bool,
    /// Particles changed identity in place.
    pub dn_swap: bool,
    /// Changed slots relative to `begin`, sorted and unique.
    pub atoms: Vec<usize>,
}

impl GroupChange {
    pub fn whole(group: usize) -> Self {
        Self {
            group,
            all: true,
            ..Default::default()
        }
    }

    pub fn with_atoms(group: usize, mut atoms: Vec<usize>) -> Self {
        atoms.sort_unstable();
        atoms.dedup();
        Self {
            group,
            atoms,
            ..Default::default()
        }
    }

    fn merge(&mut self, other: GroupChange) {
        self.all |= other.all;
        self.internal |= other.internal;
        self.dn_atomic |= other.dn_atomic;
        self.dn_swap |= other.dn_swap;
        self.atoms.extend(other.atoms);
        self.atoms.sort_unstable();
        self.atoms.dedup();
    }
}

/// Structured diff of a proposed move.
///
/// The same value bounds the energy evaluation and drives the copy between the
/// accepted and the trial configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Change {
    /// Forces a full recomputation and a full state copy.
    pub everything: bool,
    pub volume_change: bool,
    /// The number of active particles or molecules changed.
    pub dn: bool,
    pub groups: Vec<GroupChange>,
}

impl Change {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn everything() -> Self {
        Self {
            everything: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.everything && !self.volume_change && !self.dn && self.groups.is_empty()
    }

    /// Whether energy terms must ignore the group records and evaluate the whole system.
    pub fn is_global(&self) -> bool {
        self.everything || self.volume_change
    }

    pub fn push(&mut self, record: GroupChange) {
        self.groups.push(record);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Orders records by group index and folds duplicates into one record.
    pub fn sort_and_merge(&mut self) {
        let mut records = std::mem::take(&mut self.groups);
        records.sort_by_key(|r| r.group);
        for record in records {
            match self.groups.last_mut() {
                Some(last) if last.group == record.group => last.merge(record),
                _ => self.groups.push(record),
            }
        }
    }

    /// Absolute particle indices covered by the change, sorted and unique.
    ///
    /// Includes inactive slots; callers filter on activation themselves.
    pub fn touched_particles(&self, space: &Space) -> Vec<usize> {
        if self.is_global() {
            return (0..space.particles.len()).collect();
        }
        let mut indices: Vec<usize> = Vec::new();
        for record in &self.groups {
            let Some(group) = space.groups.get(record.group) else {
                continue;
            };
            if record.all {
                indices.extend(group.range());
            } else {
                indices.extend(record.atoms.iter().map(|&a| group.to_absolute(a)));
            }
        }
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    pub fn validate(&self, space: &Space) -> Result<(), ChangeError> {
        for record in &self.groups {
            let group = space
                .groups
                .get(record.group)
                .ok_or(ChangeError::UnknownGroup {
                    group: record.group,
                    count: space.groups.len(),
                })?;
            if let Some(&atom) = record.atoms.iter().find(|&&a| a >= group.capacity()) {
                return Err(ChangeError::AtomOutOfRange {
                    group: record.group,
                    atom,
                    capacity: group.capacity(),
                });
            }
        }
        Ok(())
    }
}
