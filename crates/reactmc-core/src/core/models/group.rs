use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupError {
    #[error("Cannot activate {requested} particles: only {available} inactive slots left")]
    CapacityExceeded { requested: usize, available: usize },
    #[error("Cannot deactivate {requested} particles: only {available} are active")]
    NotEnoughActive { requested: usize, available: usize },
}

/// A contiguous slot range `[begin, begin + capacity)` of the particle vector.
///
/// The first `size` slots are active; the rest are inert placeholders that can
/// be switched on later without reallocating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Molecule kind id in the topology.
    pub molecule: usize,
    pub begin: usize,
    size: usize,
    capacity: usize,
    pub atomic: bool,
    /// Cached mass center; only meaningful for non-atomic, non-empty groups.
    pub mass_center: Option<Point3<f64>>,
    /// Index into the molecule kind's conformation library.
    pub conformation: usize,
}

impl Group {
    pub fn new(molecule: usize, begin: usize, capacity: usize, size: usize, atomic: bool) -> Self {
        Self {
            molecule,
            begin,
            size: size.min(capacity),
            capacity,
            atomic,
            mass_center: None,
            conformation: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    /// All slots owned by the group.
    pub fn range(&self) -> Range<usize> {
        self.begin..self.begin + self.capacity
    }

    pub fn active_range(&self) -> Range<usize> {
        self.begin..self.begin + self.size
    }

    pub fn inactive_range(&self) -> Range<usize> {
        self.begin + self.size..self.begin + self.capacity
    }

    #[inline]
    pub fn to_absolute(&self, relative: usize) -> usize {
        self.begin + relative
    }

    pub fn contains(&self, absolute: usize) -> bool {
        self.range().contains(&absolute)
    }

    pub fn contains_active(&self, absolute: usize) -> bool {
        self.active_range().contains(&absolute)
    }

    /// Extends the active prefix by `n` slots taken from the inactive tail.
    pub fn activate(&mut self, n: usize) -> Result<Range<usize>, GroupError> {
        let available = self.capacity - self.size;
        if n > available {
            return Err(GroupError::CapacityExceeded {
                requested: n,
                available,
            });
        }
        let start = self.begin + self.size;
        self.size += n;
        Ok(start..start + n)
    }

    /// Shrinks the active prefix by `n`; the last `n` active slots become inactive.
    pub fn deactivate(&mut self, n: usize) -> Result<Range<usize>, GroupError> {
        if n > self.size {
            return Err(GroupError::NotEnoughActive {
                requested: n,
                available: self.size,
            });
        }
        self.size -= n;
        if self.size == 0 {
            self.mass_center = None;
        }
        let start = self.begin + self.size;
        Ok(start..start + n)
    }

    pub(crate) fn set_len(&mut self, size: usize) {
        self.size = size.min(self.capacity);
    }

    /// Whether the group keeps a cached mass center.
    pub fn tracks_mass_center(&self) -> bool {
        !self.atomic && self.size > 0
    }
}
