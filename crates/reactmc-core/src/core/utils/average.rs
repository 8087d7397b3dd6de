use serde::Serialize;
use std::ops::AddAssign;

/// Running arithmetic mean that never stores individual samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Average {
    sum: f64,
    count: u64,
}

impl Average {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean of all samples, or zero before the first sample.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

impl AddAssign<f64> for Average {
    fn add_assign(&mut self, rhs: f64) {
        self.push(rhs);
    }
}
