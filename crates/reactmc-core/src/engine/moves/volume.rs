use super::{Move, MoveStatistics};
use crate::core::forcefield::params::SystemTables;
use crate::core::models::change::Change;
use crate::core::models::space::Space;
use crate::core::utils::geometry::VolumeMethod;
use crate::engine::error::EngineError;
use crate::engine::utils::sampling::Random;
use rand::Rng;

/// Random walk in `ln V`.
///
/// Free atoms follow the cell affinely while molecules are translated rigidly
/// with their mass center.
#[derive(Debug)]
pub struct VolumeMove {
    method: VolumeMethod,
    pending: f64,
    statistics: MoveStatistics,
}

impl VolumeMove {
    pub fn new(space: &Space, dv: f64, method: VolumeMethod, adjust_interval: u64) -> Result<Self, EngineError> {
        let mut cell = space.cell;
        cell
            .set_volume(space.cell.volume(), method)
            .map_err(|e| EngineError::Initialization(e.to_string()))?;
        Ok(Self {
            method,
            pending: 0.0,
            statistics: MoveStatistics::tuned(dv, adjust_interval),
        })
    }
}

impl Move for VolumeMove {
    fn name(&self) -> &str {
        "volume"
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
        _tables: &SystemTables,
        rng: &mut Random,
    ) -> Result<Change, EngineError> {
        self.pending = 0.0;
        let dv = self.statistics.dp;
        if dv <= 0.0 {
            return Ok(Change::new());
        }
        let old_volume = space.cell.volume();
        let new_volume = (old_volume.ln() + dv * (rng.r#gen::<f64>() - 0.5)).exp();
        let scale = space.cell.set_volume(new_volume, self.method)?;

        for index in 0..space.groups.len() {
            let g = &space.groups[index];
            if g.atomic {
                for particle in &mut space.particles[g.range()] {
                    particle.pos.coords.component_mul_assign(&scale);
                }
            } else if let Some(cm) = g.mass_center {
                let shift = cm.coords.component_mul(&scale) - cm.coords;
                space.translate_group(index, &shift);
            }
        }
        self.pending = (new_volume - old_volume).powi(2);

        Ok(Change {
            volume_change: true,
            ..Change::new()
        })
    }

    fn on_accept(&mut self, _change: &Change) -> Result<(), EngineError> {
        self.statistics.msqd.push(self.pending);
        Ok(())
    }

    fn on_reject(&mut self, _change: &Change) -> Result<(), EngineError> {
        self.statistics.msqd.push(0.0);
        Ok(())
    }
}
