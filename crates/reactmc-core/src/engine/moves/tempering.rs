use super::{Move, MoveStatistics};
use crate::core::forcefield::params::SystemTables;
use crate::core::models::change::Change;
use crate::core::models::space::Space;
use crate::engine::error::EngineError;
use crate::engine::replica::{ExchangePayload, ReplicaLink, swap_messages};
use crate::engine::utils::sampling::{Random, metropolis};
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

/// Replica exchange with a neighbouring simulation.
///
/// Replicas are paired by rank with a parity that alternates on every
/// attempt. The trial configuration takes the partner's particles and cell, and
/// the driver recomputes its energy with the local Hamiltonian. Both sides then
/// swap their local energy changes and decide with a random stream seeded
/// identically on every replica, so they always reach the same verdict.
pub struct ParallelTempering {
    link: Box<dyn ReplicaLink>,
    exchange_rng: Random,
    parity: usize,
    partner: Option<usize>,
    statistics: MoveStatistics,
}

impl std::fmt::Debug for ParallelTempering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelTempering")
            .field("rank", &self.link.rank())
            .field("size", &self.link.size())
            .field("parity", &self.parity)
            .field("partner", &self.partner)
            .finish()
    }
}

impl ParallelTempering {
    pub fn new(link: Box<dyn ReplicaLink>, exchange_seed: u64) -> Self {
        Self {
            link,
            exchange_rng: Random::seed_from_u64(exchange_seed),
            parity: 1,
            partner: None,
            statistics: MoveStatistics::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.link.rank()
    }

    fn next_partner(&mut self) -> Option<usize> {
        self.parity ^= 1;
        let rank = self.link.rank();
        let partner = if rank % 2 == self.parity {
            rank + 1
        } else {
            rank.checked_sub(1)?
        };
        (partner < self.link.size()).then_some(partner)
    }
}

impl Move for ParallelTempering {
    fn name(&self) -> &str {
        "parallel-tempering"
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
        _rng: &mut Random,
    ) -> Result<Change, EngineError> {
        self.partner = self.next_partner();
        let Some(partner) = self.partner else {
            // Keeps the shared stream aligned with replicas that do exchange.
            let _: f64 = self.exchange_rng.r#gen();
            trace!(rank = self.link.rank(), "no exchange partner this round");
            return Ok(Change::new());
        };
        let outgoing = ExchangePayload::from_space(space).encode();
        let incoming = swap_messages(self.link.as_mut(), partner, outgoing)?;
        ExchangePayload::decode(&incoming)?.apply(space, &tables.topology)?;
        Ok(Change::everything())
    }

    fn joint_decision(&mut self, energy_change: f64) -> Result<Option<bool>, EngineError> {
        let Some(partner) = self.partner else {
            return Err(EngineError::Internal(
                "exchange decision requested without a partner".to_string(),
            ));
        };
        let reply = swap_messages(self.link.as_mut(), partner, vec![energy_change])?;
        let &[partner_change] = reply.as_slice() else {
            return Err(EngineError::Protocol(format!(
                "expected one energy from replica {}, got {} values",
                partner,
                reply.len()
            )));
        };
        let accepted = metropolis(energy_change + partner_change, &mut self.exchange_rng);
        debug!(
            rank = self.link.rank(),
            partner,
            local = energy_change,
            remote = partner_change,
            accepted,
            "replica exchange attempt"
        );
        Ok(Some(accepted))
    }
}
