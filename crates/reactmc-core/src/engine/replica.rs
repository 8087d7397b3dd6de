use crate::core::models::particle::{Particle, ParticleExtension};
use crate::core::models::space::Space;
use crate::core::models::topology::Topology;
use crate::core::utils::geometry::Cell;
use crate::engine::error::EngineError;
use crossbeam_channel::{Receiver, Sender, unbounded};
use nalgebra::{Matrix3, Point3, Vector3};

/// Blocking point-to-point messaging between replicas.
pub trait ReplicaLink: Send {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn send(&mut self, partner: usize, message: Vec<f64>) -> Result<(), EngineError>;

    fn receive(&mut self, partner: usize) -> Result<Vec<f64>, EngineError>;
}

/// Sends `message` to `partner` and returns the partner's message.
///
/// The lower rank sends first and the higher rank receives first, so each side
/// performs exactly one send and one receive.
pub fn swap_messages(link: &mut dyn ReplicaLink, partner: usize, message: Vec<f64>) -> Result<Vec<f64>, EngineError> {
    if link.rank() < partner {
        link.send(partner, message)?;
        link.receive(partner)
    } else {
        let received = link.receive(partner)?;
        link.send(partner, message)?;
        Ok(received)
    }
}

/// In-process link between threads.
#[derive(Debug)]
pub struct ChannelLink {
    rank: usize,
    outgoing: Vec<Option<Sender<Vec<f64>>>>,
    incoming: Vec<Option<Receiver<Vec<f64>>>>,
}

impl ChannelLink {
    /// Fully connected set of `size` links, one per replica.
    pub fn mesh(size: usize) -> Vec<ChannelLink> {
        let mut links: Vec<ChannelLink> = (0..size)
            .map(|rank| ChannelLink {
                rank,
                outgoing: (0..size).map(|_| None).collect(),
                incoming: (0..size).map(|_| None).collect(),
            })
            .collect();
        for from in 0..size {
            for to in (0..size).filter(|&to| to != from) {
                let (sender, receiver) = unbounded();
                links[from].outgoing[to] = Some(sender);
                links[to].incoming[from] = Some(receiver);
            }
        }
        links
    }
}

impl ReplicaLink for ChannelLink {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.outgoing.len()
    }

    fn send(&mut self, partner: usize, message: Vec<f64>) -> Result<(), EngineError> {
        let sender = self
            .outgoing
            .get(partner)
            .and_then(Option::as_ref)
            .ok_or_else(|| EngineError::Exchange(format!("replica {} has no channel to {}", self.rank, partner)))?;
        sender
            .send(message)
            .map_err(|_| EngineError::Exchange(format!("replica {} hung up before receiving", partner)))
    }

    fn receive(&mut self, partner: usize) -> Result<Vec<f64>, EngineError> {
        let receiver = self
            .incoming
            .get(partner)
            .and_then(Option::as_ref)
            .ok_or_else(|| EngineError::Exchange(format!("replica {} has no channel from {}", self.rank, partner)))?;
        receiver
            .recv()
            .map_err(|_| EngineError::Exchange(format!("replica {} hung up before sending", partner)))
    }
}

const HEADER: usize = 4;
const PARTICLE_FIELDS: usize = 18;
const GROUP_FIELDS: usize = 2;

/// Configuration sent to an exchange partner.
///
/// Encoded as `[volume, lx, ly, lz, n, (x y z charge kind oriented dipole quadrupole) * n, m,
/// (size conformation) * m]`; a sphere sends its diameter as all three lengths.
/// Every particle takes the same 18 slots: `oriented` is 1 when the dipole and the
/// row-major quadrupole that follow are meaningful and 0 when they are zero padding.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangePayload {
    pub volume: f64,
    pub lengths: Vector3<f64>,
    pub particles: Vec<Particle>,
    pub groups: Vec<(usize, usize)>,
}

impl ExchangePayload {
    pub fn from_space(space: &Space) -> Self {
        let lengths = match space.cell {
            Cell::Cuboid { lengths } => lengths,
            Cell::Sphere { radius } => Vector3::repeat(2.0 * radius),
        };
        Self {
            volume: space.cell.volume(),
            lengths,
            particles: space.particles.clone(),
            groups: space.groups.iter().map(|g| (g.len(), g.conformation)).collect(),
        }
    }

    pub fn encode(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(
            HEADER + 2 + PARTICLE_FIELDS * self.particles.len() + GROUP_FIELDS * self.groups.len(),
        );
        out.push(self.volume);
        out.extend(self.lengths.iter());
        out.push(self.particles.len() as f64);
        for particle in &self.particles {
            out.extend(particle.pos.coords.iter());
            out.push(particle.charge);
            out.push(particle.kind as f64);
            match &particle.ext {
                Some(ext) => {
                    out.push(1.0);
                    out.extend(ext.dipole.iter());
                    out.extend(ext.quadrupole.transpose().iter());
                }
                None => out.extend([0.0; PARTICLE_FIELDS - 6]),
            }
        }
        out.push(self.groups.len() as f64);
        for (size, conformation) in &self.groups {
            out.push(*size as f64);
            out.push(*conformation as f64);
        }
        out
    }

    pub fn decode(data: &[f64]) -> Result<Self, EngineError> {
        let fail = |what: &str| EngineError::Protocol(format!("malformed exchange payload: {}", what));
        if data.len() < HEADER + 1 {
            return Err(fail("truncated header"));
        }
        let volume = data[0];
        let lengths = Vector3::new(data[1], data[2], data[3]);
        let n = as_count(data[HEADER]).ok_or_else(|| fail("particle count"))?;
        let particles_end = PARTICLE_FIELDS
            .checked_mul(n)
            .and_then(|len| len.checked_add(HEADER + 1))
            .ok_or_else(|| fail("particle count"))?;
        if data.len() < particles_end + 1 {
            return Err(fail("truncated particle block"));
        }
        let particles = data[HEADER + 1..particles_end]
            .chunks_exact(PARTICLE_FIELDS)
            .map(|c| -> Result<_, EngineError> {
                let kind = as_count(c[4]).ok_or_else(|| fail("atom kind"))?;
                let mut particle = Particle::new(kind, Point3::new(c[0], c[1], c[2]), c[3]);
                if c[5] == 1.0 {
                    particle.ext = Some(Box::new(ParticleExtension {
                        dipole: Vector3::from_column_slice(&c[6..9]),
                        quadrupole: Matrix3::from_row_slice(&c[9..18]),
                    }));
                } else if c[5] != 0.0 {
                    return Err(fail("orientation flag"));
                }
                Ok(particle)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let m = as_count(data[particles_end]).ok_or_else(|| fail("group count"))?;
        let groups_start = particles_end + 1;
        if Some(data.len()) != GROUP_FIELDS.checked_mul(m).and_then(|len| len.checked_add(groups_start)) {
            return Err(fail("group block length"));
        }
        let groups = data[groups_start..]
            .chunks_exact(GROUP_FIELDS)
            .map(|c| -> Result<_, EngineError> {
                let size = as_count(c[0]).ok_or_else(|| fail("group size"))?;
                let conformation = as_count(c[1]).ok_or_else(|| fail("conformation"))?;
                Ok((size, conformation))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            volume,
            lengths,
            particles,
            groups,
        })
    }

    /// Overwrites `space` with the payload and refreshes the mass centers.
    pub fn apply(&self, space: &mut Space, topology: &Topology) -> Result<(), EngineError> {
        if self.particles.len() != space.particles.len() || self.groups.len() != space.groups.len() {
            return Err(EngineError::Protocol(format!(
                "partner sent {} particles in {} groups, expected {} in {}",
                self.particles.len(),
                self.groups.len(),
                space.particles.len(),
                space.groups.len()
            )));
        }
        let cell = match space.cell {
            Cell::Cuboid { .. } => Cell::Cuboid { lengths: self.lengths },
            Cell::Sphere { .. } => Cell::Sphere {
                radius: 0.5 * self.lengths.x,
            },
        };
        let tolerance = 1e-9 * self.volume.abs().max(1.0);
        if !((cell.volume() - self.volume).abs() <= tolerance) {
            return Err(EngineError::Protocol(format!(
                "partner volume {} does not match its cell ({})",
                self.volume,
                cell.volume()
            )));
        }
        for (g, &(size, conformation)) in self.groups.iter().enumerate() {
            let group = &space.groups[g];
            if size > group.capacity() {
                return Err(EngineError::Protocol(format!(
                    "partner group {} has {} active slots but capacity is {}",
                    g,
                    size,
                    group.capacity()
                )));
            }
            let molecule = topology.molecule(group.molecule);
            if molecule.is_some_and(|m| conformation > 0 && conformation >= m.conformations.len()) {
                return Err(EngineError::Protocol(format!(
                    "partner group {} uses unknown conformation {}",
                    g, conformation
                )));
            }
        }
        if let Some(particle) = self.particles.iter().find(|p| p.kind >= topology.atoms().len()) {
            return Err(EngineError::Protocol(format!(
                "partner sent unknown atom kind {}",
                particle.kind
            )));
        }

        space.cell = cell;
        space.particles.clone_from(&self.particles);
        for (group, &(size, conformation)) in space.groups.iter_mut().zip(&self.groups) {
            group.set_len(size);
            group.conformation = conformation;
        }
        space.update_mass_centers(topology);
        Ok(())
    }
}

fn as_count(value: f64) -> Option<usize> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then_some(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::topology::{AtomKind, MoleculeKind};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn topology() -> Topology {
        let mut topology = Topology::new();
        let a = topology.add_atom(AtomKind::new("A").with_charge(1.0)).unwrap();
        let b = topology.add_atom(AtomKind::new("B")).unwrap();
        topology.add_molecule(MoleculeKind::atomic("ions", vec![a, b])).unwrap();
        topology
            .add_molecule(MoleculeKind::molecular(
                "dimer",
                vec![b, b],
                vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)],
            ))
            .unwrap();
        topology
    }

    fn space(seed: u64, active: usize) -> Space {
        let topology = topology();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut space = Space::new(Cell::cube(12.0));
        space.insert_atomic(&topology, 0, 4, active, &mut rng).unwrap();
        space.insert_molecules(&topology, 1, 2, 1, &mut rng).unwrap();
        space
    }

    #[test]
    fn payload_transfers_a_configuration() {
        let topology = topology();
        let source = space(1, 3);
        let mut target = space(2, 1);
        let encoded = ExchangePayload::from_space(&source).encode();
        assert_eq!(encoded.len(), 4 + 1 + 18 * 8 + 1 + 2 * 3);
        ExchangePayload::decode(&encoded)
            .unwrap()
            .apply(&mut target, &topology)
            .unwrap();
        assert_eq!(target.particles, source.particles);
        assert_eq!(target.groups[0].len(), 3);
        target.check_invariants(&topology, 1e-9).unwrap();
    }

    #[test]
    fn truncated_payload_is_a_protocol_error() {
        let encoded = ExchangePayload::from_space(&space(3, 2)).encode();
        assert!(matches!(
            ExchangePayload::decode(&encoded[..encoded.len() - 1]),
            Err(EngineError::Protocol(_))
        ));
        assert!(matches!(ExchangePayload::decode(&[1.0]), Err(EngineError::Protocol(_))));
    }

    #[test]
    fn payload_carries_particle_orientation() {
        let topology = topology();
        let mut source = space(6, 4);
        let mut target = space(7, 4);
        source.particles[1].ext = Some(Box::new(ParticleExtension {
            dipole: Vector3::new(0.3, -1.2, 0.5),
            quadrupole: Matrix3::new(1.0, 0.2, -0.4, 0.2, -0.5, 0.7, -0.4, 0.7, -0.5),
        }));
        target.particles[0].ext = Some(Box::new(ParticleExtension {
            dipole: Vector3::x(),
            quadrupole: Matrix3::zeros(),
        }));
        ExchangePayload::decode(&ExchangePayload::from_space(&source).encode())
            .unwrap()
            .apply(&mut target, &topology)
            .unwrap();
        assert_eq!(target.particles[1].ext, source.particles[1].ext);
        assert!(target.particles[0].ext.is_none());
        assert_eq!(target.particles, source.particles);
    }

    #[test]
    fn unknown_orientation_flag_is_a_protocol_error() {
        let mut encoded = ExchangePayload::from_space(&space(8, 2)).encode();
        encoded[HEADER + 1 + 5] = 0.5;
        assert!(matches!(ExchangePayload::decode(&encoded), Err(EngineError::Protocol(_))));
    }

    #[test]
    fn particle_count_mismatch_is_a_protocol_error() {
        let topology = topology();
        let mut small = Space::new(Cell::cube(12.0));
        let mut rng = StdRng::seed_from_u64(4);
        small.insert_atomic(&topology, 0, 2, 2, &mut rng).unwrap();
        let payload = ExchangePayload::from_space(&space(5, 2));
        assert!(matches!(payload.apply(&mut small, &topology), Err(EngineError::Protocol(_))));
    }

    #[test]
    fn channel_mesh_swaps_messages_between_threads() {
        let mut links = ChannelLink::mesh(2);
        let mut second = links.pop().unwrap();
        let mut first = links.pop().unwrap();
        assert_eq!((first.rank(), first.size()), (0, 2));
        let handle = std::thread::spawn(move || swap_messages(&mut second, 0, vec![2.0]).unwrap());
        let received = swap_messages(&mut first, 1, vec![1.0]).unwrap();
        assert_eq!(received, vec![2.0]);
        assert_eq!(handle.join().unwrap(), vec![1.0]);
    }

    #[test]
    fn dropped_partner_is_an_exchange_error() {
        let mut links = ChannelLink::mesh(2);
        drop(links.pop());
        let mut first = links.pop().unwrap();
        assert!(matches!(first.receive(1), Err(EngineError::Exchange(_))));
        assert!(matches!(first.send(1, vec![]), Err(EngineError::Exchange(_))));
    }
}
