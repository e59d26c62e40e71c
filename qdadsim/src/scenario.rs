//! Scenario builder for setting up and running simulations.

use hashbrown::HashMap;
use qdad::{Address, Duration, Timestamp};

use crate::event::{ScenarioAction, SimId};
use crate::metrics::SimulationResult;
use crate::sim::Simulator;
use crate::topology::Topology;

/// Type of topology to generate.
#[derive(Debug, Clone)]
enum TopologyType {
    FullyConnected,
    Chain,
    /// First node is the hub.
    Star,
    UnitDisk { radius: f64 },
    UnitDiskAdaptive,
    Custom(Topology),
}

/// How a node starts out.
#[derive(Debug, Clone)]
enum NodeSetup {
    /// No address, all randomness from the seed.
    Fresh,
    /// No address, first random draws taken from the script.
    Scripted(Vec<u64>),
    /// Already holds the address.
    Settled(Address),
}

/// Builder for simulation scenarios.
///
/// Node `i` gets `SimId` `i` and seed `seed + i * 1000`. Unless told
/// otherwise a node starts without an address and the nodes form a full
/// mesh.
pub struct ScenarioBuilder {
    num_nodes: usize,
    seed: u64,
    topology_type: TopologyType,
    loss_rate: f64,
    delay: Duration,
    setups: HashMap<usize, NodeSetup>,
    actions: Vec<(Timestamp, ScenarioAction)>,
    snapshot_interval: Option<Duration>,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ScenarioBuilder {
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            seed: 42,
            topology_type: TopologyType::FullyConnected,
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
            setups: HashMap::new(),
            actions: Vec::new(),
            snapshot_interval: None,
        }
    }

    /// Set the RNG seed for deterministic simulation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Use a hand-built topology over ids `0..num_nodes`.
    pub fn topology(mut self, topo: Topology) -> Self {
        self.topology_type = TopologyType::Custom(topo);
        self
    }

    pub fn fully_connected(mut self) -> Self {
        self.topology_type = TopologyType::FullyConnected;
        self
    }

    /// Line topology: node `i` only hears `i - 1` and `i + 1`.
    pub fn chain_topology(mut self) -> Self {
        self.topology_type = TopologyType::Chain;
        self
    }

    pub fn star_topology(mut self) -> Self {
        self.topology_type = TopologyType::Star;
        self
    }

    /// Seeded unit-disk graph; see [`Topology::unit_disk`].
    pub fn unit_disk(mut self, radius: f64) -> Self {
        self.topology_type = TopologyType::UnitDisk { radius };
        self
    }

    pub fn unit_disk_adaptive(mut self) -> Self {
        self.topology_type = TopologyType::UnitDiskAdaptive;
        self
    }

    /// Set global packet loss rate.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set one-hop delay on every link.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Node `index` starts in Normal holding `address`.
    pub fn with_committed(mut self, index: usize, address: Address) -> Self {
        self.setups.insert(index, NodeSetup::Settled(address));
        self
    }

    /// Node `index` draws its tentative address, then its start jitter (in
    /// ms), and so on, from `values` before falling back to its seed.
    pub fn with_scripted_random(mut self, index: usize, values: Vec<u64>) -> Self {
        self.setups.insert(index, NodeSetup::Scripted(values));
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Split the mesh into isolated groups of node indices at `time`.
    pub fn partition_at(mut self, time: Timestamp, groups: Vec<Vec<usize>>) -> Self {
        self.actions
            .push((time, ScenarioAction::Partition { groups }));
        self
    }

    pub fn heal_at(mut self, time: Timestamp) -> Self {
        self.actions.push((time, ScenarioAction::HealPartition));
        self
    }

    pub fn disable_link_at(mut self, time: Timestamp, a: usize, b: usize) -> Self {
        self.actions.push((time, ScenarioAction::DisableLink { a, b }));
        self
    }

    pub fn snapshot_at(mut self, time: Timestamp) -> Self {
        self.actions.push((time, ScenarioAction::TakeSnapshot));
        self
    }

    /// Build the simulator with all nodes and topology.
    pub fn build(mut self) -> (Simulator, Vec<SimId>) {
        let mut sim = Simulator::new(self.seed);
        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }

        let ids: Vec<SimId> = (0..self.num_nodes).collect();
        let mut topo = match self.topology_type {
            TopologyType::FullyConnected => Topology::fully_connected(&ids),
            TopologyType::Chain => Topology::chain(&ids),
            TopologyType::Star => Topology::star(&ids),
            TopologyType::UnitDisk { radius } => Topology::unit_disk(&ids, self.seed, radius),
            TopologyType::UnitDiskAdaptive => Topology::unit_disk_adaptive(&ids, self.seed),
            TopologyType::Custom(t) => t,
        };
        if self.loss_rate > 0.0 {
            topo.set_global_loss_rate(self.loss_rate);
        }
        topo.set_global_delay(self.delay);
        sim = sim.with_topology(topo);

        for i in 0..self.num_nodes {
            let seed = self.seed.wrapping_add(i as u64 * 1000);
            let id = match self.setups.remove(&i).unwrap_or(NodeSetup::Fresh) {
                NodeSetup::Fresh => sim.add_node(seed),
                NodeSetup::Scripted(values) => sim.add_scripted_node(seed, values),
                NodeSetup::Settled(address) => sim.add_settled_node(seed, address),
            };
            debug_assert_eq!(id, i);
        }

        for (time, action) in self.actions {
            sim.schedule_action(time, action);
        }

        (sim, ids)
    }

    /// Build and run for the specified duration.
    pub fn run_for(self, duration: Duration) -> (Simulator, SimulationResult) {
        let (mut sim, _) = self.build();
        let result = sim.run_for(duration);
        (sim, result)
    }

    /// Build and run until the specified time.
    pub fn run_until(self, time: Timestamp) -> (Simulator, SimulationResult) {
        let (mut sim, _) = self.build();
        let result = sim.run_until(time);
        (sim, result)
    }
}

#[cfg(test)]
mod tests {
    use qdad::NodeState;

    use super::*;

    #[test]
    fn test_build_applies_setups() {
        let (sim, ids) = ScenarioBuilder::new(3)
            .chain_topology()
            .with_committed(1, Address::new(4, 4))
            .with_delay(Duration::from_millis(5))
            .build();

        assert_eq!(ids, [0, 1, 2]);
        assert_eq!(sim.node(0).map(|n| n.state()), Some(NodeState::NoAddress));
        assert_eq!(
            sim.node(1).and_then(|n| n.committed_address()),
            Some(Address::new(4, 4))
        );
        assert!(!sim.topology().is_connected(0, 2));
        assert_eq!(
            sim.topology().get_link(1, 2).map(|l| l.delay),
            Some(Duration::from_millis(5))
        );
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let run = || {
            let (_, result) = ScenarioBuilder::new(6)
                .with_seed(7)
                .chain_topology()
                .run_for(Duration::from_secs(15));
            (0..6)
                .map(|i| result.committed_address(i))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_partition_by_index() {
        let (sim, _) = ScenarioBuilder::new(4)
            .partition_at(Timestamp::from_millis(10), vec![vec![0, 1], vec![2, 3]])
            .heal_at(Timestamp::from_millis(20))
            .run_until(Timestamp::from_millis(15));

        assert!(sim.topology().is_connected(0, 1));
        assert!(!sim.topology().is_connected(1, 2));
    }
}
