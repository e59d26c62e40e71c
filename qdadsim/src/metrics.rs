//! Metrics collection for simulation analysis.

use hashbrown::HashMap;
use qdad::{Address, NodeState, Timestamp};

use crate::event::SimId;

/// Per-node address state at a point in time.
#[derive(Debug, Clone)]
pub struct AddressSnapshot {
    /// When this snapshot was taken.
    pub time: Timestamp,
    pub states: HashMap<SimId, NodeState>,
    /// Current address of each node (link address until commit).
    pub addresses: HashMap<SimId, Address>,
}

impl AddressSnapshot {
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            states: HashMap::new(),
            addresses: HashMap::new(),
        }
    }

    pub fn record_node(&mut self, id: SimId, state: NodeState, address: Address) {
        self.states.insert(id, state);
        self.addresses.insert(id, address);
    }

    pub fn all_normal(&self) -> bool {
        self.states.values().all(|&s| s == NodeState::Normal)
    }

    pub fn normal_count(&self) -> usize {
        self.states
            .values()
            .filter(|&&s| s == NodeState::Normal)
            .count()
    }

    /// Address held by `id`, if that node has committed.
    pub fn committed_address(&self, id: SimId) -> Option<Address> {
        match self.states.get(&id) {
            Some(NodeState::Normal) => self.addresses.get(&id).copied(),
            _ => None,
        }
    }

    /// Addresses committed by more than one node, sorted.
    pub fn duplicate_addresses(&self) -> Vec<Address> {
        let mut committed: Vec<Address> = self
            .states
            .keys()
            .filter_map(|&id| self.committed_address(id))
            .collect();
        committed.sort_unstable();

        let mut dups: Vec<Address> = committed
            .windows(2)
            .filter(|w| w[0] == w[1])
            .map(|w| w[0])
            .collect();
        dups.dedup();
        dups
    }

    /// No two committed nodes share an address.
    pub fn addresses_unique(&self) -> bool {
        self.duplicate_addresses().is_empty()
    }
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Frames handed to the radio (one per broadcast or unicast hop).
    pub messages_sent: u64,
    /// Per-receiver copies lost to the loss rate.
    pub messages_dropped: u64,
    /// Per-receiver copies that reached a node.
    pub messages_delivered: u64,
    pub broadcasts_sent: u64,
    pub unicasts_sent: u64,
    /// Unicasts whose next hop no active neighbor answered to.
    pub unicasts_unreachable: u64,
    /// Address snapshots taken at intervals.
    pub snapshots: Vec<AddressSnapshot>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_snapshot(&mut self, snapshot: AddressSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// Whether the first snapshot at or after `time` shows every node
    /// settled on a unique address.
    pub fn converged_by(&self, time: Timestamp) -> bool {
        self.snapshots
            .iter()
            .find(|s| s.time >= time)
            .is_some_and(|s| s.all_normal() && s.addresses_unique())
    }

    /// First snapshot time with every node settled on a unique address.
    pub fn convergence_time(&self) -> Option<Timestamp> {
        self.snapshots
            .iter()
            .find(|s| s.all_normal() && s.addresses_unique())
            .map(|s| s.time)
    }

    pub fn latest_snapshot(&self) -> Option<&AddressSnapshot> {
        self.snapshots.last()
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Final simulation time.
    pub end_time: Timestamp,
    /// Collected metrics; the last snapshot is taken at `end_time`.
    pub metrics: SimMetrics,
    /// Whether simulation ended due to event queue exhaustion (vs time limit).
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// Every node committed and no address is held twice.
    pub fn converged(&self) -> bool {
        self.all_normal() && self.addresses_unique()
    }

    pub fn all_normal(&self) -> bool {
        self.metrics
            .latest_snapshot()
            .is_some_and(|s| s.all_normal())
    }

    pub fn addresses_unique(&self) -> bool {
        self.metrics
            .latest_snapshot()
            .is_some_and(|s| s.addresses_unique())
    }

    pub fn committed_address(&self, id: SimId) -> Option<Address> {
        self.metrics
            .latest_snapshot()
            .and_then(|s| s.committed_address(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ms: u64, nodes: &[(NodeState, u16)]) -> AddressSnapshot {
        let mut s = AddressSnapshot::new(Timestamp::from_millis(ms));
        for (id, &(state, addr)) in nodes.iter().enumerate() {
            s.record_node(id, state, Address::from_u16(addr));
        }
        s
    }

    #[test]
    fn test_duplicates_only_count_committed_nodes() {
        let s = snapshot(
            0,
            &[
                (NodeState::Normal, 7),
                (NodeState::Advertising, 7),
                (NodeState::Normal, 9),
            ],
        );
        assert!(s.addresses_unique());
        assert!(!s.all_normal());
        assert_eq!(s.normal_count(), 2);
        assert_eq!(s.committed_address(1), None);

        let s = snapshot(0, &[(NodeState::Normal, 7), (NodeState::Normal, 7)]);
        assert_eq!(s.duplicate_addresses(), [Address::from_u16(7)]);
    }

    #[test]
    fn test_convergence_time() {
        let mut metrics = SimMetrics::new();
        metrics.add_snapshot(snapshot(100, &[(NodeState::NoAddress, 1)]));
        metrics.add_snapshot(snapshot(200, &[(NodeState::Normal, 1)]));

        assert_eq!(metrics.convergence_time(), Some(Timestamp::from_millis(200)));
        assert!(!metrics.converged_by(Timestamp::from_millis(50)));
        assert!(metrics.converged_by(Timestamp::from_millis(150)));
    }
}
