//! Radio neighborhoods: which simulated nodes can hear each other.

use hashbrown::HashMap;
use qdad::Duration;

use crate::event::SimId;

/// Properties of a radio link between two nodes.
#[derive(Debug, Clone)]
pub struct Link {
    /// Probability that a single frame is lost (0.0 to 1.0).
    pub loss_rate: f64,
    /// One-hop delivery delay.
    pub delay: Duration,
    /// Whether the link is currently up.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
            active: true,
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Symmetric connectivity between simulated nodes.
///
/// Broadcasts reach every node with an active link to the sender; nothing
/// else is reachable in one hop.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    links: HashMap<(SimId, SimId), Link>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node hears every other node.
    pub fn fully_connected(nodes: &[SimId]) -> Self {
        let mut topo = Self::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in &nodes[i + 1..] {
                topo.add_link(a, b, Link::default());
            }
        }
        topo
    }

    /// A line: each node only hears its predecessor and successor.
    pub fn chain(nodes: &[SimId]) -> Self {
        let mut topo = Self::new();
        for pair in nodes.windows(2) {
            topo.add_link(pair[0], pair[1], Link::default());
        }
        topo
    }

    /// First node is the hub; spokes only hear the hub.
    pub fn star(nodes: &[SimId]) -> Self {
        let mut topo = Self::new();
        if let Some((&hub, spokes)) = nodes.split_first() {
            for &spoke in spokes {
                topo.add_link(hub, spoke, Link::default());
            }
        }
        topo
    }

    /// Unit-disk graph over seeded positions in the unit square.
    ///
    /// Nodes within `radius` of each other are linked. If that leaves the
    /// graph split, the shortest bridging edges are added until every node
    /// is reachable from the first one.
    pub fn unit_disk(nodes: &[SimId], seed: u64, radius: f64) -> Self {
        let mut topo = Self::new();
        let positions = scatter(nodes.len(), seed);
        let distance = |i: usize, j: usize| {
            let dx = positions[i].0 - positions[j].0;
            let dy = positions[i].1 - positions[j].1;
            (dx * dx + dy * dy).sqrt()
        };

        for i in 0..nodes.len() {
            for j in i + 1..nodes.len() {
                if distance(i, j) <= radius {
                    topo.add_link(nodes[i], nodes[j], Link::default());
                }
            }
        }

        // Grow the component around node 0, bridging to the nearest outsider
        // whenever it stops growing.
        loop {
            let reached = topo.reachable_from(nodes, 0);
            let (inside, outside): (Vec<usize>, Vec<usize>) =
                (0..nodes.len()).partition(|&i| reached[i]);
            let outside = &outside;
            let bridge = inside
                .iter()
                .flat_map(|&i| outside.iter().map(move |&j| (i, j)))
                .min_by(|&(a, b), &(c, d)| distance(a, b).total_cmp(&distance(c, d)));

            match bridge {
                Some((i, j)) => topo.add_link(nodes[i], nodes[j], Link::default()),
                None => break,
            }
        }

        topo
    }

    /// Unit-disk graph with a radius sized for about five neighbors per node.
    pub fn unit_disk_adaptive(nodes: &[SimId], seed: u64) -> Self {
        Self::unit_disk(nodes, seed, adaptive_radius(nodes.len()))
    }

    /// Add (or replace) the link between `a` and `b`.
    pub fn add_link(&mut self, a: SimId, b: SimId, link: Link) {
        self.links.insert(Self::key(a, b), link);
    }

    pub fn get_link(&self, a: SimId, b: SimId) -> Option<&Link> {
        self.links.get(&Self::key(a, b))
    }

    pub fn get_link_mut(&mut self, a: SimId, b: SimId) -> Option<&mut Link> {
        self.links.get_mut(&Self::key(a, b))
    }

    /// A link exists and is up.
    pub fn is_connected(&self, a: SimId, b: SimId) -> bool {
        self.get_link(a, b).is_some_and(|link| link.active)
    }

    /// Nodes that hear `node` right now, in ascending order.
    pub fn neighbors(&self, node: SimId) -> Vec<SimId> {
        let mut result: Vec<SimId> = self
            .links
            .iter()
            .filter(|(_, link)| link.active)
            .filter_map(|(&(a, b), _)| {
                if a == node {
                    Some(b)
                } else if b == node {
                    Some(a)
                } else {
                    None
                }
            })
            .collect();
        result.sort_unstable();
        result
    }

    /// Take down every link whose ends sit in different groups.
    ///
    /// Nodes not listed in any group count as one extra group of their own.
    pub fn partition(&mut self, groups: &[Vec<SimId>]) {
        let group_of = |id: SimId| groups.iter().position(|g| g.contains(&id));
        for (&(a, b), link) in self.links.iter_mut() {
            if group_of(a) != group_of(b) {
                link.active = false;
            }
        }
    }

    /// Bring every link back up.
    pub fn heal(&mut self) {
        for link in self.links.values_mut() {
            link.active = true;
        }
    }

    pub fn set_global_loss_rate(&mut self, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        for link in self.links.values_mut() {
            link.loss_rate = rate;
        }
    }

    pub fn set_global_delay(&mut self, delay: Duration) {
        for link in self.links.values_mut() {
            link.delay = delay;
        }
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    fn key(a: SimId, b: SimId) -> (SimId, SimId) {
        (a.min(b), a.max(b))
    }

    /// Which of `nodes` (by index) can be reached from `nodes[start]`.
    fn reachable_from(&self, nodes: &[SimId], start: usize) -> Vec<bool> {
        let mut reached = vec![false; nodes.len()];
        if nodes.is_empty() {
            return reached;
        }
        let mut stack = vec![start];
        reached[start] = true;
        while let Some(i) = stack.pop() {
            for j in 0..nodes.len() {
                if !reached[j] && self.is_connected(nodes[i], nodes[j]) {
                    reached[j] = true;
                    stack.push(j);
                }
            }
        }
        reached
    }
}

/// Seeded points in the unit square.
fn scatter(count: usize, seed: u64) -> Vec<(f64, f64)> {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        ((state >> 16) & 0x7FFF) as f64 / 32767.0
    };
    (0..count).map(|_| (next(), next())).collect()
}

/// r = sqrt(k / ((n - 1) * pi)) for k = 5 expected neighbors, clamped.
pub(crate) fn adaptive_radius(num_nodes: usize) -> f64 {
    if num_nodes <= 1 {
        return 0.5;
    }
    let n = num_nodes as f64;
    (5.0 / ((n - 1.0) * core::f64::consts::PI))
        .sqrt()
        .clamp(0.15, 0.70)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(count: usize) -> Vec<SimId> {
        (0..count).collect()
    }

    fn all_reachable(topo: &Topology, nodes: &[SimId]) -> bool {
        topo.reachable_from(nodes, 0).iter().all(|&r| r)
    }

    #[test]
    fn test_chain_links_only_adjacent_nodes() {
        let nodes = ids(4);
        let topo = Topology::chain(&nodes);

        assert!(topo.is_connected(0, 1));
        assert!(topo.is_connected(2, 1));
        assert!(topo.is_connected(2, 3));
        assert!(!topo.is_connected(0, 2));
        assert_eq!(topo.neighbors(1), [0, 2]);
        assert_eq!(topo.neighbors(3), [2]);
    }

    #[test]
    fn test_star_spokes_only_hear_hub() {
        let topo = Topology::star(&ids(4));

        assert_eq!(topo.neighbors(0), [1, 2, 3]);
        assert_eq!(topo.neighbors(2), [0]);
        assert!(!topo.is_connected(1, 3));
    }

    #[test]
    fn test_partition_and_heal() {
        let mut topo = Topology::fully_connected(&ids(4));
        topo.partition(&[vec![0, 1], vec![2, 3]]);

        assert!(topo.is_connected(0, 1));
        assert!(topo.is_connected(2, 3));
        assert!(!topo.is_connected(1, 2));
        assert_eq!(topo.neighbors(0), [1]);

        topo.heal();
        assert_eq!(topo.neighbors(0), [1, 2, 3]);
    }

    #[test]
    fn test_partition_unlisted_nodes_form_own_group() {
        let mut topo = Topology::fully_connected(&ids(3));
        topo.partition(&[vec![0]]);

        assert!(!topo.is_connected(0, 1));
        assert!(topo.is_connected(1, 2));
    }

    #[test]
    fn test_unit_disk_is_connected_and_deterministic() {
        let nodes = ids(20);
        let a = Topology::unit_disk(&nodes, 42, 0.3);
        let b = Topology::unit_disk(&nodes, 42, 0.3);

        assert!(all_reachable(&a, &nodes));
        for i in 0..nodes.len() {
            assert_eq!(a.neighbors(i), b.neighbors(i));
        }
    }

    #[test]
    fn test_unit_disk_tiny_radius_bridged() {
        let nodes = ids(10);
        let topo = Topology::unit_disk(&nodes, 7, 0.01);

        assert!(all_reachable(&topo, &nodes));
        // A spanning tree needs exactly n - 1 bridges when nothing is in range
        assert!(topo.link_count() >= nodes.len() - 1);
    }

    #[test]
    fn test_adaptive_radius_bounds() {
        assert!((adaptive_radius(2) - 0.70).abs() < 0.01);
        assert!(adaptive_radius(100) < adaptive_radius(5));
        assert!((adaptive_radius(1000) - 0.15).abs() < 0.01);
    }

    #[test]
    fn test_global_link_settings() {
        let mut topo = Topology::chain(&ids(3));
        topo.set_global_loss_rate(1.5);
        topo.set_global_delay(Duration::from_millis(20));

        let link = topo.get_link(1, 0).cloned().unwrap_or_default();
        assert_eq!(link.loss_rate, 1.0);
        assert_eq!(link.delay, Duration::from_millis(20));
    }
}
