//! Discrete event simulator for the DAD protocol.

use std::collections::BinaryHeap;

use log::{debug, trace};
use qdad::{Address, Duration, Incoming, Outgoing, Timestamp};

use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber, SimId};
use crate::metrics::{AddressSnapshot, SimMetrics, SimulationResult};
use crate::node::SimNode;
use crate::topology::Topology;

/// Discrete event simulator for DAD meshes.
///
/// Nodes are addressed by [`SimId`], handed out in insertion order starting
/// at 0. The simulator plays the link layer for every node: it fans out
/// broadcasts to active neighbors and carries unicast hops to whichever
/// neighbor currently answers to the requested next-hop address.
pub struct Simulator {
    nodes: Vec<SimNode>,
    topology: Topology,
    current_time: Timestamp,
    event_queue: BinaryHeap<ScheduledEvent>,
    metrics: SimMetrics,
    next_seq: u64,
    /// RNG state for packet loss.
    rng_state: u64,
    snapshot_interval: Option<Duration>,
    next_snapshot: Option<Timestamp>,
}

impl Simulator {
    /// Create a new simulator with given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: Vec::new(),
            topology: Topology::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            rng_state: seed,
            snapshot_interval: None,
            next_snapshot: None,
        }
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Record an address snapshot every `interval`.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    /// Add a node that starts without an address.
    pub fn add_node(&mut self, seed: u64) -> SimId {
        let id = self.nodes.len();
        self.add_node_internal(SimNode::new(id, seed, self.current_time))
    }

    /// Add a node whose first random draws (tentative address, then jitter)
    /// come from `script`.
    pub fn add_scripted_node(&mut self, seed: u64, script: Vec<u64>) -> SimId {
        let id = self.nodes.len();
        self.add_node_internal(SimNode::with_script(id, seed, script, self.current_time))
    }

    /// Add a node that already holds `address`.
    pub fn add_settled_node(&mut self, seed: u64, address: Address) -> SimId {
        let id = self.nodes.len();
        self.add_node_internal(SimNode::settled(id, seed, address, self.current_time))
    }

    fn add_node_internal(&mut self, node: SimNode) -> SimId {
        let id = node.id();
        debug!(
            "sim: node {} joins as {} ({})",
            id,
            node.address(),
            node.state()
        );
        self.nodes.push(node);
        self.reschedule_timer(id);
        id
    }

    pub fn node(&self, id: SimId) -> Option<&SimNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: SimId) -> Option<&mut SimNode> {
        self.nodes.get_mut(id)
    }

    pub fn node_ids(&self) -> Vec<SimId> {
        (0..self.nodes.len()).collect()
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    /// Schedule an event.
    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    /// Schedule a scenario action.
    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Run simulation until specified time.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while self
            .event_queue
            .peek()
            .is_some_and(|event| event.time <= end_time)
        {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.process_event(event.event);
            self.maybe_take_snapshot();
        }

        // Advance to end_time even if no more events
        self.advance_time(end_time);
        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    /// Run simulation for specified duration.
    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    /// Run until event queue is empty or max events processed.
    pub fn run_events(&mut self, max_events: usize) -> SimulationResult {
        for _ in 0..max_events {
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.process_event(event.event);
            self.maybe_take_snapshot();
        }

        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::BroadcastDelivery { to, from, payload } => {
                self.deliver(to, Incoming::Broadcast { from, payload });
            }
            Event::UnicastDelivery {
                to,
                destination,
                payload,
            } => {
                self.deliver(
                    to,
                    Incoming::Multihop {
                        destination,
                        payload,
                    },
                );
            }
            Event::TimerFire { node } => self.fire_timer(node),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    fn deliver(&mut self, to: SimId, frame: Incoming) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(to) else {
            return;
        };
        node.handle_incoming(frame, now);
        self.metrics.messages_delivered += 1;

        self.collect_outgoing(to);
        self.reschedule_timer(to);
    }

    fn fire_timer(&mut self, id: SimId) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        // Superseded by a later reschedule
        if node.scheduled_wake != Some(now) {
            return;
        }
        node.scheduled_wake = None;
        node.handle_timer(now);

        self.collect_outgoing(id);
        self.reschedule_timer(id);
    }

    /// Keep exactly one live timer per node, at its current `next_wake`.
    fn reschedule_timer(&mut self, id: SimId) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let wake = node.next_wake().max(now);
        if node.scheduled_wake == Some(wake) {
            return;
        }
        node.scheduled_wake = Some(wake);
        self.schedule(wake, Event::TimerFire { node: id });
    }

    fn collect_outgoing(&mut self, sender: SimId) {
        let frames = match self.nodes.get(sender) {
            Some(node) => node.take_outgoing(),
            None => return,
        };

        for frame in frames {
            match frame {
                Outgoing::Broadcast { payload } => self.route_broadcast(sender, payload),
                Outgoing::Unicast {
                    next_hop,
                    destination,
                    payload,
                } => self.route_unicast(sender, next_hop, destination, payload),
            }
        }
    }

    /// One copy per active neighbor, each subject to that link's loss rate.
    fn route_broadcast(&mut self, sender: SimId, payload: Vec<u8>) {
        let Some(from) = self.nodes.get(sender).map(|n| n.address()) else {
            return;
        };
        self.metrics.messages_sent += 1;
        self.metrics.broadcasts_sent += 1;

        for neighbor in self.topology.neighbors(sender) {
            let Some(delay) = self.transmit(sender, neighbor) else {
                continue;
            };
            self.schedule(
                self.current_time + delay,
                Event::BroadcastDelivery {
                    to: neighbor,
                    from,
                    payload: payload.clone(),
                },
            );
        }
    }

    /// Hand a multihop packet to the neighbor that answers to `next_hop`.
    fn route_unicast(
        &mut self,
        sender: SimId,
        next_hop: Address,
        destination: Address,
        payload: Vec<u8>,
    ) {
        self.metrics.messages_sent += 1;
        self.metrics.unicasts_sent += 1;

        let targets: Vec<SimId> = self
            .topology
            .neighbors(sender)
            .into_iter()
            .filter(|&n| self.nodes.get(n).is_some_and(|node| node.address() == next_hop))
            .collect();

        if targets.is_empty() {
            self.metrics.unicasts_unreachable += 1;
            debug!(
                "sim: node {} has no neighbor at {} (packet for {})",
                sender, next_hop, destination
            );
            return;
        }

        for to in targets {
            let Some(delay) = self.transmit(sender, to) else {
                continue;
            };
            self.schedule(
                self.current_time + delay,
                Event::UnicastDelivery {
                    to,
                    destination,
                    payload: payload.clone(),
                },
            );
        }
    }

    /// Roll the link's loss dice. Returns the delay if the frame gets through.
    fn transmit(&mut self, from: SimId, to: SimId) -> Option<Duration> {
        let (active, loss_rate, delay) = {
            let link = self.topology.get_link(from, to)?;
            (link.active, link.loss_rate, link.delay)
        };
        if !active {
            return None;
        }
        if loss_rate > 0.0 && self.random_f64() < loss_rate {
            self.metrics.messages_dropped += 1;
            trace!("sim: frame {} -> {} lost", from, to);
            return None;
        }
        Some(delay)
    }

    fn execute_action(&mut self, action: ScenarioAction) {
        debug!("sim: {:?} at {}", action, self.current_time);
        match action {
            ScenarioAction::Partition { groups } => {
                self.topology.partition(&groups);
            }
            ScenarioAction::HealPartition => {
                self.topology.heal();
            }
            ScenarioAction::DisableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { a, b } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { a, b, rate } => {
                if let Some(link) = self.topology.get_link_mut(a, b) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
            ScenarioAction::TakeSnapshot => {
                self.take_snapshot();
            }
        }
    }

    fn maybe_take_snapshot(&mut self) {
        let (Some(next), Some(interval)) = (self.next_snapshot, self.snapshot_interval) else {
            return;
        };
        if self.current_time >= next {
            self.take_snapshot();
            self.next_snapshot = Some(next + interval);
        }
    }

    /// Record every node's state and current address.
    pub fn take_snapshot(&mut self) {
        let mut snapshot = AddressSnapshot::new(self.current_time);
        for node in &self.nodes {
            snapshot.record_node(node.id(), node.state(), node.address());
        }
        self.metrics.add_snapshot(snapshot);
    }

    /// Generate a random f64 in [0, 1).
    fn random_f64(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }
}
