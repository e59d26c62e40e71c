//! SimNode wrapper for simulated DAD nodes.

use std::cell::Cell;
use std::collections::VecDeque;
use std::future::{ready, Ready};

use embassy_sync::channel::Channel;
use qdad::config::DefaultConfig;
use qdad::traits::{Clock, IncomingChannel, OutgoingChannel, Random, Transport};
use qdad::{
    Address, Event, Incoming, Node, NodeState, Outgoing, ProtocolMetrics, Timestamp,
};

use crate::event::SimId;

/// Channel-backed link layer; the simulator drains it after every handler.
pub struct SimTransport {
    outgoing: OutgoingChannel,
    incoming: IncomingChannel,
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            outgoing: Channel::new(),
            incoming: Channel::new(),
        }
    }

    /// Take all queued frames in transmit order.
    pub fn take_sent(&self) -> Vec<Outgoing> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outgoing.try_receive() {
            frames.push(frame);
        }
        frames
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimTransport {
    fn outgoing(&self) -> &OutgoingChannel {
        &self.outgoing
    }

    fn incoming(&self) -> &IncomingChannel {
        &self.incoming
    }
}

/// Mock clock for simulation.
///
/// Time is controlled externally by the simulator.
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::at(Timestamp::ZERO)
    }
}

impl Clock for SimClock {
    type SleepFuture<'a> = Ready<()>;

    fn now(&self) -> Timestamp {
        self.current.get()
    }

    fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
        ready(())
    }
}

/// Deterministic randomness: scripted values first, then an LCG.
///
/// A script lets a scenario force a particular tentative address (and
/// jitter) so collisions can be staged on purpose.
pub struct SimRandom {
    script: VecDeque<u64>,
    state: u64,
}

impl SimRandom {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            script: VecDeque::new(),
            state: seed,
        }
    }

    pub fn with_script(mut self, values: impl IntoIterator<Item = u64>) -> Self {
        self.script.extend(values);
        self
    }
}

impl Random for SimRandom {
    fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        let range = max.saturating_sub(min);
        let raw = match self.script.pop_front() {
            Some(v) if (min..max).contains(&v) => return v,
            Some(v) => v,
            None => {
                self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
                self.state
            }
        };
        if range == 0 {
            return min;
        }
        min + raw % range
    }
}

/// Type alias for simulated nodes.
pub type SimNodeInner = Node<SimTransport, SimRandom, SimClock, DefaultConfig>;

/// Link address a node uses before it commits.
pub fn link_address(id: SimId) -> Address {
    Address::from_u16((id as u16).wrapping_add(1))
}

/// Wrapper around a qdad Node for simulation.
pub struct SimNode {
    id: SimId,
    inner: SimNodeInner,
    /// When the node was created.
    pub created_at: Timestamp,
    /// Timer the simulator has queued for this node, if any.
    pub(crate) scheduled_wake: Option<Timestamp>,
    /// Protocol events drained from the node, stamped with sim time.
    event_log: Vec<(Timestamp, Event)>,
}

impl SimNode {
    /// A fresh node starting in NoAddress with its link address.
    pub fn new(id: SimId, seed: u64, created_at: Timestamp) -> Self {
        Self::from_random(id, SimRandom::with_seed(seed), created_at, None)
    }

    /// A node whose first random draws come from `script`.
    pub fn with_script(
        id: SimId,
        seed: u64,
        script: impl IntoIterator<Item = u64>,
        created_at: Timestamp,
    ) -> Self {
        let random = SimRandom::with_seed(seed).with_script(script);
        Self::from_random(id, random, created_at, None)
    }

    /// A node already holding `address` in Normal state.
    pub fn settled(id: SimId, seed: u64, address: Address, created_at: Timestamp) -> Self {
        Self::from_random(id, SimRandom::with_seed(seed), created_at, Some(address))
    }

    fn from_random(
        id: SimId,
        random: SimRandom,
        created_at: Timestamp,
        committed: Option<Address>,
    ) -> Self {
        let transport = SimTransport::new();
        let clock = SimClock::at(created_at);
        let inner = match committed {
            Some(address) => Node::with_address(transport, random, clock, address),
            None => Node::new(transport, random, clock, link_address(id)),
        };
        Self {
            id,
            inner,
            created_at,
            scheduled_wake: None,
            event_log: Vec::new(),
        }
    }

    pub fn id(&self) -> SimId {
        self.id
    }

    pub fn inner(&self) -> &SimNodeInner {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut SimNodeInner {
        &mut self.inner
    }

    pub fn state(&self) -> NodeState {
        self.inner.state()
    }

    /// Address the node answers to right now (link address until commit).
    pub fn address(&self) -> Address {
        self.inner.address()
    }

    pub fn committed_address(&self) -> Option<Address> {
        self.inner.committed_address()
    }

    pub fn tentative_address(&self) -> Option<Address> {
        self.inner.tentative_address()
    }

    pub fn metrics(&self) -> &ProtocolMetrics {
        self.inner.metrics()
    }

    pub fn next_wake(&self) -> Timestamp {
        self.inner.next_wake()
    }

    /// Handle a frame delivered by the simulated radio.
    pub fn handle_incoming(&mut self, frame: Incoming, now: Timestamp) {
        // Update the clock so any code that reads clock.now() gets correct time
        self.inner.clock().set(now);
        self.inner.handle_incoming(frame, now);
        self.drain_events(now);
    }

    pub fn handle_timer(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.handle_timer(now);
        self.drain_events(now);
    }

    /// Take all outgoing frames from the transport.
    pub fn take_outgoing(&self) -> Vec<Outgoing> {
        self.inner.transport().take_sent()
    }

    /// Every protocol event so far, oldest first.
    pub fn event_log(&self) -> &[(Timestamp, Event)] {
        &self.event_log
    }

    /// When the node last committed an address.
    pub fn committed_at(&self) -> Option<Timestamp> {
        self.event_log.iter().rev().find_map(|(t, e)| match e {
            Event::AddressCommitted { .. } => Some(*t),
            _ => None,
        })
    }

    fn drain_events(&mut self, now: Timestamp) {
        while let Ok(event) = self.inner.events().try_receive() {
            self.event_log.push((now, event));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_node_uses_link_address() {
        let node = SimNode::new(4, 42, Timestamp::ZERO);
        assert_eq!(node.state(), NodeState::NoAddress);
        assert_eq!(node.address(), Address::new(0, 5));
        assert_eq!(node.next_wake(), Timestamp::ZERO);
    }

    #[test]
    fn test_settled_node_is_normal() {
        let node = SimNode::settled(0, 1, Address::new(3, 3), Timestamp::from_secs(2));
        assert_eq!(node.committed_address(), Some(Address::new(3, 3)));
        assert_eq!(node.created_at, Timestamp::from_secs(2));
    }

    #[test]
    fn test_script_forces_tentative_and_jitter() {
        let mut node = SimNode::with_script(0, 1, [0xbeef, 250], Timestamp::ZERO);
        node.handle_timer(Timestamp::ZERO);

        assert_eq!(node.tentative_address(), Some(Address::from_u16(0xbeef)));
        assert_eq!(node.next_wake(), Timestamp::from_millis(250));
    }

    #[test]
    fn test_events_logged_with_time() {
        let mut node = SimNode::with_script(0, 1, [0x0102, 0], Timestamp::ZERO);
        node.handle_timer(Timestamp::from_millis(5));
        assert_eq!(node.take_outgoing().len(), 1);

        assert_eq!(
            node.event_log(),
            [(
                Timestamp::from_millis(5),
                Event::AdvertisingStarted {
                    tentative: Address::new(1, 2),
                },
            )]
        );
        assert_eq!(node.committed_at(), None);
    }

    #[test]
    fn test_sim_random_folds_out_of_range_script() {
        let mut rng = SimRandom::with_seed(9).with_script([7, 1_000]);
        assert_eq!(rng.gen_range(0, 10), 7);
        assert_eq!(rng.gen_range(0, 10), 0);
        assert!(rng.gen_range(100, 200) >= 100);
    }
}
