//! Node implementation - owns all per-node protocol state.
//!
//! The Node struct holds the FSM, both caches and the metrics, and provides
//! an async `run()` method that drives the protocol. It is fully
//! event-driven:
//! - Incoming broadcasts go to the flood handler
//! - Incoming multihop packets are delivered or relayed one hop
//! - The FSM timer advances address selection, advertising and commit
//!
//! # Usage
//!
//! ```ignore
//! let mut node: Node<_, _, _> = Node::new(transport, random, clock, link_address);
//!
//! // Spawn the node's run loop
//! spawn(async move {
//!     node.run().await;
//! });
//!
//! // Watch for the committed address
//! loop {
//!     if let Event::AddressCommitted { address } = node.events().receive().await {
//!         break address;
//!     }
//! }
//! ```

use core::marker::PhantomData;

use embassy_sync::channel::Channel;
use log::{debug, trace, warn};

use crate::cache::{CacheStore, ReverseRoutes, SeenRequests};
use crate::config::{DadConfig, DefaultConfig};
use crate::fsm::Phase;
use crate::time::Timestamp;
use crate::traits::{Clock, EventChannel, Random, Transport};
use crate::types::{
    Address, Areq, Error, Event, Incoming, NodeState, Outgoing, ProtocolMetrics,
};
use crate::wire::Decode;

/// The main protocol node.
///
/// Generic over:
/// - `T`: Transport implementation
/// - `R`: Random number generator
/// - `Clk`: Clock/timer implementation
/// - `Cfg`: Protocol configuration (timings, cache capacity, hop budget)
///
/// The node is fully event-driven. Call `run()` to start the main loop, or
/// drive it by hand with [`handle_incoming`](Self::handle_incoming),
/// [`handle_timer`](Self::handle_timer) and [`next_wake`](Self::next_wake).
pub struct Node<T, R, Clk, Cfg = DefaultConfig> {
    // Dependencies (injected)
    transport: T,
    random: R,
    clock: Clk,

    events: EventChannel,

    // Identity: the link address until commit, then the committed one.
    address: Address,

    // FSM
    phase: Phase,
    wake_at: Timestamp,

    caches: CacheStore,
    metrics: ProtocolMetrics,

    _config: PhantomData<Cfg>,
}

impl<T, R, Clk, Cfg> Node<T, R, Clk, Cfg>
where
    T: Transport,
    R: Random,
    Clk: Clock,
    Cfg: DadConfig,
{
    /// Create a node with no address.
    ///
    /// `link_address` is what the link layer calls this node before it has
    /// committed; it is used as the AREQ originator so collision notices can
    /// find their way back.
    pub fn new(transport: T, random: R, clock: Clk, link_address: Address) -> Self {
        let now = clock.now();
        Self {
            transport,
            random,
            clock,
            events: Channel::new(),
            address: link_address,
            phase: Phase::NoAddress { pending: None },
            wake_at: now,
            caches: CacheStore::with_capacity(Cfg::MAX_CACHE_ENTRIES),
            metrics: ProtocolMetrics::new(),
            _config: PhantomData,
        }
    }

    /// Create a node that already holds `address` (state Normal).
    ///
    /// Used to seed an established mesh.
    pub fn with_address(transport: T, random: R, clock: Clk, address: Address) -> Self {
        let mut node = Self::new(transport, random, clock, address);
        node.phase = Phase::Normal;
        node.wake_at = node.clock.now() + Cfg::NORMAL_IDLE_INTERVAL;
        node
    }

    /// Current protocol state.
    pub fn state(&self) -> NodeState {
        self.phase.state()
    }

    /// Address this node answers to right now.
    ///
    /// Before commit this is the link address given to [`Node::new`].
    pub fn address(&self) -> Address {
        self.address
    }

    /// Committed address, if the node is in Normal state.
    pub fn committed_address(&self) -> Option<Address> {
        matches!(self.phase, Phase::Normal).then_some(self.address)
    }

    /// Tentative address being probed or about to be probed.
    pub fn tentative_address(&self) -> Option<Address> {
        self.phase.tentative()
    }

    /// AREQ rounds already broadcast for the current tentative address.
    pub fn advertisement_round(&self) -> u8 {
        match &self.phase {
            Phase::Advertising(adv) => adv.round,
            _ => 0,
        }
    }

    /// Protocol event channel.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Per-node protocol counters.
    pub fn metrics(&self) -> &ProtocolMetrics {
        &self.metrics
    }

    pub fn seen_requests(&self) -> &SeenRequests {
        &self.caches.seen
    }

    pub fn reverse_routes(&self) -> &ReverseRoutes {
        &self.caches.routes
    }

    /// When the node next needs [`handle_timer`](Self::handle_timer):
    /// the FSM deadline or the earliest cache expiry, whichever is first.
    pub fn next_wake(&self) -> Timestamp {
        match self.caches.next_expiry() {
            Some(expiry) => self.wake_at.min(expiry),
            None => self.wake_at,
        }
    }

    /// Run the node's main loop.
    ///
    /// Waits for either an incoming frame or the next wake time, handles it,
    /// and repeats forever. Call this from an async task/executor.
    pub async fn run(&mut self) -> ! {
        use embassy_futures::select::{select, Either};

        loop {
            let wake = self.next_wake();

            let result = select(
                self.transport.incoming().receive(),
                self.clock.sleep_until(wake),
            )
            .await;

            let now = self.clock.now();
            match result {
                Either::First(frame) => self.handle_incoming(frame, now),
                Either::Second(()) => self.handle_timer(now),
            }
        }
    }

    /// Handle a frame from the link layer.
    ///
    /// Runs to completion: at most one frame is queued in response.
    pub fn handle_incoming(&mut self, frame: Incoming, now: Timestamp) {
        self.caches.purge_expired(now);

        match frame {
            Incoming::Broadcast { from, payload } => match Areq::decode_from_slice(&payload) {
                Ok(areq) => self.handle_areq(areq, from, now),
                Err(e) => {
                    self.metrics.malformed += 1;
                    trace!("{}: dropping broadcast from {}: {}", self.address, from, e);
                }
            },
            Incoming::Multihop {
                destination,
                payload,
            } => self.handle_multihop(destination, payload, now),
        }
    }

    /// Handle timer expiry: purge caches and advance the FSM.
    pub fn handle_timer(&mut self, now: Timestamp) {
        let purged = self.caches.purge_expired(now);
        if purged > 0 {
            trace!("{}: purged {} expired cache entries", self.address, purged);
        }
        self.step(now);
    }

    // --- Internal helpers for other modules ---

    pub(crate) fn phase(&self) -> &Phase {
        &self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        if phase.state() != self.phase.state() {
            debug!(
                "{}: {} -> {}",
                self.address,
                self.phase.state(),
                phase.state()
            );
        }
        self.phase = phase;
    }

    pub(crate) fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    pub(crate) fn wake_at(&self) -> Timestamp {
        self.wake_at
    }

    pub(crate) fn set_wake_at(&mut self, time: Timestamp) {
        self.wake_at = time;
    }

    pub(crate) fn random_mut(&mut self) -> &mut R {
        &mut self.random
    }

    pub(crate) fn caches_mut(&mut self) -> &mut CacheStore {
        &mut self.caches
    }

    pub(crate) fn metrics_mut(&mut self) -> &mut ProtocolMetrics {
        &mut self.metrics
    }

    /// Queue a frame for transmission.
    pub(crate) fn enqueue(&mut self, frame: Outgoing) -> Result<(), Error> {
        if self.transport.outgoing().try_send(frame).is_err() {
            self.metrics.queue_dropped += 1;
            warn!("{}: outgoing queue full, frame dropped", self.address);
            return Err(Error::QueueFull);
        }
        Ok(())
    }

    /// Push an event to the events channel.
    pub(crate) fn push_event(&mut self, event: Event) {
        let _ = self.events.try_send(event);
    }
}
