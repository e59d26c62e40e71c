//! qdadsim - Discrete event network simulator for qdad protocol testing.
//!
//! This crate provides a deterministic, discrete-event simulator for testing
//! flood-based duplicate address detection on meshes of any shape without
//! real-time delays.
//!
//! # Features
//!
//! - **Discrete event simulation**: No real-time delays, deterministic ordering
//! - **Configurable topology**: Fully connected, chain, star, unit-disk or custom
//! - **Link properties**: Packet loss, delay and up/down per link
//! - **Scripted randomness**: Force a node's tentative address to stage collisions
//! - **Scenario builder**: Pre-settled nodes, scheduled partitions and healing
//! - **Metrics collection**: Address snapshots, frame counts, convergence time
//!
//! # Example
//!
//! ```
//! use qdadsim::{Duration, ScenarioBuilder};
//!
//! // Five nodes on a line, all starting without an address
//! let (_sim, result) = ScenarioBuilder::new(5)
//!     .with_seed(42)
//!     .chain_topology()
//!     .run_for(Duration::from_secs(15));
//!
//! // Everyone committed, nobody shares an address
//! assert!(result.converged());
//! ```
//!
//! # Architecture
//!
//! The simulator uses a priority queue of events ordered by (time, sequence_number).
//! The main loop:
//! 1. Pop next event from queue
//! 2. Advance simulation time
//! 3. Process event (call node handlers)
//! 4. Collect outgoing frames
//! 5. Route through topology, schedule deliveries
//! 6. Re-arm the node's timer at its `next_wake`
//!
//! Handlers are called directly (`handle_incoming`, `handle_timer`) instead of
//! through the async `node.run()` method. The simulator plays the link layer:
//! broadcasts reach every active neighbor, and a unicast hop reaches the
//! neighbor whose current address matches the requested next hop.

pub mod event;
pub mod metrics;
pub mod node;
pub mod scenario;
pub mod sim;
pub mod topology;

// Re-export main types
pub use event::{Event, ScenarioAction, ScheduledEvent, SimId};
pub use metrics::{AddressSnapshot, SimMetrics, SimulationResult};
pub use node::SimNode;
pub use qdad::{Address, Duration, NodeState, Timestamp};
pub use scenario::ScenarioBuilder;
pub use sim::Simulator;
pub use topology::{Link, Topology};
