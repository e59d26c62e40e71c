#![forbid(unsafe_code)]
//! qdad - Flood-based duplicate address detection for wireless meshes
//!
//! Every node picks a random two-byte tentative address and floods an address
//! request (AREQ) through the mesh. A settled node that already holds that
//! address answers with a collision notice, routed back hop by hop along the
//! reverse path the flood left behind. A tentative address that survives a
//! bounded number of unanswered rounds is committed.
//!
//! This crate is `no_std` but **requires the `alloc` crate**. Both caches are
//! heap-allocated maps with a compile-time capacity limit
//! ([`DadConfig::MAX_CACHE_ENTRIES`]).
//!
//! # Key Properties
//!
//! - No central authority and no pre-existing routing table
//! - Each (originator, requested) pair is relayed at most once per node per
//!   dedup lifetime
//! - Floods are bounded by a hop budget
//! - All soft state expires; nothing survives a restart
//! - Single-threaded and deterministic: every handler takes `now` explicitly
//!
//! # Example (wire format)
//!
//! ```
//! use qdad::{Address, Areq, Decode, Encode};
//!
//! let areq = Areq {
//!     originator: Address::new(0, 1),
//!     requested: Address::new(0x12, 0x34),
//!     hops_remaining: 50,
//! };
//! let bytes = areq.encode_to_vec();
//! assert_eq!(bytes, [0, 1, 0x12, 0x34, 50]);
//! assert_eq!(Areq::decode_from_slice(&bytes), Ok(areq));
//! ```
//!
//! # Example (integration pattern)
//!
//! ```text
//! use qdad::{Node, Transport, Random, Clock, Event};
//!
//! // Implement traits for your platform...
//!
//! // Create a node with the link layer's own address as placeholder
//! // let mut node: Node<_, _, _> = Node::new(transport, random, clock, link_address);
//!
//! // Spawn the node's run loop
//! // spawn(async move {
//! //     node.run().await;
//! // });
//!
//! // The link layer's multihop forwarder asks the node for next hops
//! // let next = node.resolve_next_hop(destination, now);
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Core types (Address, Areq, NodeState, Event, etc.)
//! - [`wire`] - Wire format serialization
//! - [`traits`] - Transport, Clock, Random, MultihopHandler traits
//! - [`node`] - Main Node struct and public API
//! - [`fsm`] - Address autoconfiguration state machine
//! - [`flood`] - AREQ dedup, relay and collision detection
//! - [`forward`] - Reverse-path forwarding of collision notices
//! - [`cache`] - Seen-request and reverse-route caches
//! - [`time`] - Timestamp and Duration types
//! - [`config`] - Compile-time protocol configuration

#![no_std]

#[cfg(all(feature = "test-support", not(test), not(debug_assertions)))]
compile_error!(
    "The `test-support` feature must not be enabled in release builds. \
     It includes mock random sources that are fully predictable."
);

extern crate alloc;

pub mod cache;
pub mod config;
pub mod flood;
pub mod forward;
pub mod fsm;
pub mod node;
pub mod time;
pub mod traits;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use cache::CacheError;
pub use config::{DadConfig, DefaultConfig, SmallConfig};
pub use node::Node;
pub use time::{Duration, Timestamp};
pub use traits::{Clock, MultihopHandler, Random, Transport};
pub use types::{
    Address, Areq, Error, Event, Incoming, NodeState, Outgoing, ProtocolMetrics,
    COLLISION_NOTICE,
};
pub use wire::{CollisionNotice, Decode, DecodeError, Encode};
