//! Core types and constants for the qdad protocol.

use alloc::vec::Vec;
use core::fmt;

/// Width of a link address on the wire, in bytes.
pub const ADDRESS_LEN: usize = 2;

/// Encoded AREQ size: originator, requested address and hop byte.
pub const AREQ_LEN: usize = 2 * ADDRESS_LEN + 1;

/// Payload of a collision notice. Only its arrival matters to the receiver.
pub const COLLISION_NOTICE: &[u8] = b"Address is not unique!\0";

/// Two-byte mesh link address, printed as `hi.lo`.
///
/// A node starts with whatever address the link layer gave it (a placeholder
/// that is only used as the AREQ originator) and replaces it with its
/// tentative address on commit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// All-zero placeholder.
    pub const UNSET: Address = Address([0, 0]);

    /// Number of distinct addresses.
    pub const SPACE: u64 = 1 << (8 * ADDRESS_LEN);

    pub const fn new(hi: u8, lo: u8) -> Self {
        Address([hi, lo])
    }

    pub const fn from_u16(v: u16) -> Self {
        Address(v.to_be_bytes())
    }

    pub const fn as_u16(self) -> u16 {
        u16::from_be_bytes(self.0)
    }

    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}.{})", self.0[0], self.0[1])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0[0], self.0[1])
    }
}

impl From<u16> for Address {
    fn from(v: u16) -> Self {
        Address::from_u16(v)
    }
}

/// Address request, flooded to probe whether a tentative address is taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Areq {
    /// Address the requester currently answers to.
    pub originator: Address,
    /// Tentative address being probed.
    pub requested: Address,
    /// Relays left before the request stops spreading.
    pub hops_remaining: u8,
}

/// Externally visible protocol state of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// No address; choosing a tentative one.
    NoAddress,
    /// Probing a tentative address.
    Advertising,
    /// Address committed.
    Normal,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::NoAddress => "NO_ADDRESS",
            NodeState::Advertising => "ADVERTISING",
            NodeState::Normal => "NORMAL",
        };
        f.write_str(name)
    }
}

/// Frame handed to the node by the link layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Incoming {
    /// One-hop broadcast, tagged with the sender's link address.
    Broadcast { from: Address, payload: Vec<u8> },
    /// Multihop packet that reached this node, to deliver or relay.
    Multihop {
        destination: Address,
        payload: Vec<u8>,
    },
}

/// Frame the node asks the link layer to transmit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outgoing {
    /// Fan out to all one-hop neighbors.
    Broadcast { payload: Vec<u8> },
    /// One hop of a multihop packet.
    Unicast {
        next_hop: Address,
        destination: Address,
        payload: Vec<u8>,
    },
}

/// Events emitted for the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// First AREQ round for a tentative address is going out.
    AdvertisingStarted { tentative: Address },
    /// Tentative address survived all rounds and is now ours.
    AddressCommitted { address: Address },
    /// Someone requested our address; a notice was sent toward them.
    CollisionDetected {
        originator: Address,
        requested: Address,
    },
    /// A collision notice reached us; the tentative address was dropped.
    AddressRejected { tentative: Option<Address> },
}

/// Per-node protocol counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProtocolMetrics {
    /// AREQ rounds broadcast for our own tentative addresses.
    pub areq_originated: u32,
    /// AREQs rebroadcast on behalf of other nodes.
    pub areq_relayed: u32,
    /// AREQs ignored because we have no committed address.
    pub areq_not_ready: u32,
    /// Echoes of our own AREQs.
    pub areq_self_loop: u32,
    /// AREQs that arrived with no hops left.
    pub areq_hop_limit: u32,
    /// AREQs already relayed within the dedup lifetime.
    pub areq_duplicate: u32,
    /// Inbound frames that failed to decode.
    pub malformed: u32,
    /// AREQs for our own committed address.
    pub collisions_detected: u32,
    /// Collision notice hops this node resolved and sent.
    pub notices_forwarded: u32,
    /// Collision notices dropped for lack of a reverse route.
    pub notices_dropped: u32,
    /// Collision notices that terminated here.
    pub notices_delivered: u32,
    /// Cache inserts skipped because the cache was full.
    pub cache_full: u32,
    /// Frames the transport queue refused.
    pub queue_dropped: u32,
}

impl ProtocolMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Error type for node operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The transport's outgoing queue is full.
    #[error("transport outgoing queue is full")]
    QueueFull,
    /// No reverse route toward the destination.
    #[error("no route to {0}")]
    NoRoute(Address),
}
