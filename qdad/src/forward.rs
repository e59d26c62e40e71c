//! Reverse-path forwarding of collision notices.
//!
//! A notice travels hop by hop toward the AREQ originator. Every hop,
//! including the node that detected the collision, resolves the next neighbor
//! from its reverse-route cache. A hop without a live route drops the notice;
//! the originator then simply runs out its rounds.

use alloc::vec::Vec;

use log::{debug, trace};

use crate::config::DadConfig;
use crate::node::Node;
use crate::time::Timestamp;
use crate::traits::{Clock, MultihopHandler, Random, Transport};
use crate::types::{Address, Error, NodeState, Outgoing};
use crate::wire::{CollisionNotice, Decode};

impl<T, R, Clk, Cfg> MultihopHandler for Node<T, R, Clk, Cfg>
where
    T: Transport,
    R: Random,
    Clk: Clock,
    Cfg: DadConfig,
{
    /// Reverse route toward `destination`. Refuses unless Normal.
    fn resolve_next_hop(&self, destination: Address, now: Timestamp) -> Option<Address> {
        if self.state() != NodeState::Normal {
            return None;
        }
        self.reverse_routes().next_hop(destination, now)
    }

    /// A collision notice reached us: whatever we were doing, start over.
    fn on_deliver(&mut self, _payload: &[u8], now: Timestamp) {
        self.metrics_mut().notices_delivered += 1;
        self.reject_tentative(now);
    }
}

impl<T, R, Clk, Cfg> Node<T, R, Clk, Cfg>
where
    T: Transport,
    R: Random,
    Clk: Clock,
    Cfg: DadConfig,
{
    /// Send `payload` one hop toward `destination` along the reverse path.
    pub fn multihop_send(
        &mut self,
        destination: Address,
        payload: Vec<u8>,
        now: Timestamp,
    ) -> Result<(), Error> {
        let Some(next_hop) = self.resolve_next_hop(destination, now) else {
            self.metrics_mut().notices_dropped += 1;
            debug!(
                "{}: no reverse route to {}, notice dropped",
                self.address(),
                destination
            );
            return Err(Error::NoRoute(destination));
        };

        trace!(
            "{}: notice for {} via {}",
            self.address(),
            destination,
            next_hop
        );
        self.enqueue(Outgoing::Unicast {
            next_hop,
            destination,
            payload,
        })?;
        self.metrics_mut().notices_forwarded += 1;
        Ok(())
    }

    /// A multihop packet reached this node: deliver it or pass it on.
    pub(crate) fn handle_multihop(&mut self, destination: Address, payload: Vec<u8>, now: Timestamp) {
        if destination != self.address() {
            let _ = self.multihop_send(destination, payload, now);
            return;
        }

        match CollisionNotice::decode_from_slice(&payload) {
            Ok(CollisionNotice) => self.on_deliver(&payload, now),
            Err(e) => {
                self.metrics_mut().malformed += 1;
                trace!("{}: dropping multihop payload: {}", self.address(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::config::DefaultConfig;
    use crate::time::Duration;
    use crate::traits::test_impls::{MockClock, MockRandom, MockTransport};
    use crate::types::{Areq, Event, Incoming, COLLISION_NOTICE};
    use crate::wire::Encode;

    type TestNode = Node<MockTransport, MockRandom, MockClock, DefaultConfig>;

    const ME: Address = Address::new(0, 2);
    const ORIGIN: Address = Address::new(0, 1);
    const TOWARD_ORIGIN: Address = Address::new(0, 9);

    fn relay_node() -> TestNode {
        let mut node: TestNode = Node::with_address(
            MockTransport::new(),
            MockRandom::new(),
            MockClock::new(),
            ME,
        );
        // Learn the route by relaying ORIGIN's flood
        let areq = Areq {
            originator: ORIGIN,
            requested: Address::new(7, 7),
            hops_remaining: 5,
        };
        node.handle_incoming(
            Incoming::Broadcast {
                from: TOWARD_ORIGIN,
                payload: areq.encode_to_vec(),
            },
            Timestamp::ZERO,
        );
        let _ = node.transport().take_sent();
        node
    }

    fn notice_for(destination: Address) -> Incoming {
        Incoming::Multihop {
            destination,
            payload: COLLISION_NOTICE.to_vec(),
        }
    }

    #[test]
    fn test_resolver_uses_reverse_route() {
        let node = relay_node();
        assert_eq!(
            node.resolve_next_hop(ORIGIN, Timestamp::from_millis(10)),
            Some(TOWARD_ORIGIN)
        );
        assert_eq!(node.resolve_next_hop(Address::new(5, 5), Timestamp::ZERO), None);
    }

    #[test]
    fn test_resolver_refuses_expired_route() {
        let node = relay_node();
        let expiry = Timestamp::ZERO + DefaultConfig::reverse_route_lifetime();
        assert_eq!(node.resolve_next_hop(ORIGIN, expiry), None);
    }

    #[test]
    fn test_resolver_refuses_until_normal() {
        let node: TestNode = Node::new(
            MockTransport::new(),
            MockRandom::new(),
            MockClock::new(),
            ME,
        );
        assert_eq!(node.resolve_next_hop(ORIGIN, Timestamp::ZERO), None);
    }

    #[test]
    fn test_relays_notice_one_hop() {
        let mut node = relay_node();
        node.handle_incoming(notice_for(ORIGIN), Timestamp::from_millis(50));

        assert_eq!(
            node.transport().take_sent(),
            [Outgoing::Unicast {
                next_hop: TOWARD_ORIGIN,
                destination: ORIGIN,
                payload: COLLISION_NOTICE.to_vec(),
            }]
        );
        assert_eq!(node.metrics().notices_forwarded, 1);
        // Relaying a notice leaves our own state alone
        assert_eq!(node.state(), NodeState::Normal);
    }

    #[test]
    fn test_unroutable_notice_dropped() {
        let mut node = relay_node();
        let later = Timestamp::ZERO + DefaultConfig::reverse_route_lifetime() + Duration::from_millis(1);
        node.handle_incoming(notice_for(ORIGIN), later);

        assert!(node.transport().take_sent().is_empty());
        assert_eq!(node.metrics().notices_dropped, 1);
        assert_eq!(
            node.multihop_send(ORIGIN, vec![1], later),
            Err(Error::NoRoute(ORIGIN))
        );
    }

    #[test]
    fn test_delivery_resets_even_when_normal() {
        let mut node = relay_node();
        node.handle_incoming(notice_for(ME), Timestamp::from_millis(70));

        assert_eq!(node.state(), NodeState::NoAddress);
        assert_eq!(node.next_wake(), Timestamp::from_millis(70));
        assert_eq!(
            node.events().try_receive().ok(),
            Some(Event::AddressRejected { tentative: None })
        );
    }

    #[test]
    fn test_non_notice_payload_not_delivered() {
        let mut node = relay_node();
        node.handle_incoming(
            Incoming::Multihop {
                destination: ME,
                payload: vec![0xde, 0xad],
            },
            Timestamp::ZERO,
        );
        assert_eq!(node.state(), NodeState::Normal);
        assert_eq!(node.metrics().malformed, 1);
    }
}
