//! Inbound AREQ processing: dedup, relay, and collision detection.
//!
//! Checks run in a fixed order and the first match wins:
//!
//! 1. not Normal: drop
//! 2. originator is us: drop (echo of our own flood)
//! 3. requested is our address: record the reverse route, send a collision
//!    notice back toward the originator, stop
//! 4. no hops left: drop
//! 5. pair already seen: drop
//! 6. record seen pair and reverse route, decrement hops, rebroadcast
//!
//! Relaying builds a reverse spanning tree rooted at the originator, which is
//! what the collision notice later walks back along.

use log::{debug, info, trace, warn};

use crate::config::DadConfig;
use crate::node::Node;
use crate::time::Timestamp;
use crate::traits::{Clock, Random, Transport};
use crate::types::{Address, Areq, Event, NodeState, Outgoing};
use crate::wire::{CollisionNotice, Encode};

impl<T, R, Clk, Cfg> Node<T, R, Clk, Cfg>
where
    T: Transport,
    R: Random,
    Clk: Clock,
    Cfg: DadConfig,
{
    /// Handle an AREQ broadcast heard from neighbor `from`.
    pub(crate) fn handle_areq(&mut self, areq: Areq, from: Address, now: Timestamp) {
        let me = self.address();

        if self.state() != NodeState::Normal {
            self.metrics_mut().areq_not_ready += 1;
            trace!("{}: not settled, ignoring AREQ for {}", me, areq.requested);
            return;
        }

        if areq.originator == me {
            self.metrics_mut().areq_self_loop += 1;
            trace!("{}: own AREQ echoed back by {}", me, from);
            return;
        }

        if areq.requested == me {
            self.metrics_mut().collisions_detected += 1;
            info!(
                "{}: {} requested our address (via {})",
                me, areq.originator, from
            );
            self.remember_route(areq.originator, from, now);
            self.push_event(Event::CollisionDetected {
                originator: areq.originator,
                requested: areq.requested,
            });
            let _ = self.multihop_send(areq.originator, CollisionNotice.encode_to_vec(), now);
            return;
        }

        if areq.hops_remaining == 0 {
            self.metrics_mut().areq_hop_limit += 1;
            trace!("{}: AREQ from {} out of hops", me, areq.originator);
            return;
        }

        if self
            .seen_requests()
            .contains(areq.originator, areq.requested, now)
        {
            self.metrics_mut().areq_duplicate += 1;
            trace!(
                "{}: duplicate AREQ {} -> {}",
                me,
                areq.originator,
                areq.requested
            );
            return;
        }

        let seen_expiry = now + Cfg::seen_request_lifetime();
        if let Err(e) =
            self.caches_mut()
                .seen
                .record(areq.originator, areq.requested, seen_expiry, now)
        {
            self.metrics_mut().cache_full += 1;
            warn!("{}: seen-request cache: {}", me, e);
        }
        self.remember_route(areq.originator, from, now);

        let relayed = Areq {
            hops_remaining: areq.hops_remaining - 1,
            ..areq
        };
        debug!(
            "{}: relaying AREQ {} -> {} ({} hops left)",
            me, relayed.originator, relayed.requested, relayed.hops_remaining
        );
        let payload = relayed.encode_to_vec();
        if self.enqueue(Outgoing::Broadcast { payload }).is_ok() {
            self.metrics_mut().areq_relayed += 1;
        }
    }

    /// Insert or refresh the route back to `originator` through `next_hop`.
    fn remember_route(&mut self, originator: Address, next_hop: Address, now: Timestamp) {
        let expires_at = now + Cfg::reverse_route_lifetime();
        if let Err(e) = self
            .caches_mut()
            .routes
            .record(originator, next_hop, expires_at, now)
        {
            self.metrics_mut().cache_full += 1;
            warn!("{}: reverse-route cache: {}", self.address(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::config::SmallConfig;
    use crate::time::Duration;
    use crate::traits::test_impls::{MockClock, MockRandom, MockTransport};
    use crate::types::{Incoming, COLLISION_NOTICE};
    use crate::wire::Decode;

    type TestNode = Node<MockTransport, MockRandom, MockClock, SmallConfig>;

    const ME: Address = Address::new(0, 5);
    const NEIGHBOR: Address = Address::new(0, 4);
    const ORIGIN: Address = Address::new(0, 1);

    fn settled_node() -> TestNode {
        Node::with_address(
            MockTransport::new(),
            MockRandom::new(),
            MockClock::new(),
            ME,
        )
    }

    fn areq(requested: Address, hops: u8) -> Areq {
        Areq {
            originator: ORIGIN,
            requested,
            hops_remaining: hops,
        }
    }

    fn deliver(node: &mut TestNode, areq: Areq, from: Address, now: Timestamp) {
        node.handle_incoming(
            Incoming::Broadcast {
                from,
                payload: areq.encode_to_vec(),
            },
            now,
        );
    }

    fn relayed(node: &TestNode) -> Vec<Areq> {
        node.transport()
            .take_sent()
            .into_iter()
            .filter_map(|f| match f {
                Outgoing::Broadcast { payload } => Areq::decode_from_slice(&payload).ok(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_relay_decrements_hops_and_records_state() {
        let mut node = settled_node();
        let now = Timestamp::from_millis(10);
        deliver(&mut node, areq(Address::new(9, 9), 16), NEIGHBOR, now);

        assert_eq!(relayed(&node), [areq(Address::new(9, 9), 15)]);
        assert!(node
            .seen_requests()
            .contains(ORIGIN, Address::new(9, 9), now));
        assert_eq!(node.reverse_routes().next_hop(ORIGIN, now), Some(NEIGHBOR));
        assert_eq!(
            node.reverse_routes().cache().expires_at(&ORIGIN),
            Some(now + SmallConfig::reverse_route_lifetime())
        );
        assert_eq!(node.metrics().areq_relayed, 1);
    }

    #[test]
    fn test_duplicates_relayed_once_per_lifetime() {
        let mut node = settled_node();
        let req = areq(Address::new(9, 9), 10);
        let t0 = Timestamp::ZERO;

        for i in 0..5 {
            let from = Address::new(0, 10 + i);
            deliver(&mut node, req, from, t0 + Duration::from_millis(i as u64));
        }
        assert_eq!(relayed(&node).len(), 1);
        assert_eq!(node.metrics().areq_duplicate, 4);

        // Same pair after the dedup entry expired is a new flood
        let later = t0 + SmallConfig::seen_request_lifetime();
        deliver(&mut node, req, NEIGHBOR, later);
        assert_eq!(relayed(&node).len(), 1);
    }

    #[test]
    fn test_duplicate_does_not_move_reverse_route() {
        let mut node = settled_node();
        let req = areq(Address::new(9, 9), 10);
        deliver(&mut node, req, NEIGHBOR, Timestamp::ZERO);
        deliver(&mut node, req, Address::new(0, 77), Timestamp::from_millis(5));

        assert_eq!(
            node.reverse_routes().next_hop(ORIGIN, Timestamp::from_millis(5)),
            Some(NEIGHBOR)
        );
    }

    #[test]
    fn test_zero_hops_never_relayed() {
        let mut node = settled_node();
        deliver(&mut node, areq(Address::new(9, 9), 0), NEIGHBOR, Timestamp::ZERO);

        assert!(relayed(&node).is_empty());
        assert!(node.seen_requests().cache().is_empty());
        assert!(node.reverse_routes().cache().is_empty());
        assert_eq!(node.metrics().areq_hop_limit, 1);
    }

    #[test]
    fn test_last_hop_relays_with_zero() {
        let mut node = settled_node();
        deliver(&mut node, areq(Address::new(9, 9), 1), NEIGHBOR, Timestamp::ZERO);
        assert_eq!(relayed(&node), [areq(Address::new(9, 9), 0)]);
    }

    #[test]
    fn test_own_echo_ignored() {
        let mut node = settled_node();
        let echo = Areq {
            originator: ME,
            requested: Address::new(9, 9),
            hops_remaining: 10,
        };
        deliver(&mut node, echo, NEIGHBOR, Timestamp::ZERO);

        assert!(node.transport().take_sent().is_empty());
        assert!(node.reverse_routes().cache().is_empty());
        assert_eq!(node.metrics().areq_self_loop, 1);
    }

    #[test]
    fn test_unsettled_node_ignores_areqs() {
        let mut node: TestNode = Node::new(
            MockTransport::new(),
            MockRandom::new(),
            MockClock::new(),
            ME,
        );
        deliver(&mut node, areq(ME, 10), NEIGHBOR, Timestamp::ZERO);

        assert!(node.transport().take_sent().is_empty());
        assert!(node.reverse_routes().cache().is_empty());
        assert_eq!(node.metrics().areq_not_ready, 1);
    }

    #[test]
    fn test_collision_sends_notice_back() {
        let mut node = settled_node();
        // Hop budget does not matter for detection
        deliver(&mut node, areq(ME, 0), NEIGHBOR, Timestamp::ZERO);

        assert_eq!(
            node.transport().take_sent(),
            [Outgoing::Unicast {
                next_hop: NEIGHBOR,
                destination: ORIGIN,
                payload: COLLISION_NOTICE.to_vec(),
            }]
        );
        assert_eq!(node.reverse_routes().cache().len(), 1);
        assert!(node.seen_requests().cache().is_empty());
        assert_eq!(node.metrics().collisions_detected, 1);
        assert_eq!(node.metrics().notices_forwarded, 1);
        assert_eq!(
            node.events().try_receive().ok(),
            Some(Event::CollisionDetected {
                originator: ORIGIN,
                requested: ME,
            })
        );
    }

    #[test]
    fn test_full_caches_still_relay() {
        let mut node = settled_node();
        let now = Timestamp::ZERO;
        for i in 0..SmallConfig::MAX_CACHE_ENTRIES as u16 {
            let req = Areq {
                originator: Address::from_u16(1000 + i),
                requested: Address::new(9, 9),
                hops_remaining: 3,
            };
            deliver(&mut node, req, NEIGHBOR, now);
            let _ = node.transport().take_sent();
        }
        assert_eq!(node.metrics().cache_full, 0);

        deliver(&mut node, areq(Address::new(8, 8), 3), NEIGHBOR, now);
        assert_eq!(relayed(&node).len(), 1);
        // Both inserts failed
        assert_eq!(node.metrics().cache_full, 2);
        assert_eq!(node.reverse_routes().next_hop(ORIGIN, now), None);
    }
}
