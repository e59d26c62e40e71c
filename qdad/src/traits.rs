//! Core traits for transport, time, randomness and multihop delivery.
//!
//! These traits allow the protocol to be used with different:
//! - Link layers (802.15.4 radio, UDP, simulation)
//! - Time sources (hardware timers, simulated time)
//! - Random number generators

use core::future::Future;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

use crate::time::Timestamp;
use crate::types::{Address, Event, Incoming, Outgoing};

/// Queue size for transport channels.
pub(crate) const TRANSPORT_QUEUE_SIZE: usize = 16;

/// Queue size for event channel.
pub(crate) const EVENT_QUEUE_SIZE: usize = 16;

/// Mutex type used for channels.
///
/// The node and its link layer share one executor, so no locking is needed.
pub(crate) type ChannelMutex = NoopRawMutex;

/// Frames received from the link layer.
pub type IncomingChannel = Channel<ChannelMutex, Incoming, TRANSPORT_QUEUE_SIZE>;

/// Frames waiting to be transmitted.
pub type OutgoingChannel = Channel<ChannelMutex, Outgoing, TRANSPORT_QUEUE_SIZE>;

/// Protocol event channel.
pub type EventChannel = Channel<ChannelMutex, Event, EVENT_QUEUE_SIZE>;

/// Link layer offering one-hop broadcast and hop-by-hop unicast.
///
/// - Radio driver → `incoming().try_send(frame)` on reception
/// - Node → `outgoing().try_send(frame)` to transmit
/// - Transmit task → `outgoing().receive().await`
///
/// Multihop forwarding is split between the two sides: the link layer moves
/// one hop at a time, and asks the node (through [`MultihopHandler`]) where
/// the next hop is.
///
/// ```ignore
/// use qdad::traits::test_impls::MockTransport;
/// use qdad::traits::Transport;
/// use qdad::Outgoing;
///
/// let transport = MockTransport::new();
/// transport
///     .outgoing()
///     .try_send(Outgoing::Broadcast { payload: vec![1, 2, 3] })
///     .ok();
///
/// let sent = transport.take_sent();
/// assert_eq!(sent, vec![Outgoing::Broadcast { payload: vec![1, 2, 3] }]);
/// ```
pub trait Transport {
    /// Frames the node wants transmitted.
    fn outgoing(&self) -> &OutgoingChannel;

    /// Frames received for the node.
    fn incoming(&self) -> &IncomingChannel;
}

/// Time source trait for real or simulated time.
///
/// # Example (testing with MockClock, needs `test-support`)
///
/// ```ignore
/// use qdad::traits::test_impls::MockClock;
/// use qdad::{Clock, Duration, Timestamp};
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now(), Timestamp::ZERO);
///
/// clock.advance(Duration::from_millis(600));
/// assert_eq!(clock.now(), Timestamp::from_millis(600));
/// ```
///
/// # Example (embedded with embassy)
///
/// ```text
/// struct EmbassyClock;
///
/// impl Clock for EmbassyClock {
///     type SleepFuture<'a> = embassy_time::Timer;
///
///     fn now(&self) -> Timestamp {
///         Timestamp::from_millis(embassy_time::Instant::now().as_millis())
///     }
///
///     fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_> {
///         embassy_time::Timer::at(embassy_time::Instant::from_millis(time.as_millis()))
///     }
/// }
/// ```
pub trait Clock {
    /// Future type returned by sleep_until.
    type SleepFuture<'a>: Future<Output = ()>
    where
        Self: 'a;

    /// Get the current timestamp.
    fn now(&self) -> Timestamp;

    /// Sleep until the given timestamp.
    fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_>;
}

/// Random number generator trait.
///
/// Used for the tentative address and the start jitter.
pub trait Random {
    /// Generate a random u64 in the range [min, max).
    fn gen_range(&mut self, min: u64, max: u64) -> u64;

    /// Generate a uniformly distributed 16-bit value.
    fn gen_u16(&mut self) -> u16 {
        self.gen_range(0, u16::MAX as u64 + 1) as u16
    }
}

/// Hooks the multihop layer calls into.
pub trait MultihopHandler {
    /// Next hop toward `destination`, or `None` to drop the packet.
    fn resolve_next_hop(&self, destination: Address, now: Timestamp) -> Option<Address>;

    /// A multihop packet addressed to us has arrived.
    fn on_deliver(&mut self, payload: &[u8], now: Timestamp);
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock implementations of traits for unit testing and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use alloc::collections::VecDeque;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use core::future::{ready, Ready};

    use super::*;

    /// Mock transport backed by the node's own channel types.
    pub struct MockTransport {
        outgoing: OutgoingChannel,
        incoming: IncomingChannel,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self {
                outgoing: Channel::new(),
                incoming: Channel::new(),
            }
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Inject a one-hop broadcast as if it was received.
        pub fn inject_broadcast(&self, from: Address, payload: Vec<u8>) {
            let _ = self.incoming.try_send(Incoming::Broadcast { from, payload });
        }

        /// Inject a multihop packet as if it was received.
        pub fn inject_multihop(&self, destination: Address, payload: Vec<u8>) {
            let _ = self
                .incoming
                .try_send(Incoming::Multihop { destination, payload });
        }

        /// Take all sent frames in queue order.
        pub fn take_sent(&self) -> Vec<Outgoing> {
            let mut frames = Vec::new();
            while let Ok(frame) = self.outgoing.try_receive() {
                frames.push(frame);
            }
            frames
        }
    }

    impl Transport for MockTransport {
        fn outgoing(&self) -> &OutgoingChannel {
            &self.outgoing
        }

        fn incoming(&self) -> &IncomingChannel {
            &self.incoming
        }
    }

    /// Mock clock for testing (synchronous, time advances manually).
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self {
                current: Cell::new(Timestamp::ZERO),
            }
        }
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn at(time: Timestamp) -> Self {
            Self {
                current: Cell::new(time),
            }
        }

        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        pub fn advance(&self, duration: crate::time::Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        type SleepFuture<'a> = Ready<()>;

        fn now(&self) -> Timestamp {
            self.current.get()
        }

        fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
            // Completes immediately; tests advance time themselves.
            ready(())
        }
    }

    /// Mock random for testing (deterministic LCG).
    pub struct MockRandom {
        pub state: u64,
    }

    impl Default for MockRandom {
        fn default() -> Self {
            Self { state: 12345 }
        }
    }

    impl MockRandom {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_seed(seed: u64) -> Self {
            Self { state: seed }
        }
    }

    impl Random for MockRandom {
        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let range = max.saturating_sub(min);
            if range == 0 {
                return min;
            }
            min + (self.state % range)
        }
    }

    /// Random source that replays a script, then falls back to an LCG.
    ///
    /// A scripted value inside `[min, max)` is returned as is; anything else
    /// is folded into the range. Handy for forcing a tentative address.
    pub struct ScriptedRandom {
        script: VecDeque<u64>,
        fallback: MockRandom,
    }

    impl ScriptedRandom {
        pub fn new(values: impl IntoIterator<Item = u64>) -> Self {
            Self {
                script: values.into_iter().collect(),
                fallback: MockRandom::new(),
            }
        }

        pub fn with_fallback_seed(mut self, seed: u64) -> Self {
            self.fallback = MockRandom::with_seed(seed);
            self
        }

        /// Scripted values not yet consumed.
        pub fn remaining(&self) -> usize {
            self.script.len()
        }
    }

    impl Random for ScriptedRandom {
        fn gen_range(&mut self, min: u64, max: u64) -> u64 {
            let Some(v) = self.script.pop_front() else {
                return self.fallback.gen_range(min, max);
            };
            let range = max.saturating_sub(min);
            if range == 0 {
                min
            } else if (min..max).contains(&v) {
                v
            } else {
                min + v % range
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_scripted_random_replays_then_falls_back() {
            let mut rng = ScriptedRandom::new([7, 70_000]);
            assert_eq!(rng.gen_range(0, 100), 7);
            // Out of range values are folded in
            assert_eq!(rng.gen_u16(), (70_000 % 65_536) as u16);
            assert_eq!(rng.remaining(), 0);

            let v = rng.gen_range(10, 20);
            assert!((10..20).contains(&v));
        }

        #[test]
        fn test_mock_random_empty_range() {
            let mut rng = MockRandom::new();
            assert_eq!(rng.gen_range(5, 5), 5);
        }

        #[test]
        fn test_mock_transport_queues_inbound() {
            let transport = MockTransport::new();
            transport.inject_broadcast(Address::new(0, 1), alloc::vec![9]);
            transport.inject_multihop(Address::new(0, 2), alloc::vec![8]);

            assert_eq!(
                transport.incoming().try_receive().ok(),
                Some(Incoming::Broadcast {
                    from: Address::new(0, 1),
                    payload: alloc::vec![9],
                })
            );
            assert!(matches!(
                transport.incoming().try_receive(),
                Ok(Incoming::Multihop { .. })
            ));
        }
    }
}
