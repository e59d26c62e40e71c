//! Address autoconfiguration state machine.
//!
//! ```text
//!            pick tentative + jitter        jitter elapsed
//! NoAddress ─────────────────────► NoAddress ──────────────► Advertising
//!     ▲        (pending = None)     (pending = Some)            │
//!     │                                                         │ round 1..=ADDRESS_RETRIES:
//!     │ collision notice                                        │   broadcast AREQ,
//!     └─────────────────────────────────────────────────────────┤   wait discovery timeout
//!                                                               │
//!                                                               ▼ round ADDRESS_RETRIES + 1
//!                                                             Normal (idle)
//! ```
//!
//! The FSM only ever moves forward on [`Node::handle_timer`]; a collision
//! notice resets it to `NoAddress` and pulls the wake time to "now" so the next
//! tick picks a fresh tentative address without waiting out the round.

use log::{debug, info};

use crate::config::DadConfig;
use crate::node::Node;
use crate::time::{Duration, Timestamp};
use crate::traits::{Clock, Random, Transport};
use crate::types::{Address, Areq, Event, NodeState, Outgoing};
use crate::wire::Encode;

/// Working data while a tentative address is being advertised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Advertisement {
    pub tentative: Address,
    /// Rounds already broadcast.
    pub round: u8,
    pub areq: Areq,
}

/// Internal FSM state. Maps onto [`NodeState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    /// `pending` holds the tentative address while the start jitter runs.
    NoAddress { pending: Option<Address> },
    Advertising(Advertisement),
    Normal,
}

impl Phase {
    pub fn state(&self) -> NodeState {
        match self {
            Phase::NoAddress { .. } => NodeState::NoAddress,
            Phase::Advertising(_) => NodeState::Advertising,
            Phase::Normal => NodeState::Normal,
        }
    }

    pub fn tentative(&self) -> Option<Address> {
        match self {
            Phase::NoAddress { pending } => *pending,
            Phase::Advertising(adv) => Some(adv.tentative),
            Phase::Normal => None,
        }
    }
}

impl<T, R, Clk, Cfg> Node<T, R, Clk, Cfg>
where
    T: Transport,
    R: Random,
    Clk: Clock,
    Cfg: DadConfig,
{
    /// Advance the FSM as far as `now` allows.
    ///
    /// Zero-length waits (no jitter, or the jump from the jitter into the
    /// first round) are taken in the same call.
    pub(crate) fn step(&mut self, now: Timestamp) {
        while now >= self.wake_at() {
            match *self.phase() {
                Phase::NoAddress { pending: None } => self.choose_tentative(now),
                Phase::NoAddress {
                    pending: Some(tentative),
                } => self.start_advertising(tentative, now),
                Phase::Advertising(adv) => self.advertise(adv, now),
                Phase::Normal => {
                    self.set_wake_at(now + Cfg::NORMAL_IDLE_INTERVAL);
                    break;
                }
            }
        }
    }

    /// Drop the current tentative address and start over on the next tick.
    pub(crate) fn reject_tentative(&mut self, now: Timestamp) {
        let tentative = self.phase().tentative();
        info!(
            "{}: address {:?} is not unique, restarting",
            self.address(),
            tentative
        );
        self.set_phase(Phase::NoAddress { pending: None });
        self.set_wake_at(now);
        self.push_event(Event::AddressRejected { tentative });
    }

    fn choose_tentative(&mut self, now: Timestamp) {
        let tentative = Address::from_u16(self.random_mut().gen_u16());
        let max_delay = Cfg::MAX_START_DELAY.as_millis();
        let jitter = Duration::from_millis(self.random_mut().gen_range(0, max_delay));

        debug!(
            "{}: trying {} after {}ms",
            self.address(),
            tentative,
            jitter.as_millis()
        );
        self.set_phase(Phase::NoAddress {
            pending: Some(tentative),
        });
        self.set_wake_at(now + jitter);
    }

    fn start_advertising(&mut self, tentative: Address, now: Timestamp) {
        let areq = Areq {
            originator: self.address(),
            requested: tentative,
            hops_remaining: Cfg::MAX_HOPS,
        };
        self.set_phase(Phase::Advertising(Advertisement {
            tentative,
            round: 0,
            areq,
        }));
        self.set_wake_at(now);
    }

    fn advertise(&mut self, mut adv: Advertisement, now: Timestamp) {
        let round = match adv.round.checked_add(1) {
            Some(round) if round <= Cfg::ADDRESS_RETRIES => round,
            _ => return self.commit(adv.tentative, now),
        };
        adv.round = round;

        if round == 1 {
            self.push_event(Event::AdvertisingStarted {
                tentative: adv.tentative,
            });
        }
        debug!(
            "{}: AREQ round {}/{} for {}",
            self.address(),
            round,
            Cfg::ADDRESS_RETRIES,
            adv.tentative
        );

        let payload = adv.areq.encode_to_vec();
        if self.enqueue(Outgoing::Broadcast { payload }).is_ok() {
            self.metrics_mut().areq_originated += 1;
        }

        self.set_phase(Phase::Advertising(adv));
        self.set_wake_at(now + Cfg::address_discovery_timeout());
    }

    fn commit(&mut self, address: Address, now: Timestamp) {
        self.set_address(address);
        self.set_phase(Phase::Normal);
        self.set_wake_at(now + Cfg::NORMAL_IDLE_INTERVAL);
        info!("{}: address committed", address);
        self.push_event(Event::AddressCommitted { address });
    }
}
