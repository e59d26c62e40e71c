//! Event types and priority queue for discrete event simulation.

use std::cmp::Ordering;

use qdad::{Address, Timestamp};

/// Stable simulator-side node handle.
///
/// Protocol addresses change when a node commits, so the simulator keys
/// nodes and links by this index instead.
pub type SimId = usize;

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone)]
pub enum ScenarioAction {
    /// Partition the network into isolated groups.
    Partition { groups: Vec<Vec<SimId>> },
    /// Heal all partitions (restore full connectivity).
    HealPartition,
    /// Disable a specific link.
    DisableLink { a: SimId, b: SimId },
    /// Enable a specific link.
    EnableLink { a: SimId, b: SimId },
    /// Set loss rate on a link.
    SetLossRate { a: SimId, b: SimId, rate: f64 },
    /// Take an address snapshot for metrics.
    TakeSnapshot,
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// A one-hop broadcast reaches a neighbor.
    BroadcastDelivery {
        to: SimId,
        /// Sender's address at transmit time.
        from: Address,
        payload: Vec<u8>,
    },
    /// One hop of a multihop packet reaches the chosen neighbor.
    UnicastDelivery {
        to: SimId,
        destination: Address,
        payload: Vec<u8>,
    },
    /// Fire timer for a node.
    TimerFire { node: SimId },
    /// Execute a scenario action.
    ScenarioAction(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// When the event should occur.
    pub time: Timestamp,
    /// Sequence number for deterministic ordering of same-time events.
    pub seq: SequenceNumber,
    /// The event to process.
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// Implement ordering for min-heap (BinaryHeap is max-heap, so we reverse).
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    fn timer(ms: u64, seq: u64, node: SimId) -> ScheduledEvent {
        ScheduledEvent::new(
            Timestamp::from_millis(ms),
            SequenceNumber::new(seq),
            Event::TimerFire { node },
        )
    }

    #[test]
    fn test_earlier_event_pops_first() {
        let mut heap = BinaryHeap::new();
        heap.push(timer(600, 1, 0));
        heap.push(timer(40, 2, 1));
        heap.push(timer(1200, 3, 2));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop())
            .map(|e| e.time.as_millis())
            .collect();
        assert_eq!(order, [40, 600, 1200]);
    }

    #[test]
    fn test_same_time_keeps_schedule_order() {
        let first = timer(10, 1, 0);
        let second = timer(10, 2, 1);

        // Lower sequence is "greater" so the max-heap pops it first
        assert!(first > second);
    }
}
