//! Compile-time protocol configuration.
//!
//! The `DadConfig` trait fixes timing and memory bounds at compile time, the
//! same way a firmware image would. Derived timings follow the classic DAD
//! formulas:
//!
//! | Parameter | Formula |
//! |-----------|---------|
//! | address discovery timeout | `3 * NODE_TRAVERSAL_TIME * NET_DIAMETER / 2` |
//! | reverse route lifetime | `2 * address discovery timeout` |
//! | seen request lifetime | reverse route lifetime |
//!
//! # Example
//!
//! ```
//! use qdad::{DadConfig, DefaultConfig, Duration};
//!
//! assert_eq!(DefaultConfig::address_discovery_timeout(), Duration::from_millis(600));
//! assert_eq!(DefaultConfig::reverse_route_lifetime(), Duration::from_millis(1200));
//!
//! // Custom deployment with a wider mesh
//! struct WideMesh;
//! impl DadConfig for WideMesh {
//!     const NODE_TRAVERSAL_TIME: Duration = Duration::from_millis(40);
//!     const ADDRESS_RETRIES: u8 = 3;
//!     const NET_DIAMETER: u64 = 35;
//!     const MAX_START_DELAY: Duration = Duration::from_secs(10);
//!     const MAX_CACHE_ENTRIES: usize = 1000;
//!     const MAX_HOPS: u8 = 50;
//! }
//! assert_eq!(WideMesh::address_discovery_timeout(), Duration::from_millis(2100));
//! ```

use crate::time::Duration;

/// Protocol timing and memory bounds.
///
/// Memory bounds must be non-zero.
pub trait DadConfig {
    /// Time for a frame to cross one hop, including queueing.
    const NODE_TRAVERSAL_TIME: Duration;

    /// Number of AREQ broadcast rounds before an unanswered tentative
    /// address is committed.
    const ADDRESS_RETRIES: u8;

    /// Assumed upper bound on the mesh diameter, in hops.
    const NET_DIAMETER: u64;

    /// Upper bound (exclusive) for the random start jitter.
    const MAX_START_DELAY: Duration;

    /// Capacity of each cache (seen requests and reverse routes).
    const MAX_CACHE_ENTRIES: usize;

    /// Hop budget placed in every originated AREQ.
    const MAX_HOPS: u8;

    /// How often a settled node wakes up while idle.
    const NORMAL_IDLE_INTERVAL: Duration = Duration::from_secs(1);

    /// How long to wait for a collision notice after each AREQ round.
    fn address_discovery_timeout() -> Duration {
        Self::NODE_TRAVERSAL_TIME * 3 * Self::NET_DIAMETER / 2
    }

    /// Lifetime of a reverse route entry.
    fn reverse_route_lifetime() -> Duration {
        Self::address_discovery_timeout() * 2
    }

    /// Lifetime of a seen-request (dedup) entry.
    fn seen_request_lifetime() -> Duration {
        Self::reverse_route_lifetime()
    }
}

/// Defaults for a Contiki-class mote mesh of up to ten hops.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl DadConfig for DefaultConfig {
    const NODE_TRAVERSAL_TIME: Duration = Duration::from_millis(40);
    const ADDRESS_RETRIES: u8 = 3;
    const NET_DIAMETER: u64 = 10;
    const MAX_START_DELAY: Duration = Duration::from_secs(10);
    const MAX_CACHE_ENTRIES: usize = 1000;
    const MAX_HOPS: u8 = 50;
}

/// Same timings as [`DefaultConfig`] with small caches and a short hop
/// budget, for devices with a few KB of RAM to spare.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallConfig;

impl DadConfig for SmallConfig {
    const NODE_TRAVERSAL_TIME: Duration = Duration::from_millis(40);
    const ADDRESS_RETRIES: u8 = 3;
    const NET_DIAMETER: u64 = 10;
    const MAX_START_DELAY: Duration = Duration::from_secs(10);
    const MAX_CACHE_ENTRIES: usize = 32;
    const MAX_HOPS: u8 = 16;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(DefaultConfig::NODE_TRAVERSAL_TIME.as_millis(), 40);
        assert_eq!(DefaultConfig::ADDRESS_RETRIES, 3);
        assert_eq!(DefaultConfig::NET_DIAMETER, 10);
        assert_eq!(DefaultConfig::MAX_START_DELAY.as_millis(), 10_000);
        assert_eq!(DefaultConfig::MAX_CACHE_ENTRIES, 1000);
        assert_eq!(DefaultConfig::MAX_HOPS, 50);
        assert_eq!(DefaultConfig::NORMAL_IDLE_INTERVAL.as_millis(), 1000);
    }

    #[test]
    fn test_derived_timings() {
        assert_eq!(DefaultConfig::address_discovery_timeout().as_millis(), 600);
        assert_eq!(DefaultConfig::reverse_route_lifetime().as_millis(), 1200);
        assert_eq!(
            DefaultConfig::seen_request_lifetime(),
            DefaultConfig::reverse_route_lifetime()
        );
    }

    #[test]
    fn test_small_config_smaller_than_default() {
        assert!(SmallConfig::MAX_CACHE_ENTRIES < DefaultConfig::MAX_CACHE_ENTRIES);
        assert!(SmallConfig::MAX_HOPS < DefaultConfig::MAX_HOPS);
        assert_eq!(
            SmallConfig::address_discovery_timeout(),
            DefaultConfig::address_discovery_timeout()
        );
    }

    #[test]
    fn test_configs_are_nonzero() {
        assert!(DefaultConfig::MAX_CACHE_ENTRIES > 0);
        assert!(DefaultConfig::ADDRESS_RETRIES > 0);
        assert!(SmallConfig::MAX_CACHE_ENTRIES > 0);
        assert!(SmallConfig::ADDRESS_RETRIES > 0);
    }
}
