//! Millisecond time types.
//!
//! The protocol never reads a wall clock on its own. Every handler receives
//! `now` from the caller, which keeps cache expiry and FSM waits reproducible
//! under simulation.

use core::fmt;
use core::ops::{Add, Div, Mul, Sub};

/// A point in time, in milliseconds since an arbitrary epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1000))
    }

    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Adds a duration, clamping at [`Timestamp::MAX`].
    #[inline]
    pub const fn saturating_add(self, d: Duration) -> Self {
        Timestamp(self.0.saturating_add(d.0))
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    #[inline]
    pub const fn saturating_sub(self, earlier: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        self.saturating_add(rhs)
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        self.saturating_sub(rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{}ms", self.0)
    }
}

/// A span of time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    pub const ZERO: Duration = Duration(0);

    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Duration(ms)
    }

    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Duration(secs.saturating_mul(1000))
    }

    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn saturating_mul(self, n: u64) -> Self {
        Duration(self.0.saturating_mul(n))
    }
}

impl Add for Duration {
    type Output = Duration;

    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_add(rhs.0))
    }
}

impl Mul<u64> for Duration {
    type Output = Duration;

    #[inline]
    fn mul(self, rhs: u64) -> Duration {
        self.saturating_mul(rhs)
    }
}

/// Integer division. Division by zero yields [`Duration::ZERO`].
impl Div<u64> for Duration {
    type Output = Duration;

    #[inline]
    fn div(self, rhs: u64) -> Duration {
        Duration(self.0.checked_div(rhs).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversions() {
        assert_eq!(Timestamp::from_secs(3).as_millis(), 3000);
        assert_eq!(Duration::from_secs(2).as_millis(), 2000);
        assert_eq!(Duration::from_millis(40).as_millis(), 40);
    }

    #[test]
    fn test_deadline_arithmetic() {
        let start = Timestamp::from_millis(250);
        let deadline = start + Duration::from_millis(600);
        assert_eq!(deadline.as_millis(), 850);
        assert_eq!((deadline - start).as_millis(), 600);
        // Elapsed time never goes negative.
        assert_eq!(start - deadline, Duration::ZERO);
    }

    #[test]
    fn test_discovery_formula_rounds_down() {
        // 3 * 40 * 10 / 2
        let d = Duration::from_millis(40) * 3 * 10 / 2;
        assert_eq!(d.as_millis(), 600);
        assert_eq!((Duration::from_millis(7) * 3 / 2).as_millis(), 10);
        assert_eq!(Duration::from_millis(7) / 0, Duration::ZERO);
    }

    #[test]
    fn test_saturation_at_max() {
        assert_eq!(Timestamp::MAX + Duration::from_secs(1), Timestamp::MAX);
        assert_eq!(
            Duration::from_millis(u64::MAX) * 2,
            Duration::from_millis(u64::MAX)
        );
    }
}
