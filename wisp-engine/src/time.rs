// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Simulated time.
//!
//! All time in the simulation is an integer count of nanoseconds so that
//! events scheduled for the same instant compare equal exactly.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

const NS_PER_SEC: f64 = 1_000_000_000.0;

/// A point in (or span of) simulated time in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(u64);

impl SimTime {
    /// Time zero.
    pub const ZERO: SimTime = SimTime(0);

    /// Largest representable time.
    pub const MAX: SimTime = SimTime(u64::MAX);

    #[must_use]
    pub const fn from_ns(ns: u64) -> Self {
        Self(ns)
    }

    #[must_use]
    pub const fn from_micros(us: u64) -> Self {
        Self(us * 1_000)
    }

    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * 1_000_000)
    }

    /// Convert seconds to the nearest nanosecond.
    ///
    /// Negative or non-finite values saturate to zero / [`SimTime::MAX`].
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return Self::ZERO;
        }
        let ns = (secs * NS_PER_SEC).round();
        if ns >= u64::MAX as f64 {
            Self::MAX
        } else {
            Self(ns as u64)
        }
    }

    #[must_use]
    pub const fn as_ns(&self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / NS_PER_SEC
    }

    /// Add without wrapping past [`SimTime::MAX`].
    #[must_use]
    pub fn saturating_add(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(other.0))
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, other: SimTime) -> SimTime {
        self.saturating_add(other)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, other: SimTime) {
        *self = *self + other;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}s", self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_round_to_ns() {
        assert_eq!(SimTime::from_secs_f64(0.016384), SimTime::from_ns(16_384_000));
        assert_eq!(SimTime::from_secs_f64(1.0), SimTime::from_millis(1000));
        assert_eq!(SimTime::from_secs_f64(-1.0), SimTime::ZERO);
    }

    #[test]
    fn arithmetic_saturates() {
        assert_eq!(SimTime::MAX + SimTime::from_ns(1), SimTime::MAX);
        assert_eq!(SimTime::from_ns(1) - SimTime::from_ns(2), SimTime::ZERO);
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", SimTime::from_millis(1500)), "1.500000000s");
    }
}
