//! Time sources
//!
//! The tracker only ever subtracts two readings from the same clock, so a
//! `Timestamp` is seconds since an arbitrary per-clock origin.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// A monotonic reading, in seconds since the clock's origin
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// Seconds elapsed since `earlier`, never negative
    pub fn elapsed_since(&self, earlier: Timestamp) -> f64 {
        let delta = self.0 - earlier.0;
        if delta.is_finite() {
            delta.max(0.0)
        } else {
            0.0
        }
    }
}

/// Trait for time sources
pub trait Clock: Send + Sync {
    /// Current monotonic reading
    fn now(&self) -> Timestamp;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Clock backed by `std::time::Instant`
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed().as_secs_f64())
    }
}

/// Hand-driven clock for tests and scenario replay. Clones share the reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at `secs`
    pub fn starting_at(secs: f64) -> Self {
        let clock = Self::new();
        clock.set(secs);
        clock
    }

    /// Jump to an absolute reading
    pub fn set(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now = secs;
        }
    }

    /// Move forward by `secs`
    pub fn advance(&self, secs: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now += secs;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now.lock().map(|now| *now).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_is_clamped() {
        let start = Timestamp::from_secs(10.0);
        assert_eq!(Timestamp::from_secs(4.0).elapsed_since(start), 0.0);
        assert_eq!(Timestamp::from_secs(12.5).elapsed_since(start), 2.5);
        assert_eq!(Timestamp::from_secs(f64::NAN).elapsed_since(start), 0.0);
    }

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::starting_at(5.0);
        let other = clock.clone();
        other.advance(3.0);
        assert_eq!(clock.now().as_secs(), 8.0);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
