//! Non-blocking rate limiting for simulation passes.

use crate::error::RateError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A non-blocking gate bounding how often an expensive pass executes.
///
/// Constructed with a maximum frequency in Hz.
/// [`attempt_to_run`](Self::attempt_to_run) accumulates elapsed time and
/// accepts a run only once a full period has built up since the previous
/// accepted run. The accumulated time consumed by the accepted run is
/// reported by [`last_processed_elapsed`](Self::last_processed_elapsed) so
/// callers integrate against the actual simulation cadence rather than the
/// (possibly higher-frequency) call cadence.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RateLimiter {
    /// Minimum seconds between accepted runs.
    period: f32,
    /// Elapsed time accumulated since the last accepted run.
    accumulated: f32,
    /// Elapsed time consumed by the most recently accepted run.
    last_elapsed: f32,
}

impl RateLimiter {
    /// Creates a limiter that accepts at most `max_hz` runs per second.
    pub fn new(max_hz: f32) -> Result<Self, RateError> {
        if !max_hz.is_finite() || max_hz <= 0.0 {
            return Err(RateError { hz: max_hz });
        }
        Ok(Self {
            period: 1.0 / max_hz,
            accumulated: 0.0,
            last_elapsed: 0.0,
        })
    }

    /// Records `elapsed` seconds and reports whether a run is due.
    ///
    /// Returns true and consumes the accumulated time only if a full period
    /// has elapsed since the previous accepted run; otherwise returns false
    /// and records nothing beyond the accumulation. Never blocks.
    pub fn attempt_to_run(&mut self, elapsed: f32) -> bool {
        self.accumulated += elapsed;
        if self.accumulated < self.period {
            return false;
        }
        self.last_elapsed = self.accumulated;
        self.accumulated = 0.0;
        true
    }

    /// Returns the time delta consumed by the most recently accepted run.
    pub fn last_processed_elapsed(&self) -> f32 {
        self.last_elapsed
    }

    /// Returns the minimum interval between accepted runs, in seconds.
    pub fn period(&self) -> f32 {
        self.period
    }
}
