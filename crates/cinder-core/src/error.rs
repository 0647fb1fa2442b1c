//! Error types for cinder-core.

use thiserror::Error;

/// Error when constructing a [`RateLimiter`](crate::RateLimiter) with a
/// frequency that cannot define a period.
#[derive(Debug, Clone, Error)]
#[error("invalid rate limiter frequency: {hz} Hz (must be finite and positive)")]
pub struct RateError {
    /// The frequency that was rejected.
    pub hz: f32,
}
