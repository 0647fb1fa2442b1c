//! Identity and timing primitives for the cinder particle engine.
//!
//! This crate provides the foundational types shared by emitters:
//!
//! - [`ParticleId`] / [`IdAllocator`] - per-emitter particle identity with
//!   explicit reclaim after death
//! - [`EmitterId`] - process-wide emitter identity
//! - [`RateLimiter`] - non-blocking gate bounding how often a simulation
//!   pass executes
//! - [`RateError`] - construction error for unusable frequencies

mod error;
mod ids;
mod rate;

pub use error::RateError;
pub use ids::{EmitterId, IdAllocator, ParticleId};
pub use rate::RateLimiter;
