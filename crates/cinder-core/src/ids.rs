//! Identity for emitters and particles.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Process-wide emitter id counter. Initialized once, never reset.
static NEXT_EMITTER_ID: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for an emitter.
///
/// Drawn from a process-wide counter so ids stay unique across emitters.
/// Particle ids are a separate, per-emitter space (see [`IdAllocator`]),
/// which keeps emitters independently testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EmitterId(u64);

impl EmitterId {
    /// Generates a new unique emitter id.
    #[inline]
    pub fn new() -> Self {
        Self(NEXT_EMITTER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for EmitterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique identifier for a particle, scoped to one emitter.
///
/// Issued by an [`IdAllocator`]; stable for the particle's lifetime and
/// eligible for reuse after the allocator reclaims it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParticleId(u32);

impl ParticleId {
    /// Returns the raw id value.
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues unique particle ids on demand and reclaims them after death.
///
/// A growable arena with a free list: [`acquire`](Self::acquire) pops the
/// free list or extends a monotonic counter, [`release`](Self::release)
/// pushes an outstanding id back for reuse. Identifier growth is bounded by
/// the peak number of simultaneously live particles.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    /// One flag per id ever issued; true while that id is outstanding.
    live: Vec<bool>,
    /// Ids released and eligible for reuse.
    free: Vec<u32>,
}

impl IdAllocator {
    /// Creates an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an id not currently held by any live particle.
    pub fn acquire(&mut self) -> ParticleId {
        match self.free.pop() {
            Some(index) => {
                self.live[index as usize] = true;
                ParticleId(index)
            }
            None => {
                let index = self.live.len() as u32;
                self.live.push(true);
                ParticleId(index)
            }
        }
    }

    /// Returns an id to the pool, making it eligible for a future
    /// [`acquire`](Self::acquire).
    ///
    /// # Panics
    /// Panics if `id` is not currently outstanding. A double release would
    /// let the same id be handed to two live particles, so it is rejected
    /// loudly instead of being absorbed.
    pub fn release(&mut self, id: ParticleId) {
        let index = id.0 as usize;
        assert!(
            index < self.live.len() && self.live[index],
            "released particle id {id} that is not outstanding"
        );
        self.live[index] = false;
        self.free.push(id.0);
    }

    /// Returns true if `id` is currently held.
    pub fn is_outstanding(&self, id: ParticleId) -> bool {
        self.live.get(id.0 as usize).copied().unwrap_or(false)
    }

    /// Returns the number of ids currently held.
    pub fn outstanding(&self) -> usize {
        self.live.iter().filter(|held| **held).count()
    }
}
