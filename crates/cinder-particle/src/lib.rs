//! Particle lifecycle engine: spawning, aging, pruning, and depth sorting.
//!
//! Provides [`ParticleEmitter`] (unbounded population) and [`ParticlePool`]
//! (fixed capacity, slots reset in place), both parameterized by six injected
//! behavior objects: samplers for lifespan, initial velocity, and spawn
//! delay, plus velocity, scale, and roll curves over a particle's life.
//! Spawn and death observers receive `(EmitterId, ParticleId)` pairs, and a
//! cached back-to-front snapshot keeps alpha-blended draw order correct.
//!
//! # Example
//!
//! ```
//! use cinder_particle::{Constant, ConstantVelocity, EmitterBehaviors, ParticleEmitter};
//! use cinder_transform::Transform;
//! use glam::{Mat4, Vec3};
//!
//! let behaviors = EmitterBehaviors {
//!     lifespan: Box::new(Constant(2.0)),
//!     spawn_delay: Box::new(Constant(1.0)),
//!     initial_velocity: Box::new(ConstantVelocity(Vec3::Y)),
//!     ..Default::default()
//! };
//! let mut emitter = ParticleEmitter::new(behaviors, Transform::IDENTITY);
//!
//! // One second of simulation: one particle spawned and integrated.
//! emitter.update(1.0, Mat4::IDENTITY);
//! assert_eq!(emitter.count(), 1);
//!
//! // Back-to-front view for rendering.
//! for particle in emitter.sorted_by_distance() {
//!     let _model = particle.transform().to_matrix();
//! }
//! ```

use cinder_core::{EmitterId, IdAllocator, ParticleId, RateLimiter};
use cinder_transform::Transform;
use glam::{Mat4, Vec3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Behaviors
// ============================================================================

/// Samples the lifespan, in seconds, for a newly spawned particle.
pub trait LifespanSampler: Send + Sync {
    /// Returns the lifespan of the next particle.
    fn sample(&self, rng: &mut SampleRng) -> f32;
}

/// Samples the initial velocity for a newly spawned particle.
pub trait VelocitySampler: Send + Sync {
    /// Returns the initial velocity of the next particle.
    fn sample(&self, rng: &mut SampleRng) -> Vec3;
}

/// Samples the delay, in seconds, until the next spawn is due.
///
/// Re-sampled on every spawn check, so implementations may answer with a
/// different delay each time (randomized or time-varying intervals).
pub trait SpawnDelaySampler: Send + Sync {
    /// Returns the current spawn delay.
    fn sample(&self, rng: &mut SampleRng) -> f32;
}

/// Perturbs a particle's velocity over its life.
pub trait VelocityCurve: Send + Sync {
    /// Returns the velocity change to add for one step.
    ///
    /// `life` is the particle's life fraction in `[0, 1)`; `dt` is the step
    /// in seconds.
    fn delta(&self, life: f32, dt: f32) -> Vec3;
}

/// Uniform scale of a particle as a function of its life fraction.
pub trait ScaleCurve: Send + Sync {
    /// Returns the scale at the given life fraction.
    fn at(&self, life: f32) -> f32;
}

/// Roll of a particle, in degrees, as a function of its life fraction.
pub trait RollCurve: Send + Sync {
    /// Returns the roll at the given life fraction.
    fn at(&self, life: f32) -> f32;
}

impl<F> LifespanSampler for F
where
    F: Fn(&mut SampleRng) -> f32 + Send + Sync,
{
    fn sample(&self, rng: &mut SampleRng) -> f32 {
        self(rng)
    }
}

impl<F> VelocitySampler for F
where
    F: Fn(&mut SampleRng) -> Vec3 + Send + Sync,
{
    fn sample(&self, rng: &mut SampleRng) -> Vec3 {
        self(rng)
    }
}

impl<F> SpawnDelaySampler for F
where
    F: Fn(&mut SampleRng) -> f32 + Send + Sync,
{
    fn sample(&self, rng: &mut SampleRng) -> f32 {
        self(rng)
    }
}

impl<F> VelocityCurve for F
where
    F: Fn(f32, f32) -> Vec3 + Send + Sync,
{
    fn delta(&self, life: f32, dt: f32) -> Vec3 {
        self(life, dt)
    }
}

impl<F> ScaleCurve for F
where
    F: Fn(f32) -> f32 + Send + Sync,
{
    fn at(&self, life: f32) -> f32 {
        self(life)
    }
}

impl<F> RollCurve for F
where
    F: Fn(f32) -> f32 + Send + Sync,
{
    fn at(&self, life: f32) -> f32 {
        self(life)
    }
}

/// The six behavior objects that parameterize an emitter.
///
/// Behaviors are stored by ownership transfer; an emitter never borrows
/// caller-held state. Every field has a working default, so configurations
/// can use struct update syntax and override only what they need.
pub struct EmitterBehaviors {
    /// Lifespan sampler for newly spawned particles.
    pub lifespan: Box<dyn LifespanSampler>,
    /// Initial velocity sampler for newly spawned particles.
    pub initial_velocity: Box<dyn VelocitySampler>,
    /// Delay until the next spawn is due; re-sampled on every check.
    pub spawn_delay: Box<dyn SpawnDelaySampler>,
    /// Velocity perturbation over a particle's life.
    pub velocity_change: Box<dyn VelocityCurve>,
    /// Uniform scale over a particle's life.
    pub scale: Box<dyn ScaleCurve>,
    /// Roll, in degrees, over a particle's life.
    pub roll: Box<dyn RollCurve>,
}

impl Default for EmitterBehaviors {
    fn default() -> Self {
        Self {
            lifespan: Box::new(Constant(1.0)),
            initial_velocity: Box::new(ConstantVelocity(Vec3::Y)),
            spawn_delay: Box::new(Constant(0.1)),
            velocity_change: Box::new(ConstantAcceleration(Vec3::ZERO)),
            scale: Box::new(Constant(1.0)),
            roll: Box::new(Constant(0.0)),
        }
    }
}

// ============================================================================
// Built-in behaviors
// ============================================================================

/// A fixed value, usable as a lifespan, spawn delay, scale, or roll behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Constant(pub f32);

impl LifespanSampler for Constant {
    fn sample(&self, _rng: &mut SampleRng) -> f32 {
        self.0
    }
}

impl SpawnDelaySampler for Constant {
    fn sample(&self, _rng: &mut SampleRng) -> f32 {
        self.0
    }
}

impl ScaleCurve for Constant {
    fn at(&self, _life: f32) -> f32 {
        self.0
    }
}

impl RollCurve for Constant {
    fn at(&self, _life: f32) -> f32 {
        self.0
    }
}

/// Samples uniformly from `[min, max)`, usable as a lifespan or spawn delay.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UniformRange {
    /// Inclusive lower bound.
    pub min: f32,
    /// Exclusive upper bound.
    pub max: f32,
}

impl LifespanSampler for UniformRange {
    fn sample(&self, rng: &mut SampleRng) -> f32 {
        rng.range(self.min, self.max)
    }
}

impl SpawnDelaySampler for UniformRange {
    fn sample(&self, rng: &mut SampleRng) -> f32 {
        rng.range(self.min, self.max)
    }
}

/// A fixed initial velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstantVelocity(pub Vec3);

impl VelocitySampler for ConstantVelocity {
    fn sample(&self, _rng: &mut SampleRng) -> Vec3 {
        self.0
    }
}

/// Initial velocity inside a spread cone around a direction.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpreadVelocity {
    /// Central emission direction.
    pub direction: Vec3,
    /// Blend toward a random direction: `0.0` (focused) to `1.0`
    /// (omnidirectional).
    pub spread: f32,
    /// Minimum speed.
    pub speed_min: f32,
    /// Maximum speed.
    pub speed_max: f32,
}

impl VelocitySampler for SpreadVelocity {
    fn sample(&self, rng: &mut SampleRng) -> Vec3 {
        let dir = if self.spread > 0.0 {
            let random_dir = rng.unit_sphere();
            let amount = rng.next_f32() * self.spread;
            self.direction
                .normalize()
                .lerp(random_dir, amount)
                .normalize()
        } else {
            self.direction.normalize()
        };

        dir * rng.range(self.speed_min, self.speed_max)
    }
}

/// Constant acceleration applied over a particle's whole life
/// (gravity-style velocity perturbation).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstantAcceleration(pub Vec3);

impl VelocityCurve for ConstantAcceleration {
    fn delta(&self, _life: f32, dt: f32) -> Vec3 {
        self.0 * dt
    }
}

/// Linear interpolation from `start` at spawn to `end` at end of life,
/// usable as a scale or roll curve.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinearRamp {
    /// Value at life fraction 0.
    pub start: f32,
    /// Value at life fraction 1.
    pub end: f32,
}

impl ScaleCurve for LinearRamp {
    fn at(&self, life: f32) -> f32 {
        self.start + (self.end - self.start) * life
    }
}

impl RollCurve for LinearRamp {
    fn at(&self, life: f32) -> f32 {
        self.start + (self.end - self.start) * life
    }
}

// ============================================================================
// Rng
// ============================================================================

/// Seedable random number generator threaded into sampler behaviors.
///
/// xorshift64; a given seed always produces the same sequence, so emitter
/// runs are reproducible in tests.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleRng {
    state: u64,
}

impl Default for SampleRng {
    fn default() -> Self {
        Self::new(0x5EED_CAFE)
    }
}

impl SampleRng {
    /// Creates a new generator from a seed.
    pub fn new(seed: u64) -> Self {
        // xorshift has a fixed point at zero
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Returns a random f32 in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        // Top 24 bits so the quotient stays strictly below 1.0.
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Returns a random f32 in `[min, max)`.
    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_f32() * (max - min)
    }

    /// Returns a random direction on the unit sphere.
    pub fn unit_sphere(&mut self) -> Vec3 {
        // Rejection sampling for a uniform distribution.
        loop {
            let x = self.range(-1.0, 1.0);
            let y = self.range(-1.0, 1.0);
            let z = self.range(-1.0, 1.0);
            let len_sq = x * x + y * y + z * z;
            if len_sq > 1e-4 && len_sq <= 1.0 {
                return Vec3::new(x, y, z) / len_sq.sqrt();
            }
        }
    }
}

// ============================================================================
// Particle
// ============================================================================

/// One simulated visual entity with age-driven kinematic and visual state.
///
/// Particles are created by an emitter's spawn pass and mutated only by its
/// update pass; renderers see clones inside the sorted snapshot.
#[derive(Debug, Clone)]
pub struct Particle {
    id: ParticleId,
    age: f32,
    lifespan: f32,
    velocity: Vec3,
    transform: Transform,
    distance_to_camera: f32,
}

impl Particle {
    fn new(id: ParticleId, lifespan: f32, velocity: Vec3, origin: Vec3, initial_scale: f32) -> Self {
        let mut transform = Transform::from_position(origin);
        transform.scale = Vec3::splat(initial_scale);
        Self {
            id,
            age: 0.0,
            lifespan,
            velocity,
            transform,
            distance_to_camera: 0.0,
        }
    }

    /// Resets this particle in place for slot reuse, keeping its id.
    fn reset(&mut self, lifespan: f32, velocity: Vec3, origin: Vec3, initial_scale: f32) {
        self.age = 0.0;
        self.lifespan = lifespan;
        self.velocity = velocity;
        self.transform = Transform::from_position(origin);
        self.transform.scale = Vec3::splat(initial_scale);
        self.distance_to_camera = 0.0;
    }

    /// Advances the particle by `dt` seconds.
    ///
    /// Once the life fraction reaches 1.0 the age clamps to the lifespan and
    /// every other field freezes; the particle stays renderable in that
    /// terminal state until the owning emitter prunes it.
    fn update(&mut self, dt: f32, world_to_clip: Mat4, behaviors: &EmitterBehaviors) {
        self.age += dt;
        let life = self.normalized_age();
        if life >= 1.0 {
            self.age = self.lifespan.max(0.0);
            return;
        }

        self.velocity += behaviors.velocity_change.delta(life, dt);
        self.transform.position += self.velocity * dt;
        self.transform.scale = Vec3::splat(behaviors.scale.at(life));
        self.transform.rotation.z = behaviors.roll.at(life);
        self.distance_to_camera = (world_to_clip * self.transform.position.extend(1.0)).z;
    }

    /// Returns this particle's id.
    pub fn id(&self) -> ParticleId {
        self.id
    }

    /// Returns the current age in seconds.
    pub fn age(&self) -> f32 {
        self.age
    }

    /// Returns the total lifespan in seconds.
    pub fn lifespan(&self) -> f32 {
        self.lifespan
    }

    /// Returns the current velocity.
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Returns the particle's transform (position, rotation, scale).
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Returns the depth recorded by the most recent update.
    ///
    /// This is the z component of the position under the supplied camera
    /// transform - a back-to-front sort key, not a Euclidean distance.
    pub fn distance_to_camera(&self) -> f32 {
        self.distance_to_camera
    }

    /// Returns the life fraction in `[0, 1]`, treating a non-positive
    /// lifespan as already expired.
    pub fn normalized_age(&self) -> f32 {
        if self.lifespan <= 0.0 {
            1.0
        } else {
            (self.age / self.lifespan).clamp(0.0, 1.0)
        }
    }

    /// Returns true while the particle's age is below its lifespan.
    pub fn is_alive(&self) -> bool {
        self.age < self.lifespan
    }
}

/// Sorts a snapshot back to front: farther from the camera first, ties
/// keeping their relative order.
fn sort_back_to_front(particles: &mut [Particle]) {
    particles.sort_by(|a, b| b.distance_to_camera.total_cmp(&a.distance_to_camera));
}

/// Observer invoked with the emitter's id and a particle's id at the moment
/// of spawn or of prune-driven death.
pub type LifecycleCallback = Box<dyn FnMut(EmitterId, ParticleId) + Send>;

// ============================================================================
// Emitter
// ============================================================================

/// Particle emitter with an unbounded population.
///
/// Owns its particle collection (spawn order), id allocator, RNG, and
/// behaviors. Each call to [`update`](Self::update) advances the spawn timer
/// and, unless gated by an optional [`RateLimiter`], runs one
/// spawn -> prune -> integrate pass, so a particle spawned in a pass is
/// integrated in that same pass and a particle that expires in a pass is
/// pruned at the start of the next one.
pub struct ParticleEmitter {
    id: EmitterId,
    /// Spawn origin and orientation; the position is sampled at spawn time,
    /// so moving the emitter moves where new particles appear.
    pub transform: Transform,
    behaviors: EmitterBehaviors,
    particles: Vec<Particle>,
    sorted: Vec<Particle>,
    sorted_dirty: bool,
    ids: IdAllocator,
    rng: SampleRng,
    rate_limiter: Option<RateLimiter>,
    time_since_last_spawn: f32,
    emitting: bool,
    on_spawn: Vec<LifecycleCallback>,
    on_death: Vec<LifecycleCallback>,
}

impl ParticleEmitter {
    /// Creates an emitter at the given source transform.
    pub fn new(behaviors: EmitterBehaviors, transform: Transform) -> Self {
        Self {
            id: EmitterId::new(),
            transform,
            behaviors,
            particles: Vec::new(),
            sorted: Vec::new(),
            sorted_dirty: false,
            ids: IdAllocator::new(),
            rng: SampleRng::default(),
            rate_limiter: None,
            time_since_last_spawn: 0.0,
            emitting: true,
            on_spawn: Vec::new(),
            on_death: Vec::new(),
        }
    }

    /// Gates simulation passes behind `limiter`.
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Sets the sampler seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SampleRng::new(seed);
        self
    }

    /// Registers an observer for spawn events.
    pub fn on_spawn(&mut self, callback: impl FnMut(EmitterId, ParticleId) + Send + 'static) {
        self.on_spawn.push(Box::new(callback));
    }

    /// Registers an observer for death events.
    pub fn on_death(&mut self, callback: impl FnMut(EmitterId, ParticleId) + Send + 'static) {
        self.on_death.push(Box::new(callback));
    }

    /// Stops spawning new particles; existing ones keep aging and dying.
    pub fn stop_emitting(&mut self) {
        self.emitting = false;
    }

    /// Resumes spawning.
    pub fn resume_emitting(&mut self) {
        self.emitting = true;
    }

    /// Returns true while spawning is enabled.
    pub fn is_emitting(&self) -> bool {
        self.emitting
    }

    /// Returns this emitter's id.
    pub fn id(&self) -> EmitterId {
        self.id
    }

    /// Returns the number of particles currently owned, including any that
    /// expired this pass and await pruning.
    pub fn count(&self) -> usize {
        self.particles.len()
    }

    /// Returns the live collection in spawn order.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Advances the simulation by `delta_time` seconds.
    ///
    /// The spawn timer always advances by the raw `delta_time`. With a rate
    /// limiter, the spawn -> prune -> integrate pass runs only on accepted
    /// runs and integrates with the limiter's recorded elapsed time; without
    /// one, the pass runs every call with `delta_time` itself.
    ///
    /// At most one particle is spawned per executed pass, even if several
    /// spawn intervals fit inside the elapsed time; long gaps therefore
    /// under-spawn rather than burst.
    pub fn update(&mut self, delta_time: f32, world_to_clip: Mat4) {
        self.time_since_last_spawn += delta_time;

        let step = match self.rate_limiter.as_mut() {
            Some(gate) => {
                if !gate.attempt_to_run(delta_time) {
                    return;
                }
                gate.last_processed_elapsed()
            }
            None => delta_time,
        };

        self.sorted_dirty = true;
        self.try_spawn();
        self.prune_dead();
        for particle in &mut self.particles {
            particle.update(step, world_to_clip, &self.behaviors);
        }
    }

    /// Returns a back-to-front snapshot of the owned particles.
    ///
    /// The snapshot is cached: repeated calls between updates return the
    /// same sequence without resorting, and the returned slice never aliases
    /// the live collection, so a renderer will not observe a later pass
    /// through it. With no particles the slice is empty.
    pub fn sorted_by_distance(&mut self) -> &[Particle] {
        if self.sorted_dirty {
            self.sorted.clear();
            self.sorted.extend(self.particles.iter().cloned());
            sort_back_to_front(&mut self.sorted);
            self.sorted_dirty = false;
        }
        &self.sorted
    }

    fn try_spawn(&mut self) {
        if !self.emitting {
            return;
        }
        let delay = self.behaviors.spawn_delay.sample(&mut self.rng);
        if self.time_since_last_spawn < delay {
            return;
        }

        let id = self.ids.acquire();
        let lifespan = self.behaviors.lifespan.sample(&mut self.rng);
        let velocity = self.behaviors.initial_velocity.sample(&mut self.rng);
        let scale = self.behaviors.scale.at(0.0);
        self.particles
            .push(Particle::new(id, lifespan, velocity, self.transform.position, scale));
        for callback in &mut self.on_spawn {
            callback(self.id, id);
        }
        self.time_since_last_spawn = 0.0;
    }

    /// Removes every particle dead at the start of the pass, firing one
    /// death callback and releasing one id per removal, in spawn order.
    fn prune_dead(&mut self) {
        let emitter_id = self.id;
        let ids = &mut self.ids;
        let on_death = &mut self.on_death;
        self.particles.retain(|particle| {
            if particle.is_alive() {
                return true;
            }
            ids.release(particle.id);
            for callback in on_death.iter_mut() {
                callback(emitter_id, particle.id);
            }
            false
        });
    }
}

// ============================================================================
// Pool
// ============================================================================

/// One reusable slot in a [`ParticlePool`].
#[derive(Debug, Clone)]
struct Slot {
    particle: Particle,
    /// True once the slot's death has been observed and the slot is
    /// eligible for reuse.
    retired: bool,
}

/// Particle emitter over a fixed-capacity pool of pre-constructed slots.
///
/// Spawning resets the next retired slot in place instead of allocating,
/// scanning round-robin from the last reused index and wrapping. Each slot
/// keeps the id it was stamped with at construction for the pool's whole
/// lifetime; spawn and death callbacks report that slot id. While every
/// slot is live, spawn attempts are skipped (the spawn timer keeps
/// accumulating, so a freed slot is reused on the next executed pass).
pub struct ParticlePool {
    id: EmitterId,
    /// Spawn origin and orientation; the position is sampled at spawn time.
    pub transform: Transform,
    behaviors: EmitterBehaviors,
    slots: Vec<Slot>,
    /// Index of the last reused slot; scans start here.
    cursor: usize,
    sorted: Vec<Particle>,
    sorted_dirty: bool,
    rng: SampleRng,
    rate_limiter: Option<RateLimiter>,
    time_since_last_spawn: f32,
    emitting: bool,
    on_spawn: Vec<LifecycleCallback>,
    on_death: Vec<LifecycleCallback>,
}

impl ParticlePool {
    /// Creates a pool of `capacity` retired slots at the given source
    /// transform.
    pub fn new(capacity: usize, behaviors: EmitterBehaviors, transform: Transform) -> Self {
        let mut ids = IdAllocator::new();
        let slots = (0..capacity)
            .map(|_| Slot {
                particle: Particle::new(ids.acquire(), 0.0, Vec3::ZERO, transform.position, 0.0),
                retired: true,
            })
            .collect();

        Self {
            id: EmitterId::new(),
            transform,
            behaviors,
            slots,
            cursor: 0,
            sorted: Vec::new(),
            sorted_dirty: false,
            rng: SampleRng::default(),
            rate_limiter: None,
            time_since_last_spawn: 0.0,
            emitting: true,
            on_spawn: Vec::new(),
            on_death: Vec::new(),
        }
    }

    /// Gates simulation passes behind `limiter`.
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Sets the sampler seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SampleRng::new(seed);
        self
    }

    /// Registers an observer for spawn events.
    pub fn on_spawn(&mut self, callback: impl FnMut(EmitterId, ParticleId) + Send + 'static) {
        self.on_spawn.push(Box::new(callback));
    }

    /// Registers an observer for death events.
    pub fn on_death(&mut self, callback: impl FnMut(EmitterId, ParticleId) + Send + 'static) {
        self.on_death.push(Box::new(callback));
    }

    /// Stops spawning; live slots keep aging and retiring.
    pub fn stop_emitting(&mut self) {
        self.emitting = false;
    }

    /// Resumes spawning.
    pub fn resume_emitting(&mut self) {
        self.emitting = true;
    }

    /// Returns true while spawning is enabled.
    pub fn is_emitting(&self) -> bool {
        self.emitting
    }

    /// Returns this pool's id.
    pub fn id(&self) -> EmitterId {
        self.id
    }

    /// Returns the number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of slots currently holding a particle, including
    /// any that expired this pass and await retirement.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.retired).count()
    }

    /// Advances the simulation by `delta_time` seconds.
    ///
    /// Same pass structure and gating as
    /// [`ParticleEmitter::update`]: the spawn timer advances by the raw
    /// delta every call; an executed pass spawns (at most one particle),
    /// retires newly dead slots, and integrates the live ones.
    pub fn update(&mut self, delta_time: f32, world_to_clip: Mat4) {
        self.time_since_last_spawn += delta_time;

        let step = match self.rate_limiter.as_mut() {
            Some(gate) => {
                if !gate.attempt_to_run(delta_time) {
                    return;
                }
                gate.last_processed_elapsed()
            }
            None => delta_time,
        };

        self.sorted_dirty = true;
        self.try_spawn();
        self.retire_dead();
        for slot in &mut self.slots {
            if !slot.retired {
                slot.particle.update(step, world_to_clip, &self.behaviors);
            }
        }
    }

    /// Returns a back-to-front snapshot of the live slots.
    ///
    /// Same caching contract as [`ParticleEmitter::sorted_by_distance`];
    /// retired slots never appear in the snapshot.
    pub fn sorted_by_distance(&mut self) -> &[Particle] {
        if self.sorted_dirty {
            self.sorted.clear();
            self.sorted.extend(
                self.slots
                    .iter()
                    .filter(|slot| !slot.retired)
                    .map(|slot| slot.particle.clone()),
            );
            sort_back_to_front(&mut self.sorted);
            self.sorted_dirty = false;
        }
        &self.sorted
    }

    fn try_spawn(&mut self) {
        if !self.emitting {
            return;
        }
        let delay = self.behaviors.spawn_delay.sample(&mut self.rng);
        if self.time_since_last_spawn < delay {
            return;
        }
        let Some(index) = self.next_retired_slot() else {
            // Saturated: leave the timer accumulated so a freed slot
            // respawns on the next executed pass.
            return;
        };

        self.cursor = index;
        let lifespan = self.behaviors.lifespan.sample(&mut self.rng);
        let velocity = self.behaviors.initial_velocity.sample(&mut self.rng);
        let scale = self.behaviors.scale.at(0.0);

        let slot = &mut self.slots[index];
        slot.particle
            .reset(lifespan, velocity, self.transform.position, scale);
        slot.retired = false;
        let particle_id = slot.particle.id;
        for callback in &mut self.on_spawn {
            callback(self.id, particle_id);
        }
        self.time_since_last_spawn = 0.0;
    }

    /// Round-robin scan for a reusable slot, starting from the last reused
    /// index and wrapping once.
    fn next_retired_slot(&self) -> Option<usize> {
        let len = self.slots.len();
        (0..len)
            .map(|offset| (self.cursor + offset) % len)
            .find(|&index| self.slots[index].retired)
    }

    /// Retires every slot whose particle died since the previous pass,
    /// firing one death callback per slot.
    fn retire_dead(&mut self) {
        let pool_id = self.id;
        let on_death = &mut self.on_death;
        for slot in &mut self.slots {
            if slot.retired || slot.particle.is_alive() {
                continue;
            }
            slot.retired = true;
            for callback in on_death.iter_mut() {
                callback(pool_id, slot.particle.id);
            }
        }
    }
}


/// Invariant tests for the particle lifecycle.
///
/// Run with: cargo test -p cinder-particle --features invariant-tests
#[cfg(all(test, feature = "invariant-tests"))]
mod invariant_tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    fn churn_behaviors() -> EmitterBehaviors {
        EmitterBehaviors {
            lifespan: Box::new(UniformRange { min: 0.2, max: 0.8 }),
            spawn_delay: Box::new(UniformRange { min: 0.02, max: 0.1 }),
            initial_velocity: Box::new(SpreadVelocity {
                direction: Vec3::Y,
                spread: 1.0,
                speed_min: 0.5,
                speed_max: 3.0,
            }),
            scale: Box::new(LinearRamp { start: 1.0, end: 0.0 }),
            roll: Box::new(LinearRamp { start: 0.0, end: 360.0 }),
            ..Default::default()
        }
    }

    /// No id is ever held by two live particles at once.
    #[test]
    fn invariant_live_ids_unique() {
        let mut emitter = ParticleEmitter::new(churn_behaviors(), Transform::IDENTITY).with_seed(11);

        for _ in 0..200 {
            emitter.update(0.05, Mat4::IDENTITY);
            let mut seen = HashSet::new();
            for particle in emitter.particles() {
                assert!(
                    seen.insert(particle.id()),
                    "duplicate live id {}",
                    particle.id()
                );
            }
        }
    }

    /// Age never exceeds the lifespan, and aliveness is exactly
    /// `age < lifespan` at every observable point.
    #[test]
    fn invariant_age_clamped_to_lifespan() {
        let mut emitter = ParticleEmitter::new(churn_behaviors(), Transform::IDENTITY).with_seed(12);

        for _ in 0..200 {
            emitter.update(0.07, Mat4::IDENTITY);
            for particle in emitter.particles() {
                assert!(
                    particle.age() <= particle.lifespan() + 1e-6,
                    "age {} exceeded lifespan {}",
                    particle.age(),
                    particle.lifespan()
                );
                assert_eq!(particle.is_alive(), particle.age() < particle.lifespan());
            }
        }
    }

    /// The sorted view is non-increasing in depth on every pass.
    #[test]
    fn invariant_sorted_non_increasing() {
        let mut emitter = ParticleEmitter::new(churn_behaviors(), Transform::IDENTITY).with_seed(13);
        let camera = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));

        for _ in 0..100 {
            emitter.update(0.05, camera);
            let sorted = emitter.sorted_by_distance();
            for pair in sorted.windows(2) {
                assert!(
                    pair[0].distance_to_camera() >= pair[1].distance_to_camera(),
                    "sorted view must be farther-first: {} then {}",
                    pair[0].distance_to_camera(),
                    pair[1].distance_to_camera()
                );
            }
        }
    }

    /// Every spawned particle dies exactly once, and each death releases an
    /// id that later spawns may pick up again.
    #[test]
    fn invariant_births_equal_deaths() {
        let mut emitter = ParticleEmitter::new(churn_behaviors(), Transform::IDENTITY).with_seed(14);
        let born = Arc::new(Mutex::new(Vec::new()));
        let died = Arc::new(Mutex::new(Vec::new()));
        let born_sink = Arc::clone(&born);
        let died_sink = Arc::clone(&died);
        emitter.on_spawn(move |_, id| born_sink.lock().unwrap().push(id));
        emitter.on_death(move |_, id| died_sink.lock().unwrap().push(id));

        for _ in 0..200 {
            emitter.update(0.05, Mat4::IDENTITY);
        }
        // Flush: stop spawning and let everything expire and prune.
        emitter.stop_emitting();
        for _ in 0..40 {
            emitter.update(0.05, Mat4::IDENTITY);
        }

        assert_eq!(emitter.count(), 0);
        let mut born = born.lock().unwrap().clone();
        let mut died = died.lock().unwrap().clone();
        assert!(!born.is_empty());
        born.sort();
        died.sort();
        assert_eq!(born, died, "every spawn must be matched by exactly one death");
    }

    /// The pool never exceeds its capacity and reuses slot ids only.
    #[test]
    fn invariant_pool_bounded_by_capacity() {
        let mut pool = ParticlePool::new(16, churn_behaviors(), Transform::IDENTITY).with_seed(15);
        let spawned = Arc::new(Mutex::new(HashSet::new()));
        let sink = Arc::clone(&spawned);
        pool.on_spawn(move |_, id| {
            sink.lock().unwrap().insert(id);
        });

        for _ in 0..400 {
            pool.update(0.03, Mat4::IDENTITY);
            assert!(pool.live_count() <= pool.capacity());
        }

        let distinct = spawned.lock().unwrap().len();
        assert!(distinct <= 16, "pool ids are slot ids: at most capacity many");
    }

    /// Two emitters with equal seeds and behaviors evolve identically.
    #[test]
    fn invariant_deterministic_under_seed() {
        let mut a = ParticleEmitter::new(churn_behaviors(), Transform::IDENTITY).with_seed(99);
        let mut b = ParticleEmitter::new(churn_behaviors(), Transform::IDENTITY).with_seed(99);

        for _ in 0..150 {
            a.update(0.05, Mat4::IDENTITY);
            b.update(0.05, Mat4::IDENTITY);
        }

        assert_eq!(a.count(), b.count());
        for (pa, pb) in a.particles().iter().zip(b.particles()) {
            assert_eq!(pa.id(), pb.id());
            assert_eq!(pa.age(), pb.age());
            assert_eq!(pa.transform().position, pb.transform().position);
            assert_eq!(pa.velocity(), pb.velocity());
        }
    }

    /// A snapshot read twice with no pass in between is bitwise stable.
    #[test]
    fn invariant_snapshot_stable_between_passes() {
        let mut emitter = ParticleEmitter::new(churn_behaviors(), Transform::IDENTITY).with_seed(16);

        for _ in 0..50 {
            emitter.update(0.05, Mat4::IDENTITY);
            let first: Vec<_> = emitter
                .sorted_by_distance()
                .iter()
                .map(|p| (p.id(), p.distance_to_camera()))
                .collect();
            let second: Vec<_> = emitter
                .sorted_by_distance()
                .iter()
                .map(|p| (p.id(), p.distance_to_camera()))
                .collect();
            assert_eq!(first, second);
        }
    }
}
