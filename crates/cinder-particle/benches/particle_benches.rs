//! Benchmarks for emitter update and sorted-view passes.

use cinder_particle::{Constant, EmitterBehaviors, ParticleEmitter, SpreadVelocity};
use cinder_transform::Transform;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::{Mat4, Vec3};

fn filled_emitter(count: usize) -> ParticleEmitter {
    let behaviors = EmitterBehaviors {
        lifespan: Box::new(Constant(1e9)),
        spawn_delay: Box::new(Constant(0.0)),
        initial_velocity: Box::new(SpreadVelocity {
            direction: Vec3::Y,
            spread: 1.0,
            speed_min: 0.5,
            speed_max: 2.0,
        }),
        ..Default::default()
    };

    // One spawn per pass until the population is reached, then freeze the
    // population so iterations measure integration only.
    let mut emitter = ParticleEmitter::new(behaviors, Transform::IDENTITY).with_seed(42);
    for _ in 0..count {
        emitter.update(0.001, Mat4::IDENTITY);
    }
    emitter.stop_emitting();
    emitter
}

fn bench_update(c: &mut Criterion) {
    for count in [100usize, 1_000, 10_000] {
        let mut emitter = filled_emitter(count);
        c.bench_function(&format!("update_{count}"), |b| {
            b.iter(|| emitter.update(black_box(0.016), Mat4::IDENTITY))
        });
    }
}

fn bench_sorted_view(c: &mut Criterion) {
    for count in [100usize, 1_000, 10_000] {
        let mut emitter = filled_emitter(count);
        c.bench_function(&format!("sorted_by_distance_{count}"), |b| {
            b.iter(|| {
                emitter.update(black_box(0.016), Mat4::IDENTITY);
                black_box(emitter.sorted_by_distance().len())
            })
        });
    }
}

criterion_group!(benches, bench_update, bench_sorted_view);
criterion_main!(benches);
