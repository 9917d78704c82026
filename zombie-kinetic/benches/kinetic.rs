//! Throughput of pushing affine-keyed entries and advancing virtual time.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use zombie_kinetic::{AffFunction, KineticMinHeap};

fn push_and_advance(c: &mut Criterion) {
    c.bench_function("push_128_advance_16_steps", |b| {
        b.iter(|| {
            let mut heap = KineticMinHeap::new();
            for i in 0..128i64 {
                heap.push(i, AffFunction::new((i % 7) + 1, i % 23));
            }
            let mut time = 0i64;
            for _ in 0..16 {
                time += 3;
                heap.advance_to(time);
                black_box(heap.peek());
            }
            black_box(heap.len())
        });
    });
}

criterion_group!(benches, push_and_advance);
criterion_main!(benches);
