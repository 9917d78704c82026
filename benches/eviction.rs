//! GreedyDual eviction throughput: repeatedly pushing materialised cells
//! onto the heap and murdering the cheapest one.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use zombie::{bind1, Engine, Trampoline, Zombie, ZombieConfig};

fn murder_many(c: &mut Criterion) {
    c.bench_function("murder_64_peers", |b| {
        b.iter(|| {
            let engine = Engine::new(ZombieConfig::default()).unwrap();
            let root = Zombie::new(&engine, 0i64);
            let mut peers = Vec::with_capacity(64);
            for i in 0..64i64 {
                peers.push(bind1(&root, move |n| Trampoline::Return(n + i)));
            }
            for peer in &peers {
                let _ = peer.get_value();
            }
            let mut murdered = 0u32;
            while engine.murder() {
                murdered += 1;
            }
            black_box(murdered)
        });
    });
}

criterion_group!(benches, murder_many);
criterion_main!(benches);
