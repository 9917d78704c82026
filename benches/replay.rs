//! Replay-path throughput: how fast the engine can rebuild a chain and a
//! diamond of evicted cells.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use zombie::{bind1, bind2, Engine, Trampoline, Zombie, ZombieConfig};

fn chain_replay(c: &mut Criterion) {
    c.bench_function("replay_chain_of_32", |b| {
        b.iter(|| {
            let engine = Engine::new(ZombieConfig::default()).unwrap();
            let mut cell = Zombie::new(&engine, 1i64);
            let mut chain = Vec::with_capacity(32);
            for _ in 0..32 {
                cell = bind1(&cell, |n| Trampoline::Return(n + 1));
                chain.push(cell.clone());
            }
            for cell in &chain {
                cell.evict();
            }
            black_box(chain.last().unwrap().get_value())
        });
    });
}

fn diamond_replay(c: &mut Criterion) {
    c.bench_function("replay_diamond_width_16", |b| {
        b.iter(|| {
            let engine = Engine::new(ZombieConfig::default()).unwrap();
            let root = Zombie::new(&engine, 1i64);
            let mut leaves = Vec::with_capacity(16);
            for i in 0..16i64 {
                leaves.push(bind1(&root, move |n| Trampoline::Return(n + i)));
            }
            let mut sum = leaves[0].clone();
            for leaf in &leaves[1..] {
                sum = bind2(&sum, leaf, |x, y| Trampoline::Return(x + y));
            }
            root.evict();
            for leaf in &leaves {
                leaf.evict();
            }
            black_box(sum.get_value())
        });
    });
}

criterion_group!(benches, chain_replay, diamond_replay);
criterion_main!(benches);
