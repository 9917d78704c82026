//! §10.4: a small demonstration driver. Builds a short bind chain, evicts
//! part of it, reads it back, and prints the resulting lineage and eviction
//! summary. Not a supported CLI surface (§6) — just a manual-inspection aid.

use std::rc::Rc;

use tracing::info;

use zombie::{bind1, bind2, Engine, Trampoline, Zombie, ZombieConfig};

fn main() {
    tracing_subscriber::fmt::init();

    let engine = Engine::new(ZombieConfig::default()).expect("default config is always valid");

    let x = Zombie::new(&engine, 1i64);
    let y = bind1(&x, |n| Trampoline::Return(n * 2));
    let z = bind1(&y, |n| Trampoline::Return(n * 2));
    info!(value = z.get_value(), "built chain x -> y -> z");

    y.evict();
    z.evict();
    info!(
        y_materialized = y.is_materialized(),
        z_materialized = z.is_materialized(),
        "evicted y and z"
    );

    let revived = z.get_value();
    info!(value = revived, recompute_count = engine.recompute_count(), "replayed z on demand");
    assert_eq!(revived, 4);

    run_diamond(&engine);

    let (heap_size, l) = engine.reaper_score();
    info!(heap_size, l, recompute_time_ns = engine.recompute_time(), "final reaper state");
}

/// The diamond scenario from §8 scenario 2: `b` feeds both `c` and `d`,
/// which `e` combines. Demonstrates that `b`'s body runs exactly once even
/// though both its dependents are on `e`'s input list.
fn run_diamond(engine: &Rc<Engine>) {
    let a = Zombie::new(engine, 1i64);
    let b = bind1(&a, |n| Trampoline::Return(n * 2));
    let c = bind1(&b, |n| Trampoline::Return(n * 2));
    let d = bind1(&b, |n| Trampoline::Return(n * 2));
    let e = bind2(&c, &d, |x, y| Trampoline::Return(x + y));

    info!(value = e.get_value(), "diamond a -> b -> (c, d) -> e");

    c.evict();
    d.evict();
    b.evict();
    let rebuilt = e.get_value();
    info!(value = rebuilt, "diamond rebuilt after evicting b, c, d");
    assert_eq!(rebuilt, 8);
}
