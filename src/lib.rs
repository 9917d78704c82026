//! A recomputation-based memory manager for pure computations (§1).
//!
//! Materialised values live behind [`Zombie<T>`] handles; when memory
//! pressure calls for it, [`Zombie::evict`] (or the `book`'s own reaper,
//! driven by [`Engine::murder`]) drops a value's payload and keeps only the
//! lineage needed to recompute it on next access. Everything hangs off an
//! explicit [`Engine`] instance — there is no global, process-wide state.
//!
//! ```
//! use zombie::{bind1, Engine, Trampoline, Zombie, ZombieConfig};
//!
//! let engine = Engine::new(ZombieConfig::default()).unwrap();
//! let x = Zombie::new(&engine, 21i64);
//! let y = bind1(&x, |n| Trampoline::Return(n * 2));
//! assert_eq!(y.get_value(), 42);
//!
//! y.evict();
//! assert_eq!(y.get_value(), 42); // transparently replayed
//! ```

pub mod akasha;
pub mod cell;
pub mod clock;
pub mod config;
pub mod context;
pub mod cost;
pub mod engine;
pub mod error;
pub mod eviction;
pub mod meter;
pub mod size;
pub mod tock;
pub mod trampoline;

pub use akasha::AkashaBackend;
pub use cell::{bind1, bind2, bind3, bind4, bind_zombie_untyped, tail_call, EZombie, Zombie};
pub use clock::{SystemClock, TestClock, ZombieClock};
pub use config::{CostMetric, EvictionBackend, ZombieConfig};
pub use engine::{DynResult, Engine};
pub use error::ConfigError;
pub use size::ZombieSize;
pub use tock::{Tock, TockRange};
pub use trampoline::Trampoline;
