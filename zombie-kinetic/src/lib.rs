//! The kinetic priority queue (§4.5): a scheduling structure whose keys are
//! affine functions of a virtual time, so priorities age without needing a
//! re-push on every tick. Kept as its own crate because it has no
//! dependency on the rest of the engine's lineage machinery — only on
//! [`AffFunction`] arithmetic and a plain binary heap.
//!
//! ```
//! use zombie_kinetic::{AffFunction, KineticMinHeap};
//!
//! let mut heap = KineticMinHeap::new();
//! heap.push("slow-decay", AffFunction::new(1, 7));
//! heap.push("fast-decay", AffFunction::new(5, 20));
//! heap.advance_to(5);
//! assert!(heap.peek().is_some());
//! ```

pub mod aff_function;
pub mod kinetic;

pub use aff_function::{bigger_mag, smaller_mag, AffFunction, AffT, Shift, Slope};
pub use kinetic::KineticMinHeap;
