//! §7/§10.2: the crate's one recoverable error surface. Everything past
//! engine construction follows the programmer-error taxonomy of §7 instead
//! (`assert!`/`panic!`/`unreachable!`).

use thiserror::Error;

/// Failures raised by [`crate::config::ZombieConfig::validate`] and
/// [`crate::engine::Engine::new`]. Once an `Engine` exists these invariants
/// have already been checked once and are never re-validated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("approx_factor numerator/denominator must satisfy num > den > 0, got ({num}, {den})")]
    InvalidApproxFactor { num: u64, den: u64 },
}
