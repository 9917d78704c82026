//! §10.2: the process-wide configuration threaded through `Engine::new`.

use crate::akasha::AkashaBackend;
use crate::error::ConfigError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// §4.3's two cost metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CostMetric {
    #[default]
    Local,
    Uf,
}

/// §4.4/§4.5's two eviction backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EvictionBackend {
    #[default]
    GreedyDual,
    Kinetic,
}

/// §10.2: the full set of process-wide knobs. Constructed once per `Engine`
/// and never mutated afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZombieConfig {
    pub metric: CostMetric,
    pub approx_factor: (u64, u64),
    /// Reserved: selects a CPS/trampoline replay variant in the original
    /// design (§4.2). This crate builds only the ANF `replay_context` path
    /// (see `engine.rs`); the field is validated and stored but never read
    /// past construction. Kept on the struct so a future CPS driver can be
    /// added without an API break. See `DESIGN.md`.
    pub use_cps: bool,
    pub akasha_backend: AkashaBackend,
    pub use_train: bool,
    pub eviction_backend: EvictionBackend,
}

impl Default for ZombieConfig {
    fn default() -> Self {
        ZombieConfig {
            metric: CostMetric::Local,
            approx_factor: (2, 1),
            use_cps: false,
            akasha_backend: AkashaBackend::Tree,
            use_train: false,
            eviction_backend: EvictionBackend::GreedyDual,
        }
    }
}

impl ZombieConfig {
    /// The single recoverable validation point (§10.2): `approx_factor` must
    /// be a rational strictly greater than one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (num, den) = self.approx_factor;
        if den == 0 || num <= den {
            return Err(ConfigError::InvalidApproxFactor { num, den });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ZombieConfig::default().validate().is_ok());
    }

    #[test]
    fn approx_factor_must_exceed_one() {
        let mut config = ZombieConfig::default();
        config.approx_factor = (1, 1);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidApproxFactor { num: 1, den: 1 })
        );

        config.approx_factor = (3, 0);
        assert!(config.validate().is_err());
    }
}
