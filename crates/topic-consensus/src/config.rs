//! Policy configuration for consensus and contribution accounting.

use crate::types::TrustTier;
use serde::{Deserialize, Serialize};

/// Consensus policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ConsensusConfig {
    /// Protection tier given to topics that have never been protected
    /// explicitly.
    #[serde(default)]
    pub default_protection: TrustTier,
}

/// Contribution accounting policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ContributionConfig {
    /// Share of the monetized pool split among authorship-claiming versions
    /// by characters added. The remainder is split evenly across all
    /// accepted versions.
    #[serde(default = "default_claimed_share")]
    pub claimed_share: f64,
}

fn default_claimed_share() -> f64 {
    0.9
}

impl Default for ContributionConfig {
    fn default() -> Self {
        Self {
            claimed_share: default_claimed_share(),
        }
    }
}
