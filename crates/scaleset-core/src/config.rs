//! scaleset.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScaleSetConfig {
    pub scaling: ScalingConfig,
    pub reconciler: ReconcilerConfig,
    pub provider: ProviderConfig,
}

/// Capacity thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    /// Sessions a single instance can hold.
    pub max_load_per_instance: u32,
    /// Free session slots to keep available across the pool.
    pub min_free_capacity: u32,
    /// Floor for the target instance count.
    pub min_active_instances: u32,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            max_load_per_instance: 5,
            min_free_capacity: 2,
            min_active_instances: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Timer-driven reconciliation period.
    pub interval_secs: u64,
    /// Upper bound on a single provider grow/shrink/list call.
    pub provider_timeout_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            provider_timeout_secs: 300,
        }
    }
}

impl ReconcilerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Settings for the simulated inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub fault_domains: u32,
    pub update_domains: u32,
    /// Instances present at startup. Defaults to `min_active_instances`.
    pub initial_instances: Option<u32>,
    /// Delay applied to every grow request.
    pub provisioning_delay_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            fault_domains: 3,
            update_domains: 5,
            initial_instances: None,
            provisioning_delay_ms: 0,
        }
    }
}

impl ProviderConfig {
    pub fn provisioning_delay(&self) -> Duration {
        Duration::from_millis(self.provisioning_delay_ms)
    }
}

impl ScaleSetConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScaleSetConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings the reconciler cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.scaling.max_load_per_instance == 0 {
            anyhow::bail!("scaling.max_load_per_instance must be at least 1");
        }
        if self.reconciler.interval_secs == 0 {
            anyhow::bail!("reconciler.interval_secs must be at least 1");
        }
        if self.provider.fault_domains == 0 || self.provider.update_domains == 0 {
            anyhow::bail!("provider.fault_domains and provider.update_domains must be at least 1");
        }
        Ok(())
    }

    /// Number of instances the simulated inventory starts with.
    pub fn initial_instances(&self) -> u32 {
        self.provider
            .initial_instances
            .unwrap_or(self.scaling.min_active_instances)
    }
}
