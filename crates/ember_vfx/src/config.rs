//! # Registry Configuration
//!
//! Loaded once at startup from TOML:
//!
//! ```toml
//! capacity_max = 10
//! overflow = "destroy_overflow"
//! prewarm = 2
//! max_delta = 0.1
//!
//! [[pool]]
//! template = "fx/muzzle_flash"
//! capacity_max = 32
//! prewarm = 8
//! ```

use std::path::Path;

use ember_core::{FrameClock, OverflowPolicy, PoolConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::template::TemplateId;

/// Tuning for one template's pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOverride {
    /// Template asset path.
    pub template: String,
    /// Capacity for this pool.
    pub capacity_max: Option<usize>,
    /// Overflow policy for this pool.
    pub overflow: Option<OverflowPolicy>,
    /// Instances built when the pool is created.
    pub prewarm: Option<usize>,
}

/// Effect registry configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Default pool capacity.
    pub capacity_max: usize,
    /// Default overflow policy.
    pub overflow: OverflowPolicy,
    /// Default instances built when a pool is created.
    pub prewarm: usize,
    /// Per-tick clamp on Δt in seconds.
    pub max_delta: f32,
    /// Timer passes per tick before remaining re-armed timers wait a tick.
    pub max_timer_passes: u32,
    /// Event channel capacity.
    pub event_capacity: usize,
    /// Per-template overrides.
    #[serde(rename = "pool")]
    pub pools: Vec<PoolOverride>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity_max: PoolConfig::DEFAULT_CAPACITY,
            overflow: OverflowPolicy::DestroyOverflow,
            prewarm: 0,
            max_delta: FrameClock::DEFAULT_MAX_DELTA,
            max_timer_passes: 8,
            event_capacity: 1024,
            pools: Vec::new(),
        }
    }
}

impl RegistryConfig {
    /// Parses and validates a TOML config.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a value is out of range.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_delta.is_nan() || self.max_delta <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_delta must be positive, got {}",
                self.max_delta
            )));
        }
        if self.max_timer_passes == 0 {
            return Err(ConfigError::Invalid("max_timer_passes must be at least 1".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Sets the default capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity_max: usize) -> Self {
        self.capacity_max = capacity_max;
        self
    }

    /// Sets the default overflow policy.
    #[must_use]
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Sets the default prewarm count.
    #[must_use]
    pub fn with_prewarm(mut self, prewarm: usize) -> Self {
        self.prewarm = prewarm;
        self
    }

    /// Sets the per-tick Δt clamp.
    #[must_use]
    pub fn with_max_delta(mut self, max_delta: f32) -> Self {
        self.max_delta = max_delta;
        self
    }

    /// Adds a per-template override.
    #[must_use]
    pub fn with_pool(mut self, pool: PoolOverride) -> Self {
        self.pools.push(pool);
        self
    }

    /// Pool config and prewarm count for a template.
    #[must_use]
    pub fn pool_for(&self, template: TemplateId) -> (PoolConfig, usize) {
        let mut config = PoolConfig {
            capacity_max: self.capacity_max,
            overflow: self.overflow,
        };
        let mut prewarm = self.prewarm;

        if let Some(custom) = self
            .pools
            .iter()
            .find(|p| TemplateId::from_path(&p.template) == template)
        {
            config.capacity_max = custom.capacity_max.unwrap_or(config.capacity_max);
            config.overflow = custom.overflow.unwrap_or(config.overflow);
            prewarm = custom.prewarm.unwrap_or(prewarm);
        }
        (config, prewarm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::from_toml_str("").unwrap();
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.capacity_max, 10);
    }

    #[test]
    fn test_overrides() {
        let config = RegistryConfig::from_toml_str(
            r#"
            capacity_max = 4
            prewarm = 1

            [[pool]]
            template = "fx/flash"
            capacity_max = 32
            overflow = "keep_and_warn"
            "#,
        )
        .unwrap();

        let (flash, flash_prewarm) = config.pool_for(TemplateId::from_path("fx/flash"));
        assert_eq!(flash.capacity_max, 32);
        assert_eq!(flash.overflow, OverflowPolicy::KeepAndWarn);
        assert_eq!(flash_prewarm, 1);

        let (other, _) = config.pool_for(TemplateId::from_path("fx/other"));
        assert_eq!(other.capacity_max, 4);
        assert_eq!(other.overflow, OverflowPolicy::DestroyOverflow);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            RegistryConfig::from_toml_str("max_delta = 0.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RegistryConfig::from_toml_str("max_timer_passes = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RegistryConfig::from_toml_str("capacity_max = \"ten\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
