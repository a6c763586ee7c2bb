// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed correlator configuration.
//!
//! ```toml
//! pool_size = 140
//! max_payload_len = 4096
//! aging_timeout_ms = 3000
//! sweep_interval_ms = 3000
//! metadata_version = 2
//! chip_type = "hkv2"
//! platform_type = "arm"
//! unassoc_policy = "reject"
//! dispatch_mode = "worker"
//! ```

use super::flat_config::FlatConfig;
use crate::core::capture::record::VENDOR_QCA;
use crate::core::capture::types::{MetadataVersion, PlatformType, RadioType};
use crate::core::error::{CfrError, CfrResult};
use crate::core::registry::UnassocPolicy;
use crate::core::stream::dispatcher::DispatchMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Slots in the correlation pool; the firmware never has more PPDUs than
/// this in flight.
pub const DEFAULT_POOL_SIZE: usize = 140;
pub const DEFAULT_MAX_PAYLOAD_LEN: u32 = 4096;
pub const DEFAULT_AGING_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 3000;
/// Clients the firmware can capture from at once
pub const DEFAULT_MAX_CLIENTS: usize = 10;
pub const DEFAULT_DISPATCH_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    pub pool_size: usize,
    /// Largest payload a DBR completion may declare (the DBR buffer size)
    pub max_payload_len: u32,
    pub aging_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    pub metadata_version: MetadataVersion,
    pub data_version: u8,
    pub chip_type: RadioType,
    pub platform_type: PlatformType,
    pub vendor_id: u32,
    pub unassoc_pool_size: usize,
    pub unassoc_policy: UnassocPolicy,
    pub max_sta_count: usize,
    pub dispatch_mode: DispatchMode,
    pub dispatch_queue_depth: usize,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            aging_timeout_ms: DEFAULT_AGING_TIMEOUT_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
            metadata_version: MetadataVersion::V2,
            data_version: 1,
            chip_type: RadioType::None,
            platform_type: PlatformType::None,
            vendor_id: VENDOR_QCA,
            unassoc_pool_size: DEFAULT_MAX_CLIENTS,
            unassoc_policy: UnassocPolicy::Reject,
            max_sta_count: DEFAULT_MAX_CLIENTS,
            dispatch_mode: DispatchMode::Worker,
            dispatch_queue_depth: DEFAULT_DISPATCH_QUEUE_DEPTH,
        }
    }
}

fn parse_value<T>(key: &str, value: &str) -> CfrResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| {
        CfrError::configuration_with_key(format!("Invalid value '{}': {}", value, e), key)
    })
}

/// Parse a serde unit-variant enum from its configuration spelling.
fn parse_variant<T: for<'de> Deserialize<'de>>(key: &str, value: &str) -> CfrResult<T> {
    serde_yaml::from_str(value).map_err(|e| {
        CfrError::configuration_with_key(format!("Invalid value '{}': {}", value, e), key)
    })
}

impl CorrelatorConfig {
    #[inline]
    pub fn aging_timeout(&self) -> Duration {
        Duration::from_millis(self.aging_timeout_ms)
    }

    #[inline]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn validate(&self) -> CfrResult<()> {
        if self.pool_size == 0 {
            return Err(CfrError::configuration_with_key("must be > 0", "pool_size"));
        }
        if self.max_payload_len == 0 {
            return Err(CfrError::configuration_with_key(
                "must be > 0",
                "max_payload_len",
            ));
        }
        if self.aging_timeout_ms == 0 {
            return Err(CfrError::configuration_with_key(
                "must be > 0",
                "aging_timeout_ms",
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(CfrError::configuration_with_key(
                "must be > 0",
                "sweep_interval_ms",
            ));
        }
        if self.unassoc_pool_size == 0 {
            return Err(CfrError::configuration_with_key(
                "must be > 0",
                "unassoc_pool_size",
            ));
        }
        if self.dispatch_queue_depth == 0 {
            return Err(CfrError::configuration_with_key(
                "must be > 0",
                "dispatch_queue_depth",
            ));
        }
        Ok(())
    }

    pub fn from_yaml_str(text: &str) -> CfrResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> CfrResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with every property in `layers` applied, validated.
    pub fn from_layers(layers: &FlatConfig) -> CfrResult<Self> {
        let mut config = Self::default();
        config.apply_overrides(layers)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.yaml`/`.yml` or `.toml` file.
    pub fn from_file(path: &Path) -> CfrResult<Self> {
        Self::from_layers(&FlatConfig::from_file(path)?)
    }

    /// Per-user configuration file, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cfr-correlator").join("config.toml"))
    }

    /// Apply every key present in `overrides` on top of this configuration.
    pub fn apply_overrides(&mut self, overrides: &FlatConfig) -> CfrResult<()> {
        for key in overrides.keys() {
            let (value, source) = match overrides.get_with_source(key) {
                Some((v, source)) => (v.as_str(), source),
                None => continue,
            };
            log::debug!("{} = {} ({})", key, value, source.description());
            match key.as_str() {
                "pool_size" => self.pool_size = parse_value(key, value)?,
                "max_payload_len" => self.max_payload_len = parse_value(key, value)?,
                "aging_timeout_ms" => self.aging_timeout_ms = parse_value(key, value)?,
                "sweep_interval_ms" => self.sweep_interval_ms = parse_value(key, value)?,
                "metadata_version" => {
                    self.metadata_version = MetadataVersion::try_from(parse_value::<u8>(key, value)?)
                        .map_err(|e| CfrError::configuration_with_key(e, key.as_str()))?
                }
                "data_version" => self.data_version = parse_value(key, value)?,
                "chip_type" => self.chip_type = parse_variant(key, value)?,
                "platform_type" => self.platform_type = parse_variant(key, value)?,
                "vendor_id" => self.vendor_id = parse_value(key, value)?,
                "unassoc_pool_size" => self.unassoc_pool_size = parse_value(key, value)?,
                "unassoc_policy" => self.unassoc_policy = parse_variant(key, value)?,
                "max_sta_count" => self.max_sta_count = parse_value(key, value)?,
                "dispatch_mode" => self.dispatch_mode = parse_variant(key, value)?,
                "dispatch_queue_depth" => self.dispatch_queue_depth = parse_value(key, value)?,
                unknown => log::warn!(
                    "Ignoring unknown correlator property '{}' from {}",
                    unknown,
                    source.description()
                ),
            }
        }
        Ok(())
    }

    /// Resolve the effective configuration from its layers: the file
    /// (explicit path, else the default path when it exists), `CFR_*`
    /// environment variables, then `overrides`. Higher layers win per
    /// property; anything unset keeps its default.
    pub fn load(path: Option<&Path>, overrides: &FlatConfig) -> CfrResult<Self> {
        Self::load_with_env(path, std::env::vars(), overrides)
    }

    pub fn load_with_env<I>(path: Option<&Path>, env: I, overrides: &FlatConfig) -> CfrResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        let mut layers = overrides.clone();
        layers.merge(&FlatConfig::from_env_vars(env));
        if let Some(file) = file {
            log::info!("Loading correlator config from {}", file.display());
            layers.merge(&FlatConfig::from_file(&file)?);
        }
        Self::from_layers(&layers)
    }
}
