use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use toml::Value;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("plugin requires VRR command")]
    MissingVrrCommand,
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),
    #[error("DRAM model does not define the `{0}` request")]
    MissingRequest(&'static str),
    #[error("DRAM model does not define the `{0}` level")]
    MissingLevel(&'static str),
    #[error("invalid value for `{option}`: {reason}")]
    InvalidValue {
        option: &'static str,
        reason: String,
    },
    #[error("cannot deserialize config section: {0}")]
    BadSection(#[from] toml::de::Error),
}

fn invalid(option: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        option,
        reason: reason.into(),
    }
}

fn require(value: Option<u32>, option: &'static str) -> Result<u32, ConfigError> {
    value.ok_or(ConfigError::MissingParameter(option))
}

/// Plugin configs are read out of an optional TOML section of the enclosing
/// simulator config. A missing section falls back to defaults; a malformed
/// one is a setup error. Required parameters have no default and surface a
/// `MissingParameter` error once the owning plugin resolves them.
pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Result<Self, ConfigError> {
        match section {
            Some(value) => Ok(value.clone().try_into()?),
            None => {
                warn!("config section not found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainPolicy {
    /// Flush every pending dirty-buffer entry on each precharge, plus any
    /// still-resident dirty line on the same rows.
    Immediate,
    /// Flush only once the pending count reaches `drain_threshold`.
    Threshold,
}

fn default_col_size() -> u32 {
    64
}

fn default_write_back_en() -> bool {
    true
}

fn default_drain_policy() -> DrainPolicy {
    DrainPolicy::Immediate
}

fn default_drain_threshold() -> u32 {
    64
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MithrilConfig {
    pub num_table_entries: Option<u32>,
    pub adaptive_threshold: Option<u32>,
    pub rfm_threshold: Option<u32>,
    #[serde(default)]
    pub debug: bool,
}

impl Config for MithrilConfig {}

impl MithrilConfig {
    pub fn num_table_entries(&self) -> Result<u32, ConfigError> {
        let entries = require(self.num_table_entries, "num_table_entries")?;
        if entries == 0 {
            return Err(invalid("num_table_entries", "must be at least 1"));
        }
        Ok(entries)
    }

    pub fn adaptive_threshold(&self) -> Result<u32, ConfigError> {
        require(self.adaptive_threshold, "adaptive_threshold")
    }

    pub fn rfm_threshold(&self) -> Result<u32, ConfigError> {
        let threshold = require(self.rfm_threshold, "rfm_threshold")?;
        if threshold == 0 {
            return Err(invalid("rfm_threshold", "must be at least 1"));
        }
        Ok(threshold)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.num_table_entries()?;
        self.adaptive_threshold()?;
        self.rfm_threshold()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MsCacheConfig {
    pub num_cache_entries: Option<u32>,
    pub associativity: Option<u32>,
    #[serde(default = "default_col_size")]
    pub col_size: u32,
    #[serde(default = "default_write_back_en")]
    pub write_back_en: bool,
    #[serde(default = "default_drain_policy")]
    pub drain_policy: DrainPolicy,
    #[serde(default = "default_drain_threshold")]
    pub drain_threshold: u32,
    #[serde(default)]
    pub white_list_size: u32,
    #[serde(default)]
    pub debug: bool,
}

impl Config for MsCacheConfig {}

impl Default for MsCacheConfig {
    fn default() -> Self {
        Self {
            num_cache_entries: None,
            associativity: None,
            col_size: default_col_size(),
            write_back_en: default_write_back_en(),
            drain_policy: default_drain_policy(),
            drain_threshold: default_drain_threshold(),
            white_list_size: 0,
            debug: false,
        }
    }
}

impl MsCacheConfig {
    pub fn associativity(&self) -> Result<u32, ConfigError> {
        let ways = require(self.associativity, "associativity")?;
        if ways == 0 {
            return Err(invalid("associativity", "must be at least 1"));
        }
        Ok(ways)
    }

    pub fn num_sets(&self) -> Result<u32, ConfigError> {
        let entries = require(self.num_cache_entries, "num_cache_entries")?;
        let ways = self.associativity()?;
        if entries == 0 || entries % ways != 0 {
            return Err(invalid(
                "num_cache_entries",
                "must be a positive multiple of `associativity`",
            ));
        }
        let num_sets = entries / ways;
        if !num_sets.is_power_of_two() {
            return Err(invalid(
                "num_cache_entries",
                format!("derived set count {} is not a power of two", num_sets),
            ));
        }
        Ok(num_sets)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.num_sets()?;
        if !self.col_size.is_power_of_two() {
            return Err(invalid("col_size", "must be a power of two"));
        }
        if self.drain_policy == DrainPolicy::Threshold && self.drain_threshold == 0 {
            return Err(invalid("drain_threshold", "must be at least 1"));
        }
        Ok(())
    }
}

/// Flat option set of the combined plugin: tracker and cache knobs live in
/// one config section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MithrilCacheConfig {
    pub num_table_entries: Option<u32>,
    pub adaptive_threshold: Option<u32>,
    pub rfm_threshold: Option<u32>,
    pub num_cache_entries: Option<u32>,
    pub associativity: Option<u32>,
    #[serde(default = "default_col_size")]
    pub col_size: u32,
    #[serde(default = "default_write_back_en")]
    pub write_back_en: bool,
    #[serde(default = "default_drain_policy")]
    pub drain_policy: DrainPolicy,
    #[serde(default = "default_drain_threshold")]
    pub drain_threshold: u32,
    #[serde(default)]
    pub white_list_size: u32,
    #[serde(default)]
    pub debug: bool,
}

impl Config for MithrilCacheConfig {}

impl Default for MithrilCacheConfig {
    fn default() -> Self {
        Self {
            num_table_entries: None,
            adaptive_threshold: None,
            rfm_threshold: None,
            num_cache_entries: None,
            associativity: None,
            col_size: default_col_size(),
            write_back_en: default_write_back_en(),
            drain_policy: default_drain_policy(),
            drain_threshold: default_drain_threshold(),
            white_list_size: 0,
            debug: false,
        }
    }
}

impl MithrilCacheConfig {
    pub fn tracker(&self) -> MithrilConfig {
        MithrilConfig {
            num_table_entries: self.num_table_entries,
            adaptive_threshold: self.adaptive_threshold,
            rfm_threshold: self.rfm_threshold,
            debug: self.debug,
        }
    }

    pub fn cache(&self) -> MsCacheConfig {
        MsCacheConfig {
            num_cache_entries: self.num_cache_entries,
            associativity: self.associativity,
            col_size: self.col_size,
            write_back_en: self.write_back_en,
            drain_policy: self.drain_policy,
            drain_threshold: self.drain_threshold,
            white_list_size: self.white_list_size,
            debug: self.debug,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tracker().validate()?;
        self.cache().validate()
    }
}
