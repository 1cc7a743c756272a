//! Map configuration
//!
//! Defaults suit x86-64 scanline-sized routines. Every field can be overridden
//! through `SPECMAP_*` environment variables or, with the `toml-config`
//! feature, a TOML file.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use specmap_utils::TICK_FREQUENCY;
use thiserror::Error;

use crate::runtime::jit::code_buffer::DEFAULT_BLOCK_SIZE;
use crate::runtime::jit::specialization::DEFAULT_ROUTINE_CAPACITY;

pub const ROUTINE_CAPACITY_VAR: &str = "SPECMAP_ROUTINE_CAPACITY";
pub const ARENA_BLOCK_SIZE_VAR: &str = "SPECMAP_ARENA_BLOCK_SIZE";
pub const TICK_FREQUENCY_VAR: &str = "SPECMAP_TICK_FREQUENCY";
pub const PERF_MAP_VAR: &str = "SPECMAP_PERF_MAP";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid value")]
    InvalidValue { var: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("arena_block_size ({block_size}) is smaller than routine_capacity ({routine_capacity})")]
    BlockTooSmall {
        block_size: usize,
        routine_capacity: usize,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[cfg(feature = "toml-config")]
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[cfg(not(feature = "toml-config"))]
    #[error("TOML support not enabled. Enable the 'toml-config' feature.")]
    TomlDisabled,
}

/// Sizing and instrumentation of a code-generating map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Code budget of a single routine; generated code must stay below it.
    pub routine_capacity: usize,

    /// Size of each executable mapping routines are carved from.
    pub arena_block_size: usize,

    /// Ticks per second of the clock feeding `record_usage`.
    pub tick_frequency: u64,

    /// Publish generated routines in `/tmp/perf-<pid>.map`.
    pub perf_map: bool,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            routine_capacity: DEFAULT_ROUTINE_CAPACITY,
            arena_block_size: DEFAULT_BLOCK_SIZE,
            tick_frequency: TICK_FREQUENCY,
            perf_map: false,
        }
    }
}

impl MapConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a configuration from defaults overridden by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = parse_var(&lookup, ROUTINE_CAPACITY_VAR)? {
            config.routine_capacity = value;
        }
        if let Some(value) = parse_var(&lookup, ARENA_BLOCK_SIZE_VAR)? {
            config.arena_block_size = value;
        }
        if let Some(value) = parse_var(&lookup, TICK_FREQUENCY_VAR)? {
            config.tick_frequency = value;
        }
        if let Some(value) = lookup(PERF_MAP_VAR) {
            config.perf_map = parse_flag(PERF_MAP_VAR, &value)?;
        }

        config.validate()
    }

    /// Load configuration from TOML text
    #[cfg(feature = "toml-config")]
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()
    }

    /// Load configuration from TOML text (stub when toml feature is disabled)
    #[cfg(not(feature = "toml-config"))]
    pub fn from_toml_str(_contents: &str) -> Result<Self, ConfigError> {
        Err(ConfigError::TomlDisabled)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.routine_capacity == 0 {
            return Err(ConfigError::Zero {
                field: "routine_capacity",
            });
        }
        if self.arena_block_size == 0 {
            return Err(ConfigError::Zero {
                field: "arena_block_size",
            });
        }
        if self.arena_block_size < self.routine_capacity {
            return Err(ConfigError::BlockTooSmall {
                block_size: self.arena_block_size,
                routine_capacity: self.routine_capacity,
            });
        }
        if self.tick_frequency == 0 {
            return Err(ConfigError::Zero {
                field: "tick_frequency",
            });
        }
        Ok(self)
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { var, value })
        })
        .transpose()
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}
