//! Serializable run configuration.
//!
//! Every section has defaults, so an empty file (or no file at all) runs the
//! built-in universe against `data/market_breadth.csv`:
//!
//! ```toml
//! [universe]
//! identifiers = ["2330.TW", "2317.TW"]
//! # or: file = "universe.toml"
//!
//! [engine]
//! lookback = 10
//! flat_epsilon = 0.0
//! parallel = false
//!
//! [store]
//! path = "data/market_breadth.csv"
//!
//! [detector]
//! window = 5
//! sigma = 2.0
//! policy = "exclusive"
//!
//! [cache]
//! enabled = true
//! dir = ".breadthlab/cache"
//! ttl_secs = 600
//! ```

use breadthlab_core::data::{Universe, UniverseError};
use breadthlab_core::{DetectorConfig, EngineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Rerun window of the memoization cache.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("universe: {0}")]
    Universe(#[from] UniverseError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub universe: UniverseConfig,
    pub engine: EngineConfig,
    pub store: StoreConfig,
    pub detector: DetectorConfig,
    pub cache: CacheConfig,
}

/// Instruments to evaluate: an inline list, a sector-organized universe file,
/// or (when both are absent) the built-in universe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/market_breadth.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".breadthlab/cache"),
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate. A lookback shorter than seven days is rejected
    /// while parsing.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.universe.identifiers.iter().any(|id| id.trim().is_empty()) {
            return Err(ConfigError::Invalid("universe contains a blank identifier".into()));
        }
        if self.detector.window == 0 {
            return Err(ConfigError::Invalid("detector.window must be at least 1".into()));
        }
        if !self.detector.sigma.is_finite() || self.detector.sigma <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "detector.sigma must be positive, got {}",
                self.detector.sigma
            )));
        }
        if !self.engine.flat_epsilon.is_finite() || self.engine.flat_epsilon < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "engine.flat_epsilon must be non-negative, got {}",
                self.engine.flat_epsilon
            )));
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("store.path is empty".into()));
        }
        Ok(())
    }

    /// The flattened identifier list for this run.
    ///
    /// Inline identifiers win over a universe file. An empty result is an
    /// error so a run never silently evaluates nothing.
    pub fn identifiers(&self) -> Result<Vec<String>, ConfigError> {
        let ids = if !self.universe.identifiers.is_empty() {
            let mut seen = std::collections::HashSet::new();
            self.universe
                .identifiers
                .iter()
                .map(|id| id.trim().to_string())
                .filter(|id| seen.insert(id.clone()))
                .collect()
        } else if let Some(file) = &self.universe.file {
            Universe::from_file(file)?.identifiers()
        } else {
            Universe::default_twse().identifiers()
        };

        if ids.is_empty() {
            return Err(ConfigError::Invalid("universe is empty".into()));
        }
        Ok(ids)
    }
}
