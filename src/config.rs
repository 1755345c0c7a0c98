//! Engine configuration.
//!
//! All fields have defaults, so a partial JSON document (or none at all) is a
//! valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum number of nodes, including the output node.
pub const DEFAULT_MAX_NODES: usize = 100;

/// Default maximum number of connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 200;

/// Default number of undo levels kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default number of pooled buffers kept per size class.
pub const DEFAULT_POOL_DEPTH: usize = 8;

/// Default time constant for scheduled parameter ramps.
pub const DEFAULT_SMOOTHING_MS: f32 = 10.0;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Settings for a [`GraphManager`](crate::engine::GraphManager).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Sample rate requested from the backend, in Hz.
    pub sample_rate: u32,
    /// Backend render block size, in frames.
    pub buffer_size: usize,
    /// Maximum node count, output node included.
    pub max_nodes: usize,
    /// Maximum connection count.
    pub max_connections: usize,
    /// Undo levels kept before the oldest are evicted.
    pub history_limit: usize,
    /// Buffers kept per size class in the buffer pool.
    pub buffer_pool_depth: usize,
    /// Time constant of scheduled parameter ramps, in milliseconds.
    pub parameter_smoothing_ms: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 512,
            max_nodes: DEFAULT_MAX_NODES,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            buffer_pool_depth: DEFAULT_POOL_DEPTH,
            parameter_smoothing_ms: DEFAULT_SMOOTHING_MS,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Returns a copy with different capacity limits.
    pub fn with_limits(mut self, max_nodes: usize, max_connections: usize) -> Self {
        self.max_nodes = max_nodes;
        self.max_connections = max_connections;
        self
    }

    /// Smoothing time constant in seconds.
    pub fn smoothing_seconds(&self) -> f64 {
        f64::from(self.parameter_smoothing_ms) / 1000.0
    }

    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(ConfigError::Invalid {
                field: "sampleRate",
                reason: format!("{} Hz is outside 8000-192000", self.sample_rate),
            });
        }
        if self.buffer_size == 0 || !self.buffer_size.is_power_of_two() {
            return Err(ConfigError::Invalid {
                field: "bufferSize",
                reason: format!("{} is not a power of two", self.buffer_size),
            });
        }
        // The output node always occupies one slot.
        if self.max_nodes == 0 {
            return Err(ConfigError::Invalid {
                field: "maxNodes",
                reason: "must leave room for the output node".to_string(),
            });
        }
        if !self.parameter_smoothing_ms.is_finite() || self.parameter_smoothing_ms < 0.0 {
            return Err(ConfigError::Invalid {
                field: "parameterSmoothingMs",
                reason: format!("{} is not a non-negative time", self.parameter_smoothing_ms),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_nodes, 100);
        assert_eq!(config.max_connections, 200);
        assert_eq!(config.history_limit, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "maxNodes": 2, "sampleRate": 48000 }"#)
            .unwrap();
        assert_eq!(config.max_nodes, 2);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.buffer_size, 512);
    }

    #[test]
    fn test_rejects_odd_buffer_size() {
        let err = EngineConfig::from_json_str(r#"{ "bufferSize": 300 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "bufferSize", .. }));
    }

    #[test]
    fn test_rejects_zero_nodes() {
        let config = EngineConfig::default().with_limits(0, 10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "historyLimit": 5 }}"#).unwrap();
        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.history_limit, 5);
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_json_file(Path::new("/nonexistent/engine.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_smoothing_seconds() {
        let config = EngineConfig::default();
        approx::assert_relative_eq!(config.smoothing_seconds(), 0.01, epsilon = 1e-9);
    }
}
