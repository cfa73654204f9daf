//! Configuration module for sigflow-rs
//!
//! This module handles two kinds of configuration:
//! - [`PipelineConfig`] - pipeline-wide timing and sizing, persisted as TOML
//! - [`Options`] - per-component settings declared by each component
//!
//! # Example
//!
//! ```ignore
//! use sigflow_rs::config::PipelineConfig;
//!
//! let mut config = PipelineConfig::load_or_default("sigflow.toml");
//! config.buffer_size_secs = 5.0;
//! config.save("sigflow.toml")?;
//! ```

pub mod options;

pub use options::{OptionDescriptor, OptionKind, OptionValue, Options};

use crate::error::{Result, SigflowError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default buffer length in seconds
pub const DEFAULT_BUFFER_SIZE_SECS: f64 = 2.0;

/// Default multiplier applied to a frame's duration to get its read timeout
pub const DEFAULT_READ_TIMEOUT_FACTOR: f64 = 2.0;

/// Default event queue length per listener
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 256;

/// Pipeline-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seconds of data each buffer retains (overridable per component with `bufferSize`)
    pub buffer_size_secs: f64,

    /// Read timeout is `frame duration * read_timeout_factor` ...
    pub read_timeout_factor: f64,

    /// ... but never less than this
    pub min_read_timeout_ms: u64,

    /// How long a sensor may wait for its device during connect
    pub connect_timeout_ms: u64,

    /// How long a stage may take to finish its inputs at stop
    pub drain_timeout_ms: u64,

    /// How long an aborted worker may take to exit before being abandoned
    pub join_timeout_ms: u64,

    /// Clock granularity of realtime providers
    pub provider_tick_ms: u64,

    /// Queue length of every event listener
    pub event_queue_capacity: usize,

    /// How long a push may block on a full listener queue before dropping the oldest event
    pub event_push_timeout_ms: u64,

    /// Abort the whole run on the first processing error
    pub fatal_processing_errors: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size_secs: DEFAULT_BUFFER_SIZE_SECS,
            read_timeout_factor: DEFAULT_READ_TIMEOUT_FACTOR,
            min_read_timeout_ms: 100,
            connect_timeout_ms: 5000,
            drain_timeout_ms: 2000,
            join_timeout_ms: 1000,
            provider_tick_ms: 10,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            event_push_timeout_ms: 50,
            fatal_processing_errors: false,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SigflowError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content).map_err(|e| e.with_context(format!("{:?}", path)))
    }

    /// Load from a TOML file, falling back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default pipeline config: {}", e);
                Self::default()
            }
        }
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as TOML, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SigflowError::Config(format!("Failed to create directory {:?}: {}", parent, e))
                })?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| {
            SigflowError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Reject values no pipeline can run with
    pub fn validate(&self) -> Result<()> {
        if !(self.buffer_size_secs.is_finite() && self.buffer_size_secs > 0.0) {
            return Err(SigflowError::Config(format!(
                "buffer_size_secs must be positive, got {}",
                self.buffer_size_secs
            )));
        }
        if !(self.read_timeout_factor.is_finite() && self.read_timeout_factor > 0.0) {
            return Err(SigflowError::Config(format!(
                "read_timeout_factor must be positive, got {}",
                self.read_timeout_factor
            )));
        }
        if self.event_queue_capacity == 0 {
            return Err(SigflowError::Config(
                "event_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.provider_tick_ms == 0 {
            return Err(SigflowError::Config(
                "provider_tick_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Underrun timeout for a frame of `frame_secs`
    pub fn read_timeout(&self, frame_secs: f64) -> Duration {
        let scaled = Duration::from_secs_f64((frame_secs * self.read_timeout_factor).max(0.0));
        scaled.max(Duration::from_millis(self.min_read_timeout_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn provider_tick(&self) -> Duration {
        Duration::from_millis(self.provider_tick_ms)
    }

    pub fn event_push_timeout(&self) -> Duration {
        Duration::from_millis(self.event_push_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_size_secs, 2.0);
        assert!(!config.fatal_processing_errors);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PipelineConfig::from_toml_str("buffer_size_secs = 5.0\n").unwrap();
        assert_eq!(config.buffer_size_secs, 5.0);
        assert_eq!(config.join_timeout_ms, 1000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(PipelineConfig::from_toml_str("buffer_size_secs = 0.0\n").is_err());
        assert!(PipelineConfig::from_toml_str("event_queue_capacity = 0\n").is_err());
        assert!(PipelineConfig::from_toml_str("buffer_size_secs = \"big\"\n").is_err());
    }

    #[test]
    fn test_read_timeout_floor() {
        let config = PipelineConfig::default();
        assert_eq!(config.read_timeout(0.01), Duration::from_millis(100));
        assert_eq!(config.read_timeout(1.0), Duration::from_secs(2));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sigflow.toml");
        let config = PipelineConfig {
            drain_timeout_ms: 750,
            fatal_processing_errors: true,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::load_or_default(dir.path().join("absent.toml"));
        assert_eq!(config, PipelineConfig::default());
    }
}
