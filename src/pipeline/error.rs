//! Pipeline-specific error types.

use crate::pipeline::id::{ChannelId, ComponentId};
use crate::pipeline::state::PipelineState;
use crate::types::SampleType;
use thiserror::Error;

/// Errors that can occur within the pipeline system.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Component '{component}' failed to connect: {source}")]
    Connect {
        component: String,
        #[source]
        source: ComponentError,
    },

    #[error("Buffer underrun in '{component}': {source}")]
    BufferUnderrun {
        component: String,
        #[source]
        source: BufferError,
    },

    #[error("Buffer overrun in '{component}': {lost} samples lost")]
    BufferOverrun { component: String, lost: u64 },

    #[error("Component '{component}' failed while processing: {message}")]
    Processing { component: String, message: String },

    #[error("Shutdown timed out, abandoned: {}", components.join(", "))]
    ShutdownTimeout { components: Vec<String> },

    #[error("Cannot {operation} while pipeline is {state}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },

    #[error("Unknown component {0}")]
    UnknownComponent(ComponentId),

    #[error("Unknown event channel {0}")]
    UnknownChannel(ChannelId),

    #[error("Option error on '{component}': {source}")]
    Option {
        component: String,
        #[source]
        source: OptionError,
    },

    #[error("Failed to spawn worker for '{component}': {source}")]
    Spawn {
        component: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Errors raised by a stream buffer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("Timed out waiting for {requested} samples ({available} available)")]
    Underrun { requested: usize, available: usize },

    #[error("Window starting at sample {start} was overwritten (oldest retained is {oldest})")]
    Expired { start: u64, oldest: u64 },

    #[error("Writer closed with only {available} of the requested samples available")]
    Exhausted { available: usize },

    #[error("Buffer is closed for writing")]
    Closed,

    #[error("Request of {requested} samples exceeds buffer capacity {capacity}")]
    TooLarge { requested: usize, capacity: usize },

    #[error("Unknown reader {0}")]
    UnknownReader(usize),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Errors describing a stream that does not match its descriptor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Sample type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: SampleType,
        actual: SampleType,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Stream holds {actual} elements, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Range {offset}..{} out of bounds ({available} available)", offset + len)]
    OutOfRange {
        offset: usize,
        len: usize,
        available: usize,
    },

    #[error("{len} bytes is not a whole number of {width}-byte elements")]
    Truncated { len: usize, width: usize },
}

/// Errors returned by component hooks.
#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("{0}")]
    Failed(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Option(#[from] OptionError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ComponentError {
    pub fn failed(message: impl Into<String>) -> Self {
        ComponentError::Failed(message.into())
    }
}

/// Errors raised while reading or writing component options.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptionError {
    #[error("Unknown option '{0}'")]
    UnknownOption(String),

    #[error("Option '{name}' expects {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Cannot parse '{value}' for option '{name}': {reason}")]
    Parse {
        name: String,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_timeout_lists_components() {
        let err = PipelineError::ShutdownTimeout {
            components: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "Shutdown timed out, abandoned: a, b");
    }

    #[test]
    fn test_connect_error_keeps_source() {
        use std::error::Error as _;
        let err = PipelineError::Connect {
            component: "accel".into(),
            source: ComponentError::NotFound("/dev/accel0".into()),
        };
        assert!(err.to_string().contains("accel"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_out_of_range_message() {
        let err = StreamError::OutOfRange {
            offset: 2,
            len: 3,
            available: 4,
        };
        assert_eq!(err.to_string(), "Range 2..5 out of bounds (4 available)");
    }
}
