//! Error handling for sigflow-rs
//!
//! This module defines the crate-level error type used by configuration,
//! persistence and the binary. Pipeline internals use the narrower types in
//! [`crate::pipeline::error`], which convert into [`SigflowError`].

use crate::pipeline::error::PipelineError;
use thiserror::Error;

/// Main error type for sigflow-rs operations
#[derive(Error, Debug)]
pub enum SigflowError {
    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed persisted stream
    #[error("Format error: {0}")]
    Format(String),

    /// Errors raised by the pipeline
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SigflowError>,
    },
}

impl SigflowError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        SigflowError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for SigflowError {
    fn from(err: serde_json::Error) -> Self {
        SigflowError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SigflowError {
    fn from(err: toml::de::Error) -> Self {
        SigflowError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SigflowError {
    fn from(err: toml::ser::Error) -> Self {
        SigflowError::Serialization(err.to_string())
    }
}

/// Result type alias for sigflow-rs operations
pub type Result<T> = std::result::Result<T, SigflowError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<SigflowError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SigflowError::Format("bad magic".to_string());
        assert_eq!(err.to_string(), "Format error: bad magic");
    }

    #[test]
    fn test_error_with_context() {
        let err = SigflowError::Config("test".to_string());
        let with_ctx = err.with_context("Failed to load");
        assert!(with_ctx.to_string().contains("Failed to load"));
    }

    #[test]
    fn test_context_on_io_result() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = res.context("Opening recording").unwrap_err();
        assert!(err.to_string().starts_with("Opening recording"));
        assert!(matches!(err, SigflowError::WithContext { .. }));
    }

    #[test]
    fn test_pipeline_error_converts() {
        let err: SigflowError = PipelineError::Configuration("cycle".into()).into();
        assert!(err.to_string().contains("cycle"));
    }
}
