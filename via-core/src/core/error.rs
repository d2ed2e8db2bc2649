//! Unified error handling for the VIA pipeline
//!
//! This module provides a centralized error type that encompasses all possible
//! errors that can occur while driving a job through the analysis pipeline.
//! The transient/permanent split encoded here is what the orchestrator's retry
//! policy keys on.

use std::fmt;
use std::time::Duration;

use crate::core::StageKind;

/// Main error type for the VIA pipeline
#[derive(Debug)]
pub enum PipelineError {
    /// Configuration-related errors
    Config {
        /// Error message
        message: String,
    },

    /// Source acquisition errors (upload validation, remote download)
    Ingestion {
        /// Error message
        message: String,
        /// Whether retrying the operation can reasonably succeed
        transient: bool,
    },

    /// Errors raised by a stage worker (transcriber, detector, summarizer)
    StageExecution {
        /// Stage the error originated from
        stage: StageKind,
        /// Error message
        message: String,
        /// Whether retrying the stage can reasonably succeed
        transient: bool,
    },

    /// Artifact store read/write errors
    Storage {
        /// Error message
        message: String,
    },

    /// Payload encode/decode errors
    Serialization {
        /// Error message
        message: String,
    },

    /// Unknown job or artifact id
    NotFound {
        /// Resource type
        resource: String,
        /// Resource identifier
        id: String,
    },

    /// Invalid state transition or overwrite of an immutable record
    Conflict {
        /// Error message
        message: String,
    },

    /// A stage exceeded its configured deadline
    Timeout {
        /// Operation name
        operation: String,
        /// Deadline that was exceeded
        duration: Duration,
    },

    /// Job was cancelled by explicit request
    Cancelled {
        /// Job identifier
        id: String,
    },

    /// I/O errors from file operations
    Io(std::io::Error),

    /// Serde JSON errors
    SerdeJson(serde_json::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Config { message } => {
                write!(
                    f,
                    "Configuration error: {message}. \
                     Solution: check the pipeline config file or start from PipelineConfig::default()"
                )
            },
            PipelineError::Ingestion { message, transient } => {
                if *transient {
                    write!(f, "Ingestion error (transient): {message}")
                } else {
                    write!(f, "Ingestion error: {message}")
                }
            },
            PipelineError::StageExecution {
                stage,
                message,
                transient,
            } => {
                if *transient {
                    write!(f, "Stage '{stage}' error (transient): {message}")
                } else {
                    write!(f, "Stage '{stage}' error: {message}")
                }
            },
            PipelineError::Storage { message } => {
                write!(f, "Storage error: {message}")
            },
            PipelineError::Serialization { message } => {
                write!(f, "Serialization error: {message}")
            },
            PipelineError::NotFound { resource, id } => {
                write!(f, "{resource} not found: {id}")
            },
            PipelineError::Conflict { message } => {
                write!(f, "Conflict: {message}")
            },
            PipelineError::Timeout {
                operation,
                duration,
            } => {
                write!(f, "Operation '{operation}' timed out after {duration:?}")
            },
            PipelineError::Cancelled { id } => {
                write!(f, "Job cancelled: {id}")
            },
            PipelineError::Io(err) => {
                write!(f, "I/O error: {err}")
            },
            PipelineError::SerdeJson(err) => {
                write!(f, "JSON serialization error: {err}")
            },
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Io(err) => Some(err),
            PipelineError::SerdeJson(err) => Some(err),
            _ => None,
        }
    }
}

// Automatic conversions from common error types
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerdeJson(err)
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        // Timeouts, connection failures and 5xx responses are worth retrying;
        // anything else (4xx, malformed URL, redirect loops) is permanent.
        let transient = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .map(|s| s.is_server_error())
                .unwrap_or(false);
        PipelineError::Ingestion {
            message: format!("download failed: {err}"),
            transient,
        }
    }
}

/// Convenient Result type alias
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Whether the orchestrator may retry the failed operation.
    ///
    /// Transient errors are retried up to the configured attempt limit with
    /// backoff; permanent errors fail the job immediately. Storage and I/O
    /// errors abort the current attempt but count against the retry budget,
    /// so they are classified as transient.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Ingestion { transient, .. }
            | PipelineError::StageExecution { transient, .. } => *transient,
            PipelineError::Storage { .. } | PipelineError::Io(_) => true,
            PipelineError::Timeout { .. } => true,
            PipelineError::Config { .. }
            | PipelineError::Serialization { .. }
            | PipelineError::NotFound { .. }
            | PipelineError::Conflict { .. }
            | PipelineError::Cancelled { .. }
            | PipelineError::SerdeJson(_) => false,
        }
    }

    /// Get error category for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            PipelineError::Config { .. } => "config",
            PipelineError::Ingestion { .. } => "ingestion",
            PipelineError::StageExecution { .. } => "stage_execution",
            PipelineError::Storage { .. } => "storage",
            PipelineError::Serialization { .. } | PipelineError::SerdeJson(_) => "serialization",
            PipelineError::NotFound { .. } => "not_found",
            PipelineError::Conflict { .. } => "conflict",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Cancelled { .. } => "cancelled",
            PipelineError::Io(_) => "io",
        }
    }
}

/// Trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn with_context(self, context: &str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn with_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            let base_error = e.into();
            match base_error {
                PipelineError::Config { message } => PipelineError::Config {
                    message: format!("{context}: {message}"),
                },
                PipelineError::Ingestion { message, transient } => PipelineError::Ingestion {
                    message: format!("{context}: {message}"),
                    transient,
                },
                PipelineError::StageExecution {
                    stage,
                    message,
                    transient,
                } => PipelineError::StageExecution {
                    stage,
                    message: format!("{context}: {message}"),
                    transient,
                },
                PipelineError::Storage { message } => PipelineError::Storage {
                    message: format!("{context}: {message}"),
                },
                PipelineError::Serialization { message } => PipelineError::Serialization {
                    message: format!("{context}: {message}"),
                },
                PipelineError::Conflict { message } => PipelineError::Conflict {
                    message: format!("{context}: {message}"),
                },
                PipelineError::Io(err) => PipelineError::Storage {
                    message: format!("{context}: {err}"),
                },
                other => other, // For errors that don't have a message field
            }
        })
    }
}

/// Helper macros for creating specific error types
///
/// Creates a configuration error with a message
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::PipelineError::Config {
            message: format!($msg),
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::PipelineError::Config {
            message: format!($fmt, $($arg)*),
        }
    };
}

/// Creates a storage error with a message
#[macro_export]
macro_rules! storage_error {
    ($msg:expr) => {
        $crate::PipelineError::Storage {
            message: format!($msg),
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::PipelineError::Storage {
            message: format!($fmt, $($arg)*),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PipelineError::NotFound {
            resource: "Job".to_string(),
            id: "abc123".to_string(),
        };
        assert_eq!(format!("{error}"), "Job not found: abc123");
    }

    #[test]
    fn test_transient_classification() {
        let transient = PipelineError::StageExecution {
            stage: StageKind::Transcription,
            message: "model busy".to_string(),
            transient: true,
        };
        assert!(transient.is_transient());

        let permanent = PipelineError::Ingestion {
            message: "unrecognized container format".to_string(),
            transient: false,
        };
        assert!(!permanent.is_transient());

        let timeout = PipelineError::Timeout {
            operation: "detection".to_string(),
            duration: Duration::from_secs(30),
        };
        assert!(timeout.is_transient());

        let conflict = PipelineError::Conflict {
            message: "terminal status".to_string(),
        };
        assert!(!conflict.is_transient());
    }

    #[test]
    fn test_error_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let error = result.with_context("reading artifact").unwrap_err();
        assert!(matches!(error, PipelineError::Storage { .. }));
        assert!(format!("{error}").contains("reading artifact"));
    }

    #[test]
    fn test_error_macros() {
        let error = config_error!("test message");
        assert!(matches!(error, PipelineError::Config { .. }));

        let error = storage_error!("test {} {}", "formatted", "message");
        assert!(matches!(error, PipelineError::Storage { .. }));
    }

    #[test]
    fn test_error_category() {
        let error = PipelineError::Timeout {
            operation: "merge".to_string(),
            duration: Duration::from_secs(1),
        };
        assert_eq!(error.category(), "timeout");
    }
}
