//! Error types for DataFlow
//!
//! Every failure the coordinator can observe maps to one variant here, so a
//! caller can always attribute a failure to a specific job or a specific check.

use crate::model::JobStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for DataFlow operations
#[derive(Error, Debug)]
pub enum DataflowError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Capacity query could not reach the endpoint
    #[error("Storage query failed for '{endpoint}': {message}")]
    StorageQuery { endpoint: String, message: String },

    /// Compatibility score below the accepted threshold
    #[error("Endpoints are incompatible (score {score}): {summary}")]
    IncompatibleEndpoints { score: u8, summary: String },

    /// Raised by a transfer executor while moving a batch
    #[error("Transfer fault: {0}")]
    TransferFault(String),

    /// Unknown job id
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Cancellation requested on a job that already finished
    #[error("Job '{id}' is already {status}")]
    AlreadyTerminal { id: String, status: JobStatus },

    /// A job state change that the state machine does not allow
    #[error("Illegal transition for job '{id}': {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// Job ledger persistence error
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid manifest or request document
    #[error("Manifest error: {0}")]
    ManifestError(String),

    /// Operation cancelled by user
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation timed out
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),
}

impl DataflowError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a storage query error
    pub fn storage_query(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageQuery {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a transfer fault
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::TransferFault(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Check if a caller could reasonably retry the operation as a new attempt
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::StorageQuery { .. } | Self::TransferFault(_) | Self::Timeout(_)
        )
    }
}

/// Result type alias for DataFlow operations
pub type Result<T> = std::result::Result<T, DataflowError>;

impl From<std::io::Error> for DataflowError {
    fn from(err: std::io::Error) -> Self {
        DataflowError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for DataflowError {
    fn from(err: serde_json::Error) -> Self {
        DataflowError::ManifestError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| DataflowError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = DataflowError::io("/test/path", io_err);
        assert!(matches!(&err, DataflowError::Io { path, .. } if path == &PathBuf::from("/test/path")));
        assert!(err.to_string().contains("/test/path"));
    }

    #[test]
    fn test_error_recoverability() {
        assert!(DataflowError::transfer("link reset").is_recoverable());
        assert!(DataflowError::Timeout(30).is_recoverable());
        assert!(!DataflowError::JobNotFound("mig_x".into()).is_recoverable());
    }

    #[test]
    fn test_transfer_fault_is_verbatim() {
        let err = DataflowError::transfer("device disconnected");
        assert_eq!(err.to_string(), "Transfer fault: device disconnected");
    }

    #[test]
    fn test_already_terminal_message() {
        let err = DataflowError::AlreadyTerminal {
            id: "mig_1".into(),
            status: JobStatus::Completed,
        };
        assert_eq!(err.to_string(), "Job 'mig_1' is already completed");
    }
}
