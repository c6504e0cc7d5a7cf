//! Error types for the meter-pipeline crate.
//!
//! Duplicate records are never errors: every stage absorbs them through its
//! fingerprint check and reports them as counts. Errors here are the failures
//! a batch scheduler has to see, such as unreadable snapshots or bad config.

use thiserror::Error;

/// Errors that can occur in the ingestion pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The time range is invalid (start after end).
    #[error("invalid time range: start={start}, end={end}")]
    InvalidTimeRange {
        /// Start of the range, RFC 3339.
        start: String,
        /// End of the range, RFC 3339.
        end: String,
    },

    /// The pipeline configuration failed validation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// No domain with the given name is configured.
    #[error("unknown domain: {name}")]
    UnknownDomain {
        /// The domain name that was requested.
        name: String,
    },

    /// A store rejected a write.
    #[error("storage error: {reason}")]
    Storage {
        /// The reason the storage operation failed.
        reason: String,
    },

    /// Snapshot files could not be written or read back.
    #[error("persistence error: {reason}")]
    Persistence {
        /// The reason the snapshot operation failed.
        reason: String,
    },

    /// Underlying IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_time_range() {
        let err = PipelineError::InvalidTimeRange {
            start: "2025-01-02T00:00:00+00:00".to_string(),
            end: "2025-01-01T00:00:00+00:00".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid time range: start=2025-01-02T00:00:00+00:00, end=2025-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn error_display_invalid_config() {
        let err = PipelineError::InvalidConfig {
            reason: "tenant cannot be empty".to_string(),
        };
        assert_eq!(err.to_string(), "invalid configuration: tenant cannot be empty");
    }

    #[test]
    fn error_display_unknown_domain() {
        let err = PipelineError::UnknownDomain {
            name: "database".to_string(),
        };
        assert_eq!(err.to_string(), "unknown domain: database");
    }

    #[test]
    fn error_display_storage() {
        let err = PipelineError::Storage {
            reason: "fact store sealed".to_string(),
        };
        assert_eq!(err.to_string(), "storage error: fact store sealed");
    }

    #[test]
    fn error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing snapshot");
        let err = PipelineError::from(io_err);
        assert!(matches!(err, PipelineError::Io(_)));
        assert_eq!(err.to_string(), "io error: missing snapshot");
    }

    #[test]
    fn error_from_json_error() {
        let json_err = serde_json::from_str::<u32>("not json");
        let Err(json_err) = json_err else {
            panic!("expected parse failure");
        };
        let err = PipelineError::from(json_err);
        assert!(matches!(err, PipelineError::Serialization(_)));
    }
}
