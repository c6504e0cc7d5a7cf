//! CLI error types.

use meter_pipeline::PipelineError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),
    /// A background task failed to complete.
    #[error("task error: {0}")]
    Task(String),
    /// Pipeline failure.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_error_display_invalid_argument() {
        let err = CliError::InvalidArgument("--every must be positive".into());
        assert_eq!(err.to_string(), "invalid argument: --every must be positive");
    }

    #[test]
    fn cli_error_wraps_pipeline_error() {
        let err = CliError::from(PipelineError::UnknownDomain {
            name: "gpu".into(),
        });
        assert_eq!(err.to_string(), "unknown domain: gpu");
    }

    #[test]
    fn cli_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err = CliError::from(io_err);
        assert!(matches!(cli_err, CliError::Io(_)));
    }
}
