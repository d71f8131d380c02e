//! Error types module
//!
//! `AppError` is the unified error the processing, storage and proxy crates convert into at
//! the edge. It self-describes how it should be presented through [`ErrorMetadata`].

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like a flaky remote
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "UPLOAD_TRUNCATED")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Upload truncated: expected {expected} bytes, got {actual} bytes")]
    UploadTruncated { expected: u64, actual: u64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Storage configuration missing: {0}")]
    ConfigMissing(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream timeout: {0}")]
    Timeout(String),

    #[error("Remote rejected request: {0}")]
    RemoteRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::ImageProcessing(_) => (
            400,
            "IMAGE_PROCESSING_ERROR",
            false,
            Some("Check image format and try a different file"),
            false,
            LogLevel::Warn,
        ),
        AppError::UploadTruncated { .. } => (
            400,
            "UPLOAD_TRUNCATED",
            true,
            Some("The upload was cut short, retry it"),
            false,
            LogLevel::Warn,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the image path exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Forbidden(_) => (
            403,
            "FORBIDDEN",
            false,
            None,
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size"),
            false,
            LogLevel::Debug,
        ),
        AppError::ConfigMissing(_) => (
            500,
            "STORAGE_NOT_CONFIGURED",
            false,
            Some("Complete the storage settings"),
            true,
            LogLevel::Error,
        ),
        AppError::Transport(_) => (
            502,
            "STORAGE_UNREACHABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Timeout(_) => (
            504,
            "STORAGE_TIMEOUT",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Warn,
        ),
        AppError::RemoteRejected(_) => (
            502,
            "STORAGE_REJECTED",
            false,
            Some("Check the storage account and its limits"),
            false,
            LogLevel::Warn,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::ImageProcessing(_) => "ImageProcessing",
            AppError::UploadTruncated { .. } => "UploadTruncated",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::Forbidden(_) => "Forbidden",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::ConfigMissing(_) => "ConfigMissing",
            AppError::Transport(_) => "Transport",
            AppError::Timeout(_) => "Timeout",
            AppError::RemoteRejected(_) => "RemoteRejected",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::ImageProcessing(ref msg) => msg.clone(),
            AppError::UploadTruncated { .. } => self.to_string(),
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Forbidden(ref msg) => msg.clone(),
            AppError::PayloadTooLarge(ref msg) => msg.clone(),
            AppError::ConfigMissing(_) => "Storage backend is not configured".to_string(),
            AppError::Transport(_) => "Failed to reach storage backend".to_string(),
            AppError::Timeout(_) => "Storage backend timed out".to_string(),
            AppError::RemoteRejected(ref msg) => msg.clone(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_upload_is_distinct_from_decode_failure() {
        let truncated = AppError::UploadTruncated {
            expected: 10,
            actual: 4,
        };
        let decode = AppError::ImageProcessing("unsupported image format".to_string());

        assert_eq!(truncated.http_status_code(), decode.http_status_code());
        assert_ne!(truncated.error_code(), decode.error_code());
        assert!(truncated.is_recoverable());
        assert!(!decode.is_recoverable());
    }

    #[test]
    fn test_sensitive_errors_hide_details() {
        let err = AppError::Transport("dial tcp 10.0.0.3:21: connection refused".to_string());
        assert!(err.is_sensitive());
        assert!(!err.client_message().contains("10.0.0.3"));
    }

    #[test]
    fn test_remote_rejection_message_passes_through() {
        let err = AppError::RemoteRejected("quota exceeded".to_string());
        assert_eq!(err.client_message(), "quota exceeded");
        assert_eq!(err.http_status_code(), 502);
    }

    #[test]
    fn test_detailed_message_includes_source_chain() {
        let err: AppError = anyhow::anyhow!("inner").context("outer").into();
        let details = err.detailed_message();
        assert!(details.contains("Caused by"));
    }
}
