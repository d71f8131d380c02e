use crate::validator::ValidationError;
use imgate_core::AppError;

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("upload truncated: expected {expected} bytes, got {actual} bytes")]
    Truncated { expected: u64, actual: u64 },

    #[error("failed to read upload: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to load font {font}: {reason}")]
    FontLoad { font: String, reason: String },

    #[error("watermark render failed: {0}")]
    Render(String),

    #[error("encode {format} failed: {reason}")]
    Encode { format: &'static str, reason: String },

    #[error("invalid quality: {0} (must be 0-100)")]
    InvalidQuality(u8),

    #[error("thumbnail failed: {0}")]
    Thumbnail(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("processing task failed: {0}")]
    Task(String),
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;

impl ProcessingError {
    pub(crate) fn encode(format: &'static str, err: impl std::fmt::Display) -> Self {
        ProcessingError::Encode {
            format,
            reason: err.to_string(),
        }
    }
}

impl From<image::ImageError> for ProcessingError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => ProcessingError::UnsupportedFormat(e.to_string()),
            image::ImageError::IoError(e) => ProcessingError::Read(e),
            other => ProcessingError::UnsupportedFormat(other.to_string()),
        }
    }
}

impl From<ProcessingError> for AppError {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::UnsupportedFormat(msg) => AppError::ImageProcessing(format!(
                "unsupported image format: {}",
                msg
            )),
            ProcessingError::Truncated { expected, actual } => {
                AppError::UploadTruncated { expected, actual }
            }
            ProcessingError::Validation(ValidationError::FileTooLarge { size, max }) => {
                AppError::PayloadTooLarge(format!("{} bytes (max: {} bytes)", size, max))
            }
            ProcessingError::Validation(e) => AppError::InvalidInput(e.to_string()),
            ProcessingError::Render(_) | ProcessingError::FontLoad { .. } => {
                AppError::ImageProcessing(err.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}
