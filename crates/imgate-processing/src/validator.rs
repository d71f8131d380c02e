use imgate_core::GlobalConfig;

pub const MAX_UPLOAD_FILES: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Missing content type")]
    MissingContentType,

    #[error("Unsupported content type: {content_type} (allowed: {allowed})")]
    InvalidContentType {
        content_type: String,
        allowed: String,
    },

    #[error("No files in upload")]
    EmptyBatch,

    #[error("Too many files: {count} (max: {max})")]
    TooManyFiles { count: usize, max: usize },
}

/// Upload gate applied before any decoding work.
#[derive(Debug, Clone)]
pub struct ImageValidator {
    max_file_size: u64,
    allowed_types: Vec<String>,
}

impl ImageValidator {
    pub fn new(max_file_size: u64, allowed_types: Vec<String>) -> Self {
        Self {
            max_file_size,
            allowed_types: allowed_types.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(config.max_file_size as u64, config.allowed_types.clone())
    }

    pub fn validate(&self, declared_size: u64, content_type: Option<&str>) -> Result<(), ValidationError> {
        if declared_size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size: declared_size,
                max: self.max_file_size,
            });
        }

        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .ok_or(ValidationError::MissingContentType)?;

        let normalized = content_type.to_lowercase();
        if !self.allowed_types.iter().any(|t| t == &normalized) {
            return Err(ValidationError::InvalidContentType {
                content_type: content_type.to_string(),
                allowed: self.allowed_types.join(", "),
            });
        }

        Ok(())
    }

    pub fn validate_batch(&self, count: usize) -> Result<(), ValidationError> {
        match count {
            0 => Err(ValidationError::EmptyBatch),
            n if n > MAX_UPLOAD_FILES => Err(ValidationError::TooManyFiles {
                count: n,
                max: MAX_UPLOAD_FILES,
            }),
            _ => Ok(()),
        }
    }
}
