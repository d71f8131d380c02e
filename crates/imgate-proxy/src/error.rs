use http::StatusCode;
use imgate_core::AppError;
use imgate_processing::ValidationError;
use imgate_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid image path: {0}")]
    BadRequest(String),

    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Referer not allowed: {0}")]
    RefererDenied(String),

    #[error("Unsupported storage type: {0}")]
    UnsupportedStorage(String),

    #[error("Invalid upload: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Record store error: {0}")]
    RecordStore(String),
}

pub type ProxyResult<T> = Result<T, ProxyError>;

impl ProxyError {
    /// Status the proxy answers with for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) | ProxyError::Validation(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::RefererDenied(_) => StatusCode::FORBIDDEN,
            ProxyError::UnsupportedStorage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ProxyError::RecordStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::Forbidden(_) => StatusCode::FORBIDDEN,
                StorageError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                StorageError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl From<ProxyError> for AppError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::BadRequest(msg) => AppError::InvalidInput(msg),
            ProxyError::NotFound(msg) => AppError::NotFound(msg),
            ProxyError::RefererDenied(msg) => AppError::Forbidden(msg),
            ProxyError::UnsupportedStorage(msg) => {
                AppError::InvalidInput(format!("unsupported storage type: {}", msg))
            }
            ProxyError::Validation(ValidationError::FileTooLarge { size, max }) => {
                AppError::PayloadTooLarge(format!("{} bytes exceeds {} bytes", size, max))
            }
            ProxyError::Validation(e) => AppError::InvalidInput(e.to_string()),
            ProxyError::Storage(e) => e.into(),
            ProxyError::RecordStore(msg) => AppError::Internal(msg),
        }
    }
}
