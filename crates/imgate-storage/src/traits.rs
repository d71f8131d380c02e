//! Storage abstraction trait
//!
//! Every backend implements [`ImageUploader`]: it runs the processing pipeline on the upload,
//! persists the result under its own addressing scheme, and can later stream the object back
//! or remove it.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use imgate_core::{AppError, Settings, StorageType, StoredImageRecord, UploadResult};
use imgate_processing::{ImageService, ImageValidator, ProcessedImage, ProcessingError};
use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Storage backend timed out: {0}")]
    Timeout(String),

    #[error("Storage backend unreachable: {0}")]
    Transport(String),

    #[error("Storage backend rejected request: {0}")]
    RemoteRejected(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(any(
    feature = "storage-webdav",
    feature = "storage-telegram",
    feature = "storage-custom"
))]
impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Timeout(err.to_string())
        } else {
            StorageError::Transport(err.to_string())
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => AppError::NotFound(msg),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::Forbidden(msg) => AppError::Forbidden(msg),
            StorageError::Timeout(msg) => AppError::Timeout(msg),
            StorageError::RemoteRejected(msg) => AppError::RemoteRejected(msg),
            StorageError::ConfigError(msg) => AppError::ConfigMissing(msg),
            StorageError::Processing(e) => e.into(),
            StorageError::IoError(e) => e.into(),
            other @ (StorageError::UploadFailed(_)
            | StorageError::DownloadFailed(_)
            | StorageError::DeleteFailed(_)
            | StorageError::Transport(_)) => AppError::Transport(other.to_string()),
        }
    }
}

/// Chunked body of a fetched object.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Object handed back by [`ImageUploader::fetch`].
pub struct FetchedObject {
    pub stream: ByteStream,
    /// Length reported by the backend, when it knows one.
    pub content_length: Option<u64>,
}

impl std::fmt::Debug for FetchedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedObject")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// One uploaded file as received from the client.
pub struct FileInput {
    pub file_name: String,
    pub content_type: String,
    /// Size the client announced; zero when unknown.
    pub declared_size: u64,
    pub reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
}

impl FileInput {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        declared_size: u64,
        reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            declared_size,
            reader,
        }
    }

    /// In-memory upload whose declared size is the buffer length.
    pub fn from_bytes(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        let size = data.len() as u64;
        Self::new(file_name, content_type, size, Box::pin(Cursor::new(data)))
    }
}

/// Shared services and the settings snapshot for one upload request.
#[derive(Clone)]
pub struct UploadContext {
    pub images: Arc<ImageService>,
    pub validator: ImageValidator,
    pub settings: Arc<Settings>,
    /// Display name of the uploading user, used in notifications.
    pub uploader: String,
}

impl UploadContext {
    pub fn new(images: Arc<ImageService>, validator: ImageValidator, settings: Arc<Settings>) -> Self {
        Self {
            images,
            validator,
            settings,
            uploader: String::new(),
        }
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = uploader.into();
        self
    }

    /// Validate the declared metadata and run the processing pipeline.
    pub async fn process(&self, file: FileInput) -> StorageResult<ProcessedImage> {
        self.validator
            .validate(file.declared_size, Some(&file.content_type))
            .map_err(ProcessingError::from)?;

        let processed = self
            .images
            .process_image(
                file.reader,
                file.declared_size,
                &file.content_type,
                &self.settings,
            )
            .await?;
        Ok(processed)
    }

    /// Validate and buffer the upload untouched, for backends that store the original bytes.
    pub async fn read_original(&self, mut file: FileInput) -> StorageResult<Vec<u8>> {
        use tokio::io::AsyncReadExt;

        self.validator
            .validate(file.declared_size, Some(&file.content_type))
            .map_err(ProcessingError::from)?;

        let mut buffer = Vec::new();
        file.reader.read_to_end(&mut buffer).await?;

        let actual = buffer.len() as u64;
        if file.declared_size > 0 && actual != file.declared_size {
            return Err(ProcessingError::Truncated {
                expected: file.declared_size,
                actual,
            }
            .into());
        }
        Ok(buffer)
    }
}

/// Storage backend contract
///
/// Uploads fail as a whole only when the main object cannot be stored; a failed thumbnail
/// leaves `thumbnail_url` empty. Deletes are best-effort and report physical success only.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, ctx: &UploadContext, file: FileInput) -> StorageResult<UploadResult>;

    /// Remove the main object and its thumbnail. Never fails; `false` means the physical
    /// delete did not go through.
    async fn delete(&self, record: &StoredImageRecord) -> bool;

    /// Open a stream over the object stored at `path` (a public URL path such as
    /// `/uploads/2024/05/name.webp`).
    async fn fetch(&self, path: &str) -> StorageResult<FetchedObject>;

    /// Connectivity check.
    async fn probe(&self) -> StorageResult<()> {
        Ok(())
    }

    fn storage_type(&self) -> StorageType;
}

/// Successful result for a pipeline-processed upload stored under `keys`.
pub(crate) fn stored_result(
    processed: &ProcessedImage,
    keys: &crate::keys::ObjectKeys,
    thumbnail_stored: bool,
    storage: StorageType,
    message: &str,
) -> UploadResult {
    UploadResult {
        success: true,
        message: message.to_string(),
        file_name: processed.unique_file_name.clone(),
        file_size: processed.compressed_size(),
        mime_type: processed.mime_type.clone(),
        url: keys.url(),
        thumbnail_url: if thumbnail_stored {
            keys.thumbnail_url()
        } else {
            String::new()
        },
        storage,
        created_at: chrono::Utc::now(),
        width: processed.width,
        height: processed.height,
        remote_id: None,
    }
}
