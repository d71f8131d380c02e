use crate::keys::{key_from_url, ObjectKeys};
use crate::traits::{
    stored_result, FetchedObject, FileInput, ImageUploader, StorageError, StorageResult,
    UploadContext,
};
use async_trait::async_trait;
use futures::StreamExt;
use imgate_core::{StorageType, StoredImageRecord, UploadResult};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem backend
///
/// Objects live at `{root}/uploads/{YYYY}/{MM}/...`; directories are created on demand.
#[derive(Debug, Clone)]
pub struct LocalUploader {
    root: PathBuf,
}

impl LocalUploader {
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();

        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(LocalUploader { root })
    }

    /// Resolve an object key below the root, refusing anything that could escape it.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(format!(
                "Storage key contains invalid components: {}",
                key
            )));
        }

        let path = self.root.join(relative);

        // Existing files may still be symlinks pointing elsewhere.
        if let Ok(canonical) = path.canonicalize() {
            let root = self.root.canonicalize().map_err(|e| {
                StorageError::ConfigError(format!("Failed to canonicalize root: {}", e))
            })?;
            if canonical.strip_prefix(&root).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    async fn write(&self, key: &str, data: &[u8]) -> StorageResult<PathBuf> {
        let path = self.key_to_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;
        file.write_all(data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;
        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        Ok(path)
    }

    /// Remove one object; a file that is already gone counts as removed.
    async fn remove(&self, url: &str) -> StorageResult<()> {
        let path = self.key_to_path(key_from_url(url))?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl ImageUploader for LocalUploader {
    async fn upload(&self, ctx: &UploadContext, file: FileInput) -> StorageResult<UploadResult> {
        let processed = ctx.process(file).await?;
        let keys = ObjectKeys::new(&processed.unique_file_name);
        let start = Instant::now();

        let path = self.write(&keys.key(), &processed.compressed_bytes).await?;

        let thumbnail_stored = match &processed.thumbnail_bytes {
            Some(thumb) => match self.write(&keys.thumbnail_key(), thumb).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        key = %keys.thumbnail_key(),
                        "Local thumbnail write failed"
                    );
                    false
                }
            },
            None => false,
        };

        tracing::info!(
            path = %path.display(),
            key = %keys.key(),
            size_bytes = processed.compressed_size(),
            has_thumbnail = thumbnail_stored,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(stored_result(
            &processed,
            &keys,
            thumbnail_stored,
            StorageType::Default,
            "Upload successful",
        ))
    }

    async fn delete(&self, record: &StoredImageRecord) -> bool {
        let mut urls = vec![record.url.as_str()];
        if record.has_thumbnail() {
            urls.push(record.thumbnail_url.as_str());
        }

        let mut removed = true;
        for url in urls {
            if let Err(e) = self.remove(url).await {
                tracing::warn!(error = %e, url = %url, "Local storage delete failed");
                removed = false;
            }
        }

        if removed {
            tracing::info!(url = %record.url, "Local storage delete successful");
        }
        removed
    }

    async fn fetch(&self, path: &str) -> StorageResult<FetchedObject> {
        let key = key_from_url(path);
        let file_path = self.key_to_path(key)?;
        let start = Instant::now();

        let file = match fs::File::open(&file_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to open file {}: {}",
                    file_path.display(),
                    e
                )));
            }
        };
        let content_length = file.metadata().await.ok().map(|m| m.len());

        let key = key.to_string();
        let stream = tokio_util::io::ReaderStream::new(file).map(move |chunk| {
            chunk.map_err(|e| {
                tracing::error!(
                    key = %key,
                    error = %e,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage stream error"
                );
                StorageError::DownloadFailed(format!("Failed to read chunk: {}", e))
            })
        });

        Ok(FetchedObject {
            stream: Box::pin(stream),
            content_length,
        })
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Default
    }
}
