use crate::error::ProxyResult;
use imgate_core::{Settings, UploadResult};
use imgate_processing::{ImageService, ImageValidator};
use imgate_storage::{create_uploader, notify_upload, FileInput, StorageDeps, UploadContext};
use std::sync::Arc;
use std::time::Instant;

/// Write path: validate, store through the configured backend, then send the upload notice.
#[derive(Clone)]
pub struct UploadService {
    images: Arc<ImageService>,
    validator: ImageValidator,
    deps: StorageDeps,
}

impl UploadService {
    pub fn new(images: Arc<ImageService>, validator: ImageValidator, deps: StorageDeps) -> Self {
        Self {
            images,
            validator,
            deps,
        }
    }

    pub async fn upload(
        &self,
        settings: Arc<Settings>,
        file: FileInput,
        username: &str,
    ) -> ProxyResult<UploadResult> {
        let uploader = create_uploader(settings.storage_type, &settings, &self.deps).await?;
        let ctx = UploadContext::new(self.images.clone(), self.validator.clone(), settings.clone())
            .with_uploader(username);

        let start = Instant::now();
        let file_name = file.file_name.clone();
        let result = uploader.upload(&ctx, file).await.map_err(|e| {
            tracing::error!(
                error = %e,
                file_name = %file_name,
                storage = %settings.storage_type,
                "Upload failed"
            );
            e
        })?;

        tracing::info!(
            file_name = %result.file_name,
            storage = %result.storage,
            size_bytes = result.file_size,
            has_thumbnail = result.has_thumbnail(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Image uploaded"
        );

        if settings.telegram.notice {
            match self.deps.telegram_client(&settings.telegram.bot_token) {
                Ok(client) => notify_upload(&client, &settings.telegram, &result, username).await,
                Err(e) => tracing::warn!(error = %e, "Upload notice skipped"),
            }
        }

        Ok(result)
    }

    /// Upload up to ten files; each file succeeds or fails on its own.
    pub async fn upload_batch(
        &self,
        settings: Arc<Settings>,
        files: Vec<FileInput>,
        username: &str,
    ) -> ProxyResult<Vec<ProxyResult<UploadResult>>> {
        self.validator.validate_batch(files.len())?;

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            results.push(self.upload(settings.clone(), file, username).await);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use imgate_core::StorageType;
    use imgate_processing::ValidationError;

    fn service(root: &std::path::Path) -> UploadService {
        UploadService::new(
            Arc::new(ImageService::default()),
            ImageValidator::new(1024, vec!["image/png".to_string()]),
            StorageDeps::new(root),
        )
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = service(dir.path())
            .upload_batch(Arc::new(Settings::default()), vec![], "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Validation(ValidationError::EmptyBatch)));
    }

    #[tokio::test]
    async fn test_batch_reports_each_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            FileInput::from_bytes("a.txt", "text/plain", b"hello".to_vec()),
            FileInput::from_bytes("b.png", "image/png", vec![0u8; 2048]),
        ];

        let results = service(dir.path())
            .upload_batch(Arc::new(Settings::default()), files, "alice")
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_err()));
    }

    #[tokio::test]
    async fn test_unconfigured_backend_fails_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            storage_type: StorageType::Ftp,
            ..Default::default()
        };
        let err = service(dir.path())
            .upload(
                Arc::new(settings),
                FileInput::from_bytes("a.png", "image/png", b"x".to_vec()),
                "alice",
            )
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 500);
    }
}
