use crate::keys::{key_from_url, ObjectKeys};
use crate::traits::{
    stored_result, FetchedObject, FileInput, ImageUploader, StorageError, StorageResult,
    UploadContext,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use imgate_core::{S3Settings, StorageType, StoredImageRecord, UploadResult};
use imgate_processing::ProcessedImage;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, Attributes, ClientOptions, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
};
use std::time::{Duration, Instant};

const R2_REGION: &str = "auto";
const S3_REGION: &str = "us-east-1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// S3 and Cloudflare R2 backend
#[derive(Debug, Clone)]
pub struct S3Uploader {
    store: AmazonS3,
    bucket: String,
    storage_type: StorageType,
}

impl S3Uploader {
    /// Build a client for `storage_type` (`S3` or `R2`) from the credential block.
    pub fn new(settings: &S3Settings, storage_type: StorageType) -> StorageResult<Self> {
        let required = [
            ("endpoint", &settings.endpoint),
            ("access key", &settings.access_key),
            ("secret key", &settings.secret_key),
            ("bucket", &settings.bucket),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(StorageError::ConfigError(format!(
                "{} {} not configured",
                storage_type.as_str(),
                name
            )));
        }

        let region = match storage_type {
            StorageType::R2 => R2_REGION,
            _ => S3_REGION,
        };
        let endpoint = settings.endpoint.trim().to_string();

        let store = AmazonS3Builder::new()
            .with_access_key_id(settings.access_key.trim())
            .with_secret_access_key(settings.secret_key.trim())
            .with_region(region)
            .with_bucket_name(settings.bucket.trim())
            .with_allow_http(endpoint.starts_with("http://"))
            .with_endpoint(endpoint)
            .with_client_options(ClientOptions::new().with_timeout(REQUEST_TIMEOUT))
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Uploader {
            store,
            bucket: settings.bucket.trim().to_string(),
            storage_type,
        })
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        let location = Path::from(key);
        let size = data.len() as u64;
        let start = Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&location, PutPayload::from(data), opts)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                map_object_error(key, e)
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            content_type = %content_type,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );
        Ok(())
    }

    async fn remove(&self, url: &str) -> StorageResult<()> {
        let key = key_from_url(url);
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty object key".to_string()));
        }

        self.store
            .delete(&Path::from(key))
            .await
            .map_err(|e| map_object_error(key, e))
    }
}

/// Content types of the main object and its thumbnail, as produced by processing.
pub fn object_content_types(processed: &ProcessedImage) -> (&str, &'static str) {
    (processed.mime_type.as_str(), processed.thumbnail_mime())
}

fn map_object_error(key: &str, err: ObjectStoreError) -> StorageError {
    match err {
        ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
        ObjectStoreError::PermissionDenied { .. } | ObjectStoreError::Unauthenticated { .. } => {
            StorageError::Forbidden(err.to_string())
        }
        other => {
            let message = other.to_string();
            let lowered = message.to_lowercase();
            if lowered.contains("timed out") || lowered.contains("timeout") {
                StorageError::Timeout(message)
            } else {
                StorageError::Transport(message)
            }
        }
    }
}

#[async_trait]
impl ImageUploader for S3Uploader {
    async fn upload(&self, ctx: &UploadContext, file: FileInput) -> StorageResult<UploadResult> {
        let processed = ctx.process(file).await?;
        let keys = ObjectKeys::new(&processed.unique_file_name);

        let (content_type, thumbnail_type) = object_content_types(&processed);
        self.put(&keys.key(), processed.compressed_bytes.clone(), content_type)
            .await?;

        let thumbnail_stored = match &processed.thumbnail_bytes {
            Some(thumb) => match self
                .put(&keys.thumbnail_key(), thumb.clone(), thumbnail_type)
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, key = %keys.thumbnail_key(), "S3 thumbnail upload failed");
                    false
                }
            },
            None => false,
        };

        Ok(stored_result(
            &processed,
            &keys,
            thumbnail_stored,
            self.storage_type,
            "Upload successful",
        ))
    }

    async fn delete(&self, record: &StoredImageRecord) -> bool {
        let start = Instant::now();
        let mut removed = match self.remove(&record.url).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, bucket = %self.bucket, url = %record.url, "S3 delete failed");
                false
            }
        };

        if record.has_thumbnail() {
            if let Err(e) = self.remove(&record.thumbnail_url).await {
                tracing::warn!(
                    error = %e,
                    bucket = %self.bucket,
                    url = %record.thumbnail_url,
                    "S3 thumbnail delete failed"
                );
                removed = false;
            }
        }

        if removed {
            tracing::info!(
                bucket = %self.bucket,
                url = %record.url,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 delete successful"
            );
        }
        removed
    }

    async fn fetch(&self, path: &str) -> StorageResult<FetchedObject> {
        let key = key_from_url(path).to_string();
        let location = Path::from(key.as_str());
        let start = Instant::now();

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| map_object_error(&key, e))?;
        let content_length = Some(result.meta.size);

        let bucket = self.bucket.clone();
        let stream = result.into_stream().map(move |chunk| {
            chunk.map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream download error"
                );
                StorageError::DownloadFailed(e.to_string())
            })
        });

        Ok(FetchedObject {
            stream: Box::pin(stream),
            content_length,
        })
    }

    fn storage_type(&self) -> StorageType {
        self.storage_type
    }
}
