//! Read path
//!
//! Resolves a public `/uploads/...` path to its record, applies the referer policy, fetches the
//! object from the backend named by the record and relays it. A per-request watermark buffers
//! the object and re-encodes it on the blocking pool; when stamping fails the object is fetched
//! again and served untouched.

use crate::error::{ProxyError, ProxyResult};
use crate::path::{normalize_request_path, resolve_object_path};
use crate::records::ImageRecordStore;
use crate::referer::RefererPolicy;
use bytes::Bytes;
use futures::{stream, TryStreamExt};
use http::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_LENGTH,
    CONTENT_TYPE, REFERER, TRANSFER_ENCODING,
};
use http::{HeaderMap, StatusCode};
use imgate_core::{Settings, StorageType, StoredImageRecord};
use imgate_processing::{ImageService, ProcessingError, WatermarkConfig};
use imgate_storage::{
    create_uploader, ByteStream, FetchedObject, ImageUploader, StorageDeps, StorageError,
    StorageResult,
};
use std::sync::Arc;
use std::time::Instant;

pub const CACHE_CONTROL_VALUE: &str = "public, max-age=31536000";
pub const X_STORAGE_TYPE: &str = "x-storage-type";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Status, headers and body ready to hand to an HTTP server.
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl std::fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl ProxyResponse {
    /// Collect the body; meant for tests and small objects.
    pub async fn into_bytes(self) -> StorageResult<Vec<u8>> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(chunks.concat())
    }
}

#[derive(Clone)]
pub struct ProxyStreamer {
    images: Arc<ImageService>,
    records: Arc<dyn ImageRecordStore>,
    deps: StorageDeps,
}

impl ProxyStreamer {
    pub fn new(
        images: Arc<ImageService>,
        records: Arc<dyn ImageRecordStore>,
        deps: StorageDeps,
    ) -> Self {
        Self {
            images,
            records,
            deps,
        }
    }

    /// Serve `path_param` (the part of the route after `/uploads`).
    pub async fn serve<I, K, V>(
        &self,
        path_param: &str,
        query: I,
        headers: &HeaderMap,
        settings: &Settings,
    ) -> ProxyResult<ProxyResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let watermark = WatermarkConfig::from_query(query);
        let requested = normalize_request_path(path_param)?;
        let record = self
            .records
            .find_by_path(&requested)
            .await?
            .ok_or_else(|| ProxyError::NotFound(requested.clone()))?;

        if !RefererPolicy::from_settings(&settings.referer).check_headers(headers) {
            let referer = headers
                .get(REFERER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            tracing::warn!(referer = %referer, path = %requested, "Referer rejected");
            return Err(ProxyError::RefererDenied(referer));
        }

        let object_path = resolve_object_path(&record, &requested)?;
        self.stream(&record, &object_path, &watermark, settings).await
    }

    /// Fetch `object_path` from the backend `record` lives on and build the response.
    pub async fn stream(
        &self,
        record: &StoredImageRecord,
        object_path: &str,
        watermark: &WatermarkConfig,
        settings: &Settings,
    ) -> ProxyResult<ProxyResponse> {
        // Custom API objects are served by the remote host itself.
        if record.storage == StorageType::Custom {
            return Err(ProxyError::UnsupportedStorage(
                record.storage.as_str().to_string(),
            ));
        }

        let uploader = create_uploader(record.storage, settings, &self.deps).await?;
        if record.storage == StorageType::WebDav {
            spawn_probe(uploader.clone());
        }

        let start = Instant::now();
        let fetched = uploader.fetch(object_path).await.map_err(|e| {
            tracing::error!(
                error = %e,
                path = %object_path,
                storage = %record.storage,
                "Failed to fetch image from storage"
            );
            e
        })?;

        let mut headers = base_headers(record);
        let body = if watermark.enabled {
            headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            let (body, stamped_type) = self
                .watermarked_body(uploader.as_ref(), fetched, object_path, watermark)
                .await?;
            if let Some(content_type) = stamped_type {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
            body
        } else {
            let length = fetched
                .content_length
                .filter(|len| *len > 0)
                .unwrap_or(record.file_size);
            if length > 0 {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
            }
            fetched.stream
        };

        tracing::debug!(
            path = %object_path,
            storage = %record.storage,
            watermark = watermark.enabled,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Proxying image"
        );

        Ok(ProxyResponse {
            status: StatusCode::OK,
            headers,
            body,
        })
    }

    async fn watermarked_body(
        &self,
        uploader: &dyn ImageUploader,
        fetched: FetchedObject,
        object_path: &str,
        watermark: &WatermarkConfig,
    ) -> ProxyResult<(ByteStream, Option<&'static str>)> {
        match self.stamp(fetched, watermark).await {
            Ok(bytes) => {
                let content_type = stamped_content_type(&bytes);
                Ok((Box::pin(stream::once(async move { Ok(bytes) })), content_type))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %object_path,
                    "Watermark failed, serving original"
                );
                let original = uploader.fetch(object_path).await?;
                Ok((original.stream, None))
            }
        }
    }

    async fn stamp(&self, fetched: FetchedObject, watermark: &WatermarkConfig) -> StorageResult<Bytes> {
        let data: Vec<u8> = fetched
            .stream
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;

        let images = self.images.clone();
        let cfg = watermark.clone();
        let stamped = tokio::task::spawn_blocking(move || images.renderer().apply_to_bytes(&data, &cfg))
            .await
            .map_err(|e| StorageError::Processing(ProcessingError::Task(e.to_string())))??;

        Ok(Bytes::from(stamped))
    }
}

/// MIME of the re-encoded watermark output, which may differ from the stored object.
fn stamped_content_type(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

fn base_headers(record: &StoredImageRecord) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(&record.mime_type)
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_VALUE));
    headers.insert(
        HeaderName::from_static(X_STORAGE_TYPE),
        HeaderValue::from_static(record.storage.as_str()),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers
}

/// Advisory connectivity check; the outcome is only logged.
fn spawn_probe(uploader: Arc<dyn ImageUploader>) {
    tokio::spawn(async move {
        match uploader.probe().await {
            Ok(()) => tracing::debug!(storage = %uploader.storage_type(), "Storage probe ok"),
            Err(e) => {
                tracing::warn!(error = %e, storage = %uploader.storage_type(), "Storage probe failed")
            }
        }
    });
}
