use crate::keys::{key_from_url, ObjectKeys};
use crate::traits::{
    stored_result, FetchedObject, FileInput, ImageUploader, StorageError, StorageResult,
    UploadContext,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use imgate_core::{StorageType, StoredImageRecord, UploadResult, WebDavSettings};
use reqwest::{Client, Method, StatusCode};
use std::time::{Duration, Instant};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimal WebDAV client: PUT, GET, DELETE, MKCOL and a Depth 0 PROPFIND.
#[derive(Debug, Clone)]
pub struct WebDavClient {
    http: Client,
    base_url: String,
    user: String,
    pass: String,
}

impl WebDavClient {
    pub fn new(settings: &WebDavSettings) -> StorageResult<Self> {
        let base_url = settings.url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(StorageError::ConfigError(
                "WebDAV url not configured".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            user: settings.user.clone(),
            pass: settings.pass.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        format!("{}/{}", self.base_url, encoded.join("/"))
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        if self.user.is_empty() {
            builder
        } else {
            builder.basic_auth(&self.user, Some(&self.pass))
        }
    }

    /// Create every missing collection above `path`.
    async fn ensure_collections(&self, path: &str) -> StorageResult<()> {
        let mkcol = method("MKCOL")?;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut current = String::new();

        for segment in segments.iter().take(segments.len().saturating_sub(1)) {
            current.push('/');
            current.push_str(segment);

            let status = self.request(mkcol.clone(), &current).send().await?.status();
            // 405 means the collection already exists.
            if !(status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED) {
                return Err(status_error(status, &current));
            }
        }
        Ok(())
    }

    pub async fn put(&self, path: &str, data: Bytes) -> StorageResult<()> {
        self.ensure_collections(path).await?;

        let status = self.request(Method::PUT, path).body(data).send().await?.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, path))
        }
    }

    /// Depth 0 PROPFIND. `Ok(false)` when the resource does not exist.
    pub async fn stat(&self, path: &str) -> StorageResult<bool> {
        let status = self
            .request(method("PROPFIND")?, path)
            .header("Depth", "0")
            .send()
            .await?
            .status();

        match status {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => Err(status_error(other, path)),
        }
    }

    pub async fn get(&self, path: &str) -> StorageResult<reqwest::Response> {
        let response = self.request(Method::GET, path).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(status_error(status, path))
        }
    }

    pub async fn delete(&self, path: &str) -> StorageResult<()> {
        let status = self.request(Method::DELETE, path).send().await?.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, path))
        }
    }
}

fn method(name: &str) -> StorageResult<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| StorageError::ConfigError(format!("invalid method {}: {}", name, e)))
}

pub(crate) fn status_error(status: StatusCode, path: &str) -> StorageError {
    match status {
        StatusCode::NOT_FOUND => StorageError::NotFound(path.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StorageError::Forbidden(format!("{} returned {}", path, status))
        }
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => {
            StorageError::Timeout(format!("{} returned {}", path, status))
        }
        other => StorageError::RemoteRejected(format!("{} returned {}", path, other)),
    }
}

/// WebDAV backend
#[derive(Debug, Clone)]
pub struct WebDavUploader {
    client: WebDavClient,
}

impl WebDavUploader {
    pub fn new(settings: &WebDavSettings) -> StorageResult<Self> {
        Ok(Self {
            client: WebDavClient::new(settings)?,
        })
    }
}

#[async_trait]
impl ImageUploader for WebDavUploader {
    async fn upload(&self, ctx: &UploadContext, file: FileInput) -> StorageResult<UploadResult> {
        let processed = ctx.process(file).await?;
        let keys = ObjectKeys::new(&processed.unique_file_name);
        let start = Instant::now();

        self.client
            .put(&keys.url(), processed.compressed_bytes.clone())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key = %keys.key(), "WebDAV upload failed");
                e
            })?;

        let thumbnail_stored = match &processed.thumbnail_bytes {
            Some(thumb) => match self.client.put(&keys.thumbnail_url(), thumb.clone()).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, key = %keys.thumbnail_key(), "WebDAV thumbnail upload failed");
                    false
                }
            },
            None => false,
        };

        tracing::info!(
            key = %keys.key(),
            size_bytes = processed.compressed_size(),
            has_thumbnail = thumbnail_stored,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "WebDAV upload successful"
        );

        Ok(stored_result(
            &processed,
            &keys,
            thumbnail_stored,
            StorageType::WebDav,
            "Upload successful",
        ))
    }

    async fn delete(&self, record: &StoredImageRecord) -> bool {
        if record.has_thumbnail() {
            if let Err(e) = self.client.delete(&record.thumbnail_url).await {
                tracing::warn!(error = %e, url = %record.thumbnail_url, "WebDAV thumbnail delete failed");
            }
        }

        match self.client.delete(&record.url).await {
            Ok(()) => {
                tracing::info!(url = %record.url, "WebDAV delete successful");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, url = %record.url, "WebDAV delete failed");
                false
            }
        }
    }

    async fn fetch(&self, path: &str) -> StorageResult<FetchedObject> {
        let start = Instant::now();

        // Missing objects surface as NotFound before the body is requested.
        match self.client.stat(path).await {
            Ok(false) => return Err(StorageError::NotFound(key_from_url(path).to_string())),
            Ok(true) => {}
            Err(e) => tracing::debug!(error = %e, path = %path, "WebDAV stat failed, trying GET"),
        }

        let response = self.client.get(path).await?;
        let content_length = response.content_length();

        let key = path.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| {
                tracing::error!(
                    error = %e,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "WebDAV stream error"
                );
                StorageError::from(e)
            })
        });

        Ok(FetchedObject {
            stream: Box::pin(stream),
            content_length,
        })
    }

    async fn probe(&self) -> StorageResult<()> {
        self.client.stat("/").await.map(|_| ())
    }

    fn storage_type(&self) -> StorageType {
        StorageType::WebDav
    }
}

#[cfg(all(test, feature = "storage-webdav"))]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use mockito::Matcher;

    fn settings(url: &str) -> WebDavSettings {
        WebDavSettings {
            url: url.to_string(),
            user: "alice".to_string(),
            pass: "secret".to_string(),
        }
    }

    #[test]
    fn test_missing_url_fails_fast() {
        let err = WebDavClient::new(&settings("  ")).unwrap_err();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }

    #[test]
    fn test_method_names() {
        assert_eq!(method("MKCOL").unwrap().as_str(), "MKCOL");
        assert_eq!(method("PROPFIND").unwrap().as_str(), "PROPFIND");
        assert!(matches!(method("BAD METHOD"), Err(StorageError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_put_creates_parent_collections() {
        let mut server = mockito::Server::new_async().await;
        let mkcol = server
            .mock("MKCOL", Matcher::Regex(r"^/dav/uploads(/2024(/05)?)?$".to_string()))
            .with_status(405)
            .expect(3)
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/dav/uploads/2024/05/a.webp")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .with_status(201)
            .create_async()
            .await;

        let client = WebDavClient::new(&settings(&format!("{}/dav/", server.url()))).unwrap();
        client
            .put("/uploads/2024/05/a.webp", Bytes::from_static(b"data"))
            .await
            .unwrap();

        mkcol.assert_async().await;
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_stats_then_streams() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PROPFIND", "/uploads/2024/05/a.webp")
            .match_header("depth", "0")
            .with_status(207)
            .create_async()
            .await;
        server
            .mock("GET", "/uploads/2024/05/a.webp")
            .with_status(200)
            .with_body("webp-bytes")
            .create_async()
            .await;

        let uploader = WebDavUploader::new(&settings(&server.url())).unwrap();
        let fetched = uploader.fetch("/uploads/2024/05/a.webp").await.unwrap();
        assert_eq!(fetched.content_length, Some(10));

        let body: Vec<Bytes> = fetched.stream.try_collect().await.unwrap();
        assert_eq!(body.concat(), b"webp-bytes");
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PROPFIND", "/uploads/2024/05/gone.webp")
            .with_status(404)
            .create_async()
            .await;

        let uploader = WebDavUploader::new(&settings(&server.url())).unwrap();
        let err = uploader.fetch("/uploads/2024/05/gone.webp").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_probe_reports_auth_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PROPFIND", "/")
            .with_status(401)
            .create_async()
            .await;

        let uploader = WebDavUploader::new(&settings(&server.url())).unwrap();
        assert!(matches!(
            uploader.probe().await,
            Err(StorageError::Forbidden(_))
        ));
    }
}
