use crate::traits::{
    FetchedObject, FileInput, ImageUploader, StorageError, StorageResult, UploadContext,
};
use async_trait::async_trait;
use futures::StreamExt;
use imgate_core::{CustomApiSettings, StorageType, StoredImageRecord, UploadResult};
use imgate_processing::codec::extension_for_mime;
use imgate_processing::unique_file_name;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const DELETE_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);
const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiEnvelope {
    success: bool,
    code: i64,
    message: String,
    data: Option<UploadData>,
}

impl ApiEnvelope {
    fn accepted(&self) -> bool {
        self.success || self.code == 200
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UploadData {
    id: Option<serde_json::Value>,
    hash: String,
    url: String,
    size: u64,
    #[serde(rename = "type")]
    mime_type: String,
    width: u32,
    height: u32,
}

impl UploadData {
    /// Identifier the remote expects on delete: its id when given, otherwise the hash.
    fn identifier(&self) -> Option<String> {
        let id = match &self.id {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        id.or_else(|| (!self.hash.is_empty()).then(|| self.hash.clone()))
    }
}

/// Third-party image host speaking the `/api/upload` protocol
///
/// Uploads are forwarded untouched; the remote does its own processing.
#[derive(Debug, Clone)]
pub struct CustomApiUploader {
    http: Client,
    base_url: String,
    api_key: String,
    delete_url: String,
}

impl CustomApiUploader {
    pub fn new(settings: &CustomApiSettings) -> StorageResult<Self> {
        let base_url = settings.url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(StorageError::ConfigError(
                "custom API url not configured".to_string(),
            ));
        }

        Ok(Self {
            http: Client::new(),
            base_url,
            api_key: settings.key.trim().to_string(),
            delete_url: settings.delete_url.trim().to_string(),
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            builder
        } else {
            builder.header(API_KEY_HEADER, &self.api_key)
        }
    }

    /// Delete endpoint for `identifier`: the configured template, else `{url}/api/image/{id}`.
    pub fn delete_endpoint(&self, identifier: &str) -> String {
        if self.delete_url.is_empty() {
            format!("{}/api/image/{}", self.base_url, identifier)
        } else {
            self.delete_url
                .replace("{id}", identifier)
                .replace("{hash}", identifier)
        }
    }

    async fn remove(&self, identifier: &str) -> StorageResult<()> {
        let url = self.delete_endpoint(identifier);
        let response = self
            .authorize(self.http.delete(&url))
            .timeout(DELETE_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::RemoteRejected(format!(
                "delete returned {}: {}",
                status, body
            )));
        }

        // A JSON body is optional; when present it must not report failure.
        if let Ok(envelope) = response.json::<ApiEnvelope>().await {
            if !envelope.accepted() {
                return Err(StorageError::RemoteRejected(envelope.message));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ImageUploader for CustomApiUploader {
    async fn upload(&self, ctx: &UploadContext, file: FileInput) -> StorageResult<UploadResult> {
        let declared_type = file.content_type.clone();
        let data = ctx.read_original(file).await?;
        let size = data.len() as u64;
        let name = unique_file_name(extension_for_mime(&declared_type));
        let start = Instant::now();

        let form = Form::new().part("image", Part::bytes(data).file_name(name.clone()));
        let response = self
            .authorize(self.http.post(format!("{}/api/upload", self.base_url)))
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let envelope: ApiEnvelope = serde_json::from_str(&body).map_err(|e| {
            StorageError::RemoteRejected(format!("unreadable response ({}): {}", e, body))
        })?;

        if status != StatusCode::OK {
            tracing::error!(status = %status, message = %envelope.message, "Custom API upload failed");
            return Err(StorageError::RemoteRejected(format!(
                "upload returned {}: {}",
                status, envelope.message
            )));
        }
        if !envelope.accepted() {
            return Err(StorageError::RemoteRejected(envelope.message));
        }

        let data = envelope.data.unwrap_or_default();
        if data.url.is_empty() {
            return Err(StorageError::RemoteRejected(
                "upload response carried no url".to_string(),
            ));
        }

        tracing::info!(
            file_name = %name,
            remote_url = %data.url,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Custom API upload successful"
        );

        Ok(UploadResult {
            success: true,
            message: "Upload successful".to_string(),
            remote_id: data.identifier(),
            file_name: name,
            file_size: if data.size > 0 { data.size } else { size },
            mime_type: if data.mime_type.is_empty() {
                declared_type
            } else {
                data.mime_type
            },
            url: data.url,
            thumbnail_url: String::new(),
            storage: StorageType::Custom,
            created_at: chrono::Utc::now(),
            width: data.width,
            height: data.height,
        })
    }

    async fn delete(&self, record: &StoredImageRecord) -> bool {
        let identifier = record
            .remote_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| record.file_name.clone());

        match self.remove(&identifier).await {
            Ok(()) => {
                tracing::info!(identifier = %identifier, "Custom API delete successful");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, identifier = %identifier, "Custom API delete failed");
                false
            }
        }
    }

    /// Streams the remote URL; only absolute `http(s)` URLs can be fetched.
    async fn fetch(&self, path: &str) -> StorageResult<FetchedObject> {
        if !(path.starts_with("http://") || path.starts_with("https://")) {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let response = self.http.get(path).timeout(FETCH_TIMEOUT).send().await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(StorageError::NotFound(path.to_string())),
            StatusCode::FORBIDDEN => return Err(StorageError::Forbidden(path.to_string())),
            other => {
                return Err(StorageError::RemoteRejected(format!(
                    "{} returned {}",
                    path, other
                )))
            }
        }

        let content_length = response.content_length();
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StorageError::from));

        Ok(FetchedObject {
            stream: Box::pin(stream),
            content_length,
        })
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Custom
    }
}

#[cfg(all(test, feature = "storage-custom"))]
mod tests {
    use super::*;
    use imgate_core::Settings;
    use imgate_processing::{ImageService, ImageValidator};
    use mockito::Matcher;
    use std::sync::Arc;

    fn settings(url: &str, delete_url: &str) -> CustomApiSettings {
        CustomApiSettings {
            url: format!("{}/", url),
            key: "k-123".to_string(),
            delete_url: delete_url.to_string(),
        }
    }

    fn context() -> UploadContext {
        UploadContext::new(
            Arc::new(ImageService::default()),
            ImageValidator::new(1024 * 1024, vec!["image/png".to_string()]),
            Arc::new(Settings::default()),
        )
    }

    fn record(remote_id: Option<&str>) -> StoredImageRecord {
        StoredImageRecord {
            id: 3,
            url: "https://img.example.com/i/abc.png".to_string(),
            thumbnail_url: String::new(),
            file_name: "1700000000000_abcdef.png".to_string(),
            file_size: 4,
            mime_type: "image/png".to_string(),
            width: 1,
            height: 1,
            storage: StorageType::Custom,
            owner: Default::default(),
            fingerprint: String::new(),
            remote_id: remote_id.map(String::from),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_delete_endpoint_template() {
        let api = CustomApiUploader::new(&settings("https://h", "https://h/del/{hash}?k=1")).unwrap();
        assert_eq!(api.delete_endpoint("abc"), "https://h/del/abc?k=1");

        let api = CustomApiUploader::new(&settings("https://h", "")).unwrap();
        assert_eq!(api.delete_endpoint("abc"), "https://h/api/image/abc");
    }

    #[tokio::test]
    async fn test_upload_passes_original_bytes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/upload")
            .match_header("x-api-key", "k-123")
            .match_body(Matcher::Regex("raw-png-bytes".to_string()))
            .with_status(200)
            .with_body(
                r#"{"success":false,"code":200,"message":"ok","data":{"hash":"abc","url":"https://img.example.com/i/abc.png","size":13,"type":"image/png","width":5,"height":6}}"#,
            )
            .create_async()
            .await;

        let api = CustomApiUploader::new(&settings(&server.url(), "")).unwrap();
        let result = api
            .upload(
                &context(),
                FileInput::from_bytes("a.png", "image/png", b"raw-png-bytes".to_vec()),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.url, "https://img.example.com/i/abc.png");
        assert_eq!(result.remote_id.as_deref(), Some("abc"));
        assert_eq!((result.width, result.height), (5, 6));
        assert!(result.file_name.ends_with(".png"));
        assert!(!result.has_thumbnail());
    }

    #[tokio::test]
    async fn test_remote_rejection_message_passes_through() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/upload")
            .with_status(200)
            .with_body(r#"{"success":false,"code":403,"message":"quota exceeded"}"#)
            .create_async()
            .await;

        let api = CustomApiUploader::new(&settings(&server.url(), "")).unwrap();
        let err = api
            .upload(
                &context(),
                FileInput::from_bytes("a.png", "image/png", b"x".to_vec()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::RemoteRejected(ref m) if m == "quota exceeded"));
    }

    #[tokio::test]
    async fn test_delete_uses_remote_id_and_reports_failure() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("DELETE", "/api/image/abc")
            .match_header("x-api-key", "k-123")
            .with_status(200)
            .with_body(r#"{"success":true}"#)
            .create_async()
            .await;
        server
            .mock("DELETE", "/api/image/1700000000000_abcdef.png")
            .with_status(500)
            .create_async()
            .await;

        let api = CustomApiUploader::new(&settings(&server.url(), "")).unwrap();
        assert!(api.delete(&record(Some("abc"))).await);
        assert!(!api.delete(&record(None)).await);
        ok.assert_async().await;
    }
}
