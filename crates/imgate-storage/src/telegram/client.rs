//! Telegram Bot API client
//!
//! Covers the five calls the backend needs: `sendPhoto`, `getFile` plus the file download,
//! `deleteMessage` and `sendMessage`. Every call goes through the same [`RetryPolicy`].

use crate::retry::RetryPolicy;
use crate::traits::{StorageError, StorageResult};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(20);
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &str) -> StorageResult<T> {
        if !self.ok {
            return Err(StorageError::RemoteRejected(format!(
                "telegram {} failed [code:{}]: {}",
                method,
                self.error_code.unwrap_or_default(),
                self.description.unwrap_or_default()
            )));
        }
        self.result.ok_or_else(|| {
            StorageError::RemoteRejected(format!("telegram {} returned no result", method))
        })
    }
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct PhotoMessage {
    message_id: i64,
    #[serde(default)]
    photo: Vec<PhotoSize>,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    #[serde(default)]
    file_path: String,
}

/// Identifiers of a sent photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPhoto {
    /// `file_id` of the largest rendition.
    pub file_id: String,
    pub message_id: i64,
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: Client,
    api_base: String,
    token: String,
    retry: RetryPolicy,
    timeout: Duration,
}

impl TelegramClient {
    pub fn new(token: &str) -> StorageResult<Self> {
        if token.trim().is_empty() {
            return Err(StorageError::ConfigError(
                "telegram bot token not configured".to_string(),
            ));
        }

        Ok(Self {
            http: Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            token: token.trim().to_string(),
            retry: RetryPolicy::default(),
            timeout: UPLOAD_TIMEOUT,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> StorageResult<T> {
        let response: ApiResponse<T> = self
            .http
            .post(self.method_url(method))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        response.into_result(method)
    }

    pub async fn send_photo(
        &self,
        chat_id: &str,
        data: Bytes,
        file_name: &str,
        caption: &str,
    ) -> StorageResult<SentPhoto> {
        if data.is_empty() {
            return Err(StorageError::UploadFailed("photo is empty".to_string()));
        }
        if data.len() > MAX_PHOTO_BYTES {
            return Err(StorageError::UploadFailed(format!(
                "photo exceeds {} bytes (got {})",
                MAX_PHOTO_BYTES,
                data.len()
            )));
        }

        self.retry
            .run("sendPhoto", |_| {
                let data = data.clone();
                async move {
                    let mut form = Form::new().text("chat_id", chat_id.to_string());
                    if !caption.is_empty() {
                        form = form.text("caption", caption.to_string());
                    }
                    form = form.part(
                        "photo",
                        Part::bytes(data.to_vec()).file_name(file_name.to_string()),
                    );

                    let response: ApiResponse<PhotoMessage> = self
                        .http
                        .post(self.method_url("sendPhoto"))
                        .timeout(self.timeout)
                        .multipart(form)
                        .send()
                        .await?
                        .json()
                        .await?;
                    let message = response.into_result("sendPhoto")?;
                    let file_id = message
                        .photo
                        .last()
                        .map(|p| p.file_id.clone())
                        .ok_or_else(|| {
                            StorageError::RemoteRejected(
                                "telegram sendPhoto returned no photo sizes".to_string(),
                            )
                        })?;

                    Ok(SentPhoto {
                        file_id,
                        message_id: message.message_id,
                    })
                }
            })
            .await
    }

    /// Resolve a `file_id` and open the download. Both steps are retried together.
    pub async fn open_file(&self, file_id: &str) -> StorageResult<reqwest::Response> {
        let file_id = parse_file_id(file_id);
        if file_id.is_empty() {
            return Err(StorageError::NotFound("empty telegram file id".to_string()));
        }

        self.retry
            .run("getFile", |_| async move {
                let info: FileInfo = self
                    .call_json("getFile", &json!({ "file_id": file_id }))
                    .await?;
                if info.file_path.is_empty() {
                    return Err(StorageError::RemoteRejected(
                        "telegram getFile returned no file_path".to_string(),
                    ));
                }

                let url = format!(
                    "{}/file/bot{}/{}",
                    self.api_base, self.token, info.file_path
                );
                let response = self
                    .http
                    .get(url)
                    .timeout(DOWNLOAD_TIMEOUT)
                    .send()
                    .await?;
                match response.status() {
                    StatusCode::OK => Ok(response),
                    StatusCode::NOT_FOUND => Err(StorageError::NotFound(info.file_path)),
                    other => Err(StorageError::RemoteRejected(format!(
                        "telegram file download returned {}",
                        other
                    ))),
                }
            })
            .await
    }

    pub async fn delete_message(&self, chat_id: &str, message_id: i64) -> StorageResult<()> {
        if message_id <= 0 {
            return Err(StorageError::InvalidKey(format!(
                "invalid telegram message id {}",
                message_id
            )));
        }

        let body = &json!({ "chat_id": chat_id, "message_id": message_id });
        self.retry
            .run("deleteMessage", |_| async move {
                self.call_json::<bool>("deleteMessage", body).await.map(|_| ())
            })
            .await
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> StorageResult<()> {
        if text.is_empty() {
            return Err(StorageError::InvalidKey("message text is empty".to_string()));
        }

        let body = &json!({ "chat_id": chat_id, "text": text });
        self.retry
            .run("sendMessage", |_| async move {
                self.call_json::<serde_json::Value>("sendMessage", body)
                    .await
                    .map(|_| ())
            })
            .await
    }
}

/// Strip the `tg://file?id=` and `/tg/` prefixes some records carry.
pub fn parse_file_id(raw: &str) -> &str {
    raw.strip_prefix("tg://file?id=")
        .or_else(|| raw.strip_prefix("/tg/"))
        .unwrap_or(raw)
}
