//! Telegram backend
//!
//! Images are sent as photos to a chat; the returned `file_id` and `message_id` are kept in
//! a [`TelegramFileIndex`] keyed by the unique file name. Reads resolve the `file_id` again on
//! every request.

mod client;
mod index;
mod notice;

pub use client::{
    parse_file_id, SentPhoto, TelegramClient, DEFAULT_API_BASE, DOWNLOAD_TIMEOUT,
    MAX_PHOTO_BYTES, UPLOAD_TIMEOUT,
};
pub use index::{InMemoryTelegramIndex, TelegramFileIndex};
pub use notice::{notify_upload, render_notice, NoticeData, DEFAULT_NOTICE_TEMPLATE};

use crate::keys::{file_name_of, is_thumbnail_path, ObjectKeys};
use crate::traits::{
    stored_result, FetchedObject, FileInput, ImageUploader, StorageError, StorageResult,
    UploadContext,
};
use async_trait::async_trait;
use futures::StreamExt;
use imgate_core::{
    StorageType, StoredImageRecord, TelegramFileRecord, TelegramSettings, UploadResult,
};
use std::sync::Arc;
use std::time::Instant;

pub struct TelegramUploader {
    client: TelegramClient,
    chat_id: String,
    index: Arc<dyn TelegramFileIndex>,
}

impl TelegramUploader {
    /// Uploads go to the first configured receiver.
    pub fn new(settings: &TelegramSettings, index: Arc<dyn TelegramFileIndex>) -> StorageResult<Self> {
        let client = TelegramClient::new(&settings.bot_token)?;
        let chat_id = settings
            .receivers_list()
            .into_iter()
            .next()
            .ok_or_else(|| {
                StorageError::ConfigError("telegram receivers not configured".to_string())
            })?;
        Ok(Self::with_client(client, chat_id, index))
    }

    pub fn with_client(
        client: TelegramClient,
        chat_id: impl Into<String>,
        index: Arc<dyn TelegramFileIndex>,
    ) -> Self {
        Self {
            client,
            chat_id: chat_id.into(),
            index,
        }
    }
}

#[async_trait]
impl ImageUploader for TelegramUploader {
    async fn upload(&self, ctx: &UploadContext, file: FileInput) -> StorageResult<UploadResult> {
        let processed = ctx.process(file).await?;
        let name = processed.unique_file_name.clone();
        let keys = ObjectKeys::new(&name);
        let start = Instant::now();

        let main = self
            .client
            .send_photo(
                &self.chat_id,
                processed.compressed_bytes.clone(),
                &name,
                &format!("Uploaded image: {}", name),
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, file_name = %name, "Telegram upload failed");
                e
            })?;

        let thumbnail = match &processed.thumbnail_bytes {
            Some(thumb) => match self
                .client
                .send_photo(
                    &self.chat_id,
                    thumb.clone(),
                    &format!("thumbnail_{}", name),
                    &format!("Thumbnail: {}", name),
                )
                .await
            {
                Ok(sent) => Some(sent),
                Err(e) => {
                    tracing::warn!(error = %e, file_name = %name, "Telegram thumbnail upload failed");
                    None
                }
            },
            None => None,
        };

        let record = TelegramFileRecord {
            file_name: name.clone(),
            file_id: main.file_id,
            thumbnail_file_id: thumbnail
                .as_ref()
                .map(|t| t.file_id.clone())
                .unwrap_or_default(),
            message_id: main.message_id,
            thumbnail_message_id: thumbnail.as_ref().map(|t| t.message_id).unwrap_or_default(),
        };
        self.index.save(record).await?;

        tracing::info!(
            file_name = %name,
            message_id = main.message_id,
            size_bytes = processed.compressed_size(),
            has_thumbnail = thumbnail.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Telegram upload successful"
        );

        Ok(stored_result(
            &processed,
            &keys,
            thumbnail.is_some(),
            StorageType::Telegram,
            "Telegram upload successful",
        ))
    }

    async fn delete(&self, record: &StoredImageRecord) -> bool {
        let entry = match self.index.find(&record.file_name).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::warn!(file_name = %record.file_name, "No telegram record for image");
                return false;
            }
            Err(e) => {
                tracing::error!(error = %e, file_name = %record.file_name, "Telegram index lookup failed");
                return false;
            }
        };

        let removed = match self.client.delete_message(&self.chat_id, entry.message_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, message_id = entry.message_id, "Telegram delete failed");
                false
            }
        };

        if entry.thumbnail_message_id > 0 {
            if let Err(e) = self
                .client
                .delete_message(&self.chat_id, entry.thumbnail_message_id)
                .await
            {
                tracing::warn!(
                    error = %e,
                    message_id = entry.thumbnail_message_id,
                    "Telegram thumbnail delete failed"
                );
            }
        }

        if removed {
            if let Err(e) = self.index.remove(&record.file_name).await {
                tracing::warn!(error = %e, file_name = %record.file_name, "Telegram index cleanup failed");
            }
        }
        removed
    }

    async fn fetch(&self, path: &str) -> StorageResult<FetchedObject> {
        let name = file_name_of(path);
        let entry = self
            .index
            .find(name)
            .await?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        let file_id = if is_thumbnail_path(path) && !entry.thumbnail_file_id.is_empty() {
            entry.thumbnail_file_id
        } else {
            entry.file_id
        };

        let start = Instant::now();
        let response = self.client.open_file(&file_id).await?;
        let content_length = response.content_length();

        let name = name.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| {
                tracing::error!(
                    error = %e,
                    file_name = %name,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Telegram stream error"
                );
                StorageError::from(e)
            })
        });

        Ok(FetchedObject {
            stream: Box::pin(stream),
            content_length,
        })
    }

    fn storage_type(&self) -> StorageType {
        StorageType::Telegram
    }
}
