#[cfg(feature = "storage-custom")]
use crate::CustomApiUploader;
#[cfg(feature = "storage-ftp")]
use crate::FtpUploader;
#[cfg(feature = "storage-local")]
use crate::LocalUploader;
#[cfg(feature = "storage-s3")]
use crate::S3Uploader;
#[cfg(feature = "storage-webdav")]
use crate::WebDavUploader;
#[cfg(feature = "storage-telegram")]
use crate::{InMemoryTelegramIndex, TelegramClient, TelegramFileIndex, TelegramUploader};
use crate::{ImageUploader, StorageError, StorageResult};
use imgate_core::{Settings, StorageType};
use std::path::PathBuf;
use std::sync::Arc;

/// Process-wide collaborators the backends need besides the settings snapshot.
#[derive(Clone)]
pub struct StorageDeps {
    /// Root the local backend writes `uploads/` under.
    pub upload_root: PathBuf,
    #[cfg(feature = "storage-telegram")]
    pub telegram_index: Arc<dyn TelegramFileIndex>,
    /// Bot API base override.
    pub telegram_api_base: Option<String>,
}

impl StorageDeps {
    pub fn new(upload_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            #[cfg(feature = "storage-telegram")]
            telegram_index: Arc::new(InMemoryTelegramIndex::new()),
            telegram_api_base: None,
        }
    }

    #[cfg(feature = "storage-telegram")]
    pub fn with_telegram_index(mut self, index: Arc<dyn TelegramFileIndex>) -> Self {
        self.telegram_index = index;
        self
    }

    pub fn with_telegram_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.telegram_api_base = Some(api_base.into());
        self
    }

    /// Bot client for `token` honouring the API base override.
    #[cfg(feature = "storage-telegram")]
    pub fn telegram_client(&self, token: &str) -> StorageResult<TelegramClient> {
        let client = TelegramClient::new(token)?;
        Ok(match &self.telegram_api_base {
            Some(base) => client.with_api_base(base.clone()),
            None => client,
        })
    }
}

/// Create the backend for `storage_type` from the credential blocks in `settings`.
///
/// Missing credentials fail here, before any network call.
pub async fn create_uploader(
    storage_type: StorageType,
    settings: &Settings,
    deps: &StorageDeps,
) -> StorageResult<Arc<dyn ImageUploader>> {
    match storage_type {
        #[cfg(feature = "storage-local")]
        StorageType::Default => {
            let storage = LocalUploader::new(deps.upload_root.clone()).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageType::Default => Err(disabled("local", "storage-local")),

        #[cfg(feature = "storage-s3")]
        StorageType::S3 | StorageType::R2 => {
            let storage = S3Uploader::new(&settings.s3, storage_type)?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageType::S3 | StorageType::R2 => Err(disabled("S3", "storage-s3")),

        #[cfg(feature = "storage-webdav")]
        StorageType::WebDav => {
            let storage = WebDavUploader::new(&settings.webdav)?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-webdav"))]
        StorageType::WebDav => Err(disabled("WebDAV", "storage-webdav")),

        #[cfg(feature = "storage-ftp")]
        StorageType::Ftp => {
            let storage = FtpUploader::new(&settings.ftp)?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-ftp"))]
        StorageType::Ftp => Err(disabled("FTP", "storage-ftp")),

        #[cfg(feature = "storage-telegram")]
        StorageType::Telegram => {
            let chat_id = settings
                .telegram
                .receivers_list()
                .into_iter()
                .next()
                .ok_or_else(|| {
                    StorageError::ConfigError("telegram receivers not configured".to_string())
                })?;
            let client = deps.telegram_client(&settings.telegram.bot_token)?;
            let storage = TelegramUploader::with_client(client, chat_id, deps.telegram_index.clone());
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-telegram"))]
        StorageType::Telegram => Err(disabled("Telegram", "storage-telegram")),

        #[cfg(feature = "storage-custom")]
        StorageType::Custom => {
            let storage = CustomApiUploader::new(&settings.custom_api)?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-custom"))]
        StorageType::Custom => Err(disabled("custom API", "storage-custom")),
    }
}

#[allow(dead_code)]
fn disabled(backend: &str, feature: &str) -> StorageError {
    StorageError::ConfigError(format!(
        "{} storage backend not available ({} feature not enabled)",
        backend, feature
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_default_backend_uses_upload_root() {
        let dir = tempdir().unwrap();
        let deps = StorageDeps::new(dir.path());

        let uploader = create_uploader(StorageType::Default, &Settings::default(), &deps)
            .await
            .unwrap();
        assert_eq!(uploader.storage_type(), StorageType::Default);
    }

    #[tokio::test]
    async fn test_incomplete_credentials_fail_before_network() {
        let deps = StorageDeps::new(std::env::temp_dir());
        let settings = Settings::default();

        for storage_type in [
            StorageType::S3,
            StorageType::R2,
            StorageType::WebDav,
            StorageType::Ftp,
            StorageType::Telegram,
            StorageType::Custom,
        ] {
            let result = create_uploader(storage_type, &settings, &deps).await;
            assert!(
                matches!(result, Err(StorageError::ConfigError(_))),
                "{} should need credentials",
                storage_type
            );
        }
    }
}
