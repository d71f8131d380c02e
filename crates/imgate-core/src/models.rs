use crate::storage_types::StorageType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Result returned by every storage backend after a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResult {
    pub success: bool,
    pub message: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    /// Always set on success.
    pub url: String,
    /// Empty when thumbnails are disabled or the thumbnail step failed.
    pub thumbnail_url: String,
    pub storage: StorageType,
    pub created_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    /// Opaque identifier issued by a remote API, needed to delete the object later.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl UploadResult {
    pub fn has_thumbnail(&self) -> bool {
        !self.thumbnail_url.is_empty()
    }

    /// Build the persisted record for this upload.
    pub fn into_record(self, id: i64, owner: Uuid, fingerprint: String) -> StoredImageRecord {
        StoredImageRecord {
            id,
            url: self.url,
            thumbnail_url: self.thumbnail_url,
            file_name: self.file_name,
            file_size: self.file_size,
            mime_type: self.mime_type,
            width: self.width,
            height: self.height,
            storage: self.storage,
            owner,
            fingerprint,
            remote_id: self.remote_id,
            created_at: self.created_at,
        }
    }
}

/// Image row as persisted by the external metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImageRecord {
    pub id: i64,
    pub url: String,
    pub thumbnail_url: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub storage: StorageType,
    pub owner: Uuid,
    pub fingerprint: String,
    #[serde(default)]
    pub remote_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredImageRecord {
    pub fn has_thumbnail(&self) -> bool {
        !self.thumbnail_url.is_empty()
    }
}

/// Auxiliary Telegram identifiers, keyed by the unique file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramFileRecord {
    pub file_name: String,
    pub file_id: String,
    pub thumbnail_file_id: String,
    pub message_id: i64,
    pub thumbnail_message_id: i64,
}
