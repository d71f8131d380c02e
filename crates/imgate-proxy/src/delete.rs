use crate::error::{ProxyError, ProxyResult};
use crate::records::ImageRecordStore;
use imgate_core::Settings;
use imgate_storage::{create_uploader, StorageDeps};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Object and record are both gone.
    Deleted,
    /// The record is gone but the stored object could not be removed.
    RecordRemovedPhysicalFailed,
}

impl DeleteOutcome {
    pub fn physical_removed(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted)
    }
}

pub struct DeleteService {
    records: Arc<dyn ImageRecordStore>,
    deps: StorageDeps,
}

impl DeleteService {
    pub fn new(records: Arc<dyn ImageRecordStore>, deps: StorageDeps) -> Self {
        Self { records, deps }
    }

    /// Remove the stored object, then the record. The record goes even when the object stays.
    pub async fn delete(&self, id: i64, settings: &Settings) -> ProxyResult<DeleteOutcome> {
        let record = self
            .records
            .find_by_id(id)
            .await?
            .ok_or_else(|| ProxyError::NotFound(format!("image {}", id)))?;

        let physical = match create_uploader(record.storage, settings, &self.deps).await {
            Ok(uploader) => uploader.delete(&record).await,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    image_id = id,
                    storage = %record.storage,
                    "No backend for stored image"
                );
                false
            }
        };

        self.records.remove(id).await?;

        let outcome = if physical {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::RecordRemovedPhysicalFailed
        };
        tracing::info!(
            image_id = id,
            storage = %record.storage,
            file_name = %record.file_name,
            physical_removed = physical,
            "Image deleted"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::InMemoryRecordStore;
    use chrono::Utc;
    use imgate_core::{StorageType, StoredImageRecord};

    fn record(id: i64, storage: StorageType) -> StoredImageRecord {
        StoredImageRecord {
            id,
            url: "/uploads/2024/05/a.webp".to_string(),
            thumbnail_url: "/uploads/2024/05/thumbnails/a.webp".to_string(),
            file_name: "a.webp".to_string(),
            file_size: 4,
            mime_type: "image/webp".to_string(),
            width: 1,
            height: 1,
            storage,
            owner: Default::default(),
            fingerprint: String::new(),
            remote_id: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = DeleteService::new(Arc::new(InMemoryRecordStore::new()), StorageDeps::new(dir.path()));
        let err = service.delete(7, &Settings::default()).await.unwrap_err();
        assert!(matches!(err, ProxyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_local_delete_removes_files_and_record() {
        let dir = tempfile::tempdir().unwrap();
        for key in ["uploads/2024/05/a.webp", "uploads/2024/05/thumbnails/a.webp"] {
            let path = dir.path().join(key);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"data").unwrap();
        }

        let store = Arc::new(InMemoryRecordStore::new());
        store.insert(record(1, StorageType::Default)).await;
        let service = DeleteService::new(store.clone(), StorageDeps::new(dir.path()));

        let outcome = service.delete(1, &Settings::default()).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert!(!dir.path().join("uploads/2024/05/a.webp").exists());
        assert!(store.find_by_id(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_backend_still_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert(record(2, StorageType::WebDav)).await;
        let service = DeleteService::new(store.clone(), StorageDeps::new(dir.path()));

        let outcome = service.delete(2, &Settings::default()).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::RecordRemovedPhysicalFailed);
        assert!(!outcome.physical_removed());
        assert!(store.find_by_id(2).await.unwrap().is_none());
    }
}
