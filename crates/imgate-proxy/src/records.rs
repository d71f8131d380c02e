use crate::error::ProxyResult;
use async_trait::async_trait;
use imgate_core::StoredImageRecord;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Lookup and removal of persisted image rows.
///
/// The metadata store itself lives outside this crate.
#[async_trait]
pub trait ImageRecordStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> ProxyResult<Option<StoredImageRecord>>;

    /// Record whose image or thumbnail URL equals `path`.
    async fn find_by_path(&self, path: &str) -> ProxyResult<Option<StoredImageRecord>>;

    async fn remove(&self, id: i64) -> ProxyResult<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<i64, StoredImageRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: StoredImageRecord) {
        self.records.write().await.insert(record.id, record);
    }
}

#[async_trait]
impl ImageRecordStore for InMemoryRecordStore {
    async fn find_by_id(&self, id: i64) -> ProxyResult<Option<StoredImageRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_path(&self, path: &str) -> ProxyResult<Option<StoredImageRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.url == path || (r.has_thumbnail() && r.thumbnail_url == path))
            .cloned())
    }

    async fn remove(&self, id: i64) -> ProxyResult<()> {
        self.records.write().await.remove(&id);
        Ok(())
    }
}
