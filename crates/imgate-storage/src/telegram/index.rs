use crate::traits::StorageResult;
use async_trait::async_trait;
use imgate_core::TelegramFileRecord;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Auxiliary store mapping a unique file name to its Telegram identifiers.
///
/// Persistence belongs to the embedding application; the in-memory index serves tests and
/// single-process deployments.
#[async_trait]
pub trait TelegramFileIndex: Send + Sync {
    async fn save(&self, record: TelegramFileRecord) -> StorageResult<()>;

    async fn find(&self, file_name: &str) -> StorageResult<Option<TelegramFileRecord>>;

    async fn remove(&self, file_name: &str) -> StorageResult<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryTelegramIndex {
    records: RwLock<HashMap<String, TelegramFileRecord>>,
}

impl InMemoryTelegramIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TelegramFileIndex for InMemoryTelegramIndex {
    async fn save(&self, record: TelegramFileRecord) -> StorageResult<()> {
        self.records
            .write()
            .await
            .insert(record.file_name.clone(), record);
        Ok(())
    }

    async fn find(&self, file_name: &str) -> StorageResult<Option<TelegramFileRecord>> {
        Ok(self.records.read().await.get(file_name).cloned())
    }

    async fn remove(&self, file_name: &str) -> StorageResult<()> {
        self.records.write().await.remove(file_name);
        Ok(())
    }
}
