use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;

use super::{BlobStore, StorageError};

/// In-process blob store. Links are unsigned and only meaningful to tests.
pub struct MemoryBlobStore {
    base_url: String,
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    failing_deletes: RwLock<HashSet<String>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            blobs: RwLock::new(BTreeMap::new()),
            failing_deletes: RwLock::new(HashSet::new()),
        }
    }

    pub async fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.blobs.read().await.keys().cloned().collect()
    }

    /// Makes every later `delete(name)` fail.
    pub async fn fail_deletes_of(&self, name: &str) {
        self.failing_deletes.write().await.insert(name.to_string());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, _content_type: &str) -> Result<(), StorageError> {
        self.blobs.write().await.insert(name.to_string(), bytes);
        Ok(())
    }

    fn signed_read_url(
        &self,
        name: &str,
        _start: DateTime<Utc>,
        expiry: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        Ok(format!(
            "{}/{}?se={}",
            self.base_url,
            urlencoding::encode(name),
            expiry.timestamp()
        ))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let blobs = self.blobs.read().await;
        Ok(blobs
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        if self.failing_deletes.read().await.contains(name) {
            return Err(StorageError::Status {
                operation: "delete",
                status: 500,
                body: "injected failure".into(),
            });
        }
        match self.blobs.write().await.remove(name) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(name.to_string())),
        }
    }

    fn describe(&self) -> String {
        format!("memory ({})", self.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_filters_by_prefix_in_name_order() {
        let store = MemoryBlobStore::new("mem://decks/");
        for name in ["b/AzureUpdate-2", "a/other", "b/AzureUpdate-1"] {
            store.put(name, Vec::new(), "x").await.unwrap();
        }

        assert_eq!(
            store.list("b/AzureUpdate-").await.unwrap(),
            vec!["b/AzureUpdate-1", "b/AzureUpdate-2"]
        );
    }

    #[tokio::test]
    async fn delete_missing_and_injected_failures() {
        let store = MemoryBlobStore::new("mem://decks");
        store.put("keep", vec![1], "x").await.unwrap();
        store.fail_deletes_of("keep").await;

        assert!(matches!(store.delete("keep").await, Err(StorageError::Status { .. })));
        assert!(matches!(store.delete("gone").await, Err(StorageError::NotFound(_))));
        assert_eq!(store.names().await, vec!["keep"]);
    }
}
