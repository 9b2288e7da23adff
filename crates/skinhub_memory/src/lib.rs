use skinhub_core::prelude::*;

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct Inner {
    document: Option<(Bytes, u64)>,
    assets: HashMap<String, Bytes>,
}

/// Keeps everything in process memory. Revisions are a counter bumped on
/// every document write.
///
/// Don't use this in production! Data is gone when the process exits.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored assets.
    pub async fn asset_count(&self) -> usize {
        self.inner.read().await.assets.len()
    }
}

impl StorageBackend for MemoryStorage {
    async fn read_document(&self) -> Result<Option<StoredDocument>, StorageError> {
        let inner = self.inner.read().await;
        Ok(inner.document.as_ref().map(|(data, rev)| StoredDocument {
            data: data.clone(),
            revision: Revision(rev.to_string()),
        }))
    }

    async fn write_document(
        &self,
        data: Bytes,
        expected: Option<&Revision>,
        _message: &str,
    ) -> Result<Revision, StorageError> {
        let mut inner = self.inner.write().await;
        let current = inner.document.as_ref().map(|(_, rev)| *rev);

        let matches = match (current, expected) {
            (None, None) => true,
            (Some(current), Some(expected)) => current.to_string() == expected.as_str(),
            _ => false,
        };
        if !matches {
            debug!(?current, ?expected, "Stale document revision");
            return Err(StorageError::Conflict(self.document_path().to_string()));
        }

        let next = current.map_or(1, |rev| rev + 1);
        inner.document = Some((data, next));
        Ok(Revision(next.to_string()))
    }

    async fn read_asset(&self, path: &str) -> Result<Option<Bytes>, StorageError> {
        Ok(self.inner.read().await.assets.get(path).cloned())
    }

    async fn write_asset(&self, path: &str, data: Bytes) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().await;
        if inner.assets.contains_key(path) {
            return Ok(false);
        }
        inner.assets.insert(path.to_string(), data);
        Ok(true)
    }

    async fn delete_asset(&self, path: &str) -> Result<(), StorageError> {
        self.inner.write().await.assets.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_only_write_fails_once_a_document_exists() {
        let storage = MemoryStorage::new();
        let rev = storage
            .write_document(Bytes::from_static(b"{}"), None, "Update players.json")
            .await
            .unwrap();

        let err = storage
            .write_document(Bytes::from_static(b"{}"), None, "Update players.json")
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let next = storage
            .write_document(Bytes::from_static(b"{\"a\":1}"), Some(&rev), "Update players.json")
            .await
            .unwrap();
        assert_ne!(rev, next);

        let stale = storage
            .write_document(Bytes::from_static(b"{}"), Some(&rev), "Update players.json")
            .await
            .unwrap_err();
        assert!(stale.is_conflict());
    }

    #[tokio::test]
    async fn assets_are_write_once() {
        let storage = MemoryStorage::new();
        assert!(storage.write_asset("skins/a.png", Bytes::from_static(b"1")).await.unwrap());
        assert!(!storage.write_asset("skins/a.png", Bytes::from_static(b"2")).await.unwrap());
        assert_eq!(
            storage.read_asset("skins/a.png").await.unwrap().unwrap(),
            Bytes::from_static(b"1")
        );

        storage.delete_asset("skins/a.png").await.unwrap();
        storage.delete_asset("skins/a.png").await.unwrap();
        assert!(storage.read_asset("skins/a.png").await.unwrap().is_none());
    }
}
