//! # skinhub FileSystem Storage
//!
//! A local filesystem backend for skinhub.
//!
//! This crate implements the [`StorageBackend`] trait, storing the player
//! document and the PNG assets directly in a directory:
//!
//! ```text
//! <root>/players.json
//! <root>/skins/<sha256>.png
//! <root>/capes/<sha256>.png
//! ```
//!
//! ## Features
//!
//! * **Atomic Writes**: Uses temporary files and rename operations so a crash never leaves a half written document or asset.
//! * **Revisions**: The document revision is the SHA256 of its bytes. Conditional writes are
//!   serialized by a lock held by every clone of the storage, so they are only safe while a
//!   single process owns the directory.
//!
//! ## Usage
//!
//! ```no_run
//! use skinhub_fs::FileSystemStorage;
//!
//! let storage = FileSystemStorage::new("./skinhub_data");
//! ```

use skinhub_core::asset::content_hash;
use skinhub_core::prelude::*;

use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Every write goes through its own temporary file, concurrent writers of the
/// same path each rename a complete file into place.
async fn atomic_write(path: &Path, data: Bytes) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(StorageError::Io)?;
    }

    let tmp_path = path.with_extension(format!(
        "{}.{}.tmp",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    fs::write(&tmp_path, data).await.map_err(StorageError::Io)?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(StorageError::Io(e));
    }

    Ok(())
}

async fn read_optional(path: &Path) -> Result<Option<Bytes>, StorageError> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(Bytes::from(data))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

#[derive(Clone)]
pub struct FileSystemStorage {
    root: PathBuf,
    document_lock: Arc<Mutex<()>>,
}

impl FileSystemStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            root: path.into(),
            document_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Resolves a store relative path, refusing anything that would leave the root.
    fn get_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            warn!(path, "Rejected asset path outside of the storage root");
            return Err(StorageError::Generic(format!("Invalid asset path: {path}")));
        }
        Ok(self.root.join(relative))
    }

    fn document_file(&self) -> PathBuf {
        self.root.join(self.document_path())
    }
}

impl StorageBackend for FileSystemStorage {
    async fn read_document(&self) -> Result<Option<StoredDocument>, StorageError> {
        Ok(read_optional(&self.document_file())
            .await?
            .map(|data| StoredDocument {
                revision: Revision(content_hash(&data)),
                data,
            }))
    }

    async fn write_document(
        &self,
        data: Bytes,
        expected: Option<&Revision>,
        _message: &str,
    ) -> Result<Revision, StorageError> {
        let _guard = self.document_lock.lock().await;
        let path = self.document_file();

        let current = read_optional(&path)
            .await?
            .map(|data| Revision(content_hash(&data)));
        if current.as_ref() != expected {
            debug!(?current, ?expected, "Stale document revision");
            return Err(StorageError::Conflict(self.document_path().to_string()));
        }

        let revision = Revision(content_hash(&data));
        atomic_write(&path, data).await?;
        Ok(revision)
    }

    async fn read_asset(&self, path: &str) -> Result<Option<Bytes>, StorageError> {
        read_optional(&self.get_path(path)?).await
    }

    async fn write_asset(&self, path: &str, data: Bytes) -> Result<bool, StorageError> {
        let path = self.get_path(path)?;
        if fs::try_exists(&path).await.map_err(StorageError::Io)? {
            return Ok(false);
        }
        atomic_write(&path, data).await?;
        Ok(true)
    }

    async fn delete_asset(&self, path: &str) -> Result<(), StorageError> {
        let path = self.get_path(path)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}
