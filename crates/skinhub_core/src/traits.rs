use crate::error::*;

use bytes::Bytes;
use std::fmt;

/// Opaque version token of a stored document (a git blob sha, a content
/// hash or a counter, depending on the backend).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(pub String);

impl Revision {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub data: Bytes,
    pub revision: Revision,
}

/// A content store holding one metadata document plus binary assets.
///
/// Backends are not required to support transactions; the only guarantee
/// asked of them is that [`write_document`](Self::write_document) is a
/// compare-and-swap on the document revision.
pub trait StorageBackend: Send + Sync + 'static + Clone {
    /// `None` when the document does not exist yet.
    fn read_document(
        &self,
    ) -> impl Future<Output = Result<Option<StoredDocument>, StorageError>> + Send;

    /// Replaces the document if its current revision equals `expected`.
    /// `expected == None` only succeeds when no document exists.
    ///
    /// Returns [`StorageError::Conflict`] when the document moved on.
    ///
    /// `message` names the change, backends that keep a history (git) record it.
    fn write_document(
        &self,
        data: Bytes,
        expected: Option<&Revision>,
        message: &str,
    ) -> impl Future<Output = Result<Revision, StorageError>> + Send;

    fn read_asset(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<Bytes>, StorageError>> + Send;

    /// Returns `false` when an asset already existed at `path`.
    fn write_asset(
        &self,
        path: &str,
        data: Bytes,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Deleting a missing asset is not an error.
    fn delete_asset(&self, path: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn document_path(&self) -> &str {
        "players.json"
    }
}
