//! The player registry: an optimistic read-modify-write loop over the single
//! metadata document of a [`StorageBackend`].
//!
//! Every mutation follows the same cycle:
//!
//! 1. fetch the document together with its [`Revision`],
//! 2. apply the change in memory,
//! 3. write it back, conditional on the revision still being current.
//!
//! When step 3 reports a [`StorageError::Conflict`] the cycle starts over after
//! an exponential backoff, up to [`RetryPolicy::max_attempts`] times. Assets are
//! content addressed and written *before* the document, so a retried cycle never
//! has to upload them again.
//!
//! Deletes and uploads of identical bytes can interleave: an upload may find
//! its asset already present, skip the write, and commit its record after a
//! delete decided that same asset was orphaned. Both sides re-check once their
//! document write landed, the upload re-stores a vanished asset and the delete
//! restores any asset that became referenced again.

use crate::asset::{Asset, AssetKind};
use crate::error::*;
use crate::player::*;
use crate::traits::*;
use crate::validate;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of fetch-merge-write cycles, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, conflicts are returned to the caller as is.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How many entries a player's history keeps.
    ///
    /// Defaults to `10`.
    pub history_limit: usize,
    /// Largest accepted asset in bytes.
    ///
    /// Defaults to 1 MiB.
    pub max_asset_size: usize,
    pub retry: RetryPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            max_asset_size: 1024 * 1024,
            retry: RetryPolicy::default(),
        }
    }
}

/// A parsed document plus the revision it was read at.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub document: MetadataDocument,
    /// `None` when the document does not exist yet.
    pub revision: Option<Revision>,
}

/// An incoming, not yet validated upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub username: String,
    pub uuid: Option<String>,
    pub kind: AssetKind,
    pub data: Bytes,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub username: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub hash: String,
    pub path: String,
    pub size: u64,
    /// `false` when identical bytes were already stored.
    pub stored: bool,
    /// `false` when the player already had this exact asset.
    pub changed: bool,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub players: usize,
    pub skins: usize,
    pub capes: usize,
    pub history_entries: usize,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeSummary {
    pub players_removed: usize,
    pub assets_removed: Vec<String>,
}

#[derive(Clone)]
pub struct PlayerRegistry<S: StorageBackend> {
    storage: S,
    config: RegistryConfig,
}

impl<S: StorageBackend> PlayerRegistry<S> {
    pub fn new(storage: S, config: RegistryConfig) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Reads and parses the metadata document.
    ///
    /// A missing document is an empty one. A document that exists but does not
    /// parse is an error, never "empty": writing on top of it would drop every
    /// player.
    pub async fn fetch_document(&self) -> Result<Snapshot, StorageError> {
        match self.storage.read_document().await? {
            None => {
                debug!("No metadata document yet, starting empty");
                Ok(Snapshot::default())
            }
            Some(StoredDocument { data, revision }) => {
                let document = serde_json::from_slice(&data).map_err(|e| {
                    error!(%revision, "Metadata document is not valid JSON: {e}");
                    StorageError::Serialization(e)
                })?;
                Ok(Snapshot {
                    document,
                    revision: Some(revision),
                })
            }
        }
    }

    pub async fn fetch_asset(&self, path: &str) -> Result<Option<Bytes>, StorageError> {
        self.storage.read_asset(path).await
    }

    /// One conditional write of the full document, without any retry.
    pub async fn upsert_document(
        &self,
        document: &MetadataDocument,
        expected: Option<&Revision>,
        message: &str,
    ) -> Result<Revision, StorageError> {
        let data = Bytes::from(serde_json::to_vec_pretty(document)?);
        self.storage.write_document(data, expected, message).await
    }

    /// Returns `true` when the asset was not stored before.
    ///
    /// Conflicts (a git branch moving under a commit) are retried with the
    /// same backoff as document writes.
    pub async fn store_asset(&self, asset: &Asset) -> Result<bool, StorageError> {
        let path = asset.path();
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.storage.write_asset(&path, asset.data.clone()).await {
                Err(e) if e.is_conflict() && attempt + 1 < max_attempts => {
                    let delay = self.config.retry.delay(attempt);
                    warn!(%path, attempt = attempt + 1, ?delay, "Asset write conflicted, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Runs `mutate` against the latest document and writes the result back,
    /// starting over on revision conflicts.
    ///
    /// `mutate` may run several times and must only depend on its argument.
    /// `operation` doubles as the commit message of the write.
    /// Returns the document as written together with the closure's output.
    pub async fn reconcile<T, F>(
        &self,
        operation: &str,
        mut mutate: F,
    ) -> Result<(MetadataDocument, T), RegistryError>
    where
        T: Send,
        F: FnMut(&mut MetadataDocument) -> Result<T, RegistryError> + Send,
    {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let message = format!("{operation} ({})", self.storage.document_path());
        let mut attempt = 0;

        loop {
            let Snapshot {
                mut document,
                revision,
            } = self.fetch_document().await?;
            let output = mutate(&mut document)?;

            match self
                .upsert_document(&document, revision.as_ref(), &message)
                .await
            {
                Ok(new_revision) => {
                    debug!(operation, %new_revision, attempt, "Metadata document written");
                    return Ok((document, output));
                }
                Err(e) if e.is_conflict() && attempt + 1 < max_attempts => {
                    let delay = self.config.retry.delay(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        ?delay,
                        "Metadata document changed underneath us, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(operation, attempts = attempt + 1, "Metadata write failed: {e}");
                    return Err(e.into());
                }
            }
        }
    }

    /// Runs every check an upload has to pass, without touching the store.
    pub fn validate(&self, upload: &Upload) -> Result<(), ValidationError> {
        validate::username(&upload.username)?;
        validate::optional_uuid(upload.uuid.as_deref())?;
        Asset::new(upload.kind, upload.data.clone(), self.config.max_asset_size).map(|_| ())
    }

    /// Validates, stores and records an upload.
    ///
    /// Nothing is written to the store unless every check passed.
    #[instrument(skip(self, upload), fields(username = %upload.username, kind = %upload.kind))]
    pub async fn upload(&self, upload: Upload) -> Result<UploadReceipt, RegistryError> {
        let username = validate::username(&upload.username)?;
        let uuid = validate::optional_uuid(upload.uuid.as_deref())?;
        let asset = Asset::new(upload.kind, upload.data, self.config.max_asset_size)?;
        let key = validate::player_key(&username);

        let stored = self.store_asset(&asset).await?;
        debug!(hash = %asset.hash, stored, "Asset stored");

        let uploaded_at = Utc::now();
        let asset_ref = AssetRef::new(&asset, uploaded_at);
        let history_limit = self.config.history_limit;

        let operation = format!("Update {} of {username}", asset.kind);
        let (_, changed) = self
            .reconcile(&operation, |document| {
                let record = document
                    .players
                    .entry(key.clone())
                    .or_insert_with(|| PlayerRecord::new(username.clone(), uploaded_at));
                record.username = username.clone();
                if uuid.is_some() {
                    record.uuid = uuid.clone();
                }
                Ok(record.apply(asset.kind, asset_ref.clone(), history_limit))
            })
            .await?;

        if self.fetch_asset(&asset_ref.path).await?.is_none() {
            warn!(
                path = %asset_ref.path,
                "Asset vanished before its record landed, storing it again"
            );
            self.store_asset(&asset).await?;
        }

        info!(hash = %asset.hash, changed, "Upload recorded");

        Ok(UploadReceipt {
            username,
            kind: asset.kind,
            hash: asset_ref.hash,
            path: asset_ref.path,
            size: asset_ref.size,
            stored,
            changed,
            uploaded_at,
        })
    }

    pub async fn document(&self) -> Result<MetadataDocument, RegistryError> {
        Ok(self.fetch_document().await?.document)
    }

    pub async fn player(&self, username: &str) -> Result<Option<PlayerRecord>, RegistryError> {
        let key = validate::player_key(&validate::username(username)?);
        let mut document = self.document().await?;
        Ok(document.players.remove(&key))
    }

    pub async fn players(&self) -> Result<Vec<PlayerSummary>, RegistryError> {
        let document = self.document().await?;
        Ok(document.players.values().map(PlayerSummary::from).collect())
    }

    /// The current asset of a player together with its bytes.
    ///
    /// `None` for unknown players, players without an asset of this kind, and
    /// records pointing at an asset that is gone from the store.
    pub async fn current_asset(
        &self,
        username: &str,
        kind: AssetKind,
    ) -> Result<Option<(AssetRef, Bytes)>, RegistryError> {
        let Some(asset) = self
            .player(username)
            .await?
            .and_then(|record| record.current(kind).cloned())
        else {
            return Ok(None);
        };

        match self.fetch_asset(&asset.path).await? {
            Some(data) => Ok(Some((asset, data))),
            None => {
                warn!(path = %asset.path, "Player record references a missing asset");
                Ok(None)
            }
        }
    }

    pub async fn stats(&self) -> Result<RegistryStats, RegistryError> {
        let document = self.document().await?;
        let records = document.players.values();

        Ok(RegistryStats {
            players: document.len(),
            skins: records.clone().filter(|r| r.skin.is_some()).count(),
            capes: records.clone().filter(|r| r.cape.is_some()).count(),
            history_entries: records.clone().map(|r| r.history.len()).sum(),
            last_update: records.map(|r| r.updated_at).max(),
        })
    }

    /// Removes a player and every asset no other player still references.
    #[instrument(skip(self))]
    pub async fn delete_player(&self, username: &str) -> Result<PurgeSummary, RegistryError> {
        let key = validate::player_key(&validate::username(username)?);

        let operation = format!("Delete {username}");
        let (document, removed) = self
            .reconcile(&operation, |document| {
                document
                    .players
                    .remove(&key)
                    .ok_or_else(|| RegistryError::NotFound(username.to_string()))
            })
            .await?;

        let still_referenced = document.referenced_paths();
        let orphaned: Vec<String> = removed
            .asset_paths()
            .into_iter()
            .filter(|path| !still_referenced.contains(path))
            .collect();

        let assets_removed = self.purge_assets(orphaned).await;
        info!(assets = assets_removed.len(), "Player deleted");

        Ok(PurgeSummary {
            players_removed: 1,
            assets_removed,
        })
    }

    /// Empties the document and deletes every asset it referenced.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<PurgeSummary, RegistryError> {
        let (_, previous) = self
            .reconcile("Reset players", |document| Ok(std::mem::take(document)))
            .await?;

        let assets_removed = self
            .purge_assets(previous.referenced_paths().into_iter().collect())
            .await;
        warn!(
            players = previous.len(),
            assets = assets_removed.len(),
            "Registry reset"
        );

        Ok(PurgeSummary {
            players_removed: previous.len(),
            assets_removed,
        })
    }

    /// Deletes assets that were unreferenced when the document was written and
    /// returns the paths that stay deleted.
    ///
    /// Best effort: the metadata is already gone, so failures are only logged.
    /// Assets referenced again by the time the deletes are done are written
    /// back from the copy read before deleting them.
    async fn purge_assets(&self, paths: Vec<String>) -> Vec<String> {
        let mut deleted = Vec::with_capacity(paths.len());
        for path in paths {
            let data = match self.storage.read_asset(&path).await {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(e) => {
                    error!(%path, "Failed to read asset before deleting it: {e}");
                    continue;
                }
            };
            match self.storage.delete_asset(&path).await {
                Ok(()) => deleted.push((path, data)),
                Err(e) => error!(%path, "Failed to delete asset: {e}"),
            }
        }
        if deleted.is_empty() {
            return Vec::new();
        }

        let referenced = match self.fetch_document().await {
            Ok(snapshot) => snapshot.document.referenced_paths(),
            Err(e) => {
                error!("Could not recheck deleted assets against the document: {e}");
                return deleted.into_iter().map(|(path, _)| path).collect();
            }
        };

        let mut removed = Vec::with_capacity(deleted.len());
        for (path, data) in deleted {
            if !referenced.contains(&path) {
                removed.push(path);
                continue;
            }
            warn!(%path, "Deleted asset is referenced again, restoring it");
            if let Err(e) = self.storage.write_asset(&path, data).await {
                error!(%path, "Failed to restore asset: {e}");
            }
        }
        removed
    }
}
