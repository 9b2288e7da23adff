use crate::asset::{Asset, AssetKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reference from a player record to a stored asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// The SHA256 hash. This is the filename in the asset storage.
    pub hash: String,

    /// Store path e.g., "skins/<hash>.png".
    pub path: String,

    /// Size in bytes
    pub size: u64,

    pub uploaded_at: DateTime<Utc>,
}

impl AssetRef {
    pub fn new(asset: &Asset, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            hash: asset.hash.clone(),
            path: asset.path(),
            size: asset.size(),
            uploaded_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub hash: String,
    pub path: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Display name as it was last uploaded.
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    pub skin: Option<AssetRef>,
    pub cape: Option<AssetRef>,
    pub updated_at: DateTime<Utc>,

    /// Oldest first, bounded by the registry's history limit.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl PlayerRecord {
    pub fn new(username: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            username: username.into(),
            uuid: None,
            skin: None,
            cape: None,
            updated_at: now,
            history: Vec::new(),
        }
    }

    pub fn current(&self, kind: AssetKind) -> Option<&AssetRef> {
        match kind {
            AssetKind::Skin => self.skin.as_ref(),
            AssetKind::Cape => self.cape.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: AssetKind) -> &mut Option<AssetRef> {
        match kind {
            AssetKind::Skin => &mut self.skin,
            AssetKind::Cape => &mut self.cape,
        }
    }

    /// Makes `asset` the current one of its kind.
    ///
    /// Re-applying the current hash only refreshes `updated_at`.
    /// Returns whether the current reference changed.
    pub fn apply(
        &mut self,
        kind: AssetKind,
        asset: AssetRef,
        history_limit: usize,
    ) -> bool {
        self.updated_at = asset.uploaded_at;

        if self
            .current(kind)
            .is_some_and(|current| current.hash == asset.hash)
        {
            return false;
        }

        self.history.push(HistoryEntry {
            kind,
            hash: asset.hash.clone(),
            path: asset.path.clone(),
            uploaded_at: asset.uploaded_at,
        });
        *self.slot_mut(kind) = Some(asset);

        if self.history.len() > history_limit {
            let excess = self.history.len() - history_limit;
            self.history.drain(..excess);
        }
        true
    }

    /// Every asset path this record points at, current and historical.
    pub fn asset_paths(&self) -> BTreeSet<String> {
        self.skin
            .iter()
            .chain(self.cape.iter())
            .map(|a| a.path.clone())
            .chain(self.history.iter().map(|h| h.path.clone()))
            .collect()
    }
}

/// The whole player database, persisted as one JSON object keyed by
/// lowercased username.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataDocument {
    pub players: BTreeMap<String, PlayerRecord>,
}

impl MetadataDocument {
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn get(&self, key: &str) -> Option<&PlayerRecord> {
        self.players.get(key)
    }

    pub fn referenced_paths(&self) -> BTreeSet<String> {
        self.players
            .values()
            .flat_map(PlayerRecord::asset_paths)
            .collect()
    }
}

/// Short listing entry for `/api/players`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub skin: Option<String>,
    pub cape: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PlayerRecord> for PlayerSummary {
    fn from(record: &PlayerRecord) -> Self {
        Self {
            username: record.username.clone(),
            uuid: record.uuid.clone(),
            skin: record.skin.as_ref().map(|a| a.hash.clone()),
            cape: record.cape.as_ref().map(|a| a.hash.clone()),
            updated_at: record.updated_at,
        }
    }
}
