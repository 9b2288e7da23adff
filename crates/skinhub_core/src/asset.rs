use crate::error::ValidationError;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// The eight byte signature every PNG file starts with.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Skin,
    Cape,
}

impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Skin, AssetKind::Cape];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Skin => "skin",
            AssetKind::Cape => "cape",
        }
    }

    /// Directory the assets of this kind live under, e.g. `skins`.
    pub fn dir(&self) -> &'static str {
        match self {
            AssetKind::Skin => "skins",
            AssetKind::Cape => "capes",
        }
    }

    /// Content addressed path of an asset, e.g. `skins/<sha256>.png`.
    pub fn path(&self, hash: &str) -> String {
        format!("{}/{hash}.png", self.dir())
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skin" | "skins" => Ok(AssetKind::Skin),
            "cape" | "capes" => Ok(AssetKind::Cape),
            _ => Err(ValidationError::AssetKind(s.to_string())),
        }
    }
}

/// A PNG blob that passed validation and got its content hash.
#[derive(Debug, Clone)]
pub struct Asset {
    pub kind: AssetKind,
    pub hash: String,
    pub data: Bytes,
}

impl Asset {
    /// Validates the blob and computes its identifier.
    ///
    /// Only the PNG signature is checked, the image itself is never decoded.
    pub fn new(kind: AssetKind, data: Bytes, max_size: usize) -> Result<Self, ValidationError> {
        if data.len() > max_size {
            return Err(ValidationError::TooLarge {
                size: data.len(),
                limit: max_size,
            });
        }
        if !is_png(&data) {
            return Err(ValidationError::NotPng);
        }

        Ok(Self {
            kind,
            hash: content_hash(&data),
            data,
        })
    }

    pub fn path(&self) -> String {
        self.kind.path(&self.hash)
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&PNG_SIGNATURE)
}

/// Hex encoded SHA256 of the bytes.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
pub(crate) fn test_png(seed: &[u8]) -> Bytes {
    let mut data = PNG_SIGNATURE.to_vec();
    data.extend_from_slice(seed);
    Bytes::from(data)
}
