use crate::api::ApiError;
use crate::state::AppState;

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use skinhub_core::prelude::*;
use tracing::warn;

/// The single shared admin secret.
///
/// Only its SHA256 is kept, candidates are hashed before comparing.
#[derive(Clone)]
pub struct SharedKeyAuth {
    key_hash: [u8; 32],
}

fn hash_key(key: &str) -> [u8; 32] {
    Sha256::digest(key.as_bytes()).into()
}

impl SharedKeyAuth {
    pub fn new(key: &str) -> Self {
        Self {
            key_hash: hash_key(key),
        }
    }

    pub fn verify(&self, key: &str) -> Result<(), AuthError> {
        if key.is_empty() {
            return Err(AuthError::MissingKey);
        }
        if hash_key(key) == self.key_hash {
            Ok(())
        } else {
            Err(AuthError::InvalidKey)
        }
    }
}

#[derive(Deserialize)]
struct AdminQuery {
    key: Option<String>,
}

/// Present on a handler when the request carried the admin key as `?key=`.
#[derive(Clone, Copy, Debug)]
pub struct Admin;

impl<S: StorageBackend> FromRequestParts<AppState<S>> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let key = Query::<AdminQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.key)
            .unwrap_or_default();

        state.admin.verify(&key).map(|_| Admin).map_err(|e| {
            warn!(path = %parts.uri.path(), "Rejected admin request: {e}");
            ApiError::from(e)
        })
    }
}
