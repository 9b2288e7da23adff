use crate::{api, prelude::*};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use bytes::Bytes;
use skinhub_core::prelude::*;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// The builder for the skinhub server.
#[derive(Clone, Debug, Default)]
pub struct SkinhubServer {
    config: SkinhubServerConfig,
}

impl SkinhubServer {
    pub fn new(config: SkinhubServerConfig) -> Self {
        Self { config }
    }
}

#[derive(Clone, Debug)]
pub struct SkinhubServerConfig {
    /// The shared secret admin routes expect as `?key=`.
    ///
    /// Defaults to `CHANGE_ME`.
    ///
    /// **NOTE:** This should be set to a secure value!
    pub admin_key: String,
    /// History length, asset size limit and conflict retries.
    pub registry: RegistryConfig,
    /// Largest accepted request body. Base64 JSON uploads are a third
    /// larger than the asset itself.
    ///
    /// Defaults to 4 MiB.
    pub max_body_bytes: usize,
    /// Served by `GET /skin/{username}` for players without a skin.
    pub default_skin: Option<Bytes>,
}

const DEFAULT_ADMIN_KEY: &str = "CHANGE_ME";

impl Default for SkinhubServerConfig {
    fn default() -> Self {
        Self {
            admin_key: DEFAULT_ADMIN_KEY.to_string(),
            registry: RegistryConfig::default(),
            max_body_bytes: 4 * 1024 * 1024,
            default_skin: None,
        }
    }
}

impl SkinhubServer {
    pub fn build<S: StorageBackend>(self, storage: S) -> Router {
        let SkinhubServerConfig {
            admin_key,
            registry,
            max_body_bytes,
            default_skin,
        } = self.config;
        if admin_key == DEFAULT_ADMIN_KEY {
            warn!("Default admin key used. Consider setting `admin_key` to a secure value!")
        }
        let state = AppState {
            registry: PlayerRegistry::new(storage, registry),
            admin: SharedKeyAuth::new(&admin_key),
            default_skin,
            counters: Arc::new(Counters::default()),
        };

        Router::new()
            .route("/health", get(|| async { "OK" }))
            .route("/stats", get(api::stats))
            // uploads
            .route("/upload", post(api::upload))
            .route("/api/upload/{kind}", post(api::upload_kind))
            .route("/api/update-skin", post(api::update_skin))
            // downloads
            .route("/skin/{username}", get(api::skin_png))
            .route("/cape/{username}", get(api::cape_png))
            .route("/api/skin/{username}", get(api::skin_json))
            .route("/api/cape/{username}", get(api::cape_json))
            // listing
            .route("/list", get(api::list_players))
            .route("/api/players", get(api::list_players))
            .route(
                "/api/players/{username}",
                get(api::get_player).delete(api::delete_player),
            )
            .route("/all", get(api::get_all))
            .route("/api/get-all", get(api::get_all))
            // admin
            .route("/delete/{username}", delete(api::delete_player))
            .route("/reset", delete(api::reset))
            .layer(DefaultBodyLimit::max(max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
