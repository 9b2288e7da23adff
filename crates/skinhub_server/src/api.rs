use crate::auth::Admin;
use crate::state::{AppState, CounterSnapshot};

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skinhub_core::asset::content_hash;
use skinhub_core::prelude::*;
use tracing::{debug, error};

pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn storage_status(err: &StorageError) -> (StatusCode, String) {
    match err {
        StorageError::Conflict(_) => (
            StatusCode::CONFLICT,
            "Player database changed concurrently, please retry".to_string(),
        ),
        _ => {
            error!("Storage error: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Storage error".to_string(),
            )
        }
    }
}

impl ApiError {
    fn status(&self) -> (StatusCode, String) {
        if let Some(err) = self.0.downcast_ref::<RegistryError>() {
            return match err {
                RegistryError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
                RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                RegistryError::Storage(e) => storage_status(e),
            };
        }
        if let Some(err) = self.0.downcast_ref::<ValidationError>() {
            return (StatusCode::BAD_REQUEST, err.to_string());
        }
        if self.0.downcast_ref::<AuthError>().is_some() {
            return (StatusCode::UNAUTHORIZED, "Unauthorized".to_string());
        }
        if let Some(err) = self.0.downcast_ref::<MultipartError>() {
            return (err.status(), err.body_text());
        }
        if let Some(err) = self.0.downcast_ref::<StorageError>() {
            return storage_status(err);
        }

        error!("Internal error: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal Server Error".to_string(),
        )
    }

    fn is_validation(&self) -> bool {
        self.0.downcast_ref::<ValidationError>().is_some()
            || matches!(
                self.0.downcast_ref::<RegistryError>(),
                Some(RegistryError::Validation(_))
            )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status();
        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}

/// The `{success, message, data}` envelope every JSON endpoint answers with.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

fn not_found(username: &str, kind: AssetKind) -> ApiError {
    ApiError::from(RegistryError::NotFound(format!("{kind} for {username}")))
}

/// Runs an upload and keeps the accepted/rejected counters in sync.
async fn record_upload<S: StorageBackend>(
    state: &AppState<S>,
    upload: Upload,
) -> Result<UploadReceipt, ApiError> {
    match state.registry.upload(upload).await {
        Ok(receipt) => {
            state.counters.upload_accepted();
            Ok(receipt)
        }
        Err(e) => {
            let err = ApiError::from(e);
            if err.is_validation() {
                state.counters.upload_rejected();
            }
            Err(err)
        }
    }
}

#[derive(Default)]
struct UploadForm {
    username: Option<String>,
    uuid: Option<String>,
    kind: Option<String>,
    /// (field name, bytes) for every file part.
    files: Vec<(String, Bytes)>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "username" => form.username = Some(field.text().await?),
                "uuid" => form.uuid = Some(field.text().await?),
                "type" => form.kind = Some(field.text().await?),
                "skin" | "cape" | "file" => {
                    let data = field.bytes().await?;
                    form.files.push((name, data));
                }
                other => debug!(field = other, "Ignoring unknown multipart field"),
            }
        }
        Ok(form)
    }

    fn username(&self) -> Result<String, ValidationError> {
        self.username
            .clone()
            .ok_or(ValidationError::Missing("username"))
    }
}

/// POST /upload
///
/// Multipart with `username`, optional `uuid` and a `skin` and/or `cape` file.
/// A `file` part is accepted as well when a `type` field names its kind.
pub async fn upload<S: StorageBackend>(
    State(state): State<AppState<S>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = UploadForm::read(multipart).await;
    let form = form.inspect_err(|_| state.counters.upload_rejected())?;

    let mut uploads = Vec::with_capacity(form.files.len());
    for (field, data) in &form.files {
        let kind = match (field.as_str(), form.kind.as_deref()) {
            ("file", Some(kind)) => kind.parse::<AssetKind>(),
            ("file", None) => Err(ValidationError::Missing("type")),
            (field, _) => field.parse::<AssetKind>(),
        };
        let kind = kind.inspect_err(|_| state.counters.upload_rejected())?;
        uploads.push(Upload {
            username: form.username().inspect_err(|_| state.counters.upload_rejected())?,
            uuid: form.uuid.clone(),
            kind,
            data: data.clone(),
        });
    }
    if uploads.is_empty() {
        state.counters.upload_rejected();
        return Err(ValidationError::Missing("skin or cape").into());
    }
    // All or nothing: a bad cape must not leave a half applied skin behind.
    for upload in &uploads {
        state
            .registry
            .validate(upload)
            .inspect_err(|_| state.counters.upload_rejected())?;
    }

    let mut receipts = Vec::with_capacity(uploads.len());
    for upload in uploads {
        receipts.push(record_upload(&state, upload).await?);
    }

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("Upload stored", receipts),
    ))
}

/// POST /api/upload/{type}
pub async fn upload_kind<S: StorageBackend>(
    State(state): State<AppState<S>>,
    Path(kind): Path<String>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let kind = kind
        .parse::<AssetKind>()
        .inspect_err(|_| state.counters.upload_rejected())?;
    let form = UploadForm::read(multipart)
        .await
        .inspect_err(|_| state.counters.upload_rejected())?;

    let Some((_, data)) = form.files.iter().find(|(field, _)| {
        field == "file" || field == kind.as_str()
    }) else {
        state.counters.upload_rejected();
        return Err(ValidationError::Missing("file").into());
    };

    let upload = Upload {
        username: form.username().inspect_err(|_| state.counters.upload_rejected())?,
        uuid: form.uuid.clone(),
        kind,
        data: data.clone(),
    };
    let receipt = record_upload(&state, upload).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(format!("{kind} stored"), receipt),
    ))
}

#[derive(Deserialize)]
pub struct UpdateSkinMetadata {
    pub username: String,
    pub uuid: Option<String>,
}

/// Body of the mod facing upload endpoint.
#[derive(Deserialize)]
pub struct UpdateSkinRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub metadata: UpdateSkinMetadata,
    #[serde(rename = "imageDataBase64")]
    pub image_data_base64: String,
}

fn decode_image(payload: &str) -> Result<Bytes, ValidationError> {
    // Accept `data:image/png;base64,...` URLs as well.
    let payload = payload
        .split_once("base64,")
        .map_or(payload, |(_, data)| data);
    let compact: String = payload.split_whitespace().collect();
    STANDARD
        .decode(compact)
        .map(Bytes::from)
        .map_err(|_| ValidationError::Base64)
}

/// POST /api/update-skin
pub async fn update_skin<S: StorageBackend>(
    State(state): State<AppState<S>>,
    req: Result<Json<UpdateSkinRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = req
        .map_err(|e| ValidationError::Body(e.body_text()))
        .inspect_err(|_| state.counters.upload_rejected())?;
    let decoded = req.kind.parse::<AssetKind>().and_then(|kind| {
        decode_image(&req.image_data_base64).map(|data| (kind, data))
    });
    let (kind, data) = decoded.inspect_err(|_| state.counters.upload_rejected())?;

    let receipt = record_upload(
        &state,
        Upload {
            username: req.metadata.username,
            uuid: req.metadata.uuid,
            kind,
            data,
        },
    )
    .await?;

    Ok(ApiResponse::ok("Stored", receipt))
}

fn etag(hash: &str) -> String {
    format!("\"{hash}\"")
}

async fn raw_asset<S: StorageBackend>(
    state: &AppState<S>,
    headers: &HeaderMap,
    username: &str,
    kind: AssetKind,
) -> Result<Response, ApiError> {
    let (hash, data) = match state.registry.current_asset(username, kind).await? {
        Some((asset, data)) => (asset.hash, data),
        None => match (&state.default_skin, kind) {
            (Some(fallback), AssetKind::Skin) => (content_hash(fallback), fallback.clone()),
            _ => return Err(not_found(username, kind)),
        },
    };

    let tag = etag(&hash);
    let cached = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == tag);
    if cached {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, tag)]).into_response());
    }

    state.counters.asset_served();
    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::ETAG, tag),
            (header::CACHE_CONTROL, "public, max-age=60".to_string()),
        ],
        data,
    )
        .into_response())
}

/// GET /skin/{username}
pub async fn skin_png<S: StorageBackend>(
    State(state): State<AppState<S>>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    raw_asset(&state, &headers, &username, AssetKind::Skin).await
}

/// GET /cape/{username}
pub async fn cape_png<S: StorageBackend>(
    State(state): State<AppState<S>>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    raw_asset(&state, &headers, &username, AssetKind::Cape).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssetPayload {
    pub username: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub hash: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    /// Base64 encoded PNG.
    pub image: String,
}

async fn asset_json<S: StorageBackend>(
    state: &AppState<S>,
    username: &str,
    kind: AssetKind,
) -> Result<Json<ApiResponse<AssetPayload>>, ApiError> {
    let (asset, data) = state
        .registry
        .current_asset(username, kind)
        .await?
        .ok_or_else(|| not_found(username, kind))?;

    state.counters.asset_served();
    Ok(ApiResponse::ok(
        format!("{kind} found"),
        AssetPayload {
            username: username.to_string(),
            kind,
            hash: asset.hash,
            size: asset.size,
            uploaded_at: asset.uploaded_at,
            image: STANDARD.encode(&data),
        },
    ))
}

/// GET /api/skin/{username}
pub async fn skin_json<S: StorageBackend>(
    State(state): State<AppState<S>>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    asset_json(&state, &username, AssetKind::Skin).await
}

/// GET /api/cape/{username}
pub async fn cape_json<S: StorageBackend>(
    State(state): State<AppState<S>>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    asset_json(&state, &username, AssetKind::Cape).await
}

/// GET /api/players
pub async fn list_players<S: StorageBackend>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, ApiError> {
    let players = state.registry.players().await?;
    Ok(ApiResponse::ok(format!("{} players", players.len()), players))
}

/// GET /api/players/{username}
pub async fn get_player<S: StorageBackend>(
    State(state): State<AppState<S>>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .registry
        .player(&username)
        .await?
        .ok_or_else(|| RegistryError::NotFound(username.clone()))?;
    Ok(ApiResponse::ok("Player found", record))
}

/// GET /api/get-all
///
/// The raw metadata document, `{}` when nothing was uploaded yet.
pub async fn get_all<S: StorageBackend>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.registry.document().await?))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub registry: RegistryStats,
    #[serde(flatten)]
    pub counters: CounterSnapshot,
}

/// GET /stats
pub async fn stats<S: StorageBackend>(
    State(state): State<AppState<S>>,
) -> Result<impl IntoResponse, ApiError> {
    let registry = state.registry.stats().await?;
    Ok(ApiResponse::ok(
        "Stats",
        StatsResponse {
            registry,
            counters: state.counters.snapshot(),
        },
    ))
}

/// DELETE /api/players/{username}?key=...
pub async fn delete_player<S: StorageBackend>(
    State(state): State<AppState<S>>,
    _admin: Admin,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.registry.delete_player(&username).await?;
    Ok(ApiResponse::ok(format!("Deleted {username}"), summary))
}

/// DELETE /reset?key=...
pub async fn reset<S: StorageBackend>(
    State(state): State<AppState<S>>,
    _admin: Admin,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.registry.reset().await?;
    Ok(ApiResponse::ok("Registry reset", summary))
}
