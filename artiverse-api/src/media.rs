use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};
use uuid::Uuid;

use artiverse_catalog::{Artwork, Page};
use artiverse_media::transform::DEFAULT_QUALITY;
use artiverse_media::{inspect, render, MediaAsset, OutputFormat, TransformParams, TransformQuery, UploadPolicy};

use crate::admin::PageQuery;
use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

/// Room for multipart framing and the text fields around the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/media/{id}", get(serve_media))
}

/// Behind the admin middleware
pub fn admin_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/v1/admin/media",
            get(list_media)
                .post(upload_media)
                .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD)),
        )
        .route("/v1/admin/media/{id}", axum::routing::delete(delete_media))
}

async fn load_asset(state: &AppState, id: Uuid) -> Result<MediaAsset, AppError> {
    state
        .media
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("media {}", id)))
}

// ============================================================================
// Upload
// ============================================================================

struct Upload {
    bytes: Vec<u8>,
    filename: String,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::ValidationError(format!("malformed multipart body: {}", e.body_text()))
    }
}

/// POST /v1/admin/media
/// Multipart fields: `file` (required), `alt_text`, `artwork_id`
async fn upload_media(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MediaAsset>), AppError> {
    let mut upload: Option<Upload> = None;
    let mut alt_text: Option<String> = None;
    let mut artwork_id: Option<Uuid> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                upload = Some(Upload { bytes: bytes.to_vec(), filename });
            }
            Some("alt_text") => alt_text = Some(field.text().await.map_err(multipart_error)?),
            Some("artwork_id") => {
                let raw = field.text().await.map_err(multipart_error)?;
                let id = Uuid::parse_str(raw.trim())
                    .map_err(|_| AppError::ValidationError("artwork_id must be a UUID".into()))?;
                artwork_id = Some(id);
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::ValidationError("multipart field 'file' is required".into()))?;
    let policy = UploadPolicy { max_bytes: state.media_settings.config.max_upload_bytes, ..Default::default() };
    let info = inspect(&upload.bytes, &policy)?;

    let artwork: Option<Artwork> = match artwork_id {
        Some(id) => Some(
            state
                .artworks
                .get(id)
                .await?
                .ok_or_else(|| AppError::NotFoundError(format!("artwork {}", id)))?,
        ),
        None => None,
    };

    let asset = MediaAsset::new(&info, &upload.filename, upload.bytes.len(), alt_text, Some(claims.user_id()?));
    state.storage.put(&asset.storage_key, &upload.bytes).await?;
    if let Err(e) = state.media.create(&asset).await {
        if let Err(cleanup) = state.storage.delete(&asset.storage_key).await {
            tracing::warn!("Orphaned upload {}: {}", asset.storage_key, cleanup);
        }
        return Err(e.into());
    }

    if let Some(mut artwork) = artwork {
        artwork.image_ids.push(asset.id);
        artwork.updated_at = chrono::Utc::now();
        state.artworks.update(artwork).await?;
    }

    tracing::info!(
        "Stored media {} ({}x{}, {} bytes) as {}",
        asset.id,
        asset.width,
        asset.height,
        asset.size_bytes,
        asset.storage_key
    );
    Ok((StatusCode::CREATED, Json(asset)))
}

// ============================================================================
// Serving
// ============================================================================

fn image_response(bytes: Vec<u8>, content_type: &str, max_age: u64, cache: &'static str) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CACHE_CONTROL, format!("public, max-age={}", max_age)),
            (header::HeaderName::from_static("x-media-cache"), cache.to_string()),
        ],
        Body::from(bytes),
    )
        .into_response()
}

/// Does this request need a rendition, or is the stored original enough?
fn is_original(params: &TransformParams) -> bool {
    params.width.is_none()
        && params.height.is_none()
        && params.format.is_none()
        && params.quality == DEFAULT_QUALITY
        && !params.watermark
}

/// GET /v1/media/{id}?w=&h=&fit=&q=&format=&wm=
async fn serve_media(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<TransformQuery>,
) -> Result<Response, AppError> {
    let asset = load_asset(&state, id).await?;
    let config = &state.media_settings.config;
    let mut params = query.validate()?;

    if config.force_watermark {
        let (w, h) = params.target_size(asset.width, asset.height);
        if w.max(h) >= config.watermark_min_px {
            params.watermark = true;
        }
    }

    if is_original(&params) {
        let bytes = state
            .storage
            .get(&asset.storage_key)
            .await?
            .ok_or_else(|| AppError::InternalServerError(format!("original missing for media {}", id)))?;
        return Ok(image_response(bytes, &asset.content_type, config.cache_max_age_seconds, "original"));
    }

    let source_format = asset
        .source_format()
        .ok_or_else(|| AppError::InternalServerError(format!("unknown stored type {}", asset.content_type)))?;
    let output = params.format.unwrap_or_else(|| OutputFormat::for_source(source_format));
    let watermark = state.media_settings.watermark.clone();
    let variant_key = asset.variant_key(&params.cache_key(source_format, Some(watermark.as_ref())));

    if let Some(bytes) = state.storage.get(&variant_key).await? {
        return Ok(image_response(bytes, output.content_type(), config.cache_max_age_seconds, "hit"));
    }

    let source = state
        .storage
        .get(&asset.storage_key)
        .await?
        .ok_or_else(|| AppError::InternalServerError(format!("original missing for media {}", id)))?;

    let rendition = tokio::task::spawn_blocking(move || render(&source, &params, Some(watermark.as_ref())))
        .await
        .map_err(|e| AppError::InternalServerError(format!("render task failed: {}", e)))??;

    if let Err(e) = state.storage.put(&variant_key, &rendition.bytes).await {
        tracing::warn!("Could not cache rendition {}: {}", variant_key, e);
    }

    Ok(image_response(rendition.bytes, rendition.content_type, config.cache_max_age_seconds, "miss"))
}

// ============================================================================
// Admin
// ============================================================================

async fn list_media(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<MediaAsset>>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(24).clamp(1, 100);
    Ok(Json(state.media.list(page, per_page).await?))
}

/// DELETE /v1/admin/media/{id}
/// Removes the original, every cached rendition, and gallery references.
async fn delete_media(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    let asset = load_asset(&state, id).await?;

    state.artworks.detach_media(id).await?;
    state.media.delete(id).await?;
    state.storage.delete(&asset.storage_key).await?;
    state.storage.delete_prefix(&asset.variant_prefix()).await?;

    tracing::info!("Deleted media {}", id);
    Ok(StatusCode::NO_CONTENT)
}
