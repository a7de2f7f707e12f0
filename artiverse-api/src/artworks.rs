use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use artiverse_catalog::{Artist, Artwork, ArtworkQuery, ArtworkStatus, Page};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ArtworkDetail {
    #[serde(flatten)]
    pub artwork: Artwork,
    pub effective_price_cents: i64,
    pub artist: Option<Artist>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/artworks", get(list_artworks))
        .route("/v1/artworks/{key}", get(get_artwork))
}

/// GET /v1/artworks
async fn list_artworks(
    State(state): State<AppState>,
    Query(query): Query<ArtworkQuery>,
) -> Result<Json<Page<Artwork>>, AppError> {
    Ok(Json(state.artworks.search(&query.public()).await?))
}

/// Resolve an id or a slug.
pub(crate) async fn find_artwork(state: &AppState, key: &str) -> Result<Option<Artwork>, AppError> {
    let found = match Uuid::parse_str(key) {
        Ok(id) => state.artworks.get(id).await?,
        Err(_) => state.artworks.get_by_slug(key).await?,
    };
    Ok(found)
}

/// GET /v1/artworks/{id_or_slug}
async fn get_artwork(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<ArtworkDetail>, AppError> {
    let artwork = find_artwork(&state, &key)
        .await?
        .filter(|a| a.status == ArtworkStatus::Published)
        .ok_or_else(|| AppError::NotFoundError(format!("artwork {}", key)))?;

    let artist = state.artists.get(artwork.artist_id).await?;
    Ok(Json(ArtworkDetail { effective_price_cents: artwork.effective_price_cents(), artwork, artist }))
}
