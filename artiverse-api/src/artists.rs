use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artiverse_catalog::{Artist, ArtistQuery, Artwork, ArtworkQuery, Page};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ArtistDetail {
    #[serde(flatten)]
    pub artist: Artist,
    pub artworks: Page<Artwork>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtistArtworksQuery {
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/artists", get(list_artists))
        .route("/v1/artists/{key}", get(get_artist))
}

async fn list_artists(
    State(state): State<AppState>,
    Query(query): Query<ArtistQuery>,
) -> Result<Json<Page<Artist>>, AppError> {
    Ok(Json(state.artists.list(&query).await?))
}

pub(crate) async fn find_artist(state: &AppState, key: &str) -> Result<Option<Artist>, AppError> {
    let found = match Uuid::parse_str(key) {
        Ok(id) => state.artists.get(id).await?,
        Err(_) => state.artists.get_by_slug(key).await?,
    };
    Ok(found)
}

/// Profile plus the artist's published works
async fn get_artist(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(paging): Query<ArtistArtworksQuery>,
) -> Result<Json<ArtistDetail>, AppError> {
    let artist = find_artist(&state, &key)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("artist {}", key)))?;

    let query = ArtworkQuery {
        artist_id: Some(artist.id),
        sort: paging.sort,
        page: paging.page,
        per_page: paging.per_page,
        ..Default::default()
    }
    .public();
    let artworks = state.artworks.search(&query).await?;

    Ok(Json(ArtistDetail { artist, artworks }))
}
