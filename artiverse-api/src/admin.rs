use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, patch},
    Extension, Json, Router,
};
use chrono::Utc;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use artiverse_catalog::{
    Artist, ArtistPatch, ArtistQuery, Artwork, ArtworkPatch, ArtworkQuery, ArtworkStatus, NewArtist, NewArtwork, Page,
};
use artiverse_core::identity::{Role, User};
use artiverse_core::notification::templates;
use artiverse_core::repository::OrderFilter;
use artiverse_order::{Order, OrderChange, OrderManager, OrderStatus, SalesReport};

use crate::error::AppError;
use crate::middleware::Claims;
use crate::notify;
use crate::orders::load_order;
use crate::state::AppState;

const DASHBOARD_DAYS: i64 = 30;
const RECENT_ORDERS: u32 = 10;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AdminOrdersQuery {
    pub status: Option<String>,
    pub user_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderWithHistory {
    pub order: Order,
    pub history: Vec<OrderChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub sales: SalesReport,
    pub low_stock: Vec<Artwork>,
    pub low_stock_threshold: i32,
    pub recent_orders: Vec<Order>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        // Catalog
        .route("/v1/admin/artworks", get(list_artworks).post(create_artwork))
        .route(
            "/v1/admin/artworks/{id}",
            get(get_artwork).patch(update_artwork).delete(archive_artwork),
        )
        .route("/v1/admin/artists", get(list_artists).post(create_artist))
        .route(
            "/v1/admin/artists/{id}",
            get(get_artist).patch(update_artist).delete(delete_artist),
        )
        // Orders
        .route("/v1/admin/orders", get(list_orders))
        .route("/v1/admin/orders/{id}", get(get_order))
        .route("/v1/admin/orders/{id}/status", patch(update_order_status))
        // Accounts
        .route("/v1/admin/users", get(list_users))
        .route("/v1/admin/users/{id}/role", patch(update_user_role))
        // Overview
        .route("/v1/admin/dashboard", get(dashboard))
        .route("/v1/admin/stream", get(event_stream))
}

// ============================================================================
// Artwork Management Handlers
// ============================================================================

async fn ensure_artist(state: &AppState, artist_id: Uuid) -> Result<(), AppError> {
    if state.artists.get(artist_id).await?.is_none() {
        return Err(AppError::ValidationError(format!("artist {} does not exist", artist_id)));
    }
    Ok(())
}

async fn load_artwork(state: &AppState, id: Uuid) -> Result<Artwork, AppError> {
    state
        .artworks
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("artwork {}", id)))
}

/// GET /v1/admin/artworks
/// Any status unless the query narrows it
async fn list_artworks(
    State(state): State<AppState>,
    Query(query): Query<ArtworkQuery>,
) -> Result<Json<Page<Artwork>>, AppError> {
    Ok(Json(state.artworks.search(&query).await?))
}

/// POST /v1/admin/artworks
async fn create_artwork(
    State(state): State<AppState>,
    Json(mut req): Json<NewArtwork>,
) -> Result<(StatusCode, Json<Artwork>), AppError> {
    ensure_artist(&state, req.artist_id).await?;
    req.currency.get_or_insert_with(|| state.gallery.currency.clone());

    let artwork = state.artworks.create(Artwork::from_new(req)?).await?;
    tracing::info!("Created artwork {} ({})", artwork.slug, artwork.id);
    Ok((StatusCode::CREATED, Json(artwork)))
}

async fn get_artwork(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Artwork>, AppError> {
    Ok(Json(load_artwork(&state, id).await?))
}

/// PATCH /v1/admin/artworks/{id}
async fn update_artwork(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ArtworkPatch>,
) -> Result<Json<Artwork>, AppError> {
    let mut artwork = load_artwork(&state, id).await?;
    if let Some(artist_id) = patch.artist_id.filter(|a| *a != artwork.artist_id) {
        ensure_artist(&state, artist_id).await?;
    }

    let stock = patch.stock;
    artwork.apply_patch(patch)?;
    let artwork = state.artworks.update(artwork).await?;
    match stock {
        Some(stock) => Ok(Json(state.artworks.set_stock(id, stock).await?)),
        None => Ok(Json(artwork)),
    }
}

/// DELETE /v1/admin/artworks/{id}
/// Soft delete: order history keeps pointing at the record.
async fn archive_artwork(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    let mut artwork = load_artwork(&state, id).await?;
    if artwork.status != ArtworkStatus::Archived {
        artwork.status = ArtworkStatus::Archived;
        artwork.updated_at = Utc::now();
        state.artworks.update(artwork).await?;
        tracing::info!("Archived artwork {}", id);
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Artist Management Handlers
// ============================================================================

async fn load_artist(state: &AppState, id: Uuid) -> Result<Artist, AppError> {
    state
        .artists
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("artist {}", id)))
}

async fn list_artists(
    State(state): State<AppState>,
    Query(query): Query<ArtistQuery>,
) -> Result<Json<Page<Artist>>, AppError> {
    Ok(Json(state.artists.list(&query).await?))
}

async fn create_artist(
    State(state): State<AppState>,
    Json(req): Json<NewArtist>,
) -> Result<(StatusCode, Json<Artist>), AppError> {
    let artist = state.artists.create(Artist::from_new(req)?).await?;
    tracing::info!("Created artist {} ({})", artist.slug, artist.id);
    Ok((StatusCode::CREATED, Json(artist)))
}

async fn get_artist(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Artist>, AppError> {
    Ok(Json(load_artist(&state, id).await?))
}

async fn update_artist(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<ArtistPatch>,
) -> Result<Json<Artist>, AppError> {
    let mut artist = load_artist(&state, id).await?;
    artist.apply_patch(patch)?;
    Ok(Json(state.artists.update(artist).await?))
}

/// DELETE /v1/admin/artists/{id}
async fn delete_artist(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, AppError> {
    let referenced = state.artworks.count_by_artist(id).await?;
    if referenced > 0 {
        return Err(AppError::ConflictError(format!(
            "artist is referenced by {} artwork(s); archive or reassign them first",
            referenced
        )));
    }
    if !state.artists.delete(id).await? {
        return Err(AppError::NotFoundError(format!("artist {}", id)));
    }
    tracing::info!("Deleted artist {}", id);
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Order Management Handlers
// ============================================================================

/// GET /v1/admin/orders
async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<AdminOrdersQuery>,
) -> Result<Json<Page<Order>>, AppError> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(OrderStatus::parse(s).ok_or_else(|| AppError::ValidationError(format!("unknown status '{}'", s)))?),
        None => None,
    };
    let filter = OrderFilter { status, user_id: query.user_id, page: query.page, per_page: query.per_page };
    Ok(Json(state.orders.list(&filter).await?))
}

async fn get_order(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<OrderWithHistory>, AppError> {
    let order = load_order(&state, id).await?;
    let history = state.orders.history(id).await?;
    Ok(Json(OrderWithHistory { order, history }))
}

/// PATCH /v1/admin/orders/{id}/status
async fn update_order_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let next = OrderStatus::parse(&req.status)
        .ok_or_else(|| AppError::ValidationError(format!("unknown status '{}'", req.status)))?;

    let mut order = load_order(&state, id).await?;
    let note = req.note.filter(|n| !n.trim().is_empty());
    let change = OrderManager::transition(&mut order, next, &claims.email, note)?;
    state
        .orders
        .update(&order, change.from_status, Some(&change), OrderManager::restocks(next))
        .await?;
    tracing::info!(
        "Order {} moved {} -> {} by {}",
        order.order_number,
        change.from_status.as_str(),
        change.to_status.as_str(),
        claims.email
    );

    if let Some(message) = templates::status_update(&state.gallery.name, &order) {
        notify::send_email(&state, message);
    }
    notify::emit(&state, notify::status_changed(&order, &change));
    Ok(Json(order))
}

// ============================================================================
// User Management Handlers
// ============================================================================

async fn list_users(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Result<Json<Page<User>>, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);
    Ok(Json(state.users.list(page, per_page).await?))
}

/// PATCH /v1/admin/users/{id}/role
async fn update_user_role(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<User>, AppError> {
    let role = Role::parse(&req.role).ok_or_else(|| AppError::ValidationError(format!("unknown role '{}'", req.role)))?;
    if claims.user_id()? == id {
        return Err(AppError::ConflictError("administrators cannot change their own role".into()));
    }

    let mut user = state
        .users
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("user {}", id)))?;
    user.role = role;
    user.updated_at = Utc::now();
    state.users.update(&user).await?;
    tracing::info!("User {} is now {} (changed by {})", id, role.as_str(), claims.email);
    Ok(Json(user))
}

// ============================================================================
// Dashboard & Live Feed
// ============================================================================

/// GET /v1/admin/dashboard
async fn dashboard(State(state): State<AppState>) -> Result<Json<Dashboard>, AppError> {
    let since = Utc::now() - chrono::Duration::days(DASHBOARD_DAYS);
    let sales = state.orders.sales_report(since).await?;
    let threshold = state.gallery.low_stock_threshold;
    let low_stock = state.artworks.low_stock(threshold).await?;
    let recent = state
        .orders
        .list(&OrderFilter { per_page: Some(RECENT_ORDERS), ..Default::default() })
        .await?;

    Ok(Json(Dashboard {
        sales,
        low_stock,
        low_stock_threshold: threshold,
        recent_orders: recent.items,
    }))
}

/// GET /v1/admin/stream
/// Server-sent order events; lagging subscribers skip what they missed.
async fn event_stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(event) => match Event::default().event(event.name()).json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                tracing::warn!("Failed to encode SSE event: {}", e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("SSE subscriber lagged: {}", e);
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive"))
}
