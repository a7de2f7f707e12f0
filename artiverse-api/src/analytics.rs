use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::{headers::UserAgent, TypedHeader};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use artiverse_core::analytics::{summarize, summary_window, AnalyticsSummary, TrackEvent, TOP_ARTWORKS};
use artiverse_core::events::publish_analytics_event;

use crate::error::AppError;
use crate::middleware::MaybeUser;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub days: Option<u32>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/analytics/events", post(track_event))
}

/// Behind the admin middleware
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/v1/admin/analytics/summary", get(summary))
}

/// POST /v1/analytics/events
async fn track_event(
    State(state): State<AppState>,
    MaybeUser(claims): MaybeUser,
    user_agent: Option<TypedHeader<UserAgent>>,
    Json(req): Json<TrackEvent>,
) -> Result<StatusCode, AppError> {
    let user_id = claims.as_ref().map(|c| c.user_id()).transpose()?;
    let agent = user_agent.map(|TypedHeader(ua)| ua.as_str().to_string());
    let event = req.into_event(user_id, agent)?;

    state.analytics.record(&event).await?;

    let events = state.events.clone();
    tokio::spawn(async move {
        if let Err(e) = publish_analytics_event(events.as_ref(), &event).await {
            tracing::warn!("Failed to publish analytics event {}: {}", event.id, e);
        }
    });

    Ok(StatusCode::ACCEPTED)
}

/// GET /v1/admin/analytics/summary?days=N
async fn summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<AnalyticsSummary>, AppError> {
    let (days, since) = summary_window(query.days, Utc::now());
    let stats = state.analytics.stats_since(since, TOP_ARTWORKS).await?;
    let sales = state.orders.sales_report(since).await?;

    let mut report = summarize(stats, sales, days, since);

    let ids: Vec<Uuid> = report.top_artworks.iter().map(|t| t.artwork_id).collect();
    if !ids.is_empty() {
        let titles: HashMap<Uuid, String> = state
            .artworks
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|a| (a.id, a.title))
            .collect();
        for top in &mut report.top_artworks {
            top.title = titles.get(&top.artwork_id).cloned();
        }
    }

    Ok(Json(report))
}
