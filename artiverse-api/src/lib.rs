use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod admin;
pub mod analytics;
pub mod artists;
pub mod artworks;
pub mod auth;
pub mod cart;
pub mod contact;
pub mod error;
pub mod media;
pub mod metrics;
pub mod middleware;
pub mod notify;
pub mod orders;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

use crate::metrics::{metrics_handler, track_metrics};
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::middleware::resiliency::circuit_breaker_middleware;
use crate::middleware::{admin_auth_middleware, customer_auth_middleware};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::USER_AGENT])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            header::RETRY_AFTER,
        ])
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn app(state: AppState) -> Router {
    let customer = Router::new()
        .merge(auth::account_routes())
        .merge(orders::customer_routes())
        .route_layer(from_fn_with_state(state.clone(), customer_auth_middleware));

    let admin = Router::new()
        .merge(admin::routes())
        .merge(media::admin_routes(state.media_settings.config.max_upload_bytes))
        .merge(analytics::admin_routes())
        .route_layer(from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .merge(auth::routes())
        .merge(artworks::routes())
        .merge(artists::routes())
        .merge(cart::routes())
        .merge(orders::routes())
        .merge(webhooks::routes())
        .merge(media::routes())
        .merge(analytics::routes())
        .merge(contact::routes())
        .merge(customer)
        .merge(admin)
        .layer(from_fn_with_state(state.clone(), circuit_breaker_middleware))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(cors_layer(&state.cors_origins))
        .layer(from_fn_with_state(state.clone(), track_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
