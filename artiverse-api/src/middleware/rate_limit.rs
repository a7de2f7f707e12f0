use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use artiverse_core::ratelimit::{RateLimitDecision, RateLimitPolicy};
use artiverse_store::app_config::RateLimitConfig;

use crate::state::AppState;

/// Pick the policy bucket for a request; `None` means unlimited.
pub fn policy_for(method: &Method, path: &str, config: &RateLimitConfig) -> Option<RateLimitPolicy> {
    if path == "/health" || path == "/metrics" {
        return None;
    }
    if *method == Method::POST {
        match path {
            "/v1/auth/login" | "/v1/auth/register" => {
                return Some(RateLimitPolicy::per_minute("auth", config.auth_per_minute));
            }
            "/v1/checkout" | "/v1/contact" | "/v1/analytics/events" | "/v1/orders/lookup" => {
                return Some(RateLimitPolicy::per_minute("write", config.write_per_minute));
            }
            _ => {}
        }
    }
    Some(RateLimitPolicy::per_minute("default", config.default_per_minute))
}

/// First `X-Forwarded-For` hop when trusted, else the socket address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_else(|| "unknown".to_string())
}

fn set_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
}

pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !state.rate_limit.enabled {
        return next.run(req).await;
    }
    let Some(policy) = policy_for(req.method(), req.uri().path(), &state.rate_limit) else {
        return next.run(req).await;
    };

    // Read directly so routers served without connect info still work.
    let peer = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0);
    let ip = client_ip(req.headers(), peer, state.rate_limit.trust_forwarded_for);

    let key = format!("{}:{}", policy.name, ip);
    let decision = match state.limiter.check(&key, &policy).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!("Rate limiter failed, allowing request: {}", e);
            RateLimitDecision::fail_open(policy.limit)
        }
    };

    if !decision.allowed {
        let retry_secs = decision.retry_after.map(|d| d.as_secs_f64().ceil() as u64).unwrap_or(1).max(1);
        tracing::info!("Rate limit [{}] exceeded for {}", policy.name, ip);
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Rate limit exceeded" })),
        )
            .into_response();
        set_limit_headers(response.headers_mut(), &decision);
        response.headers_mut().insert("retry-after", HeaderValue::from(retry_secs));
        return response;
    }

    let mut response = next.run(req).await;
    set_limit_headers(response.headers_mut(), &decision);
    response
}
