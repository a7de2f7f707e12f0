use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artiverse_core::identity::{Role, User};

use crate::error::AppError;
use crate::state::{AppState, AuthConfig};

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::AuthenticationError("malformed token subject".into()))
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }
}

pub fn issue_token(auth: &AuthConfig, user: &User) -> Result<String, AppError> {
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role.as_str().to_string(),
        exp: (Utc::now() + Duration::seconds(auth.expiration as i64)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(auth.secret.as_bytes()))
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))
}

pub fn decode_token(auth: &AuthConfig, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(token, &DecodingKey::from_secret(auth.secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| AppError::AuthenticationError("invalid or expired token".into()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

// ============================================================================
// Customer Authentication Middleware
// ============================================================================

/// Any signed-in account
pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::AuthenticationError("missing bearer token".into()))?;
    let claims = decode_token(&state.auth, token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::AuthenticationError("missing bearer token".into()))?;
    let claims = decode_token(&state.auth, token)?;

    if !claims.is_admin() {
        return Err(AppError::AuthorizationError("admin access required".into()));
    }

    // Demotions take effect before the token expires.
    let user = state
        .users
        .get(claims.user_id()?)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("account no longer exists".into()))?;
    if user.role != Role::Admin {
        return Err(AppError::AuthorizationError("admin access required".into()));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

// ============================================================================
// Guest-capable routes
// ============================================================================

/// Claims when a token is presented; guests get `None`. A token that is
/// present but invalid is still rejected.
pub struct MaybeUser(pub Option<Claims>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match bearer_token(&parts.headers) {
            Some(token) => Ok(MaybeUser(Some(decode_token(&state.auth, token)?))),
            None => Ok(MaybeUser(None)),
        }
    }
}
