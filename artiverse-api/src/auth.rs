use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use artiverse_core::identity::{
    hash_password, normalize_email, validate_password, verify_password, ProfileUpdate, Registration, Role, User,
};
use artiverse_core::notification::templates;
use artiverse_shared::Masked;

use crate::error::AppError;
use crate::middleware::auth::issue_token;
use crate::middleware::Claims;
use crate::notify;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/register", post(register))
        .route("/v1/auth/login", post(login))
}

/// Behind the customer middleware
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/me", get(me).patch(update_me))
        .route("/v1/auth/password", post(change_password))
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<Registration>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    req.validate()?;

    let email = normalize_email(&req.email);
    if state.users.get_by_email(&email).await?.is_some() {
        return Err(AppError::ConflictError("email is already registered".into()));
    }

    let user = User::new(&email, &req.name, hash_password(&req.password)?, Role::Customer);
    state.users.create(&user).await?;
    tracing::info!("Registered account {} for {}", user.id, Masked(user.email.as_str()));

    notify::send_email(&state, templates::welcome(&state.gallery.name, &user));

    let token = issue_token(&state.auth, &user)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<AuthResponse>, AppError> {
    let invalid = || AppError::AuthenticationError("invalid email or password".into());

    let user = state.users.get_by_email(&normalize_email(&req.email)).await?.ok_or_else(invalid)?;
    if !verify_password(&user.password_hash, &req.password)? {
        tracing::info!("Failed login for {}", Masked(user.email.as_str()));
        return Err(invalid());
    }

    let token = issue_token(&state.auth, &user)?;
    Ok(Json(AuthResponse { token, user }))
}

async fn current_user(state: &AppState, claims: &Claims) -> Result<User, AppError> {
    state
        .users
        .get(claims.user_id()?)
        .await?
        .ok_or_else(|| AppError::AuthenticationError("account no longer exists".into()))
}

async fn me(State(state): State<AppState>, Extension(claims): Extension<Claims>) -> Result<Json<User>, AppError> {
    Ok(Json(current_user(&state, &claims).await?))
}

async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, AppError> {
    let mut user = current_user(&state, &claims).await?;

    if let Some(email) = update.email.as_deref().map(normalize_email) {
        if email != user.email && state.users.get_by_email(&email).await?.is_some() {
            return Err(AppError::ConflictError("email is already registered".into()));
        }
    }

    update.apply(&mut user)?;
    state.users.update(&user).await?;
    Ok(Json(user))
}

async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    let mut user = current_user(&state, &claims).await?;
    if !verify_password(&user.password_hash, &req.current_password)? {
        return Err(AppError::AuthenticationError("current password is incorrect".into()));
    }
    validate_password(&req.new_password)?;

    user.password_hash = hash_password(&req.new_password)?;
    user.updated_at = chrono::Utc::now();
    state.users.update(&user).await?;
    Ok(StatusCode::NO_CONTENT)
}
