use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use artiverse_core::notification::{templates, ContactMessage};
use artiverse_shared::Masked;

use crate::error::AppError;
use crate::notify;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/contact", post(submit_contact))
}

/// POST /v1/contact
/// Relayed to the gallery inbox with the sender as reply-to.
async fn submit_contact(State(state): State<AppState>, Json(req): Json<ContactMessage>) -> Result<StatusCode, AppError> {
    req.validate()?;
    tracing::info!("Contact message from {}: {}", Masked(req.email.as_str()), req.subject.trim());

    notify::send_email(&state, templates::contact_relay(&state.gallery.name, &state.gallery.inbox, &req));
    Ok(StatusCode::ACCEPTED)
}
