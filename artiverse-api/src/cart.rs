use std::collections::HashMap;

use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use artiverse_catalog::{Artwork, PriceBreakdown};
use artiverse_order::cart::price_cart;
use artiverse_order::{Cart, CartIssue, PricedCart, PricedLine};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CartQuote {
    pub lines: Vec<PricedLine>,
    pub issues: Vec<CartIssue>,
    pub currency: String,
    pub totals: PriceBreakdown,
    pub checkout_ready: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/cart/quote", post(quote))
}

/// Look up every artwork in the cart and price it against the live catalog.
pub(crate) async fn price(state: &AppState, cart: &Cart) -> Result<PricedCart, AppError> {
    let ids = cart.normalized().artwork_ids();
    let artworks: HashMap<Uuid, Artwork> = state
        .artworks
        .get_many(&ids)
        .await?
        .into_iter()
        .map(|a| (a.id, a))
        .collect();

    Ok(price_cart(cart, &state.gallery.currency, |id| artworks.get(id)))
}

/// POST /v1/cart/quote
async fn quote(State(state): State<AppState>, Json(cart): Json<Cart>) -> Result<Json<CartQuote>, AppError> {
    let priced = price(&state, &cart).await?;
    let totals = state.pricing.quote(&priced.quote_lines());

    Ok(Json(CartQuote {
        checkout_ready: priced.is_checkout_ready(),
        lines: priced.lines,
        issues: priced.issues,
        currency: priced.currency,
        totals,
    }))
}
