use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artiverse_catalog::Page;
use artiverse_core::notification::templates;
use artiverse_core::payment::{intent_id_for, IntentStatus, PaymentError, PaymentIntent};
use artiverse_core::repository::OrderFilter;
use artiverse_order::{CheckoutRequest, Order, OrderManager, OrderStatus};
use artiverse_shared::Masked;

use crate::cart;
use crate::error::AppError;
use crate::middleware::{Claims, MaybeUser};
use crate::notify;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    pub intent_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub client_secret: Option<String>,
}

impl From<PaymentIntent> for PaymentIntentResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            intent_id: intent.id,
            amount_cents: intent.amount_cents,
            currency: intent.currency,
            client_secret: intent.client_secret,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: Order,
    pub payment: Option<PaymentIntentResponse>,
}

#[derive(Debug, Deserialize)]
pub struct PayOrderRequest {
    pub payment_token: String,
    /// Guest orders prove ownership with the checkout e-mail
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PayOrderResponse {
    pub order: Order,
    pub payment_status: IntentStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub order_number: String,
    pub email: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MyOrdersQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/checkout", post(checkout))
        .route("/v1/orders/lookup", post(lookup_order))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/pay", post(pay_order))
        .route("/v1/orders/{id}/cancel", post(cancel_order))
}

/// Behind the customer middleware
pub fn customer_routes() -> Router<AppState> {
    Router::new().route("/v1/orders/mine", get(my_orders))
}

// ============================================================================
// Access
// ============================================================================

pub(crate) async fn load_order(state: &AppState, order_id: Uuid) -> Result<Order, AppError> {
    state
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("order {}", order_id)))
}

/// Admins see everything, accounts see their own orders, and guest orders
/// open to whoever presents the checkout e-mail. Anything else looks like a
/// missing order.
fn authorize(order: &Order, claims: Option<&Claims>, email: Option<&str>) -> Result<(), AppError> {
    if let Some(claims) = claims {
        if claims.is_admin() || order.is_owned_by(claims.user_id()?) {
            return Ok(());
        }
    }
    if order.user_id.is_none() {
        if let Some(email) = email {
            if order.customer.email.eq_ignore_ascii_case(email.trim()) {
                return Ok(());
            }
        }
    }
    if claims.is_none() && email.is_none() {
        return Err(AppError::AuthenticationError("sign in or provide the order e-mail".into()));
    }
    Err(AppError::NotFoundError(format!("order {}", order.id)))
}

fn actor(claims: Option<&Claims>) -> String {
    claims.map(|c| c.email.clone()).unwrap_or_else(|| "guest".to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/checkout
async fn checkout(
    State(state): State<AppState>,
    MaybeUser(claims): MaybeUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    req.validate()?;

    let priced = cart::price(&state, &req.cart).await?;
    if !priced.is_checkout_ready() {
        let summary = serde_json::to_string(&priced.issues).unwrap_or_default();
        return Err(AppError::ConflictError(format!("cart has unresolved issues: {}", summary)));
    }

    let artist_ids: Vec<Uuid> = priced.lines.iter().map(|l| l.artist_id).collect();
    let artist_names: HashMap<Uuid, String> = state
        .artists
        .get_many(&artist_ids)
        .await?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();

    let user_id = claims.as_ref().map(Claims::user_id).transpose()?;
    let breakdown = state.pricing.quote(&priced.quote_lines());
    let order = req.build_order(&priced, breakdown, user_id, &artist_names)?;

    // Takes the stock; nothing is written when any line falls short.
    state.orders.create(&order).await?;
    tracing::info!(
        "Order {} placed by {} for {} {}",
        order.order_number,
        Masked(order.customer.email.as_str()),
        order.total_cents,
        order.currency
    );

    let payment = match state
        .payment_orchestrator
        .initialize_payment(order.id, order.total_cents, &order.currency)
        .await
    {
        Ok(intent) => Some(intent.into()),
        Err(e) => {
            // The pay endpoint creates the intent lazily.
            tracing::warn!("Could not create payment intent for {}: {}", order.order_number, e);
            None
        }
    };

    notify::send_email(&state, templates::order_confirmation(&state.gallery.name, &order));
    notify::send_email(&state, templates::admin_new_order(&state.gallery.name, &state.gallery.inbox, &order));
    notify::emit(&state, notify::order_placed(&order));

    Ok((StatusCode::CREATED, Json(CheckoutResponse { order, payment })))
}

async fn intent_for(state: &AppState, order: &Order) -> Result<PaymentIntent, AppError> {
    match state.payment_orchestrator.process_status_update(&intent_id_for(order.id)).await {
        Ok(intent) => Ok(intent),
        Err(PaymentError::UnknownIntent(_)) => Ok(state
            .payment_orchestrator
            .initialize_payment(order.id, order.total_cents, &order.currency)
            .await?),
        Err(e) => Err(e.into()),
    }
}

/// POST /v1/orders/{id}/pay
async fn pay_order(
    State(state): State<AppState>,
    MaybeUser(claims): MaybeUser,
    Path(order_id): Path<Uuid>,
    Json(req): Json<PayOrderRequest>,
) -> Result<(StatusCode, Json<PayOrderResponse>), AppError> {
    let mut order = load_order(&state, order_id).await?;
    authorize(&order, claims.as_ref(), req.email.as_deref())?;

    if order.status != OrderStatus::Pending {
        return Err(AppError::ConflictError(format!(
            "order {} is {} and not awaiting payment",
            order.order_number,
            order.status.as_str()
        )));
    }
    if req.payment_token.trim().is_empty() {
        return Err(AppError::ValidationError("payment_token is required".into()));
    }

    let intent = intent_for(&state, &order).await?;
    // Gateway failures surface as 503 and feed the circuit breaker.
    let status = state.payment_orchestrator.process_payment(&intent, req.payment_token.trim()).await?;

    match status {
        IntentStatus::Succeeded => {
            let reference = state
                .payment_orchestrator
                .process_status_update(&intent.id)
                .await
                .ok()
                .and_then(|i| i.reference)
                .unwrap_or_else(|| intent.id.clone());

            let change = OrderManager::mark_paid(&mut order, Some(reference), "payment")?;
            if let Err(e) = state.orders.update(&order, OrderStatus::Pending, Some(&change), false).await {
                tracing::error!(
                    "Captured payment {:?} for order {} could not be recorded: {}",
                    order.payment_reference,
                    order.order_number,
                    e
                );
                return Err(e.into());
            }
            tracing::info!("Order {} paid", order.order_number);

            notify::send_email(&state, templates::payment_received(&state.gallery.name, &order));
            notify::emit(&state, notify::order_paid(&order));
            Ok((StatusCode::OK, Json(PayOrderResponse { order, payment_status: status })))
        }
        // Settles later through the webhook.
        IntentStatus::Processing => Ok((StatusCode::ACCEPTED, Json(PayOrderResponse { order, payment_status: status }))),
        IntentStatus::Failed | IntentStatus::Canceled | IntentStatus::RequiresPaymentMethod => {
            OrderManager::mark_payment_failed(&mut order)?;
            state.orders.update(&order, OrderStatus::Pending, None, false).await?;
            tracing::info!("Payment declined for order {}", order.order_number);
            Err(AppError::PaymentRequired("payment was declined".into()))
        }
    }
}

/// GET /v1/orders/{id}
async fn get_order(
    State(state): State<AppState>,
    MaybeUser(claims): MaybeUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = load_order(&state, order_id).await?;
    authorize(&order, claims.as_ref(), None)?;
    Ok(Json(order))
}

/// POST /v1/orders/lookup
async fn lookup_order(State(state): State<AppState>, Json(req): Json<LookupRequest>) -> Result<Json<Order>, AppError> {
    let not_found = || AppError::NotFoundError("no order matches that number and e-mail".into());
    let order = state
        .orders
        .get_by_number(req.order_number.trim())
        .await?
        .filter(|o| o.matches_guest_lookup(&req.order_number, &req.email))
        .ok_or_else(not_found)?;
    Ok(Json(order))
}

/// GET /v1/orders/mine
async fn my_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MyOrdersQuery>,
) -> Result<Json<Page<Order>>, AppError> {
    let filter = OrderFilter {
        user_id: Some(claims.user_id()?),
        page: query.page,
        per_page: query.per_page,
        ..Default::default()
    };
    Ok(Json(state.orders.list(&filter).await?))
}

/// POST /v1/orders/{id}/cancel
async fn cancel_order(
    State(state): State<AppState>,
    MaybeUser(claims): MaybeUser,
    Path(order_id): Path<Uuid>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<Order>, AppError> {
    let mut order = load_order(&state, order_id).await?;
    authorize(&order, claims.as_ref(), req.email.as_deref())?;

    let change = OrderManager::customer_cancel(&mut order, &actor(claims.as_ref()))?;
    state.orders.update(&order, change.from_status, Some(&change), true).await?;
    tracing::info!("Order {} cancelled by customer", order.order_number);

    if let Some(message) = templates::status_update(&state.gallery.name, &order) {
        notify::send_email(&state, message);
    }
    notify::emit(&state, notify::status_changed(&order, &change));
    Ok(Json(order))
}
