use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use artiverse_core::notification::templates;
use artiverse_core::payment::IntentStatus;
use artiverse_order::{OrderManager, OrderStatus};

use crate::error::AppError;
use crate::notify;
use crate::orders::load_order;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: PaymentIntentObject,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub status: Option<String>,
}

const HANDLED: [&str; 3] = [
    "payment_intent.succeeded",
    "payment_intent.payment_failed",
    "payment_intent.canceled",
];

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Receive payment status updates from the provider
async fn handle_payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentWebhook>,
) -> Result<Json<Value>, AppError> {
    tracing::info!(
        "Received webhook {}: {} for intent {} ({})",
        payload.id,
        payload.type_,
        payload.data.object.id,
        payload.data.object.status.as_deref().unwrap_or("no status")
    );

    if !HANDLED.contains(&payload.type_.as_str()) {
        return Ok(Json(json!({ "received": true, "handled": false })));
    }

    // The payload is only a hint; the provider's copy of the intent decides.
    let intent = state.payment_orchestrator.process_status_update(&payload.data.object.id).await?;
    let mut order = load_order(&state, intent.order_id).await?;

    match intent.status {
        IntentStatus::Succeeded if order.status == OrderStatus::Pending => {
            let reference = intent.reference.clone().unwrap_or_else(|| intent.id.clone());
            let change = OrderManager::mark_paid(&mut order, Some(reference), "payment-webhook")?;
            state.orders.update(&order, OrderStatus::Pending, Some(&change), false).await?;
            tracing::info!("Order {} marked as PAID via webhook", order.order_number);

            notify::send_email(&state, templates::payment_received(&state.gallery.name, &order));
            notify::emit(&state, notify::order_paid(&order));
        }
        IntentStatus::Failed | IntentStatus::Canceled if order.status == OrderStatus::Pending => {
            OrderManager::mark_payment_failed(&mut order)?;
            state.orders.update(&order, OrderStatus::Pending, None, false).await?;
            tracing::info!("Payment for order {} reported as {:?}", order.order_number, intent.status);
        }
        other => {
            tracing::debug!(
                "Webhook for order {} ignored: intent {:?}, order {}",
                order.order_number,
                other,
                order.status.as_str()
            );
        }
    }

    Ok(Json(json!({ "received": true, "handled": true, "order_status": order.status })))
}
