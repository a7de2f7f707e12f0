//! Fire-and-forget side effects of request handlers.

use chrono::Utc;

use artiverse_core::events::publish_gallery_event;
use artiverse_core::notification::EmailMessage;
use artiverse_order::{Order, OrderChange};
use artiverse_shared::models::events::{OrderPaidEvent, OrderPlacedEvent, OrderStatusChangedEvent};
use artiverse_shared::{GalleryEvent, Masked};

use crate::state::AppState;

/// Deliver on a background task; failures are logged, never surfaced.
pub fn send_email(state: &AppState, message: EmailMessage) {
    let mailer = state.mailer.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&message).await {
            tracing::error!("Failed to send '{}' to {}: {}", message.subject, Masked(message.to.as_str()), e);
        }
    });
}

/// Push to the admin live feed and the event bus.
pub fn emit(state: &AppState, event: GalleryEvent) {
    // No subscribers is the normal case.
    let _ = state.sse_tx.send(event.clone());

    let events = state.events.clone();
    tokio::spawn(async move {
        if let Err(e) = publish_gallery_event(events.as_ref(), &event).await {
            tracing::warn!("Failed to publish {} for order {}: {}", event.name(), event.order_id(), e);
        }
    });
}

pub fn order_placed(order: &Order) -> GalleryEvent {
    GalleryEvent::OrderPlaced(OrderPlacedEvent {
        order_id: order.id,
        order_number: order.order_number.clone(),
        user_id: order.user_id,
        total_cents: order.total_cents,
        currency: order.currency.clone(),
        item_count: order.item_count(),
        timestamp: Utc::now().timestamp(),
    })
}

pub fn order_paid(order: &Order) -> GalleryEvent {
    GalleryEvent::OrderPaid(OrderPaidEvent {
        order_id: order.id,
        order_number: order.order_number.clone(),
        total_cents: order.total_cents,
        payment_reference: order.payment_reference.clone(),
        timestamp: Utc::now().timestamp(),
    })
}

pub fn status_changed(order: &Order, change: &OrderChange) -> GalleryEvent {
    GalleryEvent::OrderStatusChanged(OrderStatusChangedEvent {
        order_id: order.id,
        order_number: order.order_number.clone(),
        from: change.from_status.as_str().to_string(),
        to: change.to_status.as_str().to_string(),
        actor: change.actor.clone(),
        timestamp: change.created_at.timestamp(),
    })
}
