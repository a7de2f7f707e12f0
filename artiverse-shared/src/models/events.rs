use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kafka topic for storefront analytics events.
pub const ANALYTICS_TOPIC: &str = "analytics.events";
/// Kafka topic for order lifecycle events.
pub const ORDERS_TOPIC: &str = "orders.events";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPlacedEvent {
    pub order_id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub total_cents: i64,
    pub currency: String,
    pub item_count: u32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPaidEvent {
    pub order_id: Uuid,
    pub order_number: String,
    pub total_cents: i64,
    pub payment_reference: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderStatusChangedEvent {
    pub order_id: Uuid,
    pub order_number: String,
    pub from: String,
    pub to: String,
    pub actor: String,
    pub timestamp: i64,
}

/// Everything the admin live feed can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GalleryEvent {
    OrderPlaced(OrderPlacedEvent),
    OrderPaid(OrderPaidEvent),
    OrderStatusChanged(OrderStatusChangedEvent),
}

impl GalleryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GalleryEvent::OrderPlaced(_) => "order_placed",
            GalleryEvent::OrderPaid(_) => "order_paid",
            GalleryEvent::OrderStatusChanged(_) => "order_status_changed",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            GalleryEvent::OrderPlaced(e) => e.order_id,
            GalleryEvent::OrderPaid(e) => e.order_id,
            GalleryEvent::OrderStatusChanged(e) => e.order_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PageView,
    ArtworkView,
    Search,
    AddToCart,
    RemoveFromCart,
    CheckoutStarted,
    Purchase,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::PageView,
        EventKind::ArtworkView,
        EventKind::Search,
        EventKind::AddToCart,
        EventKind::RemoveFromCart,
        EventKind::CheckoutStarted,
        EventKind::Purchase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PageView => "page_view",
            EventKind::ArtworkView => "artwork_view",
            EventKind::Search => "search",
            EventKind::AddToCart => "add_to_cart",
            EventKind::RemoveFromCart => "remove_from_cart",
            EventKind::CheckoutStarted => "checkout_started",
            EventKind::Purchase => "purchase",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

/// A single tracked storefront interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub session_id: String,
    pub user_id: Option<Uuid>,
    pub path: Option<String>,
    pub artwork_id: Option<Uuid>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}
