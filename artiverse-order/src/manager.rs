use chrono::Utc;
use uuid::Uuid;

use crate::cart::CartIssue;
use crate::models::{Order, OrderChange, OrderStatus, PaymentStatus};

/// Applies lifecycle transitions to orders
pub struct OrderManager;

impl OrderManager {
    /// Move `order` to `next`, keeping the payment status consistent.
    /// Returns the audit record to persist alongside the order.
    pub fn transition(
        order: &mut Order,
        next: OrderStatus,
        actor: &str,
        note: Option<String>,
    ) -> Result<OrderChange, OrderError> {
        let from = order.status;
        if !from.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: from.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        match next {
            OrderStatus::Paid => order.payment_status = PaymentStatus::Paid,
            OrderStatus::Refunded => order.payment_status = PaymentStatus::Refunded,
            OrderStatus::Cancelled if order.payment_status == PaymentStatus::Paid => {
                order.payment_status = PaymentStatus::Refunded;
            }
            _ => {}
        }

        order.status = next;
        order.updated_at = Utc::now();

        Ok(OrderChange {
            id: Uuid::new_v4(),
            order_id: order.id,
            from_status: from,
            to_status: next,
            actor: actor.to_string(),
            note,
            created_at: order.updated_at,
        })
    }

    /// Record a successful capture: Pending → Paid.
    pub fn mark_paid(order: &mut Order, reference: Option<String>, actor: &str) -> Result<OrderChange, OrderError> {
        let change = Self::transition(order, OrderStatus::Paid, actor, reference.clone())?;
        order.payment_reference = reference;
        Ok(change)
    }

    /// A declined payment leaves the order Pending so the buyer can retry.
    pub fn mark_payment_failed(order: &mut Order) -> Result<(), OrderError> {
        if order.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                from: order.status.as_str().to_string(),
                to: "PAYMENT_FAILED".to_string(),
            });
        }
        order.payment_status = PaymentStatus::Failed;
        order.updated_at = Utc::now();
        Ok(())
    }

    /// Customers may only withdraw orders nobody has paid for yet.
    pub fn customer_cancel(order: &mut Order, actor: &str) -> Result<OrderChange, OrderError> {
        if order.status != OrderStatus::Pending {
            return Err(OrderError::NotCancellable(order.status.as_str().to_string()));
        }
        Self::transition(order, OrderStatus::Cancelled, actor, Some("Cancelled by customer".to_string()))
    }

    /// Does moving to `next` put the reserved stock back on the shelf?
    pub fn restocks(next: OrderStatus) -> bool {
        next == OrderStatus::Cancelled
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },

    #[error("Order cannot be cancelled in status {0}")]
    NotCancellable(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cart has unresolved issues")]
    CartNotReady(Vec<CartIssue>),

    #[error("Insufficient stock for artwork {artwork_id}")]
    InsufficientStock {
        artwork_id: Uuid,
    },
}
