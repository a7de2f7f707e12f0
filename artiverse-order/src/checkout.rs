use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use artiverse_catalog::PriceBreakdown;

use crate::cart::{Cart, PricedCart};
use crate::manager::OrderError;
use crate::models::{generate_order_number, Order, OrderItem, OrderStatus, PaymentStatus};

pub const MAX_NOTES_LEN: usize = 1000;

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("static regex")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && email_regex().is_match(email)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Address {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub cart: Cart,
    pub customer: CustomerInfo,
    pub shipping_address: Address,
    pub notes: Option<String>,
}

impl CheckoutRequest {
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.cart.normalized().is_empty() {
            return Err(OrderError::Validation("cart is empty".into()));
        }
        if self.customer.name.trim().is_empty() {
            return Err(OrderError::Validation("customer name is required".into()));
        }
        if !is_valid_email(self.customer.email.trim()) {
            return Err(OrderError::Validation("customer email is invalid".into()));
        }
        let a = &self.shipping_address;
        if a.line1.trim().is_empty() || a.city.trim().is_empty() || a.postal_code.trim().is_empty() {
            return Err(OrderError::Validation("shipping address is incomplete".into()));
        }
        if a.country.len() != 2 || !a.country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(OrderError::Validation("country must be a 2-letter code".into()));
        }
        if self.notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            return Err(OrderError::Validation("notes are too long".into()));
        }
        Ok(())
    }

    /// Turn a priced, issue-free cart into a Pending order.
    pub fn build_order(
        &self,
        priced: &PricedCart,
        breakdown: PriceBreakdown,
        user_id: Option<Uuid>,
        artist_names: &HashMap<Uuid, String>,
    ) -> Result<Order, OrderError> {
        if !priced.is_checkout_ready() {
            return Err(OrderError::CartNotReady(priced.issues.clone()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let items = priced
            .lines
            .iter()
            .map(|line| OrderItem {
                id: Uuid::new_v4(),
                order_id: id,
                artwork_id: line.artwork_id,
                title: line.title.clone(),
                artist_name: artist_names.get(&line.artist_id).cloned(),
                unit_price_cents: line.unit_price_cents,
                quantity: line.quantity,
                line_total_cents: line.line_total_cents,
            })
            .collect();

        Ok(Order {
            id,
            order_number: generate_order_number(id, now),
            user_id,
            customer: CustomerInfo {
                name: self.customer.name.trim().to_string(),
                email: self.customer.email.trim().to_lowercase(),
                phone: self.customer.phone.clone(),
            },
            shipping_address: Address {
                country: self.shipping_address.country.to_ascii_uppercase(),
                ..self.shipping_address.clone()
            },
            items,
            subtotal_cents: breakdown.subtotal_cents,
            discount_cents: breakdown.discount_cents,
            shipping_cents: breakdown.shipping_cents,
            tax_cents: breakdown.tax_cents,
            total_cents: breakdown.total_cents,
            currency: priced.currency.clone(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_reference: None,
            notes: self.notes.clone().filter(|n| !n.trim().is_empty()),
            created_at: now,
            updated_at: now,
        })
    }
}
