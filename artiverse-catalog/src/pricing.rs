use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use artiverse_shared::money::{percent_of, scale_cents};

/// Store-wide pricing rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Sales tax applied to discounted goods (0.08 = 8%)
    pub tax_rate: f64,

    /// Flat shipping charge per order
    pub shipping_flat_cents: i64,

    /// Orders at or above this amount ship free
    pub free_shipping_threshold_cents: Option<i64>,

    /// Multiplier applied to the subtotal while a sale is running
    pub sale_multiplier: f64,

    /// Fixed adjustment applied after the multiplier (negative = discount)
    pub sale_adjustment_cents: i64,

    pub sale_start: Option<DateTime<Utc>>,
    pub sale_end: Option<DateTime<Utc>>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: 0.0,
            shipping_flat_cents: 0,
            free_shipping_threshold_cents: None,
            sale_multiplier: 1.0,
            sale_adjustment_cents: 0,
            sale_start: None,
            sale_end: None,
        }
    }
}

/// One cart line as the pricing engine sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteLine {
    pub unit_price_cents: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

/// Cart-level pricing
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Is the configured sale window open at `now`?
    pub fn sale_active(&self, now: DateTime<Utc>) -> bool {
        if (self.config.sale_multiplier - 1.0).abs() < f64::EPSILON && self.config.sale_adjustment_cents == 0 {
            return false;
        }
        if let Some(start) = self.config.sale_start {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.config.sale_end {
            if now > end {
                return false;
            }
        }
        true
    }

    pub fn quote(&self, lines: &[QuoteLine]) -> PriceBreakdown {
        self.quote_at(lines, Utc::now())
    }

    pub fn quote_at(&self, lines: &[QuoteLine], now: DateTime<Utc>) -> PriceBreakdown {
        let subtotal: i64 = lines
            .iter()
            .map(|l| l.unit_price_cents * i64::from(l.quantity))
            .sum();

        if subtotal == 0 {
            return PriceBreakdown::default();
        }

        let discount = if self.sale_active(now) {
            let adjusted = scale_cents(subtotal, self.config.sale_multiplier) + self.config.sale_adjustment_cents;
            // Sales may only lower the price, and never below zero.
            (subtotal - adjusted.max(0)).clamp(0, subtotal)
        } else {
            0
        };

        let goods = subtotal - discount;

        let shipping = match self.config.free_shipping_threshold_cents {
            Some(threshold) if goods >= threshold => 0,
            _ => self.config.shipping_flat_cents,
        };

        let tax = percent_of(goods, self.config.tax_rate);

        PriceBreakdown {
            subtotal_cents: subtotal,
            discount_cents: discount,
            shipping_cents: shipping,
            tax_cents: tax,
            total_cents: goods + shipping + tax,
        }
    }
}
