use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;
use serde_json::Value;

use crate::app_config::BusinessRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct SettingRow {
    setting_key: String,
    setting_value: Value,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rows of `store_settings` on the configured rules.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows = sqlx::query_as::<_, SettingRow>("SELECT setting_key, setting_value FROM store_settings")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for row in rows {
            apply_setting(&mut rules, &row.setting_key, &row.setting_value);
        }
        Ok(rules)
    }
}

/// Expected value shape: `{"value": <number/string>}`
pub fn apply_setting(rules: &mut BusinessRules, key: &str, raw: &Value) {
    let Some(v) = raw.get("value") else {
        tracing::warn!("store_settings.{} has no \"value\" field", key);
        return;
    };
    match key {
        "tax_rate" => {
            if let Some(f) = v.as_f64() {
                rules.tax_rate = f;
            }
        }
        "shipping_flat_cents" => {
            if let Some(i) = v.as_i64() {
                rules.shipping_flat_cents = i;
            }
        }
        "free_shipping_threshold_cents" => {
            rules.free_shipping_threshold_cents = v.as_i64();
        }
        "pricing_multiplier" => {
            if let Some(f) = v.as_f64() {
                rules.pricing_multiplier = f;
            }
        }
        "pricing_adjustment_cents" => {
            if let Some(i) = v.as_i64() {
                rules.pricing_adjustment_cents = i;
            }
        }
        "sale_start" => {
            rules.sale_start = v.as_str().map(String::from);
        }
        "sale_end" => {
            rules.sale_end = v.as_str().map(String::from);
        }
        "order_hold_minutes" => {
            if let Some(u) = v.as_u64() {
                rules.order_hold_minutes = u;
            }
        }
        "low_stock_threshold" => {
            if let Some(i) = v.as_i64() {
                rules.low_stock_threshold = i as i32;
            }
        }
        other => tracing::warn!("Unknown store setting '{}'", other),
    }
}
