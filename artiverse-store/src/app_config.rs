use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    pub media: MediaConfig,
    pub mail: MailConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    #[serde(default = "default_gallery_name")]
    pub gallery_name: String,
    /// Allowed CORS origins; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_gallery_name() -> String {
    "Artiverse Galleria".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub tax_rate: f64,
    pub shipping_flat_cents: i64,
    pub free_shipping_threshold_cents: Option<i64>,
    #[serde(default = "default_multiplier")]
    pub pricing_multiplier: f64,
    #[serde(default)]
    pub pricing_adjustment_cents: i64,
    pub sale_start: Option<String>, // ISO 8601
    pub sale_end: Option<String>,   // ISO 8601
    pub currency: String,
    pub order_hold_minutes: u64,
    pub low_stock_threshold: i32,
}

fn default_multiplier() -> f64 {
    1.0
}

impl BusinessRules {
    /// Pricing parameters; unparseable sale dates are ignored with a warning.
    pub fn pricing(&self) -> artiverse_catalog::PricingConfig {
        let parse = |label: &str, value: &Option<String>| {
            value.as_deref().and_then(|s| match chrono::DateTime::parse_from_rfc3339(s) {
                Ok(dt) => Some(dt.with_timezone(&chrono::Utc)),
                Err(e) => {
                    tracing::warn!("Ignoring {} '{}': {}", label, s, e);
                    None
                }
            })
        };
        artiverse_catalog::PricingConfig {
            tax_rate: self.tax_rate,
            shipping_flat_cents: self.shipping_flat_cents,
            free_shipping_threshold_cents: self.free_shipping_threshold_cents,
            sale_multiplier: self.pricing_multiplier,
            sale_adjustment_cents: self.pricing_adjustment_cents,
            sale_start: parse("sale_start", &self.sale_start),
            sale_end: parse("sale_end", &self.sale_end),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    pub root: String,
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub force_watermark: bool,
    #[serde(default = "default_watermark_min_px")]
    pub watermark_min_px: u32,
    pub watermark_path: Option<String>,
    #[serde(default = "default_watermark_opacity")]
    pub watermark_opacity: f32,
    #[serde(default = "default_cache_seconds")]
    pub cache_max_age_seconds: u64,
}

fn default_watermark_min_px() -> u32 {
    800
}

fn default_watermark_opacity() -> f32 {
    0.35
}

fn default_cache_seconds() -> u64 {
    86_400
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailConfig {
    pub from: String,
    pub inbox: String,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub auth_per_minute: u32,
    pub write_per_minute: u32,
    pub default_per_minute: u32,
    pub max_keys: usize,
    /// Honour the first `X-Forwarded-For` hop (set when behind a proxy)
    #[serde(default = "default_true")]
    pub trust_forwarded_for: bool,
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. ARTIVERSE__AUTH__JWT_SECRET
            .add_source(config::Environment::with_prefix("ARTIVERSE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
