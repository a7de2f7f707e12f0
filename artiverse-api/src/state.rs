use std::sync::Arc;

use tokio::sync::broadcast;

use artiverse_catalog::PricingEngine;
use artiverse_core::events::EventPublisher;
use artiverse_core::notification::Mailer;
use artiverse_core::payment::{PaymentAdapter, PaymentOrchestrator};
use artiverse_core::ratelimit::RateLimiter;
use artiverse_core::repository::{
    AnalyticsRepository, ArtistRepository, ArtworkRepository, MediaRepository, OrderRepository, UserRepository,
};
use artiverse_media::{MediaStorage, Watermark};
use artiverse_shared::GalleryEvent;
use artiverse_store::app_config::{BusinessRules, Config, MediaConfig, RateLimitConfig};
use artiverse_store::{
    DbClient, MemoryStore, PgAnalyticsRepository, PgArtistRepository, PgArtworkRepository, PgMediaRepository,
    PgOrderRepository, PgUserRepository,
};

use crate::metrics::Metrics;
use crate::middleware::resiliency::ResiliencyState;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

/// Gallery-level settings handlers need at request time
#[derive(Clone)]
pub struct GallerySettings {
    pub name: String,
    pub currency: String,
    /// Where admin alerts and contact messages go
    pub inbox: String,
    pub low_stock_threshold: i32,
    pub order_hold_minutes: u64,
}

#[derive(Clone)]
pub struct MediaSettings {
    pub config: MediaConfig,
    /// Mark stamped on protected renditions; bands when no logo is configured
    pub watermark: Arc<Watermark>,
}

#[derive(Clone)]
pub struct AppState {
    pub artworks: Arc<dyn ArtworkRepository>,
    pub artists: Arc<dyn ArtistRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub users: Arc<dyn UserRepository>,
    pub media: Arc<dyn MediaRepository>,
    pub analytics: Arc<dyn AnalyticsRepository>,
    pub storage: Arc<dyn MediaStorage>,
    pub mailer: Arc<dyn Mailer>,
    pub events: Arc<dyn EventPublisher>,
    pub limiter: Arc<dyn RateLimiter>,
    pub payment_orchestrator: Arc<PaymentOrchestrator>,
    pub pricing: Arc<PricingEngine>,
    pub sse_tx: broadcast::Sender<GalleryEvent>,
    pub auth: AuthConfig,
    pub gallery: GallerySettings,
    pub media_settings: MediaSettings,
    pub rate_limit: RateLimitConfig,
    /// Allowed browser origins; empty allows any
    pub cors_origins: Vec<String>,
    pub resiliency: Arc<ResiliencyState>,
    pub metrics: Arc<Metrics>,
}

/// Repository implementations behind the state
#[derive(Clone)]
pub struct Repositories {
    pub artworks: Arc<dyn ArtworkRepository>,
    pub artists: Arc<dyn ArtistRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub users: Arc<dyn UserRepository>,
    pub media: Arc<dyn MediaRepository>,
    pub analytics: Arc<dyn AnalyticsRepository>,
}

impl Repositories {
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            artworks: store.clone(),
            artists: store.clone(),
            orders: store.clone(),
            users: store.clone(),
            media: store.clone(),
            analytics: store,
        }
    }

    pub fn postgres(db: &DbClient) -> Self {
        Self {
            artworks: Arc::new(PgArtworkRepository::new(db.pool.clone())),
            artists: Arc::new(PgArtistRepository::new(db.pool.clone())),
            orders: Arc::new(PgOrderRepository::new(db.pool.clone())),
            users: Arc::new(PgUserRepository::new(db.pool.clone())),
            media: Arc::new(PgMediaRepository::new(db.pool.clone())),
            analytics: Arc::new(PgAnalyticsRepository::new(db.pool.clone())),
        }
    }
}

/// Outbound integrations
pub struct Services {
    pub storage: Arc<dyn MediaStorage>,
    pub mailer: Arc<dyn Mailer>,
    pub events: Arc<dyn EventPublisher>,
    pub limiter: Arc<dyn RateLimiter>,
    pub payments: Arc<dyn PaymentAdapter>,
    pub watermark: Watermark,
}

impl AppState {
    /// `rules` may differ from `config.business_rules` after store overrides.
    pub fn new(
        config: &Config,
        rules: &BusinessRules,
        repos: Repositories,
        services: Services,
    ) -> Result<Self, prometheus::Error> {
        let (sse_tx, _) = broadcast::channel(100);

        Ok(Self {
            artworks: repos.artworks,
            artists: repos.artists,
            orders: repos.orders,
            users: repos.users,
            media: repos.media,
            analytics: repos.analytics,
            storage: services.storage,
            mailer: services.mailer,
            events: services.events,
            limiter: services.limiter,
            payment_orchestrator: Arc::new(PaymentOrchestrator::new(services.payments)),
            pricing: Arc::new(PricingEngine::new(rules.pricing())),
            sse_tx,
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
                expiration: config.auth.jwt_expiration_seconds,
            },
            gallery: GallerySettings {
                name: config.server.gallery_name.clone(),
                currency: rules.currency.clone(),
                inbox: config.mail.inbox.clone(),
                low_stock_threshold: rules.low_stock_threshold,
                order_hold_minutes: rules.order_hold_minutes,
            },
            media_settings: MediaSettings {
                config: config.media.clone(),
                watermark: Arc::new(services.watermark),
            },
            rate_limit: config.rate_limit.clone(),
            cors_origins: config.server.cors_origins.clone(),
            resiliency: Arc::new(ResiliencyState::new()),
            metrics: Arc::new(Metrics::new()?),
        })
    }
}
