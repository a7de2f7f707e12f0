use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use artiverse_api::state::{Repositories, Services};
use artiverse_api::{app, worker, AppState};
use artiverse_core::events::{EventPublisher, NoopPublisher};
use artiverse_core::identity::{hash_password, normalize_email, Role, User};
use artiverse_core::notification::{LogMailer, Mailer};
use artiverse_core::payment::MockPaymentAdapter;
use artiverse_core::ratelimit::{RateLimiter, SlidingWindowLimiter};
use artiverse_media::{LocalStorage, Watermark};
use artiverse_store::app_config::{Config, MediaConfig, StorageBackend};
use artiverse_store::{DbClient, EventProducer, HttpMailer, MemoryStore, RedisClient};

const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "artiverse_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting {} API on port {}", config.server.gallery_name, config.server.port);

    // Persistence
    let (repos, rules) = match config.storage.backend {
        StorageBackend::Postgres => {
            let url = config
                .database
                .url
                .as_deref()
                .context("storage.backend is postgres but database.url is not set")?;
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            let rules = db
                .fetch_business_rules(config.business_rules.clone())
                .await
                .context("Failed to load store settings")?;
            (Repositories::postgres(&db), rules)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            (Repositories::memory(Arc::new(MemoryStore::new())), config.business_rules.clone())
        }
    };

    // Rate limiting
    let limiter: Arc<dyn RateLimiter> = match config.redis.url.as_deref() {
        Some(url) => Arc::new(RedisClient::new(url).await.context("Failed to connect to Redis")?),
        None => Arc::new(SlidingWindowLimiter::new(config.rate_limit.max_keys)),
    };

    // Event bus
    let events: Arc<dyn EventPublisher> = match config.kafka.brokers.as_deref() {
        Some(brokers) => Arc::new(EventProducer::new(brokers).context("Failed to create Kafka producer")?),
        None => Arc::new(NoopPublisher),
    };

    // Mail
    let mailer: Arc<dyn Mailer> = match (config.mail.api_url.as_deref(), config.mail.api_key.as_deref()) {
        (Some(url), Some(key)) => Arc::new(HttpMailer::new(url, key, &config.mail.from).context("Failed to build mailer")?),
        _ => {
            tracing::info!("No mail API configured; e-mails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let services = Services {
        storage: Arc::new(LocalStorage::new(&config.media.root)),
        mailer,
        events,
        limiter,
        payments: Arc::new(MockPaymentAdapter::new()),
        watermark: load_watermark(&config.media).await?,
    };

    let app_state = AppState::new(&config, &rules, repos, services).context("Failed to register metrics")?;
    bootstrap_admin(&app_state, &config).await?;

    tokio::spawn(worker::start_order_expiry_worker(app_state.clone(), EXPIRY_SWEEP_INTERVAL));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

async fn load_watermark(media: &MediaConfig) -> anyhow::Result<Watermark> {
    match media.watermark_path.as_deref() {
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read watermark {}", path))?;
            Ok(Watermark::logo(&bytes, media.watermark_opacity).with_context(|| format!("Invalid watermark {}", path))?)
        }
        None => Ok(Watermark::bands(media.watermark_opacity)),
    }
}

/// Create the configured administrator on first start.
async fn bootstrap_admin(state: &AppState, config: &Config) -> anyhow::Result<()> {
    let (Some(email), Some(password)) = (config.auth.admin_email.as_deref(), config.auth.admin_password.as_deref()) else {
        return Ok(());
    };

    let email = normalize_email(email);
    if state.users.get_by_email(&email).await?.is_some() {
        tracing::debug!("Admin account already present");
        return Ok(());
    }

    let user = User::new(&email, "Administrator", hash_password(password)?, Role::Admin);
    state.users.create(&user).await?;
    tracing::info!("Created admin account {}", user.id);
    Ok(())
}
