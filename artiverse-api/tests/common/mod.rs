#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use artiverse_api::middleware::auth::issue_token;
use artiverse_api::state::{Repositories, Services};
use artiverse_api::{app, AppState};
use artiverse_core::events::NoopPublisher;
use artiverse_core::identity::{hash_password, Role, User};
use artiverse_core::notification::{EmailMessage, Mailer};
use artiverse_core::payment::MockPaymentAdapter;
use artiverse_core::ratelimit::SlidingWindowLimiter;
use artiverse_core::repository::UserRepository;
use artiverse_core::CoreResult;
use artiverse_media::{LocalStorage, Watermark};
use artiverse_store::app_config::{
    AuthConfig, BusinessRules, Config, DatabaseConfig, KafkaConfig, MailConfig, MediaConfig, RateLimitConfig,
    RedisConfig, ServerConfig, StorageBackend, StorageConfig,
};
use artiverse_store::MemoryStore;

pub const ADMIN_EMAIL: &str = "curator@artiverse.test";
pub const INBOX: &str = "hello@artiverse.test";

/// Keeps every message so tests can assert on delivery.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn sent_to(&self, to: &str) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().iter().filter(|m| m.to == to).cloned().collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> CoreResult<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn test_config(media_root: &str) -> Config {
    Config {
        server: ServerConfig { port: 0, gallery_name: "Artiverse Galleria".into(), cors_origins: vec![] },
        storage: StorageConfig { backend: StorageBackend::Memory },
        database: DatabaseConfig::default(),
        redis: RedisConfig::default(),
        kafka: KafkaConfig::default(),
        auth: AuthConfig {
            jwt_secret: "integration-secret".into(),
            jwt_expiration_seconds: 3600,
            admin_email: None,
            admin_password: None,
        },
        business_rules: BusinessRules {
            tax_rate: 0.08,
            shipping_flat_cents: 1500,
            free_shipping_threshold_cents: Some(50_000),
            pricing_multiplier: 1.0,
            pricing_adjustment_cents: 0,
            sale_start: None,
            sale_end: None,
            currency: "USD".into(),
            order_hold_minutes: 30,
            low_stock_threshold: 2,
        },
        media: MediaConfig {
            root: media_root.to_string(),
            max_upload_bytes: 1024 * 1024,
            force_watermark: false,
            watermark_min_px: 800,
            watermark_path: None,
            watermark_opacity: 0.35,
            cache_max_age_seconds: 600,
        },
        mail: MailConfig {
            from: "Artiverse Galleria <no-reply@artiverse.test>".into(),
            inbox: INBOX.into(),
            api_url: None,
            api_key: None,
        },
        rate_limit: RateLimitConfig {
            enabled: true,
            auth_per_minute: 1000,
            write_per_minute: 1000,
            default_per_minute: 1000,
            max_keys: 1000,
            trust_forwarded_for: true,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub payments: Arc<MockPaymentAdapter>,
    pub mailer: Arc<RecordingMailer>,
    pub admin_token: String,
    _media_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let media_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(media_dir.path().to_str().unwrap());
        tweak(&mut config);

        let payments = Arc::new(MockPaymentAdapter::new());
        let mailer = Arc::new(RecordingMailer::default());
        let services = Services {
            storage: Arc::new(LocalStorage::new(media_dir.path())),
            mailer: mailer.clone(),
            events: Arc::new(NoopPublisher),
            limiter: Arc::new(SlidingWindowLimiter::new(config.rate_limit.max_keys)),
            payments: payments.clone(),
            watermark: Watermark::bands(config.media.watermark_opacity),
        };
        let repos = Repositories::memory(Arc::new(MemoryStore::new()));
        let state = AppState::new(&config, &config.business_rules, repos, services).unwrap();

        let admin = User::new(ADMIN_EMAIL, "Curator", hash_password("curator-pass").unwrap(), Role::Admin);
        state.users.create(&admin).await.unwrap();
        let admin_token = issue_token(&state.auth, &admin).unwrap();

        Self { router: app(state.clone()), state, payments, mailer, admin_token, _media_dir: media_dir }
    }

    pub fn media_root(&self) -> &std::path::Path {
        self._media_dir.path()
    }

    pub async fn request(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let (status, _, bytes) = self.request(req).await;
        (status, json_or_text(&bytes))
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(method, uri, Some(&self.admin_token), body).await
    }

    /// Register a customer and return their token
    pub async fn register(&self, email: &str, name: &str) -> String {
        let (status, body) = self
            .post("/v1/auth/register", None, json!({ "email": email, "name": name, "password": "s3cret-pass" }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn create_artist(&self, name: &str) -> Value {
        let (status, body) = self
            .admin(Method::POST, "/v1/admin/artists", Some(json!({ "name": name, "nationality": "NL" })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create artist failed: {}", body);
        body
    }

    pub async fn create_artwork(&self, artist_id: &str, title: &str, price_cents: i64, stock: i32, status: &str) -> Value {
        let (status_code, body) = self
            .admin(
                Method::POST,
                "/v1/admin/artworks",
                Some(json!({
                    "title": title,
                    "artist_id": artist_id,
                    "medium": "PAINTING",
                    "price_cents": price_cents,
                    "stock": stock,
                    "status": status,
                })),
            )
            .await;
        assert_eq!(status_code, StatusCode::CREATED, "create artwork failed: {}", body);
        body
    }

    /// One published artwork with the given stock; returns its id
    pub async fn seed_published(&self, price_cents: i64, stock: i32) -> String {
        let artist = self.create_artist("Mira Solen").await;
        let artwork = self
            .create_artwork(artist["id"].as_str().unwrap(), "Harbour at Dusk", price_cents, stock, "PUBLISHED")
            .await;
        artwork["id"].as_str().unwrap().to_string()
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self.post("/v1/auth/login", None, json!({ "email": email, "password": password })).await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn checkout(&self, token: Option<&str>, artwork_id: &str, quantity: u32, email: &str) -> (StatusCode, Value) {
        self.post("/v1/checkout", token, checkout_body(artwork_id, quantity, email)).await
    }

    pub async fn artwork_stock(&self, artwork_id: &str) -> i64 {
        let (status, body) = self.admin(Method::GET, &format!("/v1/admin/artworks/{}", artwork_id), None).await;
        assert_eq!(status, StatusCode::OK);
        body["stock"].as_i64().unwrap()
    }

    /// E-mails go out from spawned tasks; give them a moment.
    pub async fn wait_for_mail(&self, to: &str, count: usize) -> Vec<EmailMessage> {
        for _ in 0..50 {
            let sent = self.mailer.sent_to(to);
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.mailer.sent_to(to)
    }
}

/// Extractor rejections come back as plain text.
pub fn json_or_text(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

pub fn checkout_body(artwork_id: &str, quantity: u32, email: &str) -> Value {
    json!({
        "cart": { "items": [{ "artwork_id": artwork_id, "quantity": quantity }] },
        "customer": { "name": "Ada Collector", "email": email, "phone": null },
        "shipping_address": {
            "line1": "12 Canal Street",
            "line2": null,
            "city": "Amsterdam",
            "region": null,
            "postal_code": "1012 AB",
            "country": "NL"
        },
        "notes": "Please pack carefully"
    })
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| image::Rgb([(x * 4) as u8, (y * 4) as u8, 160]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub const BOUNDARY: &str = "artiverse-test-boundary";

/// Hand-built multipart body: text fields first, then the file.
pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n", BOUNDARY, name, value).as_bytes(),
        );
    }
    if let Some((filename, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
