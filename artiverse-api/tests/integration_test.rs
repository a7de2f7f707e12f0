mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use artiverse_api::worker::expire_stale_orders;
use artiverse_core::payment::IntentStatus;
use artiverse_core::repository::OrderRepository;
use artiverse_order::OrderStatus;

use common::{checkout_body, json_or_text, multipart_body, png_bytes, TestApp, ADMIN_EMAIL, BOUNDARY, INBOX};

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn test_register_login_and_profile() {
    let app = TestApp::new().await;
    let token = app.register("Ada@Example.com", "Ada Collector").await;

    let (status, me) = app.get("/v1/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ada@example.com");
    assert_eq!(me["role"], "CUSTOMER");
    assert!(me.get("password_hash").is_none());

    let welcome = app.wait_for_mail("ada@example.com", 1).await;
    assert_eq!(welcome.len(), 1);

    let (status, _) = app
        .post("/v1/auth/register", None, json!({ "email": "ada@example.com", "name": "Again", "password": "another-pass" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .post("/v1/auth/login", None, json!({ "email": "ada@example.com", "password": "s3cret-pass" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some());

    let (status, _) = app
        .post("/v1/auth/login", None, json!({ "email": "ada@example.com", "password": "wrong-pass" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, updated) = app
        .send(Method::PATCH, "/v1/auth/me", Some(&token), Some(json!({ "name": "Ada L." })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Ada L.");
}

#[tokio::test]
async fn test_change_password() {
    let app = TestApp::new().await;
    let token = app.register("bo@example.com", "Bo").await;

    let (status, _) = app
        .post("/v1/auth/password", Some(&token), json!({ "current_password": "nope-nope", "new_password": "fresh-pass-1" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/v1/auth/password", Some(&token), json!({ "current_password": "s3cret-pass", "new_password": "fresh-pass-1" }))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .post("/v1/auth/login", None, json!({ "email": "bo@example.com", "password": "fresh-pass-1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_account_routes_require_token() {
    let app = TestApp::new().await;
    let (status, _) = app.get("/v1/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/v1/auth/me", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn test_public_catalog_hides_drafts() {
    let app = TestApp::new().await;
    let artist = app.create_artist("Jun Okada").await;
    let artist_id = artist["id"].as_str().unwrap();
    let published = app.create_artwork(artist_id, "Quiet Field", 90_000, 1, "PUBLISHED").await;
    let draft = app.create_artwork(artist_id, "Unfinished Study", 40_000, 1, "DRAFT").await;

    let (status, page) = app.get("/v1/artworks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], published["id"]);

    let slug = published["slug"].as_str().unwrap();
    let (status, detail) = app.get(&format!("/v1/artworks/{}", slug), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["artist"]["name"], "Jun Okada");
    assert_eq!(detail["effective_price_cents"], 90_000);

    let (status, _) = app.get(&format!("/v1/artworks/{}", draft["id"].as_str().unwrap()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, detail) = app.get(&format!("/v1/artists/{}", artist_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["artworks"]["total"], 1);
}

#[tokio::test]
async fn test_artist_with_artworks_cannot_be_deleted() {
    let app = TestApp::new().await;
    let artist = app.create_artist("Lena Vos").await;
    let artist_id = artist["id"].as_str().unwrap();
    let artwork = app.create_artwork(artist_id, "Salt Flats", 50_000, 1, "PUBLISHED").await;

    let (status, _) = app.admin(Method::DELETE, &format!("/v1/admin/artists/{}", artist_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .admin(Method::POST, "/v1/admin/artworks", Some(json!({
            "title": "Orphan", "artist_id": Uuid::new_v4(), "medium": "PRINT", "price_cents": 1000
        })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Archiving takes it off the storefront
    let artwork_id = artwork["id"].as_str().unwrap();
    let (status, _) = app.admin(Method::DELETE, &format!("/v1/admin/artworks/{}", artwork_id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&format!("/v1/artworks/{}", artwork_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Cart and checkout
// ============================================================================

#[tokio::test]
async fn test_cart_quote_reports_issues() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(120_000, 1).await;
    let missing = Uuid::new_v4();

    let (status, quote) = app
        .post(
            "/v1/cart/quote",
            None,
            json!({ "items": [
                { "artwork_id": artwork_id, "quantity": 3 },
                { "artwork_id": missing, "quantity": 1 }
            ] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quote["checkout_ready"], false);
    assert_eq!(quote["lines"][0]["quantity"], 1);

    let kinds: Vec<&str> = quote["issues"].as_array().unwrap().iter().map(|i| i["type"].as_str().unwrap()).collect();
    assert!(kinds.contains(&"quantity_reduced"));
    assert!(kinds.contains(&"not_found"));

    let totals = &quote["totals"];
    let expected = totals["subtotal_cents"].as_i64().unwrap() - totals["discount_cents"].as_i64().unwrap()
        + totals["shipping_cents"].as_i64().unwrap()
        + totals["tax_cents"].as_i64().unwrap();
    assert_eq!(totals["total_cents"].as_i64().unwrap(), expected);
}

#[tokio::test]
async fn test_checkout_reserves_stock_and_notifies() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 2).await;
    let token = app.register("buyer@example.com", "Buyer").await;
    let mut feed = app.state.sse_tx.subscribe();

    let (status, body) = app.checkout(Some(&token), &artwork_id, 2, "buyer@example.com").await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["order"]["status"], "PENDING");
    assert_eq!(body["order"]["payment_status"], "UNPAID");
    assert_eq!(body["order"]["items"][0]["quantity"], 2);
    assert_eq!(body["payment"]["amount_cents"], body["order"]["total_cents"]);

    assert_eq!(app.artwork_stock(&artwork_id).await, 0);

    let event = feed.try_recv().unwrap();
    assert_eq!(event.name(), "order_placed");

    // Welcome plus confirmation for the buyer, alert for the gallery
    assert_eq!(app.wait_for_mail("buyer@example.com", 2).await.len(), 2);
    assert_eq!(app.wait_for_mail(INBOX, 1).await.len(), 1);

    let (status, mine) = app.get("/v1/orders/mine", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["total"], 1);
}

#[tokio::test]
async fn test_checkout_rejects_oversold_cart() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 1).await;

    let (status, _) = app.checkout(None, &artwork_id, 1, "first@example.com").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.checkout(None, &artwork_id, 1, "second@example.com").await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    assert_eq!(app.artwork_stock(&artwork_id).await, 0);
}

#[tokio::test]
async fn test_checkout_validates_input() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 1).await;

    let mut body = checkout_body(&artwork_id, 1, "not-an-email");
    let (status, _) = app.post("/v1/checkout", None, body.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    body["customer"]["email"] = json!("ok@example.com");
    body["cart"]["items"] = json!([]);
    let (status, _) = app.post("/v1/checkout", None, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Payments
// ============================================================================

#[tokio::test]
async fn test_pay_order_success_and_decline() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 2).await;

    let (_, placed) = app.checkout(None, &artwork_id, 1, "guest@example.com").await;
    let order_id = placed["order"]["id"].as_str().unwrap().to_string();
    let pay_uri = format!("/v1/orders/{}/pay", order_id);

    let (status, body) = app
        .post(&pay_uri, None, json!({ "payment_token": "tok_decline", "email": "guest@example.com" }))
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED, "{}", body);

    let order_number = placed["order"]["order_number"].as_str().unwrap();
    let (status, order) = app
        .post("/v1/orders/lookup", None, json!({ "order_number": order_number, "email": "GUEST@example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["payment_status"], "FAILED");

    let (status, paid) = app
        .post(&pay_uri, None, json!({ "payment_token": "tok_visa", "email": "guest@example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", paid);
    assert_eq!(paid["order"]["status"], "PAID");
    assert_eq!(paid["order"]["payment_status"], "PAID");
    assert!(paid["order"]["payment_reference"].as_str().is_some());

    // Already settled
    let (status, _) = app
        .post(&pay_uri, None, json!({ "payment_token": "tok_visa", "email": "guest@example.com" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_payment_webhook_settles_order_once() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 1).await;

    let (_, placed) = app.checkout(None, &artwork_id, 1, "late@example.com").await;
    let intent_id = placed["payment"]["intent_id"].as_str().unwrap().to_string();
    app.payments.settle(&intent_id, IntentStatus::Succeeded).unwrap();

    let event = json!({
        "id": "evt_1",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "status": "succeeded" } }
    });
    let (status, body) = app.post("/v1/webhooks/payments", None, event.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["handled"], true);
    assert_eq!(body["order_status"], "PAID");

    // Redelivery is harmless
    let (status, body) = app.post("/v1/webhooks/payments", None, event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_status"], "PAID");

    let (status, body) = app
        .post(
            "/v1/webhooks/payments",
            None,
            json!({ "id": "evt_2", "type": "charge.refunded", "data": { "object": { "id": intent_id } } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["handled"], false);
}

#[tokio::test]
async fn test_pending_payment_is_accepted() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 1).await;
    let token = app.register("slow@example.com", "Slow Payer").await;

    let (_, placed) = app.checkout(Some(&token), &artwork_id, 1, "slow@example.com").await;
    let order_id = placed["order"]["id"].as_str().unwrap();

    let (status, body) = app
        .post(&format!("/v1/orders/{}/pay", order_id), Some(&token), json!({ "payment_token": "tok_pending" }))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["order"]["status"], "PENDING");
}

// ============================================================================
// Order access and cancellation
// ============================================================================

#[tokio::test]
async fn test_order_access_rules() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 3).await;
    let owner = app.register("owner@example.com", "Owner").await;
    let stranger = app.register("stranger@example.com", "Stranger").await;

    let (_, placed) = app.checkout(Some(&owner), &artwork_id, 1, "owner@example.com").await;
    let uri = format!("/v1/orders/{}", placed["order"]["id"].as_str().unwrap());

    let (status, _) = app.get(&uri, Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&uri, Some(&app.admin_token)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&uri, Some(&stranger)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(
            "/v1/orders/lookup",
            None,
            json!({ "order_number": placed["order"]["order_number"], "email": "someone@else.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_guest_cancel_restocks() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 2).await;

    let (_, placed) = app.checkout(None, &artwork_id, 2, "guest@example.com").await;
    assert_eq!(app.artwork_stock(&artwork_id).await, 0);
    let cancel_uri = format!("/v1/orders/{}/cancel", placed["order"]["id"].as_str().unwrap());

    let (status, _) = app.post(&cancel_uri, None, json!({ "email": "wrong@example.com" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, order) = app.post(&cancel_uri, None, json!({ "email": "guest@example.com" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "CANCELLED");
    assert_eq!(app.artwork_stock(&artwork_id).await, 2);

    let (status, _) = app.post(&cancel_uri, None, json!({ "email": "guest@example.com" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// ============================================================================
// Admin
// ============================================================================

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = TestApp::new().await;
    let customer = app.register("nosy@example.com", "Nosy").await;

    let (status, _) = app.get("/v1/admin/dashboard", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.get("/v1/admin/dashboard", Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/v1/admin/analytics/summary", Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/v1/admin/media", Some(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.admin(Method::GET, "/v1/admin/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_order_lifecycle() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 2).await;

    let (_, placed) = app.checkout(None, &artwork_id, 1, "collector@example.com").await;
    let order_id = placed["order"]["id"].as_str().unwrap().to_string();
    let status_uri = format!("/v1/admin/orders/{}/status", order_id);

    // Shipping before payment is not a legal move
    let (status, _) = app.admin(Method::PATCH, &status_uri, Some(json!({ "status": "SHIPPED" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post(
            &format!("/v1/orders/{}/pay", order_id),
            None,
            json!({ "payment_token": "tok_visa", "email": "collector@example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, order) = app
        .admin(Method::PATCH, &status_uri, Some(json!({ "status": "PROCESSING", "note": "Framing" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "PROCESSING");

    let (status, _) = app.admin(Method::PATCH, &status_uri, Some(json!({ "status": "LOST" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, detail) = app.admin(Method::GET, &format!("/v1/admin/orders/{}", order_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let last = detail["history"].as_array().unwrap().last().unwrap().clone();
    assert_eq!(last["to_status"], "PROCESSING");
    assert_eq!(last["actor"], ADMIN_EMAIL);

    let (status, page) = app.admin(Method::GET, "/v1/admin/orders?status=PROCESSING", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);

    let (status, dashboard) = app.admin(Method::GET, "/v1/admin/dashboard", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["sales"]["paid_order_count"], 1);
    assert_eq!(dashboard["low_stock"][0]["id"], artwork_id.as_str());
    assert_eq!(dashboard["recent_orders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_role_changes() {
    let app = TestApp::new().await;
    app.register("helper@example.com", "Helper").await;

    let (status, users) = app.admin(Method::GET, "/v1/admin/users", None).await;
    assert_eq!(status, StatusCode::OK);
    let items = users["items"].as_array().unwrap();
    let helper = items.iter().find(|u| u["email"] == "helper@example.com").unwrap();
    let admin = items.iter().find(|u| u["email"] == ADMIN_EMAIL).unwrap();

    let (status, updated) = app
        .admin(
            Method::PATCH,
            &format!("/v1/admin/users/{}/role", helper["id"].as_str().unwrap()),
            Some(json!({ "role": "ADMIN" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["role"], "ADMIN");

    let (status, _) = app
        .admin(
            Method::PATCH,
            &format!("/v1/admin/users/{}/role", admin["id"].as_str().unwrap()),
            Some(json!({ "role": "CUSTOMER" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_demoted_admin_loses_access() {
    let app = TestApp::new().await;
    app.register("helper@example.com", "Helper").await;
    let (_, users) = app.admin(Method::GET, "/v1/admin/users", None).await;
    let helper_id = users["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["email"] == "helper@example.com")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let role_uri = format!("/v1/admin/users/{}/role", helper_id);

    app.admin(Method::PATCH, &role_uri, Some(json!({ "role": "ADMIN" }))).await;
    let helper_token = app.login("helper@example.com", "s3cret-pass").await;
    let (status, _) = app.get("/v1/admin/dashboard", Some(&helper_token)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.admin(Method::PATCH, &role_uri, Some(json!({ "role": "CUSTOMER" }))).await;
    assert_eq!(status, StatusCode::OK);

    // Same token, still unexpired
    let (status, _) = app.get("/v1/admin/dashboard", Some(&helper_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_artwork_edits_keep_reserved_stock() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 5).await;
    let (status, _) = app.checkout(None, &artwork_id, 2, "early@example.com").await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/v1/admin/artworks/{}", artwork_id);
    let (status, artwork) = app.admin(Method::PATCH, &uri, Some(json!({ "featured": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(artwork["featured"], true);
    assert_eq!(artwork["stock"], 3);
    assert_eq!(app.artwork_stock(&artwork_id).await, 3);

    let (status, artwork) = app.admin(Method::PATCH, &uri, Some(json!({ "stock": 8 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(artwork["stock"], 8);

    let (status, _) = app.admin(Method::PATCH, &uri, Some(json!({ "stock": -1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.artwork_stock(&artwork_id).await, 8);
}

#[tokio::test]
async fn test_admin_stream_reports_new_orders() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 3).await;

    let req = Request::builder()
        .uri("/v1/admin/stream")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.admin_token))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/event-stream"));
    let mut body = response.into_body().into_data_stream();

    let (status, placed) = app.checkout(None, &artwork_id, 1, "stream@example.com").await;
    assert_eq!(status, StatusCode::CREATED);
    let number = placed["order"]["order_number"].as_str().unwrap().to_string();

    let mut seen = String::new();
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = body.next().await {
            seen.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            if seen.contains("event: order_placed") && seen.contains(&number) {
                return true;
            }
        }
        false
    })
    .await;
    assert!(matches!(found, Ok(true)), "stream so far: {}", seen);
}

// ============================================================================
// Media
// ============================================================================

async fn upload(app: &TestApp, fields: &[(&str, &str)], bytes: &[u8]) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri("/v1/admin/media")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.admin_token))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(multipart_body(fields, Some(("study.png", "image/png", bytes)))))
        .unwrap();
    let (status, _, body) = app.request(req).await;
    (status, json_or_text(&body))
}

#[tokio::test]
async fn test_media_upload_and_transform_cache() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 1).await;

    let png = png_bytes(64, 48);
    let (status, asset) = upload(&app, &[("alt_text", "Harbour study"), ("artwork_id", artwork_id.as_str())], &png).await;
    assert_eq!(status, StatusCode::CREATED, "{}", asset);
    assert_eq!(asset["width"], 64);
    assert_eq!(asset["height"], 48);
    let media_id = asset["id"].as_str().unwrap().to_string();

    let (_, artwork) = app.admin(Method::GET, &format!("/v1/admin/artworks/{}", artwork_id), None).await;
    assert_eq!(artwork["image_ids"][0], media_id.as_str());

    let get = |uri: String| Request::builder().uri(uri).body(Body::empty()).unwrap();

    let (status, headers, body) = app.request(get(format!("/v1/media/{}", media_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-media-cache"], "original");
    assert_eq!(body, png);

    let (status, headers, first) = app.request(get(format!("/v1/media/{}?w=32", media_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-media-cache"], "miss");
    assert!(headers[header::CACHE_CONTROL].to_str().unwrap().contains("max-age=600"));
    let resized = image::load_from_memory(&first).unwrap();
    assert_eq!(resized.width(), 32);

    let (_, headers, second) = app.request(get(format!("/v1/media/{}?w=32", media_id))).await;
    assert_eq!(headers["x-media-cache"], "hit");
    assert_eq!(first, second);

    let (status, _) = app.admin(Method::DELETE, &format!("/v1/admin/media/{}", media_id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = app.request(get(format!("/v1/media/{}", media_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, artwork) = app.admin(Method::GET, &format!("/v1/admin/artworks/{}", artwork_id), None).await;
    assert!(artwork["image_ids"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_media_delete_removes_original_and_renditions() {
    let app = TestApp::new().await;
    let (status, asset) = upload(&app, &[], &png_bytes(64, 48)).await;
    assert_eq!(status, StatusCode::CREATED);
    let media_id = asset["id"].as_str().unwrap().to_string();

    for query in ["w=32", "w=16&format=jpeg", "h=20&fit=cover"] {
        let req = Request::builder().uri(format!("/v1/media/{}?{}", media_id, query)).body(Body::empty()).unwrap();
        let (status, _, _) = app.request(req).await;
        assert_eq!(status, StatusCode::OK);
    }

    let original = app.media_root().join(format!("originals/{}.png", media_id));
    let variants = app.media_root().join(format!("variants/{}", media_id));
    assert!(original.is_file());
    assert_eq!(std::fs::read_dir(&variants).unwrap().count(), 3);

    let (status, _) = app.admin(Method::DELETE, &format!("/v1/admin/media/{}", media_id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!original.exists());
    assert!(!variants.exists());

    let (status, _) = app.admin(Method::DELETE, &format!("/v1/admin/media/{}", media_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forced_watermark_applies_to_large_renditions() {
    let forced = TestApp::with_config(|c| {
        c.media.force_watermark = true;
        c.media.watermark_min_px = 40;
    })
    .await;
    let open = TestApp::new().await;
    let png = png_bytes(64, 48);

    let (_, asset) = upload(&forced, &[], &png).await;
    let forced_id = asset["id"].as_str().unwrap().to_string();
    let (_, asset) = upload(&open, &[], &png).await;
    let open_id = asset["id"].as_str().unwrap().to_string();
    let get = |uri: String| Request::builder().uri(uri).body(Body::empty()).unwrap();

    // 64px reaches the threshold, so even the plain URL gets a marked rendition
    let (status, headers, marked) = forced.request(get(format!("/v1/media/{}", forced_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-media-cache"], "miss");
    let marked = image::load_from_memory(&marked).unwrap().to_rgba8();
    let source = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(marked.dimensions(), (64, 48));
    assert_ne!(marked.into_raw(), source.into_raw());

    let (_, headers, _) = open.request(get(format!("/v1/media/{}", open_id))).await;
    assert_eq!(headers["x-media-cache"], "original");

    // 32px stays below it and matches the unforced rendition
    let (_, _, small_forced) = forced.request(get(format!("/v1/media/{}?w=32", forced_id))).await;
    let (_, _, small_open) = open.request(get(format!("/v1/media/{}?w=32", open_id))).await;
    assert_eq!(small_forced, small_open);
}

#[tokio::test]
async fn test_media_upload_rejects_non_images() {
    let app = TestApp::new().await;
    let (status, _) = upload(&app, &[], b"definitely not a picture").await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

// ============================================================================
// Rate limiting, analytics, contact, metrics
// ============================================================================

#[tokio::test]
async fn test_login_is_rate_limited_per_client() {
    let app = TestApp::with_config(|c| c.rate_limit.auth_per_minute = 2).await;
    let login = |ip: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(json!({ "email": "x@example.com", "password": "whatever-1" }).to_string()))
            .unwrap()
    };

    for _ in 0..2 {
        let (status, headers, _) = app.request(login("203.0.113.7")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(headers.contains_key("x-ratelimit-remaining"));
    }
    let (status, headers, _) = app.request(login("203.0.113.7")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.contains_key(header::RETRY_AFTER));

    // Another client has its own budget
    let (status, _, _) = app.request(login("198.51.100.2")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_analytics_track_and_summary() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 1).await;

    for session in ["s-1", "s-2"] {
        let (status, _) = app
            .post("/v1/analytics/events", None, json!({ "type": "artwork_view", "session_id": session, "artwork_id": artwork_id }))
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }
    let (status, _) = app
        .post("/v1/analytics/events", None, json!({ "type": "page_view", "session_id": "s-1", "path": "/" }))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, _) = app
        .post("/v1/analytics/events", None, json!({ "type": "artwork_view", "session_id": "s-3" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app
        .post("/v1/analytics/events", None, json!({ "type": "teleport", "session_id": "s-3" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, summary) = app.admin(Method::GET, "/v1/admin/analytics/summary?days=7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["days"], 7);
    assert_eq!(summary["total_events"], 3);
    assert_eq!(summary["unique_sessions"], 2);
    assert_eq!(summary["counts"]["artwork_view"], 2);
    assert_eq!(summary["top_artworks"][0]["artwork_id"], artwork_id.as_str());
    assert_eq!(summary["top_artworks"][0]["title"], "Harbour at Dusk");
}

#[tokio::test]
async fn test_contact_form_relays_to_inbox() {
    let app = TestApp::new().await;

    let (status, _) = app
        .post(
            "/v1/contact",
            None,
            json!({ "name": "Pia", "email": "pia@example.com", "subject": "Commission", "message": "Do you take commissions?" }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let relayed = app.wait_for_mail(INBOX, 1).await;
    assert_eq!(relayed.len(), 1);
    assert_eq!(relayed[0].reply_to.as_deref(), Some("pia@example.com"));

    let (status, _) = app
        .post("/v1/contact", None, json!({ "name": "Pia", "email": "nope", "subject": "Hi", "message": "Hello" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = TestApp::new().await;
    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    app.get("/v1/artworks", None).await;

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, _, body) = app.request(req).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("artiverse_http_requests_total"));
    assert!(text.contains("route=\"/v1/artworks\""));
}

// ============================================================================
// Background work
// ============================================================================

#[tokio::test]
async fn test_expiry_sweep_cancels_stale_orders() {
    let app = TestApp::new().await;
    let artwork_id = app.seed_published(30_000, 2).await;

    let (_, stale) = app.checkout(None, &artwork_id, 1, "stale@example.com").await;
    let (_, fresh) = app.checkout(None, &artwork_id, 1, "fresh@example.com").await;
    assert_eq!(app.artwork_stock(&artwork_id).await, 0);

    let stale_id = Uuid::parse_str(stale["order"]["id"].as_str().unwrap()).unwrap();
    let mut order = app.state.orders.get(stale_id).await.unwrap().unwrap();
    order.created_at = Utc::now() - chrono::Duration::hours(2);
    app.state.orders.update(&order, OrderStatus::Pending, None, false).await.unwrap();

    assert_eq!(expire_stale_orders(&app.state).await.unwrap(), 1);
    assert_eq!(app.artwork_stock(&artwork_id).await, 1);

    let order = app.state.orders.get(stale_id).await.unwrap().unwrap();
    assert_eq!(order.status.as_str(), "CANCELLED");

    let fresh_id = Uuid::parse_str(fresh["order"]["id"].as_str().unwrap()).unwrap();
    let fresh = app.state.orders.get(fresh_id).await.unwrap().unwrap();
    assert_eq!(fresh.status.as_str(), "PENDING");

    // Nothing left to sweep
    assert_eq!(expire_stale_orders(&app.state).await.unwrap(), 0);
}
