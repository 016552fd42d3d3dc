//! HTTP surface.

pub mod admin;
pub mod checkout;
pub mod extract;
pub mod rate_limit;
pub mod response;
pub mod storefront;

use axum::routing::{delete, get, post, put};
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::checkout::PaymentAdapter;
use crate::config::Config;
use crate::inventory::InventoryService;
use crate::notifications::NotificationDispatcher;
use crate::orders::OrderService;
use crate::payment::{PaymentGateway, WebhookVerifier};
use crate::store::Stores;
use rate_limit::ClientRateLimiter;

/// Requests per client per minute on the newsletter and contact endpoints.
pub const PUBLIC_FORM_RATE_PER_MINUTE: u32 = 5;

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub inventory: InventoryService,
    pub orders: OrderService,
    pub payments: PaymentAdapter,
    pub admin_api_key: Arc<str>,
    pub currency: String,
    pub limiter: Arc<ClientRateLimiter>,
    pub expose_internal_errors: bool,
}

impl AppState {
    pub fn new(config: &Config, stores: Stores, gateway: Arc<dyn PaymentGateway>) -> Self {
        let dispatcher = NotificationDispatcher::new(stores.mail.clone());
        let inventory = InventoryService::new(stores.catalog.clone(), stores.waitlist.clone(), dispatcher.clone(), config.inventory_settings());
        let orders = OrderService::new(stores.orders.clone(), inventory.clone(), dispatcher.clone());
        let payments = PaymentAdapter::new(
            stores.catalog.clone(),
            stores.orders.clone(),
            stores.carts.clone(),
            gateway,
            inventory.clone(),
            dispatcher,
            config.pricing.clone(),
            config.stripe_webhook_secret.clone().map(WebhookVerifier::new),
        );
        Self {
            stores,
            inventory,
            orders,
            payments,
            admin_api_key: Arc::from(config.admin_api_key.as_str()),
            currency: config.pricing.currency.clone(),
            limiter: rate_limit::client_rate_limiter(PUBLIC_FORM_RATE_PER_MINUTE),
            expose_internal_errors: !config.is_production(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/api/v1/admin/products", post(admin::create_product))
        .route("/api/v1/admin/products/:id/stock", post(admin::adjust_stock))
        .route("/api/v1/admin/orders/:id", get(admin::get_order))
        .route("/api/v1/admin/orders/:id/ship", post(admin::ship_order))
        .route("/api/v1/admin/orders/:id/deliver", post(admin::deliver_order))
        .route("/api/v1/admin/orders/:id/cancel", post(admin::cancel_order))
        .route("/api/v1/admin/orders/:id/artwork", post(admin::review_artwork))
        .route("/api/v1/admin/orders/:id/artwork/resubmit", post(admin::resubmit_artwork))
        .route_layer(middleware::from_fn_with_state(state.clone(), admin::require_admin));

    let limited_routes = Router::new()
        .route("/api/v1/newsletter/subscribe", post(storefront::subscribe))
        .route("/api/v1/newsletter/unsubscribe", post(storefront::unsubscribe))
        .route("/api/v1/contact", post(storefront::contact))
        .route_layer(middleware::from_fn_with_state(state.limiter.clone(), rate_limit::limit));

    let expose_internal_errors = state.expose_internal_errors;
    let app = Router::new()
        .route("/health", get(storefront::health))
        .route("/api/v1/products", get(storefront::list_products))
        .route("/api/v1/products/:id", get(storefront::get_product))
        .route("/api/v1/products/:id/reviews", get(storefront::list_reviews).post(storefront::create_review))
        .route("/api/v1/products/:id/waitlist", post(storefront::join_waitlist))
        .route("/api/v1/carts/:id", put(storefront::put_cart).delete(storefront::delete_cart))
        .route("/api/v1/checkout", post(checkout::checkout))
        .route("/api/v1/payments/webhook", post(checkout::webhook))
        .route("/api/v1/wishlists/:email", get(storefront::get_wishlist).post(storefront::add_to_wishlist))
        .route("/api/v1/wishlists/:email/:product_id", delete(storefront::remove_from_wishlist))
        .merge(admin_routes)
        .merge(limited_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    if expose_internal_errors {
        app
    } else {
        app.layer(middleware::map_response(response::redact_internal_errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Product;
    use crate::domain::value_objects::Money;
    use crate::payment::SimulatedProcessor;
    use crate::store::{CartStore, CatalogStore, MemoryStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tower::ServiceExt;

    const ADMIN_KEY: &str = "test-admin-key";

    async fn app() -> (Arc<MemoryStore>, Router) {
        let vars: HashMap<&str, &str> = HashMap::from([("ADMIN_API_KEY", ADMIN_KEY), ("STRIPE_WEBHOOK_SECRET", "whsec_test")]);
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        let store = Arc::new(MemoryStore::new());
        store.insert_product(&Product::create("Mug", Money::gbp(dec!(10.00)), "homeware").with_id("A").with_stock(5)).await.unwrap();
        store.insert_product(&Product::create("Tote", Money::gbp(dec!(25.00)), "bags").with_id("B").with_stock(12)).await.unwrap();
        store.insert_product(&Product::create("Cap", Money::gbp(dec!(8.00)), "clothing").with_id("C").with_stock(0)).await.unwrap();
        let stores = Stores::from_backend(store.clone(), store.clone());
        let state = AppState::new(&config, stores, Arc::new(SimulatedProcessor::new()));
        (store, router(state))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri).header("content-type", "application/json").header("x-forwarded-for", "198.51.100.4");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        dispatch(app, builder.body(body).unwrap()).await
    }

    async fn send_raw(app: &Router, uri: &str, headers: &[(&str, &str)], body: &'static str) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        dispatch(app, builder.body(Body::from(body)).unwrap()).await
    }

    async fn dispatch(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (_, app) = app().await;
        let (status, body) = send(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_product_listing_filters() {
        let (_, app) = app().await;
        let (status, body) = send(&app, "GET", "/api/v1/products?in_stock=true", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (_, body) = send(&app, "GET", "/api/v1/products?category=BAGS", None, None).await;
        assert_eq!(body["data"][0]["name"], "Tote");

        let (status, body) = send(&app, "GET", "/api/v1/products/missing", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_admin_requires_bearer_token() {
        let (store, app) = app().await;
        let product = json!({"id": "D", "name": "Coaster", "price": "4.50", "category": "homeware", "stock": 40});
        let (status, _) = send(&app, "POST", "/api/v1/admin/products", Some(product.clone()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, "POST", "/api/v1/admin/products", Some(product.clone()), Some("wrong")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&app, "POST", "/api/v1/admin/products", Some(product), Some(ADMIN_KEY)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["id"], "D");
        assert_eq!(store.get_product("D").await.unwrap().unwrap().stock(), 40);
    }

    #[tokio::test]
    async fn test_admin_stock_adjustment() {
        let (store, app) = app().await;
        let (status, body) = send(&app, "POST", "/api/v1/admin/products/B/stock", Some(json!({"operation": "subtract", "quantity": 3})), Some(ADMIN_KEY)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["after"], 9);

        let (status, _) = send(&app, "POST", "/api/v1/admin/products/B/stock", Some(json!({"operation": "subtract", "quantity": 30})), Some(ADMIN_KEY)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(store.get_product("B").await.unwrap().unwrap().stock(), 9);

        let outbox = store.outbox().await;
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to.as_str(), "admin@customiseme.co.uk");
    }

    #[tokio::test]
    async fn test_checkout_and_order_lookup() {
        let (_, app) = app().await;
        let request = json!({
            "email": "jo@example.com",
            "items": [{"product_id": "A", "quantity": 2, "price": "0.01"}, {"product_id": "B", "quantity": 1}],
            "shipping_address": {"name": "Jo Bloggs", "line1": "1 High Street", "city": "Leeds", "postcode": "LS1 1AA", "country": "GB"}
        });
        let (status, body) = send(&app, "POST", "/api/v1/checkout", Some(request), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["order"]["total"]["amount"], "49.99");
        assert_eq!(body["data"]["order"]["status"], "pending_payment");
        assert!(body["data"]["client_secret"].is_string());

        let id = body["data"]["order"]["id"].as_str().unwrap().to_string();
        let (status, body) = send(&app, "GET", &format!("/api/v1/admin/orders/{id}"), None, Some(ADMIN_KEY)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], id.as_str());

        let (status, _) = send(&app, "POST", &format!("/api/v1/admin/orders/{id}/ship"), Some(json!({"tracking_reference": "RM1"})), Some(ADMIN_KEY)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_checkout_out_of_stock() {
        let (_, app) = app().await;
        let request = json!({
            "email": "jo@example.com",
            "items": [{"product_id": "C", "quantity": 1}],
            "shipping_address": {"name": "Jo", "line1": "1 High Street", "city": "Leeds", "postcode": "LS1 1AA", "country": "GB"}
        });
        let (status, body) = send(&app, "POST", "/api/v1/checkout", Some(request), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_webhook_requires_signature() {
        let (_, app) = app().await;
        let (status, _) = send(&app, "POST", "/api/v1/payments/webhook", Some(json!({"type": "payment_intent.succeeded"})), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_waitlist_only_for_sold_out_products() {
        let (store, app) = app().await;
        let (status, _) = send(&app, "POST", "/api/v1/products/A/waitlist", Some(json!({"email": "sam@example.com"})), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, "POST", "/api/v1/products/C/waitlist", Some(json!({"email": "sam@example.com"})), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, "POST", "/api/v1/products/C/waitlist", Some(json!({"email": "SAM@example.com"})), None).await;
        assert_eq!(status, StatusCode::OK);

        send(&app, "POST", "/api/v1/admin/products/C/stock", Some(json!({"operation": "add", "quantity": 6})), Some(ADMIN_KEY)).await;
        let restocks = store.outbox().await.into_iter().filter(|m| m.to.as_str() == "sam@example.com").count();
        assert_eq!(restocks, 1);
    }

    #[tokio::test]
    async fn test_cart_tracking() {
        let (store, app) = app().await;
        let cart = json!({"email": "jo@example.com", "items": [{"product_id": "A", "quantity": 2}]});
        let (status, body) = send(&app, "PUT", "/api/v1/carts/cart-9", Some(cart), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["subtotal"]["amount"], "20.00");
        assert!(store.get_cart("cart-9").await.unwrap().is_some());

        let (status, _) = send(&app, "PUT", "/api/v1/carts/cart-9", Some(json!({"items": [{"product_id": "nope", "quantity": 1}]})), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "DELETE", "/api/v1/carts/cart-9", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "DELETE", "/api/v1/carts/cart-9", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reviews() {
        let (_, app) = app().await;
        let (status, _) = send(&app, "POST", "/api/v1/products/A/reviews", Some(json!({"name": "Jo", "rating": 6, "comment": "Great"})), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, "POST", "/api/v1/products/A/reviews", Some(json!({"name": "Jo", "rating": 5, "comment": "Great mug"})), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, body) = send(&app, "GET", "/api/v1/products/A/reviews", None, None).await;
        assert_eq!(body["data"][0]["rating"], 5);
    }

    #[tokio::test]
    async fn test_newsletter_and_contact_rate_limit() {
        let (store, app) = app().await;
        let (status, _) = send(&app, "POST", "/api/v1/newsletter/subscribe", Some(json!({"email": "jo@example.com"})), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, "POST", "/api/v1/newsletter/subscribe", Some(json!({"email": "jo@example.com"})), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = send(&app, "POST", "/api/v1/newsletter/unsubscribe", Some(json!({"email": "nobody@example.com"})), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let message = json!({"name": "Jo", "email": "jo@example.com", "subject": "Bulk order", "message": "Do you do 500 mugs?"});
        // The three newsletter calls share this client's bucket.
        for _ in 0..2 {
            let (status, _) = send(&app, "POST", "/api/v1/contact", Some(message.clone()), None).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, body) = send(&app, "POST", "/api/v1/contact", Some(message), None).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["success"], false);
        assert_eq!(store.contact_messages().await.len(), 2);

        let (status, _) = send(&app, "GET", "/api/v1/products", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_wishlist() {
        let (_, app) = app().await;
        let (status, _) = send(&app, "POST", "/api/v1/wishlists/jo@example.com", Some(json!({"product_id": "A"})), None).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, "POST", "/api/v1/wishlists/jo@example.com", Some(json!({"product_id": "A"})), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&app, "GET", "/api/v1/wishlists/jo@example.com", None, None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        let (status, _) = send(&app, "DELETE", "/api/v1/wishlists/jo@example.com/A", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "DELETE", "/api/v1/wishlists/jo@example.com/A", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn assert_rejected(status: StatusCode, body: &Value) {
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_malformed_bodies_get_the_error_envelope() {
        let (store, app) = app().await;
        let (status, body) = send(&app, "POST", "/api/v1/contact", Some(json!({})), None).await;
        assert_rejected(status, &body);
        assert!(store.contact_messages().await.is_empty());

        let (status, body) = send_raw(&app, "/api/v1/checkout", &[("content-type", "application/json")], "{\"email\": ").await;
        assert_rejected(status, &body);

        let (status, body) = send_raw(&app, "/api/v1/checkout", &[], r#"{"email": "jo@example.com"}"#).await;
        assert_rejected(status, &body);

        let (status, body) = send(&app, "POST", "/api/v1/products/A/reviews", Some(json!({"name": "Jo", "rating": "five", "comment": "Nice"})), None).await;
        assert_rejected(status, &body);

        let (status, body) = send(&app, "POST", "/api/v1/admin/products/A/stock", Some(json!({"operation": "explode", "quantity": 1})), Some(ADMIN_KEY)).await;
        assert_rejected(status, &body);
        assert_eq!(store.get_product("A").await.unwrap().unwrap().stock(), 5);

        let (status, body) = send(&app, "GET", "/api/v1/products?in_stock=maybe", None, None).await;
        assert_rejected(status, &body);
    }

    #[tokio::test]
    async fn test_checkout_rejects_oversized_quantities() {
        let (store, app) = app().await;
        let shipping = json!({"name": "Jo", "line1": "1 High Street", "city": "Leeds", "postcode": "LS1 1AA", "country": "GB"});

        let repeated = json!({
            "email": "jo@example.com",
            "items": [{"product_id": "A", "quantity": 3_000_000_000u32}, {"product_id": "A", "quantity": 3_000_000_000u32}],
            "shipping_address": shipping.clone(),
        });
        let (status, body) = send(&app, "POST", "/api/v1/checkout", Some(repeated), None).await;
        assert_rejected(status, &body);

        let wrapping = json!({
            "email": "jo@example.com",
            "items": [{"product_id": "A", "quantity": 2_147_483_648u32}, {"product_id": "A", "quantity": 2_147_483_648u32}],
            "shipping_address": shipping.clone(),
        });
        let (status, body) = send(&app, "POST", "/api/v1/checkout", Some(wrapping), None).await;
        assert_rejected(status, &body);

        let too_large = json!({
            "email": "jo@example.com",
            "items": [{"product_id": "B", "quantity": crate::checkout::MAX_LINE_QUANTITY + 1}],
            "shipping_address": shipping.clone(),
        });
        let (status, body) = send(&app, "POST", "/api/v1/checkout", Some(too_large), None).await;
        assert_rejected(status, &body);

        let negative = json!({
            "email": "jo@example.com",
            "items": [{"product_id": "A", "quantity": -1}],
            "shipping_address": shipping,
        });
        let (status, body) = send(&app, "POST", "/api/v1/checkout", Some(negative), None).await;
        assert_rejected(status, &body);

        assert_eq!(store.get_product("A").await.unwrap().unwrap().stock(), 5);
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_does_not_bypass_limit() {
        let (_, app) = app().await;
        let message = json!({"name": "Jo", "email": "jo@example.com", "subject": "Hi", "message": "Hello"});
        let mut statuses = Vec::new();
        for i in 0..8 {
            let spoofed = format!("spoof-{i}");
            let request = Request::builder()
                .method("POST")
                .uri("/api/v1/contact")
                .header("content-type", "application/json")
                .header("x-forwarded-for", spoofed.as_str())
                .body(Body::from(message.to_string()))
                .unwrap();
            statuses.push(dispatch(&app, request).await.0);
        }
        assert_eq!(statuses.iter().filter(|s| **s == StatusCode::CREATED).count(), 5);
        assert_eq!(statuses.last(), Some(&StatusCode::TOO_MANY_REQUESTS));
    }
}
