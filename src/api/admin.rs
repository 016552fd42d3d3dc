//! Staff endpoints. Every route sits behind [`require_admin`].

use axum::extract::{Path, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;
use crate::api::extract::Json;
use crate::api::response::{created, ok, ApiResult};
use crate::api::AppState;
use crate::domain::aggregates::{ArtworkDecision, CustomizationOptions, Order, Product, StockAdjustment, StockChange};
use crate::domain::value_objects::Money;
use crate::payment::webhook::constant_time_compare;
use crate::CommerceError;

/// Bearer-token check: 401 when no credential is presented, 403 when it is wrong.
pub async fn require_admin(State(s): State<AppState>, request: Request, next: Next) -> Result<Response, CommerceError> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let Some(token) = presented else {
        return Err(CommerceError::Authentication);
    };
    if !constant_time_compare(token, &s.admin_api_key) {
        warn!(path = %request.uri().path(), "rejected admin credential");
        return Err(CommerceError::Authorization);
    }
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[validate(length(min = 1, max = 80))]
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub customization: CustomizationOptions,
    #[serde(default)]
    pub images: Vec<String>,
}

pub async fn create_product(State(s): State<AppState>, Json(r): Json<CreateProductRequest>) -> ApiResult<Product> {
    r.validate()?;
    if r.price <= Decimal::ZERO {
        return Err(CommerceError::Validation("price must be greater than zero".into()));
    }
    let mut product = Product::create(r.name.trim(), Money::new(r.price, &s.currency), r.category.trim())
        .with_description(r.description)
        .with_subcategory(r.subcategory)
        .with_stock(r.stock)
        .with_customization(r.customization)
        .with_images(r.images);
    if let Some(id) = r.id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) {
        product = product.with_id(id);
    }
    s.stores.catalog.insert_product(&product).await?;
    info!(product_id = %product.id(), "product created");
    created("Product created", product)
}

pub async fn adjust_stock(State(s): State<AppState>, Path(id): Path<String>, Json(adjustment): Json<StockAdjustment>) -> ApiResult<StockChange> {
    let change = s.inventory.adjust(&id, adjustment).await?;
    ok("Stock updated", change)
}

pub async fn get_order(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Order> {
    ok("Order retrieved", s.orders.get_order(&id).await?)
}

#[derive(Debug, Deserialize)]
pub struct ShipRequest { pub tracking_reference: String }

pub async fn ship_order(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<ShipRequest>) -> ApiResult<Order> {
    ok("Order shipped", s.orders.ship(&id, &r.tracking_reference).await?)
}

pub async fn deliver_order(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Order> {
    ok("Order delivered", s.orders.deliver(&id).await?)
}

pub async fn cancel_order(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Order> {
    ok("Order cancelled", s.orders.cancel(&id).await?)
}

#[derive(Debug, Deserialize)]
pub struct ArtworkReviewRequest {
    pub decision: ArtworkDecision,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn review_artwork(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<ArtworkReviewRequest>) -> ApiResult<Order> {
    ok("Artwork reviewed", s.orders.review_artwork(&id, r.decision, r.notes).await?)
}

#[derive(Debug, Default, Deserialize)]
pub struct ResubmitRequest {
    #[serde(default)]
    pub artwork_url: Option<String>,
}

pub async fn resubmit_artwork(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<ResubmitRequest>) -> ApiResult<Order> {
    ok("Artwork resubmitted", s.orders.resubmit_artwork(&id, r.artwork_url).await?)
}
