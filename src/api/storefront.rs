//! Public storefront endpoints.

use axum::extract::{Path, State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;
use crate::api::extract::{Json, Query};
use crate::api::response::{created, ok, ApiResult};
use crate::api::AppState;
use crate::domain::aggregates::{Cart, CartItem, Customization, Product};
use crate::domain::records::{ContactMessage, Review, WishlistEntry};
use crate::domain::value_objects::EmailAddress;
use crate::store::ProductFilter;
use crate::CommerceError;

pub async fn health() -> axum::Json<Value> {
    axum::Json(json!({"status": "healthy", "service": "customiseme-commerce"}))
}

async fn find_product(state: &AppState, id: &str) -> Result<Product, CommerceError> {
    state.stores.catalog.get_product(id).await?.ok_or_else(|| CommerceError::ProductNotFound(id.to_string()))
}

pub async fn list_products(State(s): State<AppState>, Query(filter): Query<ProductFilter>) -> ApiResult<Vec<Product>> {
    let products = s.stores.catalog.list_products(&filter).await?;
    ok("Products retrieved", products)
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Product> {
    ok("Product retrieved", find_product(&s, &id).await?)
}

pub async fn list_reviews(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<Review>> {
    find_product(&s, &id).await?;
    ok("Reviews retrieved", s.stores.storefront.list_reviews(&id).await?)
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    #[validate(length(min = 1, max = 2000))]
    pub comment: String,
}

pub async fn create_review(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<ReviewRequest>) -> ApiResult<Review> {
    r.validate()?;
    find_product(&s, &id).await?;
    let review = Review::new(id, r.name.trim(), r.rating, r.comment.trim());
    s.stores.storefront.add_review(&review).await?;
    created("Review added", review)
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest { pub email: String }

/// Waitlist sign-up is only offered while a product is sold out.
pub async fn join_waitlist(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<EmailRequest>) -> ApiResult<Value> {
    let email = EmailAddress::parse(&r.email)?;
    let product = find_product(&s, &id).await?;
    if product.is_in_stock() {
        return Err(CommerceError::Validation(format!("{} is in stock", product.name())));
    }
    if s.stores.waitlist.join_waitlist(&id, &email).await? {
        created("You'll be emailed when this is back in stock", json!({"product_id": id}))
    } else {
        ok("Already on the waitlist", json!({"product_id": id}))
    }
}

#[derive(Debug, Deserialize)]
pub struct CartLineRequest {
    pub product_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub customization: Customization,
}

#[derive(Debug, Deserialize)]
pub struct CartRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub items: Vec<CartLineRequest>,
}

/// Records the browser's cart so it can be chased if abandoned. Prices come from the catalog.
pub async fn put_cart(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<CartRequest>) -> ApiResult<Cart> {
    let now = Utc::now();
    let email = r.email.as_deref().map(str::trim).filter(|e| !e.is_empty()).map(EmailAddress::parse).transpose()?;
    let mut items = Vec::with_capacity(r.items.len());
    for line in r.items {
        let product = find_product(&s, &line.product_id).await?;
        product.validate_customization(&line.customization)?;
        items.push(CartItem {
            product_id: line.product_id,
            name: product.name().to_string(),
            quantity: line.quantity,
            unit_price: product.price().clone(),
            customization: line.customization,
        });
    }

    let mut cart = match s.stores.carts.get_cart(&id).await? {
        Some(cart) => cart,
        None => Cart::new(id, &s.currency, now),
    };
    cart.replace_items(items, now);
    cart.set_email(email, now);
    s.stores.carts.save_cart(&cart).await?;
    ok("Cart saved", cart)
}

pub async fn delete_cart(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    if !s.stores.carts.delete_cart(&id).await? {
        return Err(CommerceError::CartNotFound(id));
    }
    ok("Cart removed", json!({"cart_id": id}))
}

pub async fn subscribe(State(s): State<AppState>, Json(r): Json<EmailRequest>) -> ApiResult<Value> {
    let email = EmailAddress::parse(&r.email)?;
    if !s.stores.storefront.subscribe_newsletter(&email).await? {
        return Err(CommerceError::Conflict(format!("{email} is already subscribed")));
    }
    created("Subscribed", json!({"email": email}))
}

pub async fn unsubscribe(State(s): State<AppState>, Json(r): Json<EmailRequest>) -> ApiResult<Value> {
    let email = EmailAddress::parse(&r.email)?;
    if !s.stores.storefront.unsubscribe_newsletter(&email).await? {
        return Err(CommerceError::NotFound(format!("{email} is not subscribed")));
    }
    ok("Unsubscribed", json!({"email": email}))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub subject: String,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

pub async fn contact(State(s): State<AppState>, Json(r): Json<ContactRequest>) -> ApiResult<Value> {
    r.validate()?;
    let email = EmailAddress::parse(&r.email)?;
    let message = ContactMessage::new(r.name.trim(), email, r.subject.trim(), r.message.trim());
    s.stores.storefront.save_contact_message(&message).await?;
    created("Thanks, we'll be in touch", json!({"id": message.id}))
}

pub async fn get_wishlist(State(s): State<AppState>, Path(email): Path<String>) -> ApiResult<Vec<WishlistEntry>> {
    let email = EmailAddress::parse(&email)?;
    ok("Wishlist retrieved", s.stores.storefront.wishlist(&email).await?)
}

#[derive(Debug, Deserialize)]
pub struct WishlistRequest { pub product_id: String }

pub async fn add_to_wishlist(State(s): State<AppState>, Path(email): Path<String>, Json(r): Json<WishlistRequest>) -> ApiResult<Vec<WishlistEntry>> {
    let email = EmailAddress::parse(&email)?;
    find_product(&s, &r.product_id).await?;
    let added = s.stores.storefront.add_to_wishlist(&email, &r.product_id).await?;
    let entries = s.stores.storefront.wishlist(&email).await?;
    if added { created("Added to wishlist", entries) } else { ok("Already on wishlist", entries) }
}

pub async fn remove_from_wishlist(State(s): State<AppState>, Path((email, product_id)): Path<(String, String)>) -> ApiResult<Vec<WishlistEntry>> {
    let email = EmailAddress::parse(&email)?;
    if !s.stores.storefront.remove_from_wishlist(&email, &product_id).await? {
        return Err(CommerceError::NotFound(format!("{product_id} is not on the wishlist")));
    }
    ok("Removed from wishlist", s.stores.storefront.wishlist(&email).await?)
}
