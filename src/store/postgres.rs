//! Postgres-backed store.
//!
//! Aggregates are kept as JSONB documents next to the handful of columns the
//! queries filter on. Stock and cart-flag updates lock their rows with
//! `SELECT ... FOR UPDATE` inside one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::PgExecutor;
use std::collections::HashMap;
use tracing::{info, warn};
use crate::domain::aggregates::{Cart, Order, Product, StockChange};
use crate::domain::records::{ContactMessage, Review, WishlistEntry};
use crate::domain::value_objects::EmailAddress;
use crate::inventory::{apply_operations, StockOperation};
use crate::notifications::OutboundMail;
use crate::store::{CartStore, CatalogStore, MailQueue, OrderStore, ProductFilter, StorefrontStore, WaitlistStore};
use crate::{CommerceError, Result};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| CommerceError::Storage(e.to_string()))?;
        info!("database migrations applied");
        Ok(())
    }
}

fn stock_column(product: &Product) -> i64 { i64::from(product.stock()) }

async fn write_product<'e>(executor: impl PgExecutor<'e>, product: &Product) -> Result<()> {
    sqlx::query("UPDATE products SET stock = $2, doc = $3, updated_at = $4 WHERE id = $1")
        .bind(product.id())
        .bind(stock_column(product))
        .bind(Json(product))
        .bind(product.updated_at())
        .execute(executor)
        .await?;
    Ok(())
}

async fn upsert_cart<'e>(executor: impl PgExecutor<'e>, cart: &Cart) -> Result<()> {
    sqlx::query(
        "INSERT INTO carts (id, email, item_count, updated_at, reminder_sent_at, discount_sent_at, doc) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, item_count = EXCLUDED.item_count, \
         updated_at = EXCLUDED.updated_at, reminder_sent_at = EXCLUDED.reminder_sent_at, \
         discount_sent_at = EXCLUDED.discount_sent_at, doc = EXCLUDED.doc",
    )
    .bind(cart.id())
    .bind(cart.email().map(EmailAddress::as_str))
    .bind(i32::try_from(cart.item_count()).unwrap_or(i32::MAX))
    .bind(cart.updated_at())
    .bind(cart.reminder_sent_at())
    .bind(cart.discount_sent_at())
    .bind(Json(cart))
    .execute(executor)
    .await?;
    Ok(())
}

fn parse_emails(rows: Vec<(String,)>) -> Vec<EmailAddress> {
    rows.into_iter()
        .filter_map(|(raw,)| match EmailAddress::parse(&raw) {
            Ok(email) => Some(email),
            Err(e) => {
                warn!(error = %e, "skipping malformed stored email");
                None
            }
        })
        .collect()
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO products (id, name, category, subcategory, stock, doc, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) ON CONFLICT (id) DO NOTHING",
        )
        .bind(product.id())
        .bind(product.name())
        .bind(product.category())
        .bind(product.subcategory())
        .bind(stock_column(product))
        .bind(Json(product))
        .bind(product.updated_at())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CommerceError::Conflict(format!("product {} already exists", product.id())));
        }
        Ok(())
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>> {
        let row: Option<(Json<Product>,)> = sqlx::query_as("SELECT doc FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(Json(p),)| p))
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let rows: Vec<(Json<Product>,)> = sqlx::query_as(
            "SELECT doc FROM products \
             WHERE ($1::text IS NULL OR lower(category) = lower($1)) \
               AND ($2::text IS NULL OR lower(subcategory) = lower($2)) \
               AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%' OR doc->>'description' ILIKE '%' || $3 || '%') \
               AND ($4::bool IS NULL OR (stock > 0) = $4) \
             ORDER BY name",
        )
        .bind(filter.category.as_deref())
        .bind(filter.subcategory.as_deref())
        .bind(filter.search.as_deref())
        .bind(filter.in_stock)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(Json(p),)| p).collect())
    }

    async fn apply_stock(&self, operations: &[StockOperation]) -> Result<Vec<StockChange>> {
        let mut ids: Vec<String> = operations.iter().map(|op| op.product_id.clone()).collect();
        ids.sort();
        ids.dedup();

        let mut tx = self.pool.begin().await?;
        let rows: Vec<(Json<Product>,)> = sqlx::query_as("SELECT doc FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(ids)
            .fetch_all(&mut *tx)
            .await?;
        let mut working: HashMap<String, Product> = rows.into_iter().map(|(Json(p),)| (p.id().to_string(), p)).collect();

        // An error here drops `tx`, rolling back and releasing the row locks.
        let changes = apply_operations(&mut working, operations)?;

        for change in &changes {
            if let Some(product) = working.get(&change.product_id) {
                write_product(&mut *tx, product).await?;
            }
        }
        tx.commit().await?;
        Ok(changes)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &mut Order) -> Result<()> {
        let mut doc = order.clone();
        doc.set_version(1);
        let result = sqlx::query(
            "INSERT INTO orders (id, status, payment_intent_id, delivered_at, review_requested, version, doc, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 1, $6, $7, NOW()) ON CONFLICT (id) DO NOTHING",
        )
        .bind(doc.id())
        .bind(doc.status().as_str())
        .bind(doc.payment_intent_id())
        .bind(doc.delivered_at())
        .bind(doc.review_requested())
        .bind(Json(&doc))
        .bind(doc.created_at())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CommerceError::Conflict(format!("order {} already exists", order.id())));
        }
        order.set_version(1);
        Ok(())
    }

    async fn update_order(&self, order: &mut Order) -> Result<()> {
        let expected = order.version();
        let mut doc = order.clone();
        doc.set_version(expected + 1);
        let result = sqlx::query(
            "UPDATE orders SET status = $2, payment_intent_id = $3, delivered_at = $4, review_requested = $5, \
             version = $6, doc = $7, updated_at = NOW() WHERE id = $1 AND version = $8",
        )
        .bind(doc.id())
        .bind(doc.status().as_str())
        .bind(doc.payment_intent_id())
        .bind(doc.delivered_at())
        .bind(doc.review_requested())
        .bind(expected + 1)
        .bind(Json(&doc))
        .bind(expected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM orders WHERE id = $1")
                .bind(order.id())
                .fetch_optional(&self.pool)
                .await?;
            return Err(match exists {
                Some(_) => CommerceError::Conflict(format!("order {} was modified concurrently", order.id())),
                None => CommerceError::OrderNotFound(order.id().to_string()),
            });
        }
        order.set_version(expected + 1);
        Ok(())
    }

    async fn get_order(&self, id: &str) -> Result<Option<Order>> {
        let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT doc FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(Json(o),)| o))
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>> {
        let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT doc FROM orders WHERE payment_intent_id = $1")
            .bind(intent_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(Json(o),)| o))
    }

    async fn delivered_unreviewed_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Order>> {
        let rows: Vec<(Json<Order>,)> = sqlx::query_as(
            "SELECT doc FROM orders WHERE status = 'delivered' AND NOT review_requested AND delivered_at <= $1 ORDER BY delivered_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(Json(o),)| o).collect())
    }
}

impl PgStore {
    /// Applies `mutate` only while the cart still has the `seen` activity timestamp.
    async fn update_cart_if_unchanged(&self, id: &str, seen: DateTime<Utc>, mutate: impl FnOnce(&mut Cart) + Send) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(Json<Cart>,)> = sqlx::query_as("SELECT doc FROM carts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        // The document keeps full precision; the indexed column is truncated to microseconds.
        let Some((Json(mut cart),)) = row.filter(|(Json(c),)| c.updated_at() == seen) else { return Ok(false) };
        mutate(&mut cart);
        upsert_cart(&mut *tx, &cart).await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        upsert_cart(&self.pool, cart).await
    }

    async fn get_cart(&self, id: &str) -> Result<Option<Cart>> {
        let row: Option<(Json<Cart>,)> = sqlx::query_as("SELECT doc FROM carts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(Json(c),)| c))
    }

    async fn delete_cart(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM carts WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn idle_carts_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Cart>> {
        let rows: Vec<(Json<Cart>,)> = sqlx::query_as(
            "SELECT doc FROM carts WHERE email IS NOT NULL AND item_count > 0 AND reminder_sent_at IS NULL AND updated_at <= $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(Json(c),)| c).collect())
    }

    async fn reminded_carts_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Cart>> {
        let rows: Vec<(Json<Cart>,)> = sqlx::query_as(
            "SELECT doc FROM carts WHERE email IS NOT NULL AND item_count > 0 AND discount_sent_at IS NULL AND reminder_sent_at <= $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(Json(c),)| c).collect())
    }

    async fn mark_reminder_sent(&self, id: &str, seen: DateTime<Utc>, at: DateTime<Utc>) -> Result<bool> {
        self.update_cart_if_unchanged(id, seen, |cart| cart.mark_reminder_sent(at)).await
    }

    async fn mark_discount_sent(&self, id: &str, seen: DateTime<Utc>, at: DateTime<Utc>) -> Result<bool> {
        self.update_cart_if_unchanged(id, seen, |cart| cart.mark_discount_sent(at)).await
    }
}

#[async_trait]
impl WaitlistStore for PgStore {
    async fn join_waitlist(&self, product_id: &str, email: &EmailAddress) -> Result<bool> {
        let result = sqlx::query("INSERT INTO waitlist (product_id, email) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(product_id)
            .bind(email.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn drain_waitlist(&self, product_id: &str) -> Result<Vec<EmailAddress>> {
        let rows: Vec<(String,)> = sqlx::query_as("DELETE FROM waitlist WHERE product_id = $1 RETURNING email")
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(parse_emails(rows))
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow { id: String, product_id: String, author: String, rating: i16, comment: String, created_at: DateTime<Utc> }

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id, product_id: row.product_id, author: row.author,
            rating: u8::try_from(row.rating).unwrap_or_default(), comment: row.comment, created_at: row.created_at,
        }
    }
}

#[async_trait]
impl StorefrontStore for PgStore {
    async fn add_review(&self, review: &Review) -> Result<()> {
        sqlx::query("INSERT INTO reviews (id, product_id, author, rating, comment, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(&review.id)
            .bind(&review.product_id)
            .bind(&review.author)
            .bind(i16::from(review.rating))
            .bind(&review.comment)
            .bind(review.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_reviews(&self, product_id: &str) -> Result<Vec<Review>> {
        let rows: Vec<ReviewRow> = sqlx::query_as("SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC")
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn subscribe_newsletter(&self, email: &EmailAddress) -> Result<bool> {
        let result = sqlx::query("INSERT INTO newsletter_subscribers (email) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(email.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unsubscribe_newsletter(&self, email: &EmailAddress) -> Result<bool> {
        let result = sqlx::query("DELETE FROM newsletter_subscribers WHERE email = $1")
            .bind(email.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_contact_message(&self, message: &ContactMessage) -> Result<()> {
        sqlx::query("INSERT INTO contact_messages (id, name, email, subject, message, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(&message.id)
            .bind(&message.name)
            .bind(message.email.as_str())
            .bind(&message.subject)
            .bind(&message.message)
            .bind(message.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn wishlist(&self, email: &EmailAddress) -> Result<Vec<WishlistEntry>> {
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as("SELECT product_id, added_at FROM wishlist_items WHERE email = $1 ORDER BY added_at")
            .bind(email.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(product_id, added_at)| WishlistEntry { email: email.clone(), product_id, added_at }).collect())
    }

    async fn add_to_wishlist(&self, email: &EmailAddress, product_id: &str) -> Result<bool> {
        let result = sqlx::query("INSERT INTO wishlist_items (email, product_id, added_at) VALUES ($1, $2, NOW()) ON CONFLICT DO NOTHING")
            .bind(email.as_str())
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_from_wishlist(&self, email: &EmailAddress, product_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM wishlist_items WHERE email = $1 AND product_id = $2")
            .bind(email.as_str())
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl MailQueue for PgStore {
    async fn enqueue(&self, mail: &OutboundMail) -> Result<()> {
        sqlx::query("INSERT INTO mail_queue (id, recipient, template, data, subject, body, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(&mail.id)
            .bind(mail.to.as_str())
            .bind(mail.template.as_str())
            .bind(&mail.data)
            .bind(&mail.subject)
            .bind(&mail.text)
            .bind(mail.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
