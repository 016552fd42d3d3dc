//! Inventory transactions.
//!
//! All stock movement goes through [`InventoryService`], which hands the whole
//! batch to the catalog store as one atomic unit and only then raises
//! low-stock and restock notifications for what actually committed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use crate::domain::aggregates::{Product, StockAdjustment, StockChange};
use crate::domain::events::ProductEvent;
use crate::domain::value_objects::EmailAddress;
use crate::notifications::templates::{LowStockData, RestockData};
use crate::notifications::{Notification, NotificationDispatcher};
use crate::store::{CatalogStore, WaitlistStore};
use crate::{CommerceError, Result};

pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOperation { pub product_id: String, pub adjustment: StockAdjustment }

impl StockOperation {
    pub fn subtract(product_id: impl Into<String>, quantity: u32) -> Self { Self { product_id: product_id.into(), adjustment: StockAdjustment::Subtract(quantity) } }
    pub fn add(product_id: impl Into<String>, quantity: u32) -> Self { Self { product_id: product_id.into(), adjustment: StockAdjustment::Add(quantity) } }
}

/// Runs `operations` against a working copy of the locked products.
///
/// The caller commits `working` only when this returns `Ok`. Repeated product
/// ids collapse into one change spanning the first `before` and last `after`.
pub fn apply_operations(working: &mut HashMap<String, Product>, operations: &[StockOperation]) -> Result<Vec<StockChange>> {
    let mut changes: Vec<StockChange> = Vec::with_capacity(operations.len());
    for op in operations {
        let product = working.get_mut(&op.product_id).ok_or_else(|| CommerceError::ProductNotFound(op.product_id.clone()))?;
        let change = product.apply_stock(op.adjustment)?;
        match changes.iter_mut().find(|c| c.product_id == change.product_id) {
            Some(existing) => existing.after = change.after,
            None => changes.push(change),
        }
    }
    Ok(changes)
}

#[derive(Clone, Debug)]
pub struct InventorySettings {
    pub low_stock_threshold: u32,
    pub admin_email: EmailAddress,
    pub storefront_url: String,
}

#[derive(Clone)]
pub struct InventoryService {
    catalog: Arc<dyn CatalogStore>,
    waitlist: Arc<dyn WaitlistStore>,
    dispatcher: NotificationDispatcher,
    settings: InventorySettings,
}

impl InventoryService {
    pub fn new(catalog: Arc<dyn CatalogStore>, waitlist: Arc<dyn WaitlistStore>, dispatcher: NotificationDispatcher, settings: InventorySettings) -> Self {
        Self { catalog, waitlist, dispatcher, settings }
    }

    /// Decrements every line or none. Each quantity must be positive.
    #[instrument(name = "inventory::decrement", skip(self, lines), fields(lines = lines.len()))]
    pub async fn decrement(&self, lines: &[(String, u32)]) -> Result<Vec<StockChange>> {
        if lines.is_empty() { return Err(CommerceError::Validation("no items to decrement".into())); }
        if let Some((id, _)) = lines.iter().find(|(_, qty)| *qty == 0) {
            return Err(CommerceError::Validation(format!("quantity for {id} must be greater than zero")));
        }
        let ops: Vec<StockOperation> = lines.iter().map(|(id, qty)| StockOperation::subtract(id.clone(), *qty)).collect();
        self.commit(&ops).await
    }

    /// Puts stock back, e.g. when a paid order is cancelled.
    #[instrument(name = "inventory::restore", skip(self, lines), fields(lines = lines.len()))]
    pub async fn restore(&self, lines: &[(String, u32)]) -> Result<Vec<StockChange>> {
        let ops: Vec<StockOperation> = lines.iter().filter(|(_, qty)| *qty > 0).map(|(id, qty)| StockOperation::add(id.clone(), *qty)).collect();
        if ops.is_empty() { return Ok(vec![]); }
        self.commit(&ops).await
    }

    /// Admin set / add / subtract on a single product.
    #[instrument(name = "inventory::adjust", skip(self))]
    pub async fn adjust(&self, product_id: &str, adjustment: StockAdjustment) -> Result<StockChange> {
        let mut changes = self.commit(&[StockOperation { product_id: product_id.to_string(), adjustment }]).await?;
        changes.pop().ok_or_else(|| CommerceError::ProductNotFound(product_id.to_string()))
    }

    async fn commit(&self, ops: &[StockOperation]) -> Result<Vec<StockChange>> {
        let changes = self.catalog.apply_stock(ops).await?;
        for change in &changes {
            info!(product_id = %change.product_id, before = change.before, after = change.after, "stock updated");
            self.raise_alerts(change).await;
        }
        Ok(changes)
    }

    async fn raise_alerts(&self, change: &StockChange) {
        for event in change.events(self.settings.low_stock_threshold) {
            match event {
                ProductEvent::LowStock { product_id, name, remaining, threshold } => {
                    warn!(%product_id, remaining, "stock fell below alert threshold");
                    let alert = Notification::LowStockAlert(LowStockData { product_id, product_name: name, remaining, threshold });
                    self.dispatcher.dispatch(&self.settings.admin_email, alert).await;
                }
                ProductEvent::Restocked { product_id, name, available } => self.notify_waitlist(product_id, name, available).await,
                ProductEvent::StockChanged { .. } => {}
            }
        }
    }

    async fn notify_waitlist(&self, product_id: String, name: String, available: u32) {
        let subscribers = match self.waitlist.drain_waitlist(&product_id).await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                warn!(error = %e, %product_id, "could not drain waitlist");
                return;
            }
        };
        info!(%product_id, subscribers = subscribers.len(), "product restocked, notifying waitlist");
        let product_url = format!("{}/products/{}", self.settings.storefront_url.trim_end_matches('/'), product_id);
        for email in subscribers {
            let notice = Notification::RestockNotification(RestockData {
                product_id: product_id.clone(), product_name: name.clone(), available, product_url: product_url.clone(),
            });
            self.dispatcher.dispatch(&email, notice).await;
        }
    }
}
