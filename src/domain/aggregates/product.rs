//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::ProductEvent;
use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    id: String,
    name: String,
    description: String,
    price: Money,
    stock: Quantity,
    category: String,
    subcategory: Option<String>,
    customization: CustomizationOptions,
    images: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Personalisation a product accepts. An option with no listed choices takes free text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizationOptions { pub enabled: bool, pub options: Vec<CustomizationOption> }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizationOption { pub name: String, #[serde(default)] pub choices: Vec<String> }

/// Choices a customer made for one line, plus an optional uploaded artwork reference.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customization {
    #[serde(default)]
    pub choices: BTreeMap<String, String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
}

impl Customization {
    pub fn is_empty(&self) -> bool { self.choices.is_empty() && self.artwork_url.is_none() }
    pub fn has_artwork(&self) -> bool { self.artwork_url.as_deref().is_some_and(|u| !u.trim().is_empty()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "quantity", rename_all = "snake_case")]
pub enum StockAdjustment { Set(u32), Add(u32), Subtract(u32) }

/// Stock level of one product before and after a committed adjustment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StockChange { pub product_id: String, pub name: String, pub before: u32, pub after: u32 }

impl StockChange {
    /// True only on the adjustment that takes stock from at/above the threshold to below it.
    pub fn crossed_low_stock(&self, threshold: u32) -> bool { self.before >= threshold && self.after < threshold }
    pub fn restocked(&self) -> bool { self.before == 0 && self.after > 0 }

    pub fn events(&self, threshold: u32) -> Vec<ProductEvent> {
        let mut events = vec![ProductEvent::StockChanged { product_id: self.product_id.clone(), before: self.before, after: self.after }];
        if self.crossed_low_stock(threshold) {
            events.push(ProductEvent::LowStock { product_id: self.product_id.clone(), name: self.name.clone(), remaining: self.after, threshold });
        }
        if self.restocked() {
            events.push(ProductEvent::Restocked { product_id: self.product_id.clone(), name: self.name.clone(), available: self.after });
        }
        events
    }
}

impl Product {
    pub fn create(name: impl Into<String>, price: Money, category: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(), name: name.into(), description: String::new(), price,
            stock: Quantity::default(), category: category.into(), subcategory: None,
            customization: CustomizationOptions::default(), images: vec![], created_at: now, updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self { self.id = id.into(); self }
    pub fn with_description(mut self, description: impl Into<String>) -> Self { self.description = description.into(); self }
    pub fn with_subcategory(mut self, subcategory: Option<String>) -> Self { self.subcategory = subcategory; self }
    pub fn with_stock(mut self, stock: u32) -> Self { self.stock = Quantity::new(stock); self }
    pub fn with_customization(mut self, customization: CustomizationOptions) -> Self { self.customization = customization; self }
    pub fn with_images(mut self, images: Vec<String>) -> Self { self.images = images; self }

    pub fn id(&self) -> &str { &self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn description(&self) -> &str { &self.description }
    pub fn price(&self) -> &Money { &self.price }
    pub fn stock(&self) -> u32 { self.stock.value() }
    pub fn category(&self) -> &str { &self.category }
    pub fn subcategory(&self) -> Option<&str> { self.subcategory.as_deref() }
    pub fn customization(&self) -> &CustomizationOptions { &self.customization }
    pub fn images(&self) -> &[String] { &self.images }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_in_stock(&self) -> bool { !self.stock.is_zero() }

    /// Applies one stock adjustment. Never lets stock go below zero.
    pub fn apply_stock(&mut self, adjustment: StockAdjustment) -> Result<StockChange, ProductError> {
        let before = self.stock;
        let after = match adjustment {
            StockAdjustment::Set(qty) => Quantity::new(qty),
            StockAdjustment::Add(0) | StockAdjustment::Subtract(0) => return Err(ProductError::InvalidQuantity),
            StockAdjustment::Add(qty) => before.add(qty),
            StockAdjustment::Subtract(qty) => before.subtract(qty).ok_or_else(|| ProductError::InsufficientStock {
                product_id: self.id.clone(), requested: qty, available: before.value(),
            })?,
        };
        self.stock = after;
        self.touch();
        Ok(StockChange { product_id: self.id.clone(), name: self.name.clone(), before: before.value(), after: after.value() })
    }

    /// Checks a line's personalisation against the option set this product offers.
    pub fn validate_customization(&self, customization: &Customization) -> Result<(), ProductError> {
        if customization.is_empty() { return Ok(()); }
        if !self.customization.enabled { return Err(ProductError::NotCustomizable(self.id.clone())); }
        for (name, choice) in &customization.choices {
            let option = self.customization.options.iter().find(|o| &o.name == name)
                .ok_or_else(|| ProductError::UnknownOption(name.clone()))?;
            if !option.choices.is_empty() && !option.choices.contains(choice) {
                return Err(ProductError::InvalidChoice { option: name.clone(), choice: choice.clone() });
            }
        }
        Ok(())
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("quantity must be greater than zero")]
    InvalidQuantity,
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: String, requested: u32, available: u32 },
    #[error("product {0} does not accept customization")]
    NotCustomizable(String),
    #[error("unknown customization option: {0}")]
    UnknownOption(String),
    #[error("'{choice}' is not a valid choice for {option}")]
    InvalidChoice { option: String, choice: String },
}
