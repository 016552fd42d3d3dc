//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Customization, CustomizationOption, CustomizationOptions, Product, ProductError, StockAdjustment, StockChange};
pub use order::{Address, ArtworkDecision, ArtworkReview, ArtworkStatus, Order, OrderError, OrderItem, OrderStatus};
pub use cart::{Cart, CartError, CartItem};
