//! Server-side order pricing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::OrderItem;
use crate::domain::value_objects::{Money, MoneyError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub currency: String,
    pub shipping_flat_fee: Decimal,
    /// Orders whose subtotal exceeds this ship free.
    pub free_shipping_threshold: Decimal,
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            currency: "GBP".to_string(),
            shipping_flat_fee: Decimal::new(499, 2),
            free_shipping_threshold: Decimal::new(100, 0),
            tax_rate: Decimal::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals { pub subtotal: Money, pub shipping: Money, pub tax: Money, pub total: Money }

impl PricingPolicy {
    /// subtotal + shipping + tax == total, from the unit prices snapshotted on the items.
    pub fn price(&self, items: &[OrderItem]) -> Result<OrderTotals, MoneyError> {
        let subtotal = items.iter().try_fold(Money::zero(&self.currency), |acc, i| acc.add(&i.line_total()))?;
        let shipping = if subtotal.amount() > self.free_shipping_threshold {
            Money::zero(&self.currency)
        } else {
            Money::new(self.shipping_flat_fee, &self.currency)
        };
        let tax = subtotal.apply_rate(self.tax_rate);
        let total = subtotal.add(&shipping)?.add(&tax)?;
        Ok(OrderTotals { subtotal, shipping, tax, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::Customization;
    use rust_decimal_macros::dec;

    fn line(id: &str, qty: u32, price: Decimal) -> OrderItem {
        OrderItem { product_id: id.into(), name: id.into(), quantity: qty, unit_price: Money::gbp(price), customization: Customization::default() }
    }

    #[test]
    fn test_small_basket_pays_flat_shipping() {
        let totals = PricingPolicy::default().price(&[line("A", 2, dec!(10.00)), line("B", 1, dec!(25.00))]).unwrap();
        assert_eq!(totals.subtotal.amount(), dec!(45.00));
        assert_eq!(totals.shipping.amount(), dec!(4.99));
        assert_eq!(totals.tax.amount(), dec!(0));
        assert_eq!(totals.total.amount(), dec!(49.99));
    }

    #[test]
    fn test_free_shipping_only_above_threshold() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.price(&[line("A", 1, dec!(100.00))]).unwrap().shipping.amount(), dec!(4.99));
        assert!(policy.price(&[line("A", 1, dec!(100.01))]).unwrap().shipping.is_zero());
    }

    #[test]
    fn test_tax_is_added_to_total() {
        let policy = PricingPolicy { tax_rate: dec!(0.20), ..Default::default() };
        let totals = policy.price(&[line("A", 3, dec!(9.99))]).unwrap();
        assert_eq!(totals.tax.amount(), dec!(5.99));
        let sum = totals.subtotal.add(&totals.shipping).unwrap().add(&totals.tax).unwrap();
        assert_eq!(sum, totals.total);
    }
}
