//! Derived cart totals.
//!
//! The summary is a pure function of the line items and is never stored or
//! maintained incrementally. The optimistic path may flash client-computed
//! numbers, but those come from calling [`compute_summary`] on the updated
//! lines - running deltas are what let floating-point drift creep in, and
//! they are deliberately absent here.

use clayforge_core::format_usd;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::document::CartLineItem;

/// Orders at or above this subtotal ship free.
fn free_shipping_threshold() -> Decimal {
    Decimal::from(50)
}

/// Flat shipping fee below the free-shipping threshold.
///
/// Applies to any subtotal under the threshold, including an empty cart -
/// the formula has no zero special case.
fn flat_shipping_fee() -> Decimal {
    Decimal::from(5)
}

/// Sales tax rate (10%).
fn tax_rate() -> Decimal {
    Decimal::new(10, 2)
}

/// Derived totals for a cart. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartSummary {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub free_shipping_eligible: bool,
    /// Zero once eligible.
    pub amount_needed_for_free_shipping: Decimal,
}

impl CartSummary {
    /// The free-shipping banner text, or `None` once eligible.
    #[must_use]
    pub fn free_shipping_notice(&self) -> Option<String> {
        if self.free_shipping_eligible {
            return None;
        }
        Some(format!(
            "Add {} more to your cart to get free shipping!",
            format_usd(self.amount_needed_for_free_shipping)
        ))
    }
}

/// Compute the summary fresh from a list of line items.
///
/// `subtotal = Σ price × quantity`; shipping is free at or above the
/// threshold, otherwise the flat fee; `tax = subtotal × 10%`;
/// `total = subtotal + shipping + tax`.
#[must_use]
pub fn compute_summary(items: &[CartLineItem]) -> CartSummary {
    let subtotal: Decimal = items.iter().map(CartLineItem::line_total).sum();

    let free_shipping_eligible = subtotal >= free_shipping_threshold();
    let shipping = if free_shipping_eligible {
        Decimal::ZERO
    } else {
        flat_shipping_fee()
    };
    let tax = subtotal * tax_rate();
    let amount_needed_for_free_shipping = if free_shipping_eligible {
        Decimal::ZERO
    } else {
        free_shipping_threshold() - subtotal
    };

    CartSummary {
        subtotal,
        shipping,
        tax,
        total: subtotal + shipping + tax,
        free_shipping_eligible,
        amount_needed_for_free_shipping,
    }
}
