//! Cart table rendering.
//!
//! A pure function from line items to row view models. Every state change
//! re-renders the whole table - rows are never patched in place, so a
//! removal can never leave a control wired to the wrong line. Each row
//! carries its line's durable id as the action key for the quantity and
//! remove controls.

use std::collections::HashMap;

use clayforge_core::{LineItemId, format_usd};
use rust_decimal::Decimal;

use crate::document::CartLineItem;
use crate::summary::{CartSummary, compute_summary};

/// One rendered cart row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartRowView {
    /// Action key for this row's controls.
    pub id: LineItemId,
    pub name: String,
    pub category: Option<String>,
    pub size: Option<String>,
    pub image: Option<String>,
    pub unit_price: String,
    pub quantity: u32,
    /// Ceiling for the increase control.
    pub max_quantity: u32,
    pub line_total: String,
}

/// The rendered cart table and summary card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartTableView {
    pub rows: Vec<CartRowView>,
    pub subtotal: String,
    /// "Free" at or above the threshold, otherwise the fee.
    pub shipping: String,
    pub tax: String,
    pub total: String,
    /// Nav badge count.
    pub item_count: u32,
    /// Banner text; `None` once free shipping is reached.
    pub free_shipping_notice: Option<String>,
}

impl CartTableView {
    /// Whether to show the empty-cart message instead of the table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Render the cart from line items alone, computing the summary fresh.
#[must_use]
pub fn render(items: &[CartLineItem]) -> CartTableView {
    render_reconciled(items, &compute_summary(items), &HashMap::new())
}

/// Render with an already-reconciled summary and any server-provided line
/// totals that differ from the client's `price x quantity` arithmetic.
#[must_use]
pub fn render_reconciled(
    items: &[CartLineItem],
    summary: &CartSummary,
    item_totals: &HashMap<LineItemId, Decimal>,
) -> CartTableView {
    let rows = items
        .iter()
        .map(|item| {
            let line_total = item_totals
                .get(&item.id)
                .copied()
                .unwrap_or_else(|| item.line_total());
            CartRowView {
                id: item.id.clone(),
                name: item.name.clone(),
                category: item.category.clone(),
                size: item.size.clone(),
                image: item.image.clone(),
                unit_price: format_usd(item.price),
                quantity: item.quantity,
                max_quantity: item.max_quantity,
                line_total: format_usd(line_total),
            }
        })
        .collect();

    CartTableView {
        rows,
        subtotal: format_usd(summary.subtotal),
        shipping: if summary.shipping == Decimal::ZERO {
            "Free".to_string()
        } else {
            format_usd(summary.shipping)
        },
        tax: format_usd(summary.tax),
        total: format_usd(summary.total),
        item_count: items
            .iter()
            .fold(0, |count, item| count.saturating_add(item.quantity)),
        free_shipping_notice: summary.free_shipping_notice(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clayforge_core::{ProductId, SizeId};

    fn lines() -> Vec<CartLineItem> {
        vec![
            CartLineItem {
                id: LineItemId::new("a"),
                product_id: ProductId::new(1),
                size_id: None,
                size: None,
                name: "Glazed Mug".to_string(),
                price: Decimal::new(20_00, 2),
                quantity: 1,
                category: Some("Kitchen".to_string()),
                image: Some("/media/mug.png".to_string()),
                max_quantity: 10,
            },
            CartLineItem {
                id: LineItemId::new("b"),
                product_id: ProductId::new(2),
                size_id: Some(SizeId::new(3)),
                size: Some("Large".to_string()),
                name: "Hex Planter".to_string(),
                price: Decimal::new(15_00, 2),
                quantity: 2,
                category: None,
                image: None,
                max_quantity: 5,
            },
        ]
    }

    #[test]
    fn test_rows_carry_ids_as_action_keys() {
        let view = render(&lines());
        let keys: Vec<_> = view.rows.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_row_and_summary_formatting() {
        let view = render(&lines());
        // $50 subtotal: free shipping kicks in exactly at the threshold
        assert_eq!(view.subtotal, "$50.00");
        assert_eq!(view.shipping, "Free");
        assert_eq!(view.tax, "$5.00");
        assert_eq!(view.total, "$55.00");
        assert_eq!(view.item_count, 3);
        assert!(view.free_shipping_notice.is_none());

        let first = view.rows.first().expect("row");
        assert_eq!(first.unit_price, "$20.00");
        assert_eq!(first.line_total, "$20.00");
    }

    #[test]
    fn test_below_threshold_shows_fee_and_notice() {
        let mut items = lines();
        items.truncate(1);
        let view = render(&items);
        assert_eq!(view.shipping, "$5.00");
        assert_eq!(
            view.free_shipping_notice.as_deref(),
            Some("Add $30.00 more to your cart to get free shipping!")
        );
    }

    #[test]
    fn test_server_line_total_overrides_client_arithmetic() {
        let items = lines();
        let summary = compute_summary(&items);
        let overrides = HashMap::from([(LineItemId::new("b"), Decimal::new(27_00, 2))]);
        let view = render_reconciled(&items, &summary, &overrides);

        let discounted = view.rows.last().expect("row");
        assert_eq!(discounted.line_total, "$27.00");
        // Rows without an override keep price x quantity
        assert_eq!(view.rows.first().expect("row").line_total, "$20.00");
    }

    #[test]
    fn test_render_is_a_full_rebuild() {
        let items = lines();
        assert_eq!(render(&items), render(&items));
        assert!(render(&[]).is_empty());
    }
}
