//! The guest cart document and its line items.
//!
//! A [`CartDocument`] is the unit of persistence for guest sessions: an
//! ordered list of line items plus a `last_updated` timestamp refreshed on
//! every structural mutation. Lines are unique by `(product_id, size_id)` -
//! adding the same variant twice merges quantities instead of creating a
//! duplicate row. Every line carries a durable [`LineItemId`] assigned at
//! creation; all lookups go through that id, never through positions, so a
//! stale reference after a removal simply fails to resolve instead of
//! acting on whichever line shifted into its place.

use chrono::{DateTime, Utc};
use clayforge_core::{LineItemId, ProductId, SizeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::summary::{CartSummary, compute_summary};

/// A single line in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Durable opaque id; the key for all UI actions and request guards.
    pub id: LineItemId,
    pub product_id: ProductId,
    /// Variant id; `(product_id, size_id)` is the merge key.
    #[serde(default)]
    pub size_id: Option<SizeId>,
    /// Variant display name (e.g., "Large").
    #[serde(default)]
    pub size: Option<String>,
    pub name: String,
    /// Unit price, >= 0.
    pub price: Decimal,
    /// Always within `[1, max_quantity]`.
    pub quantity: u32,
    #[serde(default)]
    pub category: Option<String>,
    /// Display-only image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Stock ceiling for this line.
    pub max_quantity: u32,
}

impl CartLineItem {
    /// Price times quantity for this line.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }

    fn merge_key(&self) -> (ProductId, Option<SizeId>) {
        (self.product_id, self.size_id)
    }
}

/// Input for adding a line to the cart; the document assigns the id.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub product_id: ProductId,
    pub size_id: Option<SizeId>,
    pub size: Option<String>,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    pub category: Option<String>,
    pub image: Option<String>,
    pub max_quantity: u32,
}

/// The persisted guest cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartDocument {
    /// Line items in insertion order.
    pub items: Vec<CartLineItem>,
    /// Refreshed on every structural mutation (add/update/remove).
    pub last_updated: DateTime<Utc>,
}

impl Default for CartDocument {
    fn default() -> Self {
        Self::empty()
    }
}

impl CartDocument {
    /// Create an empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    /// Add a line, merging by `(product_id, size_id)`.
    ///
    /// When the variant is already present, quantities are summed and
    /// clamped to the *existing* entry's `max_quantity`; otherwise a new
    /// line is appended with a freshly generated id. Returns the id of the
    /// line that now holds the variant.
    pub fn add_item(&mut self, new: NewLineItem) -> LineItemId {
        let key = (new.product_id, new.size_id);
        if let Some(existing) = self.items.iter_mut().find(|item| item.merge_key() == key) {
            existing.quantity = clamp_quantity(
                existing.quantity.saturating_add(new.quantity),
                existing.max_quantity,
            );
            let id = existing.id.clone();
            self.touch();
            return id;
        }

        let item = CartLineItem {
            id: LineItemId::generate(),
            product_id: new.product_id,
            size_id: new.size_id,
            size: new.size,
            name: new.name,
            price: new.price,
            quantity: clamp_quantity(new.quantity, new.max_quantity),
            category: new.category,
            image: new.image,
            max_quantity: new.max_quantity,
        };
        let id = item.id.clone();
        self.items.push(item);
        self.touch();
        id
    }

    /// Set a line's quantity, clamped into `[1, max_quantity]`.
    ///
    /// Returns the quantity actually stored, or `None` (a no-op, not an
    /// error) when the id does not resolve.
    pub fn set_quantity(&mut self, id: &LineItemId, requested: u32) -> Option<u32> {
        let item = self.items.iter_mut().find(|item| &item.id == id)?;
        item.quantity = clamp_quantity(requested, item.max_quantity);
        let stored = item.quantity;
        self.touch();
        Some(stored)
    }

    /// Remove a line. Remaining lines keep their insertion order.
    ///
    /// Returns `false` when the id does not resolve (e.g., a stale
    /// reference to an already-removed line).
    pub fn remove_item(&mut self, id: &LineItemId) -> bool {
        let Some(position) = self.items.iter().position(|item| &item.id == id) else {
            return false;
        };
        self.items.remove(position);
        self.touch();
        true
    }

    /// Look up a line by id.
    #[must_use]
    pub fn item(&self, id: &LineItemId) -> Option<&CartLineItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Total quantity across all lines (the nav badge count).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0, |count, item| count.saturating_add(item.quantity))
    }

    /// Compute the summary fresh from the current lines.
    #[must_use]
    pub fn summary(&self) -> CartSummary {
        compute_summary(&self.items)
    }

    /// Merge another cart into this one (guest cart replayed on login).
    ///
    /// Per merge key, quantities are summed and clamped to the existing
    /// entry's `max_quantity`; variants only present in `other` are
    /// appended in their original order.
    pub fn merge_from(&mut self, other: Self) {
        for item in other.items {
            self.add_item(NewLineItem {
                product_id: item.product_id,
                size_id: item.size_id,
                size: item.size,
                name: item.name,
                price: item.price,
                quantity: item.quantity,
                category: item.category,
                image: item.image,
                max_quantity: item.max_quantity,
            });
        }
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

/// Clamp a requested quantity into `[1, max]`.
///
/// Decreasing below 1 clamps to 1 (never auto-removes the line);
/// increasing above the stock ceiling clamps to the ceiling.
fn clamp_quantity(requested: u32, max: u32) -> u32 {
    requested.max(1).min(max.max(1))
}
