//! Guest session backend over the persisted cart document.
//!
//! Operations are synchronous underneath - the store never suspends - so
//! the async trait impl completes immediately. Read-modify-write atomicity
//! comes from the store's transactional helper, which is what lets rapid
//! repeated interactions queue up behind one another instead of
//! interleaving.

use std::path::Path;

use clayforge_core::LineItemId;

use super::{AddOutcome, CartBackend, MutationOutcome};
use crate::document::{CartLineItem, NewLineItem};
use crate::error::{CartError, Result};
use crate::store::GuestCartStore;
use crate::summary::CartSummary;

/// [`CartBackend`] for guest sessions.
#[derive(Debug, Clone)]
pub struct LocalCartBackend {
    store: GuestCartStore,
}

impl LocalCartBackend {
    /// Open the backend over the guest store in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            store: GuestCartStore::open(dir.as_ref())?,
        })
    }

    /// The underlying store (e.g., for a merge-on-login flow).
    #[must_use]
    pub const fn store(&self) -> &GuestCartStore {
        &self.store
    }
}

impl CartBackend for LocalCartBackend {
    async fn lines(&self) -> Result<Vec<CartLineItem>> {
        Ok(self.store.load().items)
    }

    async fn add_item(&self, item: NewLineItem) -> Result<AddOutcome> {
        self.store.with_document(|doc| {
            let id = doc.add_item(item);
            AddOutcome {
                id,
                cart_count: doc.item_count(),
            }
        })
    }

    async fn update_quantity(&self, id: &LineItemId, quantity: u32) -> Result<MutationOutcome> {
        let outcome = self.store.with_document(|doc| {
            doc.set_quantity(id, quantity)?;
            let item_total = doc.item(id).map(CartLineItem::line_total);
            Some(MutationOutcome {
                item_total,
                summary: doc.summary(),
                cart_count: doc.item_count(),
            })
        })?;
        outcome.ok_or_else(|| CartError::UnknownItem(id.clone()))
    }

    async fn remove_item(&self, id: &LineItemId) -> Result<MutationOutcome> {
        let outcome = self.store.with_document(|doc| {
            if !doc.remove_item(id) {
                return None;
            }
            Some(MutationOutcome {
                item_total: None,
                summary: doc.summary(),
                cart_count: doc.item_count(),
            })
        })?;
        outcome.ok_or_else(|| CartError::UnknownItem(id.clone()))
    }

    async fn summary(&self) -> Result<CartSummary> {
        Ok(self.store.load().summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clayforge_core::ProductId;
    use rust_decimal::Decimal;

    fn vase(quantity: u32) -> NewLineItem {
        NewLineItem {
            product_id: ProductId::new(9),
            size_id: None,
            size: None,
            name: "Fluted Vase".to_string(),
            price: Decimal::new(25_00, 2),
            quantity,
            category: Some("Decor".to_string()),
            image: None,
            max_quantity: 4,
        }
    }

    #[tokio::test]
    async fn test_add_then_update_then_remove() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalCartBackend::open(dir.path()).expect("open");

        let added = backend.add_item(vase(1)).await.expect("add");
        assert_eq!(added.cart_count, 1);

        let updated = backend
            .update_quantity(&added.id, 2)
            .await
            .expect("update");
        assert_eq!(updated.item_total, Some(Decimal::from(50)));
        assert_eq!(updated.cart_count, 2);
        // $50 subtotal is exactly the free-shipping threshold
        assert!(updated.summary.free_shipping_eligible);

        let removed = backend.remove_item(&added.id).await.expect("remove");
        assert_eq!(removed.item_total, None);
        assert_eq!(removed.cart_count, 0);
        assert_eq!(removed.summary.subtotal, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_stale_id_is_unknown_item() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalCartBackend::open(dir.path()).expect("open");

        let added = backend.add_item(vase(1)).await.expect("add");
        backend.remove_item(&added.id).await.expect("remove");

        let err = backend
            .update_quantity(&added.id, 3)
            .await
            .expect_err("stale id must not resolve");
        assert!(matches!(err, CartError::UnknownItem(_)));
    }
}
