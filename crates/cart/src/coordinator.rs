//! Optimistic update coordination.
//!
//! Every user action on a line item follows the same shape: apply the
//! client-computed result to the displayed state immediately, dispatch the
//! authoritative mutation to the session's backend, then either reconcile
//! the display with the authoritative numbers (server totals win - they
//! may include discounts the client cannot see) or roll it back to the
//! captured pre-action values and surface the error. Nothing is retried
//! automatically; the user re-triggers the action.
//!
//! Each action is an explicit state machine,
//! `Idle -> Pending -> Committed | RolledBack`, with the previous values
//! captured inside the `Pending` state rather than in a closure. The
//! `Pending` entry doubles as the per-item in-flight guard: a second
//! action on the same line while one is outstanding is dropped (not
//! queued, not used to cancel the first), and the guard is released only
//! once the prior request settles plus a short cooldown that absorbs
//! rapid repeated clicks.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use clayforge_core::LineItemId;
use rust_decimal::Decimal;
use tracing::instrument;

use crate::backend::{AddOutcome, CartBackend};
use crate::document::{CartLineItem, NewLineItem};
use crate::error::{CartError, Result};
use crate::render::CartTableView;
use crate::summary::{CartSummary, compute_summary};

/// A quantity button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityAction {
    Increase,
    Decrease,
}

/// Where an action currently stands. `None` from
/// [`OptimisticCoordinator::action_phase`] means idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionPhase {
    Pending,
    Committed,
    RolledBack,
}

/// What a pending action must restore if it rolls back.
#[derive(Debug)]
enum PendingKind {
    Quantity {
        prev_quantity: u32,
    },
    Removal {
        position: usize,
        line: CartLineItem,
    },
}

#[derive(Debug)]
struct PendingAction {
    kind: PendingKind,
    prev_item_total: Option<Decimal>,
    prev_summary: CartSummary,
}

#[derive(Debug)]
enum ActionState {
    Pending(PendingAction),
    Committed,
    RolledBack,
}

#[derive(Debug)]
struct ActionEntry {
    state: ActionState,
    /// Set when the request settles; the guard stays held for the
    /// cooldown after this instant.
    settled_at: Option<Instant>,
}

#[derive(Debug)]
struct DisplayState {
    lines: Vec<CartLineItem>,
    summary: CartSummary,
    /// Server-reconciled line totals that differ from `price x quantity`
    /// (discounts). Consulted by the renderer, restored on rollback.
    item_totals: HashMap<LineItemId, Decimal>,
    actions: HashMap<LineItemId, ActionEntry>,
}

/// Mediates user actions between the displayed cart and its backend.
///
/// The displayed state lives behind a mutex that is never held across a
/// suspension point; only the backend request itself awaits.
#[derive(Debug)]
pub struct OptimisticCoordinator<B> {
    backend: B,
    cooldown: Duration,
    state: Mutex<DisplayState>,
}

impl<B: CartBackend> OptimisticCoordinator<B> {
    /// Build the coordinator, seeding the displayed state from the
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot produce its current lines.
    pub async fn start(backend: B, cooldown: Duration) -> Result<Self> {
        let lines = backend.lines().await?;
        let summary = compute_summary(&lines);
        Ok(Self {
            backend,
            cooldown,
            state: Mutex::new(DisplayState {
                lines,
                summary,
                item_totals: HashMap::new(),
                actions: HashMap::new(),
            }),
        })
    }

    /// Currently displayed line items.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLineItem> {
        self.lock().lines.clone()
    }

    /// Currently displayed summary.
    #[must_use]
    pub fn summary(&self) -> CartSummary {
        self.lock().summary.clone()
    }

    /// Displayed badge count (sum of quantities).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lock()
            .lines
            .iter()
            .fold(0, |count, line| count.saturating_add(line.quantity))
    }

    /// Re-render the full table from the displayed state.
    #[must_use]
    pub fn render(&self) -> CartTableView {
        let state = self.lock();
        crate::render::render_reconciled(&state.lines, &state.summary, &state.item_totals)
    }

    /// Where the most recent action on `id` stands.
    #[must_use]
    pub fn action_phase(&self, id: &LineItemId) -> Option<ActionPhase> {
        self.lock().actions.get(id).map(|entry| match entry.state {
            ActionState::Pending(_) => ActionPhase::Pending,
            ActionState::Committed => ActionPhase::Committed,
            ActionState::RolledBack => ActionPhase::RolledBack,
        })
    }

    /// Handle a quantity button press, clamping against the displayed
    /// value. Returns the quantity now displayed; a press that would not
    /// change the value sends no request.
    ///
    /// # Errors
    ///
    /// `UpdateInFlight` when the item's guard is held, `UnknownItem` for a
    /// stale id, or the backend failure after the display was rolled back.
    pub async fn adjust_quantity(&self, id: &LineItemId, action: QuantityAction) -> Result<u32> {
        let requested = {
            let state = self.lock();
            let line = state
                .lines
                .iter()
                .find(|line| &line.id == id)
                .ok_or_else(|| CartError::UnknownItem(id.clone()))?;
            match action {
                QuantityAction::Increase => line.quantity.saturating_add(1).min(line.max_quantity),
                QuantityAction::Decrease => line.quantity.saturating_sub(1).max(1),
            }
        };
        self.set_quantity(id, requested).await
    }

    /// Set a line's quantity optimistically, then confirm or roll back.
    ///
    /// Returns the quantity now displayed.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Self::adjust_quantity`].
    #[instrument(skip(self))]
    pub async fn set_quantity(&self, id: &LineItemId, requested: u32) -> Result<u32> {
        // Optimistic phase: mutate the display and open the Pending state
        // before any suspension.
        let new_quantity = {
            let mut state = self.lock();
            self.acquire_guard(&mut state, id)?;

            let line = state
                .lines
                .iter_mut()
                .find(|line| &line.id == id)
                .ok_or_else(|| CartError::UnknownItem(id.clone()))?;
            let new_quantity = requested.max(1).min(line.max_quantity.max(1));
            if new_quantity == line.quantity {
                // Value unchanged: no request, no guard
                return Ok(new_quantity);
            }

            let prev_quantity = line.quantity;
            line.quantity = new_quantity;

            let prev_summary = state.summary.clone();
            let prev_item_total = state.item_totals.remove(id);
            state.summary = compute_summary(&state.lines);
            state.actions.insert(
                id.clone(),
                ActionEntry {
                    state: ActionState::Pending(PendingAction {
                        kind: PendingKind::Quantity { prev_quantity },
                        prev_item_total,
                        prev_summary,
                    }),
                    settled_at: None,
                },
            );
            new_quantity
        };

        match self.backend.update_quantity(id, new_quantity).await {
            Ok(outcome) => {
                let mut state = self.lock();
                state.summary = outcome.summary;
                if let Some(total) = outcome.item_total {
                    state.item_totals.insert(id.clone(), total);
                }
                Self::settle(&mut state, id, ActionState::Committed);
                Ok(new_quantity)
            }
            Err(error) => {
                tracing::error!(item = %id, %error, "quantity update failed, rolling back");
                self.roll_back(id);
                Err(error)
            }
        }
    }

    /// Remove a line optimistically, then confirm or roll back (the line
    /// is reinserted at its old position on failure).
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Self::adjust_quantity`].
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &LineItemId) -> Result<()> {
        {
            let mut state = self.lock();
            self.acquire_guard(&mut state, id)?;

            let position = state
                .lines
                .iter()
                .position(|line| &line.id == id)
                .ok_or_else(|| CartError::UnknownItem(id.clone()))?;
            let line = state.lines.remove(position);

            let prev_summary = state.summary.clone();
            let prev_item_total = state.item_totals.remove(id);
            state.summary = compute_summary(&state.lines);
            state.actions.insert(
                id.clone(),
                ActionEntry {
                    state: ActionState::Pending(PendingAction {
                        kind: PendingKind::Removal { position, line },
                        prev_item_total,
                        prev_summary,
                    }),
                    settled_at: None,
                },
            );
        }

        match self.backend.remove_item(id).await {
            Ok(outcome) => {
                let mut state = self.lock();
                state.summary = outcome.summary;
                Self::settle(&mut state, id, ActionState::Committed);
                Ok(())
            }
            Err(error) => {
                tracing::error!(item = %id, %error, "removal failed, rolling back");
                self.roll_back(id);
                Err(error)
            }
        }
    }

    /// Add a variant to the cart. Adds are not optimistic: the backend is
    /// authoritative for merge results, so the display refreshes from it
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; the displayed state is untouched in
    /// that case.
    #[instrument(skip(self, item), fields(product_id = %item.product_id))]
    pub async fn add(&self, item: NewLineItem) -> Result<AddOutcome> {
        let outcome = self.backend.add_item(item).await?;
        let lines = self.backend.lines().await?;
        let mut state = self.lock();
        state.summary = compute_summary(&lines);
        state.lines = lines;
        Ok(outcome)
    }

    /// Reject the action if the item's guard is held; otherwise sweep
    /// entries whose cooldown has lapsed.
    fn acquire_guard(&self, state: &mut DisplayState, id: &LineItemId) -> Result<()> {
        let cooldown = self.cooldown;
        state.actions.retain(|_, entry| {
            entry
                .settled_at
                .is_none_or(|settled| settled.elapsed() < cooldown)
        });
        if state.actions.contains_key(id) {
            return Err(CartError::UpdateInFlight(id.clone()));
        }
        Ok(())
    }

    fn settle(state: &mut DisplayState, id: &LineItemId, outcome: ActionState) {
        if let Some(entry) = state.actions.get_mut(id) {
            entry.state = outcome;
            entry.settled_at = Some(Instant::now());
        }
    }

    /// Restore the display to the values captured in the Pending state.
    fn roll_back(&self, id: &LineItemId) {
        let mut state = self.lock();
        let Some(entry) = state.actions.get_mut(id) else {
            return;
        };
        let ActionState::Pending(pending) =
            std::mem::replace(&mut entry.state, ActionState::RolledBack)
        else {
            return;
        };
        entry.settled_at = Some(Instant::now());

        match pending.kind {
            PendingKind::Quantity { prev_quantity } => {
                if let Some(line) = state.lines.iter_mut().find(|line| &line.id == id) {
                    line.quantity = prev_quantity;
                }
            }
            PendingKind::Removal { position, line } => {
                let position = position.min(state.lines.len());
                state.lines.insert(position, line);
            }
        }
        if let Some(total) = pending.prev_item_total {
            state.item_totals.insert(id.clone(), total);
        }
        state.summary = pending.prev_summary;
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocalCartBackend, MutationOutcome};
    use clayforge_core::ProductId;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn teapot(quantity: u32) -> NewLineItem {
        NewLineItem {
            product_id: ProductId::new(4),
            size_id: None,
            size: None,
            name: "Stoneware Teapot".to_string(),
            price: Decimal::new(20_00, 2),
            quantity,
            category: None,
            image: None,
            max_quantity: 6,
        }
    }

    async fn guest_cart(dir: &std::path::Path) -> (OptimisticCoordinator<LocalCartBackend>, LineItemId) {
        let backend = LocalCartBackend::open(dir).expect("open");
        let added = backend.add_item(teapot(2)).await.expect("seed");
        let cart = OptimisticCoordinator::start(backend, Duration::from_millis(0))
            .await
            .expect("start");
        (cart, added.id)
    }

    /// Backend whose updates always fail; tracks how many requests it saw.
    struct FailingBackend {
        lines: Vec<CartLineItem>,
        requests: AtomicUsize,
    }

    impl CartBackend for FailingBackend {
        async fn lines(&self) -> Result<Vec<CartLineItem>> {
            Ok(self.lines.clone())
        }

        async fn add_item(&self, _item: NewLineItem) -> Result<AddOutcome> {
            Err(CartError::Rejected("out of stock".to_string()))
        }

        async fn update_quantity(&self, id: &LineItemId, _quantity: u32) -> Result<MutationOutcome> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Err(CartError::Rejected(format!("no update for {id}")))
        }

        async fn remove_item(&self, id: &LineItemId) -> Result<MutationOutcome> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Err(CartError::Rejected(format!("no removal for {id}")))
        }

        async fn summary(&self) -> Result<CartSummary> {
            Ok(compute_summary(&self.lines))
        }
    }

    fn failing_cart_line() -> CartLineItem {
        CartLineItem {
            id: LineItemId::new("10"),
            product_id: ProductId::new(4),
            size_id: None,
            size: None,
            name: "Stoneware Teapot".to_string(),
            price: Decimal::new(20_00, 2),
            quantity: 2,
            category: None,
            image: None,
            max_quantity: 6,
        }
    }

    #[tokio::test]
    async fn test_successful_update_commits() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (cart, id) = guest_cart(dir.path()).await;

        let shown = cart
            .adjust_quantity(&id, QuantityAction::Increase)
            .await
            .expect("update");
        assert_eq!(shown, 3);
        assert_eq!(cart.action_phase(&id), Some(ActionPhase::Committed));
        assert_eq!(cart.summary().subtotal, Decimal::from(60));
    }

    #[tokio::test]
    async fn test_decrease_at_one_sends_no_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalCartBackend::open(dir.path()).expect("open");
        let added = backend.add_item(teapot(1)).await.expect("seed");
        let cart = OptimisticCoordinator::start(backend, Duration::from_millis(0))
            .await
            .expect("start");

        let shown = cart
            .adjust_quantity(&added.id, QuantityAction::Decrease)
            .await
            .expect("noop");
        assert_eq!(shown, 1);
        // No request was dispatched, so no action was recorded
        assert_eq!(cart.action_phase(&added.id), None);
    }

    #[tokio::test]
    async fn test_failed_update_rolls_back_everything() {
        let backend = FailingBackend {
            lines: vec![failing_cart_line()],
            requests: AtomicUsize::new(0),
        };
        let cart = OptimisticCoordinator::start(backend, Duration::from_millis(0))
            .await
            .expect("start");
        let id = LineItemId::new("10");
        let before_summary = cart.summary();
        let before_view = cart.render();

        let err = cart
            .adjust_quantity(&id, QuantityAction::Increase)
            .await
            .expect_err("backend fails");
        assert!(matches!(err, CartError::Rejected(_)));

        assert_eq!(cart.action_phase(&id), Some(ActionPhase::RolledBack));
        assert_eq!(cart.lines().first().map(|l| l.quantity), Some(2));
        assert_eq!(cart.summary(), before_summary);
        assert_eq!(cart.render(), before_view);
    }

    #[tokio::test]
    async fn test_failed_removal_reinserts_at_old_position() {
        let mut second = failing_cart_line();
        second.id = LineItemId::new("11");
        second.product_id = ProductId::new(5);
        let backend = FailingBackend {
            lines: vec![failing_cart_line(), second],
            requests: AtomicUsize::new(0),
        };
        let cart = OptimisticCoordinator::start(backend, Duration::from_millis(0))
            .await
            .expect("start");
        let id = LineItemId::new("10");

        cart.remove(&id).await.expect_err("backend fails");

        let lines = cart.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines.first().map(|l| l.id.clone()), Some(id));
    }

    #[tokio::test]
    async fn test_guard_cooldown_rejects_then_releases() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalCartBackend::open(dir.path()).expect("open");
        let added = backend.add_item(teapot(2)).await.expect("seed");
        let cart = OptimisticCoordinator::start(backend, Duration::from_millis(40))
            .await
            .expect("start");

        cart.adjust_quantity(&added.id, QuantityAction::Increase)
            .await
            .expect("first update");

        // Settled, but still cooling down
        let err = cart
            .adjust_quantity(&added.id, QuantityAction::Increase)
            .await
            .expect_err("cooldown holds the guard");
        assert!(matches!(err, CartError::UpdateInFlight(_)));
        assert_eq!(cart.lines().first().map(|l| l.quantity), Some(3));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let shown = cart
            .adjust_quantity(&added.id, QuantityAction::Increase)
            .await
            .expect("guard released after cooldown");
        assert_eq!(shown, 4);
    }

    #[tokio::test]
    async fn test_guard_is_per_item() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LocalCartBackend::open(dir.path()).expect("open");
        let first = backend.add_item(teapot(2)).await.expect("seed");
        let mut other = teapot(1);
        other.product_id = ProductId::new(5);
        other.name = "Bud Vase".to_string();
        let second = backend.add_item(other).await.expect("seed");
        let cart = OptimisticCoordinator::start(backend, Duration::from_secs(60))
            .await
            .expect("start");

        cart.adjust_quantity(&first.id, QuantityAction::Increase)
            .await
            .expect("first item");
        // The first item is cooling down, but the second is independent
        cart.adjust_quantity(&second.id, QuantityAction::Increase)
            .await
            .expect("second item unaffected");
    }
}
