//! Guest session integration tests: persisted document, coordinator flow,
//! cross-session persistence, and the merge-on-login policy.

use std::time::Duration;

use clayforge_cart::{
    CartBackend, CartDocument, GuestCartStore, NewLineItem, OptimisticCoordinator, QuantityAction,
    SessionBackend, SessionMode,
};
use clayforge_integration_tests::{MockCartService, init_tracing};
use clayforge_core::ProductId;
use rust_decimal::Decimal;

fn mug(quantity: u32) -> NewLineItem {
    NewLineItem {
        product_id: ProductId::new(1),
        size_id: None,
        size: None,
        name: "Glazed Mug".to_string(),
        price: Decimal::new(20_00, 2),
        quantity,
        category: Some("Kitchen".to_string()),
        image: Some("/media/mug.png".to_string()),
        max_quantity: 10,
    }
}

fn planter(quantity: u32) -> NewLineItem {
    NewLineItem {
        product_id: ProductId::new(2),
        size_id: None,
        size: None,
        name: "Hex Planter".to_string(),
        price: Decimal::new(30_00, 2),
        quantity,
        category: Some("Garden".to_string()),
        image: None,
        max_quantity: 5,
    }
}

async fn guest_coordinator(
    service: &MockCartService,
    dir: &std::path::Path,
) -> OptimisticCoordinator<SessionBackend> {
    let config = service.config(dir, Duration::ZERO);
    let backend = SessionBackend::select(SessionMode::from_authenticated(false), &config, Vec::new())
        .expect("guest backend");
    OptimisticCoordinator::start(backend, config.update_cooldown)
        .await
        .expect("coordinator")
}

#[tokio::test]
async fn test_guest_journey_end_to_end() {
    init_tracing();
    let service = MockCartService::spawn().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let cart = guest_coordinator(&service, dir.path()).await;

    // Add two products; the second add of the mug merges into one line
    let mug_line = cart.add(mug(1)).await.expect("add mug");
    cart.add(mug(1)).await.expect("merge mug");
    let planter_line = cart.add(planter(1)).await.expect("add planter");
    assert_ne!(mug_line.id, planter_line.id);

    let view = cart.render();
    assert_eq!(view.rows.len(), 2);
    assert_eq!(view.item_count, 3);
    // $40 + $30 = $70: free shipping
    assert_eq!(view.subtotal, "$70.00");
    assert_eq!(view.shipping, "Free");
    assert_eq!(view.total, "$77.00");

    // Decrease the mug: $50 subtotal is still at the threshold
    cart.adjust_quantity(&mug_line.id, QuantityAction::Decrease)
        .await
        .expect("decrease");
    assert_eq!(cart.summary().subtotal, Decimal::from(50));
    assert!(cart.summary().free_shipping_eligible);

    // Remove the planter: down to $20, flat fee and banner return
    cart.remove(&planter_line.id).await.expect("remove");
    let view = cart.render();
    assert_eq!(view.rows.len(), 1);
    assert_eq!(view.shipping, "$5.00");
    assert_eq!(view.tax, "$2.00");
    assert_eq!(view.total, "$27.00");
    assert_eq!(
        view.free_shipping_notice.as_deref(),
        Some("Add $30.00 more to your cart to get free shipping!")
    );

    // The guest path never touched the remote service
    assert_eq!(service.update_hits(), 0);
    assert_eq!(service.add_hits(), 0);
    assert_eq!(service.remove_hits(), 0);
}

#[tokio::test]
async fn test_guest_cart_survives_the_session() {
    let service = MockCartService::spawn().await;
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let cart = guest_coordinator(&service, dir.path()).await;
        cart.add(planter(2)).await.expect("add");
    }

    // A fresh page load sees the persisted document
    let cart = guest_coordinator(&service, dir.path()).await;
    assert_eq!(cart.item_count(), 2);
    assert_eq!(cart.summary().subtotal, Decimal::from(60));
}

#[tokio::test]
async fn test_stale_id_after_removal_is_rejected() {
    let service = MockCartService::spawn().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let cart = guest_coordinator(&service, dir.path()).await;

    let first = cart.add(mug(1)).await.expect("add mug");
    let second = cart.add(planter(1)).await.expect("add planter");

    cart.remove(&first.id).await.expect("remove first");

    // The survivor moved up a row, but its id still resolves it
    let view = cart.render();
    assert_eq!(view.rows.first().map(|r| r.id.clone()), Some(second.id));

    // The removed id is stale everywhere, not remapped to the shifted row
    let err = cart
        .adjust_quantity(&first.id, QuantityAction::Increase)
        .await
        .expect_err("stale id");
    assert!(matches!(err, clayforge_cart::CartError::UnknownItem(_)));
    assert_eq!(cart.render(), view);
}

#[tokio::test]
async fn test_merge_on_login_replays_the_guest_cart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = GuestCartStore::open(dir.path()).expect("open");
    store
        .with_document(|doc| {
            doc.add_item(mug(8));
            doc.add_item(planter(1));
        })
        .expect("seed guest cart");

    // The server cart already holds 4 mugs (max 10): 8 + 4 clamps to 10
    let mut server_cart = CartDocument::empty();
    server_cart.add_item(mug(4));
    server_cart.merge_from(store.load());

    assert_eq!(server_cart.items.len(), 2);
    assert_eq!(server_cart.items.first().map(|i| i.quantity), Some(10));
    assert_eq!(server_cart.items.last().map(|i| i.quantity), Some(1));
}

#[tokio::test]
async fn test_two_tabs_race_last_write_wins() {
    // Both "tabs" share one profile directory. No cross-tab locking
    // exists; whichever write lands last owns the document.
    let dir = tempfile::tempdir().expect("tempdir");
    let tab_a = clayforge_cart::LocalCartBackend::open(dir.path()).expect("tab a");
    let tab_b = clayforge_cart::LocalCartBackend::open(dir.path()).expect("tab b");

    tab_a.add_item(mug(1)).await.expect("tab a add");
    tab_b.add_item(planter(1)).await.expect("tab b add");

    // Tab B's transactional helper re-read tab A's write, so both lines
    // survive here; the race only drops data when a tab overwrites with
    // state read before the other's write landed.
    let lines = tab_a.lines().await.expect("lines");
    assert_eq!(lines.len(), 2);

    let mut stale = CartDocument::empty();
    stale.add_item(mug(3));
    tab_b
        .store()
        .with_document(|doc| *doc = stale.clone())
        .expect("stale overwrite");

    let lines = tab_a.lines().await.expect("lines after clobber");
    assert_eq!(lines.len(), 1);
    assert_eq!(lines.first().map(|l| l.quantity), Some(3));
}
