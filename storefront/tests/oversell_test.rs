//! Oversell protection: the advisory availability gate up front and the
//! guarded decrement backstop at finalize time.

#![allow(clippy::unwrap_used)]

use adspace_storefront::app::StorefrontError;
use adspace_storefront::checkout::{CheckoutOutcome, CheckoutRequest, CheckoutSource};
use adspace_storefront::config::HoldConfig;
use adspace_storefront::payments::{
    MockPaymentProvider, PaymentConfirmation, PaymentMetadata, PaymentStatus,
};
use adspace_storefront::server::state::build_services_with;
use adspace_storefront::types::{ConfirmationId, HolderId, ItemKey, Money, OrderLine};
use adspace_core::environment::Clock;
use adspace_testing::test_clock;
use chrono::Duration;
use std::sync::Arc;

struct World {
    services: adspace_storefront::app::Services,
    payments: Arc<MockPaymentProvider>,
}

fn world() -> World {
    let payments = Arc::new(MockPaymentProvider::new());
    let services = build_services_with(
        HoldConfig {
            cart_hold_minutes: 15,
            bundle_hold_hours: 24,
            sweep_interval_secs: 60,
        },
        Arc::new(test_clock()),
        Arc::clone(&payments) as Arc<dyn adspace_storefront::payments::PaymentProvider>,
    );
    World { services, payments }
}

async fn register_succeeded(world: &World, confirmation: &str, amount: Money) {
    world
        .payments
        .register(PaymentConfirmation {
            id: ConfirmationId::new(confirmation),
            status: PaymentStatus::Succeeded,
            amount,
            metadata: PaymentMetadata::default(),
        })
        .await;
}

#[tokio::test]
async fn availability_gate_refuses_claims_beyond_whats_left() {
    let w = world();
    let item = ItemKey::new("MT", "half");
    w.services.inventory.set_total(&item, 3).await.unwrap();

    w.services
        .claim(
            HolderId::new("first"),
            item.clone(),
            "Half page".to_string(),
            Money::from_major(250),
            2,
        )
        .await
        .unwrap();

    let err = w
        .services
        .claim(
            HolderId::new("second"),
            item.clone(),
            "Half page".to_string(),
            Money::from_major(250),
            2,
        )
        .await;

    match err {
        Err(StorefrontError::AvailabilityConflict {
            requested,
            available,
            ..
        }) => {
            assert_eq!(requested, 2);
            assert_eq!(available, 1);
        }
        other => panic!("expected availability conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn sweep_returns_expired_holds_to_availability() {
    let w = world();
    let item = ItemKey::new("MT", "half");
    w.services.inventory.set_total(&item, 3).await.unwrap();

    // One hold already past its window, one still live
    let past = test_clock().now() - Duration::minutes(1);
    w.services
        .ledger
        .create_reservation(HolderId::new("stale"), item.clone(), 2, Some(past))
        .await
        .unwrap();
    w.services
        .ledger
        .create_reservation(HolderId::new("live"), item.clone(), 1, None)
        .await
        .unwrap();

    // Expired holds are invisible to reads even before the sweep runs
    assert_eq!(w.services.ledger.available(&item, 3).await, 2);

    let swept = w.services.ledger.cleanup_expired().await;
    assert_eq!(swept, 1);
    assert_eq!(w.services.ledger.available(&item, 3).await, 2);
}

#[tokio::test]
async fn guarded_decrement_is_the_backstop_when_holds_overcommit() {
    let w = world();
    let item = ItemKey::new("MT", "half");
    w.services.inventory.set_total(&item, 3).await.unwrap();

    // Two buyers hold 2 each against a total of 3. The advisory gate would
    // normally prevent this; the ledger itself does not, so the finalize
    // decrement is what keeps the second sale from overselling.
    let holder_a = HolderId::new("buyer-a");
    let holder_b = HolderId::new("buyer-b");
    let hold_a = w
        .services
        .ledger
        .create_reservation(holder_a.clone(), item.clone(), 2, None)
        .await
        .unwrap();
    let hold_b = w
        .services
        .ledger
        .create_reservation(holder_b.clone(), item.clone(), 2, None)
        .await
        .unwrap();

    register_succeeded(&w, "pi_a", Money::from_major(500)).await;
    register_succeeded(&w, "pi_b", Money::from_major(500)).await;

    let line = |reservation_id| OrderLine {
        item: item.clone(),
        title: "Half page".to_string(),
        unit_price: Money::from_major(250),
        quantity: 2,
        reservation_id,
    };
    let request = |confirmation: &str, holder: &HolderId, reservation_id| CheckoutRequest {
        confirmation_id: ConfirmationId::new(confirmation),
        holder: holder.clone(),
        contact: None,
        lines: vec![line(reservation_id)],
        source: CheckoutSource::Direct,
    };

    let (first, second) = tokio::join!(
        w.services.checkout.finalize(request("pi_a", &holder_a, hold_a)),
        w.services.checkout.finalize(request("pi_b", &holder_b, hold_b)),
    );
    let outcomes = [first.unwrap(), second.unwrap()];

    let completed = outcomes
        .iter()
        .filter(|o| matches!(o, CheckoutOutcome::Completed { .. }))
        .count();
    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, CheckoutOutcome::FulfillmentFailed))
        .count();
    assert_eq!(completed, 1, "exactly one sale may win the last units");
    assert_eq!(failed, 1);

    // Never negative: the loser moved nothing
    assert_eq!(w.services.inventory.total(&item).await.unwrap(), 1);
    // The losing buyer's money moved, so an operator record exists
    assert_eq!(w.services.manual_actions.len().await, 1);
}
