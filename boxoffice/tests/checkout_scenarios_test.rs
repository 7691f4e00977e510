//! End-to-end checkout scenarios on the in-memory backend.
//!
//! Run with: `cargo test --test checkout_scenarios_test`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

mod common;

use boxoffice::checkout::CheckoutError;
use boxoffice::payment_gateway::PaymentMode;
use boxoffice::session::Session;
use boxoffice::types::{EphemeralReason, EventId, Persistence, Role, TicketType};
use common::{card, event_with_available, harness, harness_with, request, sign_in};

/// Scenario A: a signed-in buyer gets a persisted ticket that shows up in
/// their listing, and inventory drops by the quantity.
#[tokio::test]
async fn authenticated_checkout_persists_and_lists_ticket() {
    let event = event_with_available(5);
    let h = harness_with(common::config(), PaymentMode::AlwaysApprove, vec![event.clone()]);
    let session = sign_in(&h, "an@example.com", Role::User).await;

    let receipt = h.office.checkout(&session, request(event.id, 2)).await.unwrap();

    assert!(receipt.is_persisted());
    assert!(receipt.ticket.id.as_str().starts_with("TKT-"));
    assert!(!receipt.ticket.qr_code.is_empty());
    assert!(!receipt.ticket.barcode.is_empty());
    assert_eq!(receipt.ticket.access_code.len(), 6);
    assert!(!receipt.ticket.used);
    assert_eq!(receipt.ticket.quantity, 2);
    assert_eq!(receipt.amount, event.price.checked_mul(2).unwrap());
    assert!(receipt.transaction_id.unwrap().starts_with("sim_txn_"));
    assert_eq!(h.store.available_tickets(event.id).await, Some(3));

    let listed = h.office.tickets_for_current_holder(&session).await;
    assert_eq!(listed, vec![receipt.ticket.clone()]);

    // Listing is stable without intervening checkouts.
    assert_eq!(h.office.tickets_for_current_holder(&session).await, listed);

    let inbox = common::inbox_with(&h.office, session.user_id().unwrap(), 2).await;
    assert!(inbox.iter().any(|n| n.title == "Ticket purchased" && n.message.contains(receipt.ticket.id.as_str())));
}

/// Scenario B: guests get an ephemeral ticket that no signed-in listing sees.
#[tokio::test]
async fn anonymous_checkout_is_ephemeral() {
    let event = event_with_available(5);
    let h = harness_with(common::config(), PaymentMode::AlwaysApprove, vec![event.clone()]);
    let guest = Session::anonymous();

    let receipt = h.office.checkout(&guest, request(event.id, 1)).await.unwrap();

    assert!(receipt.ticket.customer_id.starts_with("anon-"));
    assert_eq!(
        receipt.persistence,
        Persistence::Ephemeral {
            reason: EphemeralReason::AnonymousHolder
        }
    );
    assert!(h.store.stored_tickets().await.is_empty());
    assert_eq!(h.store.available_tickets(event.id).await, Some(4));
    assert!(h.office.tickets_for_current_holder(&guest).await.is_empty());

    let other = sign_in(&h, "binh@example.com", Role::User).await;
    assert!(h.office.tickets_for_current_holder(&other).await.is_empty());
}

/// Scenario C: two concurrent checkouts of 3 against 5 seats. Exactly one
/// wins; the other is out of stock and nothing is oversold.
#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let event = event_with_available(5);
    let h = harness_with(common::config(), PaymentMode::AlwaysApprove, vec![event.clone()]);
    let first = sign_in(&h, "first@example.com", Role::User).await;
    let second = Session::anonymous();

    let (a, b) = tokio::join!(
        h.office.checkout(&first, request(event.id, 3)),
        h.office.checkout(&second, request(event.id, 3)),
    );

    let results = [a, b];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one checkout should win: {results:?}");
    assert!(results.iter().any(|r| matches!(
        r,
        Err(CheckoutError::OutOfStock {
            requested: 3,
            available: 2
        })
    )));
    assert_eq!(h.store.available_tickets(event.id).await, Some(2));
}

/// Scenario D: the default mode approves everything, including an empty
/// card number. That permissiveness is deliberate and pinned here.
#[tokio::test]
async fn default_mode_approves_any_card() {
    let event = event_with_available(5);
    let h = harness_with(common::config(), PaymentMode::AlwaysApprove, vec![event.clone()]);
    let guest = Session::anonymous();

    let mut valid = request(event.id, 1);
    valid.payment = card("4242424242424242");
    assert!(h.office.checkout(&guest, valid).await.is_ok());

    let mut empty = request(event.id, 1);
    empty.payment = card("");
    assert!(h.office.checkout(&guest, empty).await.is_ok());
}

/// Scenario D, validating mode: an empty card number is declined with the
/// provider's message and the claimed seats go back.
#[tokio::test]
async fn validating_mode_declines_and_releases_inventory() {
    let event = event_with_available(5);
    let h = harness_with(common::config(), PaymentMode::Validate, vec![event.clone()]);
    let session = sign_in(&h, "cuong@example.com", Role::User).await;

    let mut empty = request(event.id, 2);
    empty.payment = card("");
    let error = h.office.checkout(&session, empty).await.unwrap_err();

    assert_eq!(error, CheckoutError::PaymentFailed("Card number must be 13 to 19 digits".to_string()));
    assert_eq!(h.store.available_tickets(event.id).await, Some(5));
    assert!(h.office.tickets_for_current_holder(&session).await.is_empty());

    let inbox = common::inbox_with(&h.office, session.user_id().unwrap(), 2).await;
    assert!(inbox.iter().any(|n| n.title == "Payment failed"));

    let ok = h.office.checkout(&session, request(event.id, 2)).await.unwrap();
    assert!(ok.is_persisted());
}

/// Scenario E: a broken inbox does not cost the buyer their ticket.
#[tokio::test]
async fn notification_failure_does_not_fail_checkout() {
    let event = event_with_available(5);
    let h = harness_with(common::config(), PaymentMode::AlwaysApprove, vec![event.clone()]);
    let session = sign_in(&h, "dung@example.com", Role::User).await;
    h.store.fail_notification_writes(true);

    let receipt = h.office.checkout(&session, request(event.id, 1)).await.unwrap();

    assert!(receipt.is_persisted());
    assert_eq!(h.office.tickets_for_current_holder(&session).await.len(), 1);
}

#[tokio::test]
async fn more_than_available_is_rejected_before_payment() {
    let event = event_with_available(2);
    let h = harness_with(common::config(), PaymentMode::AlwaysApprove, vec![event.clone()]);

    let error = h.office.checkout(&Session::anonymous(), request(event.id, 3)).await.unwrap_err();

    assert_eq!(
        error,
        CheckoutError::OutOfStock {
            requested: 3,
            available: 2
        }
    );
    assert_eq!(h.store.available_tickets(event.id).await, Some(2));
}

#[tokio::test]
async fn exactly_available_succeeds() {
    let event = event_with_available(4);
    let h = harness_with(common::config(), PaymentMode::AlwaysApprove, vec![event.clone()]);

    h.office.checkout(&Session::anonymous(), request(event.id, 4)).await.unwrap();

    assert_eq!(h.store.available_tickets(event.id).await, Some(0));
}

#[tokio::test]
async fn request_validation() {
    let h = harness();
    let guest = Session::anonymous();
    let event_id = boxoffice::seed::events()[0].id;

    let zero = h.office.checkout(&guest, request(event_id, 0)).await.unwrap_err();
    assert_eq!(zero, CheckoutError::InvalidQuantity { requested: 0, max: 10 });

    let too_many = h.office.checkout(&guest, request(event_id, 11)).await.unwrap_err();
    assert_eq!(too_many, CheckoutError::InvalidQuantity { requested: 11, max: 10 });

    let mut fan_zone = request(event_id, 1);
    fan_zone.ticket_type = TicketType::FanZone;
    assert_eq!(
        h.office.checkout(&guest, fan_zone).await.unwrap_err(),
        CheckoutError::UnsupportedTicketType(TicketType::FanZone)
    );

    let mut no_email = request(event_id, 1);
    no_email.customer.email = "not-an-email".to_string();
    assert!(matches!(
        h.office.checkout(&guest, no_email).await.unwrap_err(),
        CheckoutError::InvalidCustomer(_)
    ));

    let unknown = EventId::new();
    assert_eq!(
        h.office.checkout(&guest, request(unknown, 1)).await.unwrap_err(),
        CheckoutError::EventNotFound(unknown)
    );
}

#[tokio::test]
async fn degraded_ticket_write_returns_ephemeral_ticket() {
    let event = event_with_available(5);
    let h = harness_with(common::config(), PaymentMode::AlwaysApprove, vec![event.clone()]);
    let session = sign_in(&h, "em@example.com", Role::User).await;
    h.store.fail_ticket_writes(true);

    let receipt = h.office.checkout(&session, request(event.id, 1)).await.unwrap();

    assert!(matches!(
        receipt.persistence,
        Persistence::Ephemeral {
            reason: EphemeralReason::StoreUnavailable(_)
        }
    ));
    assert!(h.office.tickets_for_current_holder(&session).await.is_empty());
    assert_eq!(h.store.available_tickets(event.id).await, Some(4));
}

#[tokio::test]
async fn strict_ticket_write_failure_compensates() {
    let event = event_with_available(5);
    let h = harness_with(common::strict_config(), PaymentMode::AlwaysApprove, vec![event.clone()]);
    let session = sign_in(&h, "giang@example.com", Role::User).await;
    h.store.fail_ticket_writes(true);

    let error = h.office.checkout(&session, request(event.id, 2)).await.unwrap_err();

    assert!(matches!(error, CheckoutError::PersistenceFailed(_)));
    assert_eq!(h.store.available_tickets(event.id).await, Some(5));
}

#[tokio::test]
async fn claim_conflicts_are_retried() {
    let event = event_with_available(5);
    let h = harness_with(common::config(), PaymentMode::AlwaysApprove, vec![event.clone()]);
    h.store.inject_claim_conflicts(2);

    h.office.checkout(&Session::anonymous(), request(event.id, 1)).await.unwrap();

    assert_eq!(h.store.available_tickets(event.id).await, Some(4));
}

#[tokio::test]
async fn unreachable_store_fails_claim_after_seed_lookup() {
    let h = harness();
    let event_id = boxoffice::seed::events()[0].id;
    h.store.fail_events(true);

    let error = h.office.checkout(&Session::anonymous(), request(event_id, 1)).await.unwrap_err();

    assert!(matches!(error, CheckoutError::InventoryUnavailable(_)), "{error:?}");
}
