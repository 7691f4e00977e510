//! Shared setup for the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use boxoffice::backend::{InMemoryBackend, InMemoryIdentityProvider};
use boxoffice::checkout::CheckoutRequest;
use boxoffice::config::Config;
use boxoffice::issuance::PersistencePolicy;
use boxoffice::payment_gateway::{PaymentDetails, PaymentMode, PaymentSimulator};
use boxoffice::session::Session;
use boxoffice::types::{Customer, Event, EventId, Notification, Role, TicketType, UserId};
use boxoffice::{seed, Backends, BoxOffice};
use std::sync::Arc;
use std::time::Duration;

pub const PASSWORD: &str = "correct horse";

pub struct Harness {
    pub office: BoxOffice,
    pub store: Arc<InMemoryBackend>,
    pub identity: Arc<InMemoryIdentityProvider>,
}

/// Defaults with millisecond retries so failure paths stay fast.
pub fn config() -> Config {
    let mut config = Config::default();
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

pub fn harness() -> Harness {
    harness_with(config(), PaymentMode::AlwaysApprove, seed::events())
}

pub fn harness_with(config: Config, mode: PaymentMode, events: Vec<Event>) -> Harness {
    let store = Arc::new(InMemoryBackend::with_events(events));
    let identity = Arc::new(InMemoryIdentityProvider::new());
    let office = BoxOffice::builder(config, Backends::in_memory(store.clone(), identity.clone()))
        .payments(PaymentSimulator::instant(mode).shared())
        .build();

    Harness {
        office,
        store,
        identity,
    }
}

pub fn strict_config() -> Config {
    let mut config = config();
    config.checkout.persistence_policy = PersistencePolicy::Strict;
    config
}

/// The first seed event with only `available` tickets left.
pub fn event_with_available(available: u32) -> Event {
    let mut event = seed::events().remove(0);
    event.available_tickets = available;
    event
}

pub fn customer() -> Customer {
    Customer {
        name: "Ram Thapa".to_string(),
        email: "ram@example.com".to_string(),
        phone: "0987654321".to_string(),
    }
}

pub fn card(number: &str) -> PaymentDetails {
    PaymentDetails::Card {
        number: number.to_string(),
        holder: "HOA LE".to_string(),
        expiry: "09/29".to_string(),
        cvv: "321".to_string(),
    }
}

pub fn request(event_id: EventId, quantity: u32) -> CheckoutRequest {
    CheckoutRequest {
        event_id,
        customer: customer(),
        payment: card("4242424242424242"),
        quantity,
        ticket_type: TicketType::Standard,
    }
}

pub async fn sign_in(harness: &Harness, email: &str, role: Role) -> Session {
    harness.identity.with_account(email, PASSWORD, "Test User", role).await;
    harness.office.sessions().sign_in(email, PASSWORD).await.unwrap()
}

/// Poll the inbox until it holds at least `count` entries or a second passes.
pub async fn inbox_with(office: &BoxOffice, user_id: UserId, count: usize) -> Vec<Notification> {
    for _ in 0..100 {
        let notifications = office.inbox().list(Some(user_id)).await;
        if notifications.len() >= count {
            return notifications;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    office.inbox().list(Some(user_id)).await
}
