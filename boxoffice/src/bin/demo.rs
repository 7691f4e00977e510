//! Box office demo.
//!
//! Runs the whole flow against the in-memory backend seeded with the sample
//! events: browse, buy as a guest, sign in, buy again, list, download,
//! scan at the door, upgrade, read the inbox, sign out.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info,boxoffice=debug cargo run --bin boxoffice-demo
//! ```

use anyhow::Context as _;
use boxoffice::backend::{InMemoryBackend, InMemoryIdentityProvider};
use boxoffice::catalog::EventQuery;
use boxoffice::checkout::CheckoutRequest;
use boxoffice::config::Config;
use boxoffice::payment_gateway::{PaymentDetails, PaymentSimulator};
use boxoffice::types::{Category, Customer, Role, TicketType};
use boxoffice::{seed, Backends, BoxOffice};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_EMAIL: &str = "pasang@example.com";
const DEMO_PASSWORD: &str = "rhododendron-2026";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,boxoffice=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    boxoffice::metrics::register_business_metrics();

    let config = Config::from_env();
    let store = Arc::new(InMemoryBackend::with_events(seed::events()));
    let identity = Arc::new(InMemoryIdentityProvider::new());
    identity
        .with_account(DEMO_EMAIL, DEMO_PASSWORD, "Pasang Sherpa", Role::Organizer)
        .await;

    let office = BoxOffice::builder(config.clone(), Backends::in_memory(store.clone(), identity))
        .payments(
            PaymentSimulator::new(
                config.payment.mode,
                Duration::from_millis(50),
                Duration::from_millis(150),
            )
            .shared(),
        )
        .build();

    // Browse
    let featured = office.catalog().featured().await;
    tracing::info!(count = featured.value.len(), degraded = featured.degraded, "Featured events");
    for event in &featured.value {
        tracing::info!(title = %event.title, date = %event.date, price = %event.price, "  featured");
    }
    let outdoor = office.catalog().search(&EventQuery::all().tag("outdoor")).await;
    tracing::info!(count = outdoor.value.len(), "Outdoor events");
    let music = office
        .catalog()
        .search(&EventQuery::all().category(Category::Music))
        .await
        .value
        .into_iter()
        .next()
        .context("seed data has a music event")?;

    // Guest checkout
    let guest = office.sessions().restore().await;
    let guest_receipt = office
        .checkout(
            &guest,
            CheckoutRequest {
                event_id: music.id,
                customer: Customer {
                    name: "Sita Sharma".into(),
                    email: "sita@example.com".into(),
                    phone: "9841234567".into(),
                },
                payment: PaymentDetails::Esewa {
                    phone: "9841234567".into(),
                },
                quantity: 1,
                ticket_type: TicketType::Standard,
            },
        )
        .await?;
    tracing::info!(
        ticket_id = %guest_receipt.ticket.id,
        persisted = guest_receipt.is_persisted(),
        "Guest ticket issued"
    );

    // Signed-in checkout
    let session = office.sessions().sign_in(DEMO_EMAIL, DEMO_PASSWORD).await?;
    let receipt = office
        .checkout(
            &session,
            CheckoutRequest {
                event_id: music.id,
                customer: Customer {
                    name: "Pasang Sherpa".into(),
                    email: DEMO_EMAIL.into(),
                    phone: "9801234567".into(),
                },
                payment: PaymentDetails::Card {
                    number: "4242 4242 4242 4242".into(),
                    holder: "PASANG SHERPA".into(),
                    expiry: "12/28".into(),
                    cvv: "123".into(),
                },
                quantity: 2,
                ticket_type: TicketType::Vip,
            },
        )
        .await?;
    tracing::info!(
        ticket_id = %receipt.ticket.id,
        amount = %receipt.amount,
        access_code = %receipt.ticket.access_code,
        "Ticket issued"
    );
    tracing::info!(
        remaining = store.available_tickets(music.id).await.unwrap_or_default(),
        "Inventory after checkouts"
    );

    // Retrieval and rendering
    let tickets = office.tickets_for_current_holder(&session).await;
    tracing::info!(count = tickets.len(), "My tickets");
    let file = office.download_ticket_artifact(&session, &receipt.ticket).await?;
    tracing::info!(file = %file.file_name, bytes = file.bytes.len(), "Downloaded ticket card");
    let page = office.print_ticket_artifact(&receipt.ticket).await?;
    tracing::info!(bytes = page.len(), "Rendered print page");

    // Upgrade, then scan at the door twice
    let upgrade = office
        .ledger()
        .upgrade(&session.holder, &receipt.ticket.id, TicketType::FanZone)
        .await?;
    tracing::info!(surcharge = %upgrade.surcharge, ticket_type = %upgrade.ticket.ticket_type, "Upgraded");
    let admitted = office.ledger().validate(&receipt.ticket.access_code).await?;
    tracing::info!(ticket_id = %admitted.id, "Admitted");
    if let Err(error) = office.ledger().validate(&receipt.ticket.access_code).await {
        tracing::info!(%error, "Second scan rejected");
    }

    // Inbox
    tokio::time::sleep(Duration::from_millis(100)).await;
    for notification in office.inbox().list(session.user_id()).await {
        tracing::info!(title = %notification.title, kind = ?notification.kind, "  inbox");
    }
    let unread = office.inbox().unread_count(session.user_id()).await;
    tracing::info!(unread, "Unread notifications");

    let session = office.sessions().sign_out().await;
    tracing::info!(signed_in = session.is_authenticated(), "Signed out");

    office.shutdown().await;
    Ok(())
}
