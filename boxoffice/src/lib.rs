//! # Boxoffice
//!
//! Event ticketing: event discovery, checkout, ticket issuance and
//! retrieval, on top of the `boxoffice-core` reducer model and the
//! `boxoffice-runtime` Store.
//!
//! ## Flow
//!
//! ```text
//! CheckoutRequest ──▶ CheckoutService (Store + CheckoutReducer)
//!                       │ load event ─▶ claim inventory ─▶ pay ─▶ issue
//!                       ▼
//!                  CheckoutReceipt ──▶ TicketLedger / render
//!                       │
//!                       └─▶ NotificationOutbox ──▶ Notifier ──▶ inbox
//! ```
//!
//! The hosted store is reached through the repository traits in
//! [`backend`]; [`backend::RestBackend`] talks to a hosted project and
//! [`backend::InMemoryBackend`] serves tests and the demo.
//!
//! ## Example
//!
//! ```no_run
//! use boxoffice::config::Config;
//! use boxoffice::{Backends, BoxOffice};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::from_env();
//! let backends = Backends::from_config(&config.backend)?;
//! let office = BoxOffice::builder(config, backends).build();
//!
//! let session = office.sessions().restore().await;
//! let featured = office.catalog().featured().await;
//! println!("{} featured events", featured.value.len());
//! let tickets = office.tickets_for_current_holder(&session).await;
//! println!("{} tickets", tickets.len());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod catalog;
pub mod checkout;
pub mod codes;
pub mod config;
pub mod issuance;
pub mod metrics;
pub mod notifications;
pub mod payment_gateway;
pub mod render;
pub mod seed;
pub mod session;
pub mod tickets;
pub mod types;

use backend::{
    EventRepository, InMemoryBackend, InMemoryIdentityProvider, NotificationRepository, RestBackend, StoreResult,
    TicketRepository,
};
use boxoffice_core::environment::{Clock, SystemClock};
use catalog::EventCatalog;
use checkout::{CheckoutEnvironment, CheckoutError, CheckoutReceipt, CheckoutRequest, CheckoutService};
use codes::CodeGenerator;
use config::{BackendConfig, Config};
use issuance::TicketIssuer;
use notifications::{Inbox, InboxPoller, NotificationDraft, NotificationOutbox, Notifier};
use payment_gateway::{PaymentGateway, PaymentSimulator};
use render::TicketFile;
use session::{FileSessionCache, IdentityProvider, InMemorySessionCache, Session, SessionCache, SessionManager};
use std::sync::Arc;
use std::time::Duration;
use tickets::{TicketError, TicketLedger};
use tokio::task::JoinHandle;
use types::{DigitalTicket, Event};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The store and identity provider the box office runs against.
#[derive(Clone)]
pub struct Backends {
    /// Events and inventory
    pub events: Arc<dyn EventRepository>,
    /// Issued tickets
    pub tickets: Arc<dyn TicketRepository>,
    /// Inbox
    pub notifications: Arc<dyn NotificationRepository>,
    /// Sign-up, sign-in and sign-out
    pub identity: Arc<dyn IdentityProvider>,
}

impl Backends {
    /// Everything in memory.
    #[must_use]
    pub fn in_memory(store: Arc<InMemoryBackend>, identity: Arc<InMemoryIdentityProvider>) -> Self {
        Self {
            events: store.clone(),
            tickets: store.clone(),
            notifications: store,
            identity,
        }
    }

    /// Everything on one hosted project.
    #[must_use]
    pub fn rest(backend: Arc<RestBackend>) -> Self {
        Self {
            events: backend.clone(),
            tickets: backend.clone(),
            notifications: backend.clone(),
            identity: backend,
        }
    }

    /// Hosted backend when a URL is configured, otherwise an in-memory store
    /// seeded with the sample events.
    ///
    /// # Errors
    ///
    /// Returns the [`backend::StoreError`] from building the HTTP client.
    pub fn from_config(config: &BackendConfig) -> StoreResult<Self> {
        match &config.url {
            Some(url) => {
                tracing::info!(%url, "Using hosted backend");
                let backend = RestBackend::new(url.clone(), config.anon_key.clone(), config.request_timeout())?;
                Ok(Self::rest(Arc::new(backend)))
            },
            None => {
                tracing::info!("No backend URL configured, using in-memory store with seed events");
                Ok(Self::in_memory(
                    Arc::new(InMemoryBackend::with_events(seed::events())),
                    Arc::new(InMemoryIdentityProvider::new()),
                ))
            },
        }
    }
}

/// Assembles a [`BoxOffice`]. Anything not set is built from the config.
pub struct BoxOfficeBuilder {
    config: Config,
    backends: Backends,
    payments: Option<Arc<dyn PaymentGateway>>,
    clock: Option<Arc<dyn Clock>>,
    codes: Option<CodeGenerator>,
    session_cache: Option<Arc<dyn SessionCache>>,
}

impl BoxOfficeBuilder {
    /// Use this payment provider instead of the configured simulator
    #[must_use]
    pub fn payments(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
        self.payments = Some(payments);
        self
    }

    /// Use this clock instead of the system clock
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use this code generator (for example a seeded one)
    #[must_use]
    pub fn codes(mut self, codes: CodeGenerator) -> Self {
        self.codes = Some(codes);
        self
    }

    /// Use this session cache instead of the configured one
    #[must_use]
    pub fn session_cache(mut self, cache: Arc<dyn SessionCache>) -> Self {
        self.session_cache = Some(cache);
        self
    }

    /// Build the box office and start its notification consumer.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn build(self) -> BoxOffice {
        let Self {
            config,
            backends,
            payments,
            clock,
            codes,
            session_cache,
        } = self;

        let clock: Arc<dyn Clock> = match clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let retry = config.retry.policy();

        let payments = payments.unwrap_or_else(|| {
            PaymentSimulator::new(
                config.payment.mode,
                Duration::from_millis(config.payment.min_delay_ms),
                Duration::from_millis(config.payment.max_delay_ms),
            )
            .shared()
        });
        let codes = codes
            .unwrap_or_else(|| CodeGenerator::new(config.codes.verify_base_url.clone()))
            .with_clock(clock.clone());
        let session_cache: Arc<dyn SessionCache> = match (session_cache, &config.session.cache_path) {
            (Some(cache), _) => cache,
            (None, Some(path)) => Arc::new(FileSessionCache::new(path.clone())),
            (None, None) => Arc::new(InMemorySessionCache::new()),
        };

        let notifier = Notifier::new(backends.notifications.clone(), clock.clone());
        let (outbox, outbox_task) = NotificationOutbox::spawn(notifier, config.notifications.outbox_capacity);

        let catalog = EventCatalog::new(backends.events.clone(), retry.clone());
        let issuer = TicketIssuer::new(
            backends.tickets.clone(),
            Arc::new(codes),
            clock.clone(),
            outbox.clone(),
            config.checkout.persistence_policy,
            retry,
        );
        let checkout = CheckoutService::new(
            CheckoutEnvironment {
                catalog: catalog.clone(),
                payments,
                issuer,
                outbox: outbox.clone(),
                clock,
                quantity_cap: config.checkout.quantity_cap,
            },
            config.checkout.wait_timeout(),
        );
        let ledger = TicketLedger::new(backends.tickets.clone(), catalog.clone(), outbox.clone());
        let inbox = Inbox::new(backends.notifications.clone());
        let sessions = Arc::new(SessionManager::new(backends.identity.clone(), session_cache, outbox.clone()));

        tracing::info!(
            quantity_cap = config.checkout.quantity_cap,
            persistence_policy = ?config.checkout.persistence_policy,
            payment_mode = ?config.payment.mode,
            "Box office ready"
        );

        BoxOffice {
            config,
            catalog,
            checkout,
            ledger,
            inbox,
            sessions,
            outbox,
            outbox_task,
        }
    }
}

/// The assembled box office.
pub struct BoxOffice {
    config: Config,
    catalog: EventCatalog,
    checkout: CheckoutService,
    ledger: TicketLedger,
    inbox: Inbox,
    sessions: Arc<SessionManager>,
    outbox: NotificationOutbox,
    outbox_task: JoinHandle<()>,
}

impl BoxOffice {
    /// Start assembling a box office
    #[must_use]
    pub fn builder(config: Config, backends: Backends) -> BoxOfficeBuilder {
        BoxOfficeBuilder {
            config,
            backends,
            payments: None,
            clock: None,
            codes: None,
            session_cache: None,
        }
    }

    /// Buy tickets.
    ///
    /// # Errors
    ///
    /// Returns the [`CheckoutError`] the checkout ended with.
    pub async fn checkout(&self, session: &Session, request: CheckoutRequest) -> Result<CheckoutReceipt, CheckoutError> {
        self.checkout.checkout(session, request).await
    }

    /// Persisted tickets of the session's holder, newest first. Guests get an
    /// empty list.
    pub async fn tickets_for_current_holder(&self, session: &Session) -> Vec<DigitalTicket> {
        self.ledger.list_for_holder(&session.holder).await
    }

    /// The ticket card as an SVG file. Signed-in holders get a "ticket
    /// downloaded" notification.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::EventNotFound`] when the ticket's event is gone.
    pub async fn download_ticket_artifact(
        &self,
        session: &Session,
        ticket: &DigitalTicket,
    ) -> Result<TicketFile, TicketError> {
        let event = self.event_for(ticket).await?;
        let file = render::download(ticket, &event);

        tracing::debug!(ticket_id = %ticket.id, bytes = file.bytes.len(), "Ticket downloaded");
        if let Some(user_id) = session.user_id() {
            self.outbox.emit(NotificationDraft::ticket_downloaded(user_id, &ticket.id));
        }
        Ok(file)
    }

    /// The printable HTML page for a ticket.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::EventNotFound`] when the ticket's event is gone.
    pub async fn print_ticket_artifact(&self, ticket: &DigitalTicket) -> Result<String, TicketError> {
        let event = self.event_for(ticket).await?;
        Ok(render::print(ticket, &event))
    }

    /// Background inbox refresh for the session's user, at the configured
    /// interval.
    #[must_use]
    pub fn watch_inbox(&self, session: &Session) -> InboxPoller {
        InboxPoller::spawn(
            self.inbox.clone(),
            session.user_id(),
            self.config.notifications.poll_interval(),
        )
    }

    /// Event discovery and organizer operations
    #[must_use]
    pub const fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    /// Ticket lookup, validation and upgrades
    #[must_use]
    pub const fn ledger(&self) -> &TicketLedger {
        &self.ledger
    }

    /// Notification inbox
    #[must_use]
    pub const fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Sign-up, sign-in and sign-out
    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Stop accepting checkouts and wait for queued notifications to be
    /// written.
    pub async fn shutdown(self) {
        self.checkout.shutdown();

        let Self {
            checkout,
            ledger,
            sessions,
            outbox,
            outbox_task,
            ..
        } = self;
        // Every outbox clone has to go before the consumer sees the channel close.
        drop((checkout, ledger, sessions, outbox));

        match tokio::time::timeout(SHUTDOWN_GRACE, outbox_task).await {
            Ok(Ok(())) => {},
            Ok(Err(error)) => tracing::warn!(%error, "Notification consumer ended abnormally"),
            Err(_) => tracing::warn!("Notification consumer still busy at shutdown, abandoning queued notifications"),
        }
        tracing::info!("Box office shut down");
    }

    async fn event_for(&self, ticket: &DigitalTicket) -> Result<Event, TicketError> {
        self.catalog
            .get_event(ticket.event_id)
            .await
            .value
            .ok_or(TicketError::EventNotFound(ticket.event_id))
    }
}
