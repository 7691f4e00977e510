//! Access to the hosted backend.
//!
//! The box office keeps no durable state of its own. Events, tickets and
//! notifications live in a hosted relational store reached through the
//! repository traits below:
//!
//! - [`rest::RestBackend`]: the hosted store over HTTPS (PostgREST dialect)
//! - [`memory::InMemoryBackend`]: process-local tables for tests and the demo
//!
//! Inventory changes go through [`EventRepository::claim_tickets`], an atomic
//! conditional decrement. Implementations must never let
//! `available_tickets` drop below zero or rise above `total_tickets`.

use crate::types::{DigitalTicket, Event, EventId, Notification, NotificationId, TicketId, TicketType, UserId};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod rest;

pub use memory::{InMemoryBackend, InMemoryIdentityProvider};
pub use rest::RestBackend;

/// Errors from the hosted store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    // ========== Transport ==========
    /// The store could not be reached or answered with a server error
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A conditional update lost a race; safe to retry
    #[error("Concurrent update conflict")]
    Conflict,

    // ========== Domain ==========
    /// Fewer tickets left than requested
    #[error("Insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory {
        /// Tickets asked for
        requested: u32,
        /// Tickets left
        available: u32,
    },

    /// Row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    // ========== Protocol ==========
    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Credentials rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-success status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status
        status: u16,
        /// Body or reason
        message: String,
    },
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Conflict)
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// The `events` table.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Read one event.
    async fn fetch_event(&self, id: EventId) -> StoreResult<Option<Event>>;

    /// Read every event, soonest first.
    async fn list_events(&self) -> StoreResult<Vec<Event>>;

    /// Insert a new event.
    async fn insert_event(&self, event: &Event) -> StoreResult<()>;

    /// Delete an event. Returns `false` when it did not exist.
    async fn delete_event(&self, id: EventId) -> StoreResult<bool>;

    /// Decrement `available_tickets` by `quantity` only if enough are left.
    /// Returns the remaining count.
    ///
    /// Fails with [`StoreError::InsufficientInventory`] when too few are
    /// left, and with [`StoreError::Conflict`] when a concurrent update won
    /// the race.
    async fn claim_tickets(&self, id: EventId, quantity: u32) -> StoreResult<u32>;

    /// Give `quantity` tickets back, never exceeding `total_tickets`.
    /// Returns the new available count.
    async fn release_tickets(&self, id: EventId, quantity: u32) -> StoreResult<u32>;
}

/// The `tickets` table.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Insert a freshly issued ticket.
    async fn insert_ticket(&self, ticket: &DigitalTicket) -> StoreResult<()>;

    /// Every ticket held by `customer_id`, newest first.
    async fn tickets_for_customer(&self, customer_id: &str) -> StoreResult<Vec<DigitalTicket>>;

    /// Read one ticket.
    async fn fetch_ticket(&self, id: &TicketId) -> StoreResult<Option<DigitalTicket>>;

    /// Look a ticket up by its 6-digit access code.
    async fn find_by_access_code(&self, access_code: &str) -> StoreResult<Option<DigitalTicket>>;

    /// Set `used` where it is still `false`. Returns `false` when the ticket
    /// was already used.
    async fn mark_used(&self, id: &TicketId) -> StoreResult<bool>;

    /// Change only the ticket type, where `used` is still `false`. Returns
    /// `false` when the ticket was already used.
    async fn update_ticket_type(&self, id: &TicketId, ticket_type: TicketType) -> StoreResult<bool>;
}

/// The `notifications` table.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert an inbox entry.
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;

    /// Entries addressed to `user_id` plus broadcasts, newest first. `None`
    /// returns broadcasts only.
    async fn notifications_for(&self, user_id: Option<UserId>) -> StoreResult<Vec<Notification>>;

    /// Set `read` on one entry.
    async fn mark_read(&self, id: NotificationId) -> StoreResult<()>;

    /// Set `read` on every entry addressed to `user_id`. Returns how many
    /// changed.
    async fn mark_all_read(&self, user_id: UserId) -> StoreResult<usize>;
}
