//! Event catalog and inventory.
//!
//! Reads go to the hosted store first and fall back to the [`seed`] list
//! when the store cannot be read; the returned [`Lookup`] says which one
//! answered. Inventory changes never use seed data: a claim is an atomic
//! conditional decrement in the store, retried with backoff when it loses a
//! race.
//!
//! [`seed`]: crate::seed

use crate::backend::{EventRepository, StoreError};
use crate::seed;
use crate::session::Session;
use crate::types::{Category, Event, EventId, Lookup, NewEvent};
use boxoffice_runtime::retry::{retry_with_predicate, RetryPolicy};
use std::sync::Arc;
use thiserror::Error;

/// Catalog errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No such event
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Fewer tickets left than requested
    #[error("Only {available} ticket(s) left, {requested} requested")]
    OutOfStock {
        /// Tickets asked for
        requested: u32,
        /// Tickets left
        available: u32,
    },

    /// The session's role does not allow the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// New event rejected
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Store failure after retries
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Filters for [`EventCatalog::search`]. Empty fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventQuery {
    /// Case-insensitive match on title, descriptions and location
    pub text: Option<String>,
    /// Exact category
    pub category: Option<Category>,
    /// Featured events only
    pub featured_only: bool,
    /// Case-insensitive exact tag
    pub tag: Option<String>,
}

impl EventQuery {
    /// Match everything
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Free-text filter
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Category filter
    #[must_use]
    pub const fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Featured-only filter
    #[must_use]
    pub const fn featured(mut self) -> Self {
        self.featured_only = true;
        self
    }

    /// Tag filter
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Whether `event` passes every filter
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if self.featured_only && !event.featured {
            return false;
        }
        if self.category.is_some_and(|c| c != event.category) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !event.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.trim().to_lowercase();
            if !needle.is_empty() {
                let haystack = [
                    event.title.as_str(),
                    event.short_description.as_str(),
                    event.description.as_str(),
                    event.location.as_str(),
                ];
                if !haystack.iter().any(|field| field.to_lowercase().contains(&needle)) {
                    return false;
                }
            }
        }
        true
    }
}

/// Event lookup, discovery and inventory.
#[derive(Clone)]
pub struct EventCatalog {
    events: Arc<dyn EventRepository>,
    retry: RetryPolicy,
}

impl EventCatalog {
    /// Catalog over `events`, retrying inventory writes with `retry`
    #[must_use]
    pub fn new(events: Arc<dyn EventRepository>, retry: RetryPolicy) -> Self {
        Self { events, retry }
    }

    /// Read one event. A miss is `value: None`, not an error.
    pub async fn get_event(&self, id: EventId) -> Lookup<Option<Event>> {
        match self.events.fetch_event(id).await {
            Ok(event) => Lookup::fresh(event),
            Err(error) => {
                tracing::warn!(event_id = %id, %error, "Event read failed, using seed data");
                Lookup::fallback(seed::find(id))
            },
        }
    }

    /// Events matching `query`, soonest first.
    pub async fn search(&self, query: &EventQuery) -> Lookup<Vec<Event>> {
        let all = match self.events.list_events().await {
            Ok(events) => Lookup::fresh(events),
            Err(error) => {
                tracing::warn!(%error, "Event listing failed, using seed data");
                Lookup::fallback(seed::events())
            },
        };
        all.map(|events| events.into_iter().filter(|e| query.matches(e)).collect())
    }

    /// Featured events
    pub async fn featured(&self) -> Lookup<Vec<Event>> {
        self.search(&EventQuery::all().featured()).await
    }

    /// Atomically take `quantity` tickets. Returns the remaining count.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::OutOfStock`] when too few are left
    /// - [`CatalogError::EventNotFound`] for unknown events
    /// - [`CatalogError::Store`] when the store stays unavailable
    pub async fn claim(&self, event_id: EventId, quantity: u32) -> Result<u32, CatalogError> {
        let events = Arc::clone(&self.events);
        let result = retry_with_predicate(
            &self.retry,
            "claim_tickets",
            || {
                let events = Arc::clone(&events);
                async move { events.claim_tickets(event_id, quantity).await }
            },
            StoreError::is_transient,
        )
        .await;

        match result {
            Ok(remaining) => {
                tracing::info!(event_id = %event_id, quantity, remaining, "Inventory claimed");
                Ok(remaining)
            },
            Err(StoreError::InsufficientInventory { requested, available }) => {
                tracing::info!(event_id = %event_id, requested, available, "Inventory claim rejected");
                Err(CatalogError::OutOfStock { requested, available })
            },
            Err(StoreError::NotFound(_)) => Err(CatalogError::EventNotFound(event_id)),
            Err(error) => Err(CatalogError::Store(error)),
        }
    }

    /// Give back `quantity` previously claimed tickets.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the store stays unavailable or the
    /// event has been deleted.
    pub async fn release(&self, event_id: EventId, quantity: u32) -> Result<u32, CatalogError> {
        let events = Arc::clone(&self.events);
        let result = retry_with_predicate(
            &self.retry,
            "release_tickets",
            || {
                let events = Arc::clone(&events);
                async move { events.release_tickets(event_id, quantity).await }
            },
            StoreError::is_transient,
        )
        .await;

        match result {
            Ok(available) => {
                tracing::info!(event_id = %event_id, quantity, available, "Inventory released");
                Ok(available)
            },
            Err(StoreError::NotFound(_)) => Err(CatalogError::EventNotFound(event_id)),
            Err(error) => {
                tracing::error!(event_id = %event_id, quantity, %error, "Inventory release failed");
                Err(CatalogError::Store(error))
            },
        }
    }

    /// List a new event. Organizers and admins only.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Forbidden`] for guests and plain users
    /// - [`CatalogError::InvalidEvent`] for an empty title or zero capacity
    /// - [`CatalogError::Store`] when the insert fails
    pub async fn create_event(&self, session: &Session, new_event: NewEvent) -> Result<Event, CatalogError> {
        let Some(user) = session.user.as_ref().filter(|u| u.role.can_create_events()) else {
            return Err(CatalogError::Forbidden("only organizers can create events".to_string()));
        };
        if new_event.title.trim().is_empty() {
            return Err(CatalogError::InvalidEvent("title is required".to_string()));
        }
        if new_event.total_tickets == 0 {
            return Err(CatalogError::InvalidEvent("capacity must be at least one".to_string()));
        }

        let event = Event {
            id: EventId::new(),
            title: new_event.title,
            description: new_event.description,
            short_description: new_event.short_description,
            date: new_event.date,
            time: new_event.time,
            location: new_event.location,
            price: new_event.price,
            category: new_event.category,
            image_url: new_event.image_url,
            tags: new_event.tags,
            featured: new_event.featured,
            organizer_id: Some(user.id),
            total_tickets: new_event.total_tickets,
            available_tickets: new_event.total_tickets,
        };

        self.events.insert_event(&event).await?;
        tracing::info!(event_id = %event.id, organizer_id = %user.id, "Event created");
        Ok(event)
    }

    /// Remove an event. Admins only.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Forbidden`] for non-admins
    /// - [`CatalogError::EventNotFound`] when nothing was deleted
    /// - [`CatalogError::Store`] when the delete fails
    pub async fn delete_event(&self, session: &Session, id: EventId) -> Result<(), CatalogError> {
        if !session.role().is_some_and(|role| role.can_delete_events()) {
            return Err(CatalogError::Forbidden("only admins can delete events".to_string()));
        }
        if !self.events.delete_event(id).await? {
            return Err(CatalogError::EventNotFound(id));
        }
        tracing::info!(event_id = %id, "Event deleted");
        Ok(())
    }
}
