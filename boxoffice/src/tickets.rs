//! Ticket retrieval, door validation and upgrades.

use crate::backend::{StoreError, TicketRepository};
use crate::catalog::EventCatalog;
use crate::codes::TICKET_ID_PREFIX;
use crate::notifications::{NotificationDraft, NotificationOutbox};
use crate::types::{DigitalTicket, EventId, Holder, Money, TicketId, TicketType};
use std::sync::Arc;
use thiserror::Error;

/// Ticket errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketError {
    /// No ticket for the id or access code
    #[error("Ticket not found: {0}")]
    NotFound(String),

    /// Second scan of the same ticket
    #[error("Ticket already used: {0}")]
    AlreadyUsed(TicketId),

    /// Ticket belongs to someone else
    #[error("Ticket {0} belongs to another holder")]
    NotOwner(TicketId),

    /// Upgrade to the type the ticket already has
    #[error("Ticket is already {0}")]
    SameType(TicketType),

    /// The ticket's event no longer exists
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Surcharge percentage over the event's base price, per ticket.
#[must_use]
pub const fn upgrade_surcharge_percent(ticket_type: TicketType) -> u32 {
    match ticket_type {
        TicketType::Standard | TicketType::EarlyBird => 0,
        TicketType::Vip => 50,
        TicketType::FanZone => 30,
    }
}

/// Surcharge for upgrading `quantity` admissions priced at `base_price`.
#[must_use]
pub fn upgrade_price(base_price: Money, ticket_type: TicketType, quantity: u32) -> Option<Money> {
    base_price
        .percent(upgrade_surcharge_percent(ticket_type))?
        .checked_mul(quantity)
}

/// Result of [`TicketLedger::upgrade`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeReceipt {
    /// The ticket with its new type
    pub ticket: DigitalTicket,
    /// Amount due for the upgrade
    pub surcharge: Money,
}

/// Read and update issued tickets.
#[derive(Clone)]
pub struct TicketLedger {
    tickets: Arc<dyn TicketRepository>,
    catalog: EventCatalog,
    outbox: NotificationOutbox,
}

impl TicketLedger {
    /// Ledger over `tickets`
    #[must_use]
    pub fn new(tickets: Arc<dyn TicketRepository>, catalog: EventCatalog, outbox: NotificationOutbox) -> Self {
        Self {
            tickets,
            catalog,
            outbox,
        }
    }

    /// All persisted tickets of `holder`, newest first. Guests always get an
    /// empty list, and so does everyone while the store is unreachable.
    pub async fn list_for_holder(&self, holder: &Holder) -> Vec<DigitalTicket> {
        let Holder::Authenticated { user_id } = holder else {
            return Vec::new();
        };

        match self.tickets.tickets_for_customer(&user_id.to_string()).await {
            Ok(tickets) => tickets,
            Err(error) => {
                tracing::warn!(user_id = %user_id, %error, "Failed to load tickets");
                Vec::new()
            },
        }
    }

    /// One ticket by id.
    ///
    /// # Errors
    ///
    /// Returns [`TicketError::Store`] when the store fails.
    pub async fn find(&self, id: &TicketId) -> Result<Option<DigitalTicket>, TicketError> {
        Ok(self.tickets.fetch_ticket(id).await?)
    }

    /// Admit a ticket at the door by ticket id or 6-digit access code.
    ///
    /// # Errors
    ///
    /// - [`TicketError::NotFound`] for unknown codes
    /// - [`TicketError::AlreadyUsed`] on every scan after the first
    pub async fn validate(&self, code: &str) -> Result<DigitalTicket, TicketError> {
        let code = code.trim();
        let found = if code.starts_with(TICKET_ID_PREFIX) {
            self.tickets.fetch_ticket(&TicketId::new(code)).await?
        } else {
            self.tickets.find_by_access_code(code).await?
        };
        let mut ticket = found.ok_or_else(|| TicketError::NotFound(code.to_string()))?;

        if !self.tickets.mark_used(&ticket.id).await? {
            tracing::warn!(ticket_id = %ticket.id, "Rejected second scan");
            return Err(TicketError::AlreadyUsed(ticket.id));
        }

        ticket.used = true;
        tracing::info!(ticket_id = %ticket.id, event_id = %ticket.event_id, "Ticket admitted");
        Ok(ticket)
    }

    /// Change a ticket's type and quote the surcharge. Nothing else on the
    /// ticket changes.
    ///
    /// # Errors
    ///
    /// - [`TicketError::NotFound`] / [`TicketError::NotOwner`]
    /// - [`TicketError::AlreadyUsed`] for scanned tickets
    /// - [`TicketError::SameType`] when nothing would change
    /// - [`TicketError::EventNotFound`] when the event is gone
    pub async fn upgrade(
        &self,
        holder: &Holder,
        ticket_id: &TicketId,
        ticket_type: TicketType,
    ) -> Result<UpgradeReceipt, TicketError> {
        let mut ticket = self
            .tickets
            .fetch_ticket(ticket_id)
            .await?
            .ok_or_else(|| TicketError::NotFound(ticket_id.to_string()))?;

        if ticket.customer_id != holder.customer_id() {
            return Err(TicketError::NotOwner(ticket.id));
        }
        if ticket.used {
            return Err(TicketError::AlreadyUsed(ticket.id));
        }
        if ticket.ticket_type == ticket_type {
            return Err(TicketError::SameType(ticket_type));
        }

        let event = self
            .catalog
            .get_event(ticket.event_id)
            .await
            .value
            .ok_or(TicketError::EventNotFound(ticket.event_id))?;
        let surcharge = upgrade_price(event.price, ticket_type, ticket.quantity).unwrap_or(Money::ZERO);

        if !self.tickets.update_ticket_type(&ticket.id, ticket_type).await? {
            tracing::warn!(ticket_id = %ticket.id, "Ticket scanned before upgrade landed");
            return Err(TicketError::AlreadyUsed(ticket.id));
        }
        ticket.ticket_type = ticket_type;

        tracing::info!(
            ticket_id = %ticket.id,
            ticket_type = %ticket_type,
            surcharge = surcharge.minor_units(),
            "Ticket upgraded"
        );
        if let Some(user_id) = holder.user_id() {
            self.outbox
                .emit(NotificationDraft::ticket_upgraded(user_id, &ticket.id, ticket_type));
        }

        Ok(UpgradeReceipt { ticket, surcharge })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surcharge_table() {
        let base = Money::from_minor(200_000);
        assert_eq!(upgrade_price(base, TicketType::Standard, 2), Some(Money::ZERO));
        assert_eq!(upgrade_price(base, TicketType::EarlyBird, 2), Some(Money::ZERO));
        assert_eq!(upgrade_price(base, TicketType::Vip, 2), Some(Money::from_minor(200_000)));
        assert_eq!(upgrade_price(base, TicketType::FanZone, 1), Some(Money::from_minor(60_000)));
    }
}
