//! Ticket issuance.
//!
//! Builds a [`DigitalTicket`] from freshly generated codes and, for signed-in
//! holders, writes it to the store. Guest tickets are never written; they are
//! returned to the caller as ephemeral records under the guest's `anon-…` id.

use crate::backend::{StoreError, TicketRepository};
use crate::codes::CodeGenerator;
use crate::notifications::{NotificationDraft, NotificationOutbox};
use crate::types::{
    Customer, DigitalTicket, EphemeralReason, Event, Holder, IssuedTicket, Persistence, TicketId, TicketType,
};
use boxoffice_core::environment::Clock;
use boxoffice_runtime::retry::{retry_with_predicate, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Issuance errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IssuanceError {
    /// Quantity outside `1..=available`
    #[error("Invalid quantity {requested}: {available} ticket(s) available")]
    InvalidQuantity {
        /// Tickets asked for
        requested: u32,
        /// Tickets available when the event was read
        available: u32,
    },

    /// The ticket could not be written and the policy is strict
    #[error("Failed to persist ticket: {0}")]
    PersistenceFailed(StoreError),
}

/// What to do when the ticket write fails after retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePolicy {
    /// Return the ticket as ephemeral
    #[default]
    Degrade,
    /// Fail the issuance
    Strict,
}

impl FromStr for PersistencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "degrade" => Ok(Self::Degrade),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown persistence policy: {other}")),
        }
    }
}

/// Everything needed to issue one ticket.
#[derive(Clone, Debug)]
pub struct IssueRequest {
    /// Event as read before the inventory claim
    pub event: Event,
    /// Contact details from checkout
    pub customer: Customer,
    /// Admission kind
    pub ticket_type: TicketType,
    /// Number of admissions
    pub quantity: u32,
    /// Who the ticket is issued to
    pub holder: Holder,
}

/// Issues tickets.
#[derive(Clone)]
pub struct TicketIssuer {
    tickets: Arc<dyn TicketRepository>,
    codes: Arc<CodeGenerator>,
    clock: Arc<dyn Clock>,
    outbox: NotificationOutbox,
    policy: PersistencePolicy,
    retry: RetryPolicy,
}

impl TicketIssuer {
    /// Issuer writing through `tickets`
    #[must_use]
    pub fn new(
        tickets: Arc<dyn TicketRepository>,
        codes: Arc<CodeGenerator>,
        clock: Arc<dyn Clock>,
        outbox: NotificationOutbox,
        policy: PersistencePolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            tickets,
            codes,
            clock,
            outbox,
            policy,
            retry,
        }
    }

    /// Active persistence policy
    #[must_use]
    pub const fn policy(&self) -> PersistencePolicy {
        self.policy
    }

    /// Issue a ticket.
    ///
    /// Signed-in holders get a persisted ticket and a "ticket purchased"
    /// notification. Guests get an ephemeral ticket and no notification.
    ///
    /// # Errors
    ///
    /// - [`IssuanceError::InvalidQuantity`] outside `1..=available`
    /// - [`IssuanceError::PersistenceFailed`] when the write fails under
    ///   [`PersistencePolicy::Strict`]
    pub async fn issue(&self, request: IssueRequest) -> Result<IssuedTicket, IssuanceError> {
        let IssueRequest {
            event,
            customer,
            ticket_type,
            quantity,
            holder,
        } = request;

        if quantity == 0 || !event.has_capacity(quantity) {
            return Err(IssuanceError::InvalidQuantity {
                requested: quantity,
                available: event.available_tickets,
            });
        }

        let id = self.codes.new_ticket_id();
        let ticket = DigitalTicket {
            qr_code: self.codes.new_qr_payload(&id),
            barcode: self.codes.new_barcode(&id),
            access_code: self.codes.new_access_code(),
            id: TicketId::new(id),
            event_id: event.id,
            customer_id: holder.customer_id(),
            ticket_type,
            quantity,
            purchase_date: self.clock.now(),
            used: false,
        };

        let Holder::Authenticated { user_id } = holder else {
            tracing::info!(
                ticket_id = %ticket.id,
                event_id = %event.id,
                customer = %customer.name,
                "Issued ephemeral ticket to guest"
            );
            crate::metrics::record_ticket_issued(false);
            return Ok(IssuedTicket {
                ticket,
                persistence: Persistence::Ephemeral {
                    reason: EphemeralReason::AnonymousHolder,
                },
            });
        };

        let tickets = Arc::clone(&self.tickets);
        let write = retry_with_predicate(
            &self.retry,
            "insert_ticket",
            || {
                let tickets = Arc::clone(&tickets);
                let ticket = ticket.clone();
                async move { tickets.insert_ticket(&ticket).await }
            },
            StoreError::is_transient,
        )
        .await;

        let persistence = match write {
            Ok(()) => Persistence::Persisted,
            Err(error) if self.policy == PersistencePolicy::Degrade => {
                tracing::warn!(
                    ticket_id = %ticket.id,
                    %error,
                    "Ticket write failed, returning ephemeral ticket"
                );
                Persistence::Ephemeral {
                    reason: EphemeralReason::StoreUnavailable(error.to_string()),
                }
            },
            Err(error) => {
                tracing::error!(ticket_id = %ticket.id, %error, "Ticket write failed");
                return Err(IssuanceError::PersistenceFailed(error));
            },
        };

        tracing::info!(
            ticket_id = %ticket.id,
            event_id = %event.id,
            user_id = %user_id,
            quantity,
            persisted = matches!(persistence, Persistence::Persisted),
            "Ticket issued"
        );
        crate::metrics::record_ticket_issued(matches!(persistence, Persistence::Persisted));

        self.outbox.emit(NotificationDraft::ticket_issued(
            user_id,
            &ticket.id,
            &event.title,
            quantity,
        ));

        Ok(IssuedTicket { ticket, persistence })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::notifications::Notifier;
    use crate::seed;
    use crate::types::UserId;
    use boxoffice_testing::test_clock;
    use std::time::Duration;

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        issuer: TicketIssuer,
    }

    fn fixture(policy: PersistencePolicy) -> Fixture {
        let backend = Arc::new(InMemoryBackend::with_events(seed::events()));
        let clock: Arc<dyn Clock> = Arc::new(test_clock());
        let (outbox, _handle) = NotificationOutbox::spawn(Notifier::new(backend.clone(), clock.clone()), 16);
        let issuer = TicketIssuer::new(
            backend.clone(),
            Arc::new(CodeGenerator::new("https://verify.example.com").with_seed(1)),
            clock,
            outbox,
            policy,
            RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(1))
                .build(),
        );
        Fixture { backend, issuer }
    }

    fn request(holder: Holder, quantity: u32) -> IssueRequest {
        IssueRequest {
            event: seed::events().remove(0),
            customer: Customer {
                name: "Bikash".to_string(),
                email: "bikash@example.com".to_string(),
                phone: "9801234567".to_string(),
            },
            ticket_type: TicketType::Standard,
            quantity,
            holder,
        }
    }

    #[tokio::test]
    async fn authenticated_tickets_are_persisted() {
        let f = fixture(PersistencePolicy::Degrade);
        let user_id = UserId::new();

        let issued = f
            .issuer
            .issue(request(Holder::Authenticated { user_id }, 2))
            .await
            .unwrap();

        assert!(issued.is_persisted());
        assert_eq!(issued.ticket.customer_id, user_id.to_string());
        assert_eq!(issued.ticket.purchase_date, test_clock().now());
        assert!(!issued.ticket.used);
        assert!(issued.ticket.qr_code.ends_with(issued.ticket.id.as_str()));
        assert_eq!(f.backend.stored_tickets().await, vec![issued.ticket]);
    }

    #[tokio::test]
    async fn guests_get_ephemeral_tickets() {
        let f = fixture(PersistencePolicy::Strict);

        let issued = f.issuer.issue(request(Holder::anonymous(), 1)).await.unwrap();

        assert_eq!(
            issued.persistence,
            Persistence::Ephemeral {
                reason: EphemeralReason::AnonymousHolder
            }
        );
        assert!(issued.ticket.customer_id.starts_with("anon-"));
        assert!(f.backend.stored_tickets().await.is_empty());
    }

    #[tokio::test]
    async fn degrade_policy_returns_ephemeral_on_write_failure() {
        let f = fixture(PersistencePolicy::Degrade);
        f.backend.fail_ticket_writes(true);

        let issued = f
            .issuer
            .issue(request(Holder::Authenticated { user_id: UserId::new() }, 1))
            .await
            .unwrap();

        assert!(matches!(
            issued.persistence,
            Persistence::Ephemeral {
                reason: EphemeralReason::StoreUnavailable(_)
            }
        ));
    }

    #[tokio::test]
    async fn strict_policy_fails_on_write_failure() {
        let f = fixture(PersistencePolicy::Strict);
        f.backend.fail_ticket_writes(true);

        let result = f
            .issuer
            .issue(request(Holder::Authenticated { user_id: UserId::new() }, 1))
            .await;

        assert!(matches!(result, Err(IssuanceError::PersistenceFailed(_))));
    }

    #[tokio::test]
    async fn quantity_is_bounded() {
        let f = fixture(PersistencePolicy::Degrade);
        let mut oversized = request(Holder::anonymous(), 0);
        assert!(matches!(
            f.issuer.issue(oversized.clone()).await,
            Err(IssuanceError::InvalidQuantity { requested: 0, .. })
        ));

        oversized.quantity = oversized.event.available_tickets + 1;
        assert!(matches!(
            f.issuer.issue(oversized).await,
            Err(IssuanceError::InvalidQuantity { .. })
        ));
    }

    struct Rejecting {
        error: StoreError,
        attempts: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl TicketRepository for Rejecting {
        async fn insert_ticket(&self, _ticket: &DigitalTicket) -> crate::backend::StoreResult<()> {
            self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(self.error.clone())
        }

        async fn tickets_for_customer(&self, _customer_id: &str) -> crate::backend::StoreResult<Vec<DigitalTicket>> {
            Ok(Vec::new())
        }

        async fn fetch_ticket(&self, _id: &TicketId) -> crate::backend::StoreResult<Option<DigitalTicket>> {
            Ok(None)
        }

        async fn find_by_access_code(&self, _access_code: &str) -> crate::backend::StoreResult<Option<DigitalTicket>> {
            Ok(None)
        }

        async fn mark_used(&self, _id: &TicketId) -> crate::backend::StoreResult<bool> {
            Ok(false)
        }

        async fn update_ticket_type(&self, _id: &TicketId, _ticket_type: TicketType) -> crate::backend::StoreResult<bool> {
            Ok(false)
        }
    }

    async fn attempts_for(error: StoreError) -> u32 {
        let f = fixture(PersistencePolicy::Strict);
        let tickets = Arc::new(Rejecting {
            error,
            attempts: std::sync::atomic::AtomicU32::new(0),
        });
        let issuer = TicketIssuer {
            tickets: tickets.clone(),
            ..f.issuer
        };

        let result = issuer
            .issue(request(Holder::Authenticated { user_id: UserId::new() }, 1))
            .await;
        assert!(matches!(result, Err(IssuanceError::PersistenceFailed(_))));
        tickets.attempts.load(std::sync::atomic::Ordering::SeqCst)
    }

    #[tokio::test]
    async fn only_transient_write_failures_are_retried() {
        assert_eq!(attempts_for(StoreError::Unavailable("down".into())).await, 3);
        assert_eq!(attempts_for(StoreError::Unauthorized("row-level security".into())).await, 1);
        assert_eq!(
            attempts_for(StoreError::Api {
                status: 409,
                message: "duplicate key".into(),
            })
            .await,
            1
        );
    }

    #[test]
    fn policy_parses() {
        assert_eq!("STRICT".parse::<PersistencePolicy>(), Ok(PersistencePolicy::Strict));
        assert!("lenient".parse::<PersistencePolicy>().is_err());
    }
}
