use super::{CheckoutError, CheckoutRequest};
use crate::catalog::{CatalogError, EventCatalog};
use crate::issuance::{IssuanceError, IssueRequest, TicketIssuer};
use crate::notifications::{NotificationDraft, NotificationOutbox};
use crate::payment_gateway::{PaymentGateway, PaymentOutcome};
use crate::types::{CheckoutId, Event, Holder, IssuedTicket, Money};
use boxoffice_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, DateTime, SmallVec, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

// ============================================================================
// Actions
// ============================================================================

/// Inputs of the checkout saga: the initial command and the results of each
/// step's effect.
#[derive(Clone, Debug)]
pub enum CheckoutAction {
    /// Begin a checkout
    Start {
        /// Correlation id
        checkout_id: CheckoutId,
        /// The request
        request: CheckoutRequest,
        /// Who the ticket goes to
        holder: Holder,
    },

    /// The event was read
    EventLoaded {
        /// Correlation id
        checkout_id: CheckoutId,
        /// `None` when the event does not exist
        event: Option<Event>,
        /// Served from seed data
        degraded: bool,
    },

    /// Inventory was decremented
    InventoryClaimed {
        /// Correlation id
        checkout_id: CheckoutId,
        /// Tickets left after the claim
        remaining: u32,
    },

    /// Payment finished, approved or declined
    PaymentSettled {
        /// Correlation id
        checkout_id: CheckoutId,
        /// Provider result
        outcome: PaymentOutcome,
    },

    /// Issuance failed after payment; compensation follows
    IssuanceFailed {
        /// Correlation id
        checkout_id: CheckoutId,
        /// What went wrong
        error: IssuanceError,
    },

    /// Terminal: the ticket was issued
    TicketIssued {
        /// Correlation id
        checkout_id: CheckoutId,
        /// The ticket
        issued: IssuedTicket,
        /// Amount charged
        amount: Money,
        /// Payment transaction
        transaction_id: Option<String>,
    },

    /// Terminal: the checkout failed (after any compensation)
    CheckoutFailed {
        /// Correlation id
        checkout_id: CheckoutId,
        /// Why
        error: CheckoutError,
    },
}

impl CheckoutAction {
    /// Correlation id of the action
    #[must_use]
    pub const fn checkout_id(&self) -> CheckoutId {
        match self {
            Self::Start { checkout_id, .. }
            | Self::EventLoaded { checkout_id, .. }
            | Self::InventoryClaimed { checkout_id, .. }
            | Self::PaymentSettled { checkout_id, .. }
            | Self::IssuanceFailed { checkout_id, .. }
            | Self::TicketIssued { checkout_id, .. }
            | Self::CheckoutFailed { checkout_id, .. } => *checkout_id,
        }
    }

    /// Whether this action ends the checkout `id`
    #[must_use]
    pub fn is_terminal_for(&self, id: CheckoutId) -> bool {
        matches!(self, Self::TicketIssued { .. } | Self::CheckoutFailed { .. }) && self.checkout_id() == id
    }
}

// ============================================================================
// State
// ============================================================================

/// Where an in-flight checkout is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckoutStep {
    /// Reading the event
    LoadingEvent,
    /// Claiming inventory
    ClaimingInventory,
    /// Waiting for the payment provider
    AwaitingPayment,
    /// Issuing the ticket
    Issuing,
    /// Releasing inventory and refunding
    Compensating,
}

/// An in-flight checkout
#[derive(Clone, Debug)]
pub struct CheckoutRecord {
    /// The request
    pub request: CheckoutRequest,
    /// Who the ticket goes to
    pub holder: Holder,
    /// Current step
    pub step: CheckoutStep,
    /// Event as read in step 2
    pub event: Option<Event>,
    /// Total price
    pub amount: Money,
    /// Set once payment is approved
    pub transaction_id: Option<String>,
    /// When the checkout started
    pub started_at: DateTime<Utc>,
}

/// Outcome of a finished checkout
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Ticket issued
    Completed,
    /// Failed with this error
    Failed(CheckoutError),
}

/// State of the checkout reducer.
///
/// Finished checkouts are moved out of `in_flight` into a bounded history.
#[derive(Clone, Debug, Default)]
pub struct CheckoutState {
    /// Checkouts that have not reached a terminal action
    pub in_flight: HashMap<CheckoutId, CheckoutRecord>,
    /// Most recent outcomes, oldest first
    pub finished: VecDeque<(CheckoutId, CheckoutOutcome)>,
}

impl CheckoutState {
    /// How many finished checkouts are remembered
    pub const HISTORY_LIMIT: usize = 256;

    /// Outcome of a finished checkout, if still remembered
    #[must_use]
    pub fn outcome(&self, id: CheckoutId) -> Option<&CheckoutOutcome> {
        self.finished.iter().rev().find(|(finished, _)| *finished == id).map(|(_, outcome)| outcome)
    }

    fn finish(&mut self, id: CheckoutId, outcome: CheckoutOutcome) {
        self.in_flight.remove(&id);
        if self.finished.len() == Self::HISTORY_LIMIT {
            self.finished.pop_front();
        }
        self.finished.push_back((id, outcome));
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the checkout saga
#[derive(Clone)]
pub struct CheckoutEnvironment {
    /// Event lookup and inventory
    pub catalog: EventCatalog,
    /// Payment provider
    pub payments: Arc<dyn PaymentGateway>,
    /// Ticket issuance
    pub issuer: TicketIssuer,
    /// Notification queue
    pub outbox: NotificationOutbox,
    /// Clock for timestamps
    pub clock: Arc<dyn Clock>,
    /// Largest quantity per checkout
    pub quantity_cap: u32,
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the checkout saga
#[derive(Clone, Debug, Default)]
pub struct CheckoutReducer;

impl CheckoutReducer {
    /// Creates a new `CheckoutReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate(request: &CheckoutRequest, quantity_cap: u32) -> Result<(), CheckoutError> {
        request.customer.validate().map_err(CheckoutError::InvalidCustomer)?;
        if request.quantity == 0 || request.quantity > quantity_cap {
            return Err(CheckoutError::InvalidQuantity {
                requested: request.quantity,
                max: quantity_cap,
            });
        }
        if !request.ticket_type.is_offered_at_checkout() {
            return Err(CheckoutError::UnsupportedTicketType(request.ticket_type));
        }
        Ok(())
    }

    fn fail(checkout_id: CheckoutId, error: CheckoutError) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        smallvec![Effect::send(CheckoutAction::CheckoutFailed { checkout_id, error })]
    }

    fn claim_error(error: CatalogError) -> CheckoutError {
        match error {
            CatalogError::OutOfStock { requested, available } => CheckoutError::OutOfStock { requested, available },
            CatalogError::EventNotFound(id) => CheckoutError::EventNotFound(id),
            CatalogError::Store(error) => CheckoutError::InventoryUnavailable(error.to_string()),
            other => CheckoutError::Runtime(other.to_string()),
        }
    }

    /// Release the claim, refund if charged, then fail with `error`.
    fn compensate(
        checkout_id: CheckoutId,
        record: &CheckoutRecord,
        error: CheckoutError,
        env: &CheckoutEnvironment,
    ) -> Effect<CheckoutAction> {
        let catalog = env.catalog.clone();
        let payments = Arc::clone(&env.payments);
        let event_id = record.request.event_id;
        let quantity = record.request.quantity;
        let amount = record.amount;
        let transaction_id = record.transaction_id.clone();

        Effect::future(async move {
            if let Err(release_error) = catalog.release(event_id, quantity).await {
                tracing::error!(
                    checkout_id = %checkout_id,
                    event_id = %event_id,
                    quantity,
                    error = %release_error,
                    "Failed to release inventory during compensation"
                );
            }

            if let Some(transaction_id) = transaction_id {
                match payments.refund_payment(&transaction_id, amount).await {
                    Ok(refund_id) => {
                        crate::metrics::record_refund();
                        tracing::info!(checkout_id = %checkout_id, refund_id = %refund_id, "Payment refunded");
                    },
                    Err(refund_error) => {
                        tracing::error!(
                            checkout_id = %checkout_id,
                            transaction_id = %transaction_id,
                            error = %refund_error,
                            "Refund failed during compensation"
                        );
                    },
                }
            }

            Some(CheckoutAction::CheckoutFailed { checkout_id, error })
        })
    }
}

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Step 1: Validate ==========
            CheckoutAction::Start {
                checkout_id,
                request,
                holder,
            } => {
                if state.in_flight.contains_key(&checkout_id) {
                    tracing::warn!(checkout_id = %checkout_id, "Ignoring duplicate checkout start");
                    return SmallVec::new();
                }
                if let Err(error) = Self::validate(&request, env.quantity_cap) {
                    tracing::info!(checkout_id = %checkout_id, %error, "Checkout rejected");
                    return Self::fail(checkout_id, error);
                }

                tracing::info!(
                    checkout_id = %checkout_id,
                    event_id = %request.event_id,
                    quantity = request.quantity,
                    ticket_type = %request.ticket_type,
                    "Checkout started"
                );

                let event_id = request.event_id;
                state.in_flight.insert(
                    checkout_id,
                    CheckoutRecord {
                        request,
                        holder,
                        step: CheckoutStep::LoadingEvent,
                        event: None,
                        amount: Money::ZERO,
                        transaction_id: None,
                        started_at: env.clock.now(),
                    },
                );

                // ========== Step 2: Load event ==========
                let catalog = env.catalog.clone();
                smallvec![Effect::future(async move {
                    let lookup = catalog.get_event(event_id).await;
                    Some(CheckoutAction::EventLoaded {
                        checkout_id,
                        event: lookup.value,
                        degraded: lookup.degraded,
                    })
                })]
            },

            CheckoutAction::EventLoaded {
                checkout_id,
                event,
                degraded,
            } => {
                let Some(record) = state.in_flight.get_mut(&checkout_id) else {
                    return SmallVec::new();
                };
                let Some(event) = event else {
                    return Self::fail(checkout_id, CheckoutError::EventNotFound(record.request.event_id));
                };

                let quantity = record.request.quantity;
                if !event.has_capacity(quantity) {
                    return Self::fail(
                        checkout_id,
                        CheckoutError::OutOfStock {
                            requested: quantity,
                            available: event.available_tickets,
                        },
                    );
                }
                let Some(amount) = event.price.checked_mul(quantity) else {
                    return Self::fail(
                        checkout_id,
                        CheckoutError::InvalidQuantity {
                            requested: quantity,
                            max: env.quantity_cap,
                        },
                    );
                };
                if degraded {
                    tracing::warn!(checkout_id = %checkout_id, event_id = %event.id, "Checkout using seed event data");
                }

                record.amount = amount;
                record.event = Some(event);
                record.step = CheckoutStep::ClaimingInventory;

                // ========== Step 3: Claim inventory ==========
                let catalog = env.catalog.clone();
                let event_id = record.request.event_id;
                smallvec![Effect::future(async move {
                    Some(match catalog.claim(event_id, quantity).await {
                        Ok(remaining) => CheckoutAction::InventoryClaimed { checkout_id, remaining },
                        Err(error) => CheckoutAction::CheckoutFailed {
                            checkout_id,
                            error: Self::claim_error(error),
                        },
                    })
                })]
            },

            // ========== Step 4: Pay ==========
            CheckoutAction::InventoryClaimed { checkout_id, remaining } => {
                let Some(record) = state.in_flight.get_mut(&checkout_id) else {
                    return SmallVec::new();
                };
                record.step = CheckoutStep::AwaitingPayment;
                tracing::debug!(checkout_id = %checkout_id, remaining, "Requesting payment");

                let payment = env.payments.process_payment(
                    record.amount,
                    record.request.payment.clone(),
                    record.holder.customer_id(),
                );
                smallvec![Effect::future(async move {
                    let outcome = payment.await;
                    Some(CheckoutAction::PaymentSettled { checkout_id, outcome })
                })]
            },

            CheckoutAction::PaymentSettled { checkout_id, outcome } => {
                let Some(record) = state.in_flight.get_mut(&checkout_id) else {
                    return SmallVec::new();
                };

                if !outcome.success {
                    record.step = CheckoutStep::Compensating;
                    if let (Some(user_id), Some(event)) = (record.holder.user_id(), record.event.as_ref()) {
                        env.outbox
                            .emit(NotificationDraft::payment_failed(user_id, &event.title, &outcome.message));
                    }
                    let error = CheckoutError::PaymentFailed(outcome.message);
                    return smallvec![Self::compensate(checkout_id, record, error, env)];
                }

                let Some(event) = record.event.clone() else {
                    return Self::fail(checkout_id, CheckoutError::Runtime("event missing after payment".to_string()));
                };
                record.transaction_id = outcome.transaction_id;
                record.step = CheckoutStep::Issuing;

                // ========== Step 5: Issue ==========
                let issuer = env.issuer.clone();
                let amount = record.amount;
                let transaction_id = record.transaction_id.clone();
                let request = IssueRequest {
                    event,
                    customer: record.request.customer.clone(),
                    ticket_type: record.request.ticket_type,
                    quantity: record.request.quantity,
                    holder: record.holder.clone(),
                };
                smallvec![Effect::future(async move {
                    Some(match issuer.issue(request).await {
                        Ok(issued) => CheckoutAction::TicketIssued {
                            checkout_id,
                            issued,
                            amount,
                            transaction_id,
                        },
                        Err(error) => CheckoutAction::IssuanceFailed { checkout_id, error },
                    })
                })]
            },

            CheckoutAction::IssuanceFailed { checkout_id, error } => {
                let Some(record) = state.in_flight.get_mut(&checkout_id) else {
                    return SmallVec::new();
                };
                record.step = CheckoutStep::Compensating;

                let error = match error {
                    IssuanceError::PersistenceFailed(store_error) => {
                        CheckoutError::PersistenceFailed(store_error.to_string())
                    },
                    IssuanceError::InvalidQuantity { requested, .. } => CheckoutError::InvalidQuantity {
                        requested,
                        max: env.quantity_cap,
                    },
                };
                smallvec![Self::compensate(checkout_id, record, error, env)]
            },

            // ========== Terminal ==========
            CheckoutAction::TicketIssued {
                checkout_id, issued, ..
            } => {
                if let Some(record) = state.in_flight.get(&checkout_id) {
                    let elapsed = env.clock.now() - record.started_at;
                    tracing::info!(
                        checkout_id = %checkout_id,
                        ticket_id = %issued.ticket.id,
                        persisted = issued.is_persisted(),
                        elapsed_ms = elapsed.num_milliseconds(),
                        "Checkout completed"
                    );
                }
                state.finish(checkout_id, CheckoutOutcome::Completed);
                SmallVec::new()
            },

            CheckoutAction::CheckoutFailed { checkout_id, error } => {
                tracing::info!(checkout_id = %checkout_id, %error, "Checkout failed");
                state.finish(checkout_id, CheckoutOutcome::Failed(error));
                SmallVec::new()
            },
        }
    }
}
