//! Checkout saga.
//!
//! One checkout runs these steps in order, each as an effect whose result is
//! fed back into [`CheckoutReducer`]:
//!
//! 1. Validate the request (customer, quantity cap, ticket type)
//! 2. Load the event (seed fallback allowed) and check availability
//! 3. Claim inventory with an atomic conditional decrement
//! 4. Charge the payment method
//! 5. Issue the ticket and notify the holder
//!
//! Compensation: a declined payment releases the claimed inventory; a
//! failed ticket write under the strict persistence policy releases the
//! inventory and refunds the payment.
//!
//! [`CheckoutService`] wraps the reducer in a Store and turns a request into
//! a [`CheckoutReceipt`] or a [`CheckoutError`].

use crate::payment_gateway::PaymentDetails;
use crate::types::{CheckoutId, Customer, DigitalTicket, EventId, Money, Persistence, TicketType};
use thiserror::Error;

mod reducer;
mod service;

pub use reducer::{
    CheckoutAction, CheckoutEnvironment, CheckoutOutcome, CheckoutRecord, CheckoutReducer, CheckoutState, CheckoutStep,
};
pub use service::CheckoutService;

/// What the buyer submits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Event to buy tickets for
    pub event_id: EventId,
    /// Contact details
    pub customer: Customer,
    /// Payment method and details
    pub payment: PaymentDetails,
    /// Number of admissions
    pub quantity: u32,
    /// Admission kind
    pub ticket_type: TicketType,
}

/// A completed checkout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutReceipt {
    /// Checkout correlation id
    pub checkout_id: CheckoutId,
    /// The issued ticket
    pub ticket: DigitalTicket,
    /// Whether the ticket reached the store
    pub persistence: Persistence,
    /// Amount charged
    pub amount: Money,
    /// Payment transaction
    pub transaction_id: Option<String>,
}

impl CheckoutReceipt {
    /// `true` when the ticket was written to the store
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        matches!(self.persistence, Persistence::Persisted)
    }
}

/// Why a checkout did not produce a ticket.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckoutError {
    // ========== Rejected before payment ==========
    /// Contact details unusable
    #[error("Invalid customer details: {0}")]
    InvalidCustomer(String),

    /// Quantity outside `1..=max`
    #[error("Invalid quantity {requested}: must be between 1 and {max}")]
    InvalidQuantity {
        /// Tickets asked for
        requested: u32,
        /// Largest allowed quantity
        max: u32,
    },

    /// Ticket type cannot be bought directly
    #[error("Ticket type {0} is not sold at checkout")]
    UnsupportedTicketType(TicketType),

    /// Event does not exist
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Not enough tickets left
    #[error("Only {available} ticket(s) left, {requested} requested")]
    OutOfStock {
        /// Tickets asked for
        requested: u32,
        /// Tickets left
        available: u32,
    },

    /// Inventory could not be claimed because the store is unavailable
    #[error("Inventory unavailable: {0}")]
    InventoryUnavailable(String),

    // ========== After payment started ==========
    /// Payment declined; the message is the provider's, verbatim
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// Ticket write failed under the strict policy; payment refunded
    #[error("Ticket could not be saved: {0}")]
    PersistenceFailed(String),

    // ========== Runtime ==========
    /// The Store timed out or shut down
    #[error("Checkout runtime error: {0}")]
    Runtime(String),
}

impl CheckoutError {
    /// Label used for the `status` metric dimension.
    #[must_use]
    pub const fn status_label(&self) -> &'static str {
        match self {
            Self::InvalidCustomer(_) | Self::InvalidQuantity { .. } | Self::UnsupportedTicketType(_) => "rejected",
            Self::EventNotFound(_) => "event_not_found",
            Self::OutOfStock { .. } => "out_of_stock",
            Self::InventoryUnavailable(_) => "inventory_unavailable",
            Self::PaymentFailed(_) => "payment_failed",
            Self::PersistenceFailed(_) => "persistence_failed",
            Self::Runtime(_) => "runtime_error",
        }
    }
}
