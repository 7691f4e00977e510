//! Business metrics for the box office.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_checkouts_total{status}` - Checkouts by outcome
//! - `boxoffice_tickets_issued_total{persistence}` - Tickets by `persisted` / `ephemeral`
//! - `boxoffice_payments_total{status}` - Payments by `approved` / `declined` / `refunded`
//! - `boxoffice_notifications_total{status}` - Inbox writes by `delivered` / `failed` / `dropped`
//!
//! ## Histograms
//! - `boxoffice_checkout_duration_seconds` - Wall time of a checkout request

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Register metric descriptions. Call once at startup, before recording.
pub fn register_business_metrics() {
    describe_counter!(
        "boxoffice_checkouts_total",
        "Total number of checkouts by status (completed, out_of_stock, payment_failed, ...)"
    );
    describe_histogram!(
        "boxoffice_checkout_duration_seconds",
        "Time taken from checkout request to receipt or failure"
    );

    describe_counter!(
        "boxoffice_tickets_issued_total",
        "Total number of tickets issued by persistence (persisted, ephemeral)"
    );

    describe_counter!(
        "boxoffice_payments_total",
        "Total number of payments by status (approved, declined, refunded)"
    );

    describe_counter!(
        "boxoffice_notifications_total",
        "Total number of inbox notifications by status (delivered, failed, dropped)"
    );

    tracing::info!("Business metrics registered");
}

/// Record a finished checkout.
pub fn record_checkout(status: &'static str, elapsed: Duration) {
    counter!("boxoffice_checkouts_total", "status" => status).increment(1);
    histogram!("boxoffice_checkout_duration_seconds").record(elapsed.as_secs_f64());
}

/// Record an issued ticket.
pub fn record_ticket_issued(persisted: bool) {
    let persistence = if persisted { "persisted" } else { "ephemeral" };
    counter!("boxoffice_tickets_issued_total", "persistence" => persistence).increment(1);
}

/// Record a payment attempt.
pub fn record_payment(approved: bool) {
    let status = if approved { "approved" } else { "declined" };
    counter!("boxoffice_payments_total", "status" => status).increment(1);
}

/// Record a compensating refund.
pub fn record_refund() {
    counter!("boxoffice_payments_total", "status" => "refunded").increment(1);
}

/// Record the fate of a notification.
pub fn record_notification(status: &'static str) {
    counter!("boxoffice_notifications_total", "status" => status).increment(1);
}
