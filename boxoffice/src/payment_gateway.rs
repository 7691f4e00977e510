//! Simulated payment providers.
//!
//! No real gateway is contacted. [`PaymentSimulator`] waits a short random
//! delay and then approves, either unconditionally
//! ([`PaymentMode::AlwaysApprove`], the demo behavior) or after checking the
//! payment details ([`PaymentMode::Validate`]).
//!
//! There is no idempotency key: submitting the same checkout twice charges
//! twice.

use crate::types::Money;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, PaymentError>;

/// Boxed future returned by [`PaymentGateway`] methods
pub type GatewayFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Failures that are not a decline (declines are a [`PaymentOutcome`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// Refund for an unknown transaction
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),
}

/// Method-specific payment details.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentDetails {
    /// Credit or debit card
    Card {
        /// Card number, spaces allowed
        number: String,
        /// Name on the card
        holder: String,
        /// `MM/YY`
        expiry: String,
        /// Security code
        cvv: String,
    },
    /// `eSewa` wallet
    Esewa {
        /// Wallet phone number
        phone: String,
    },
    /// Khalti wallet
    Khalti {
        /// Wallet phone number
        phone: String,
    },
    /// `connectIPS` interbank transfer
    #[serde(rename = "CONNECTIPS")]
    ConnectIps {
        /// Bank code
        bank_code: String,
        /// Account number
        account: String,
    },
    /// Fonepay interbank transfer
    Fonepay {
        /// Bank code
        bank_code: String,
        /// Account number
        account: String,
    },
}

impl PaymentDetails {
    /// Provider tag (`CARD`, `ESEWA`, ...)
    #[must_use]
    pub const fn method_name(&self) -> &'static str {
        match self {
            Self::Card { .. } => "CARD",
            Self::Esewa { .. } => "ESEWA",
            Self::Khalti { .. } => "KHALTI",
            Self::ConnectIps { .. } => "CONNECTIPS",
            Self::Fonepay { .. } => "FONEPAY",
        }
    }

    /// Check the details the way a real provider would reject them.
    ///
    /// # Errors
    ///
    /// Returns the decline message.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Card { number, .. } => {
                let digits: String = number.chars().filter(|c| !c.is_whitespace()).collect();
                if !(13..=19).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err("Card number must be 13 to 19 digits".to_string());
                }
                if !luhn_valid(&digits) {
                    return Err("Card number failed checksum".to_string());
                }
                Ok(())
            },
            Self::Esewa { phone } | Self::Khalti { phone } => {
                let digits = phone.chars().filter(char::is_ascii_digit).count();
                if (9..=11).contains(&digits) {
                    Ok(())
                } else {
                    Err("Wallet phone number must be 9 to 11 digits".to_string())
                }
            },
            Self::ConnectIps { bank_code, .. } | Self::Fonepay { bank_code, .. } => {
                if bank_code.trim().is_empty() {
                    Err("Bank code is required".to_string())
                } else {
                    Ok(())
                }
            },
        }
    }
}

// Card numbers and account numbers stay out of logs.
impl std::fmt::Debug for PaymentDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentDetails::{}", self.method_name())
    }
}

fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Result of a payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutcome {
    /// Approved
    pub success: bool,
    /// Provider message, shown verbatim on failure
    pub message: String,
    /// Set when approved
    pub transaction_id: Option<String>,
}

/// How strict the simulator is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Approve everything
    #[default]
    AlwaysApprove,
    /// Decline invalid details
    Validate,
}

impl FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always_approve" | "approve" | "demo" => Ok(Self::AlwaysApprove),
            "validate" | "strict" => Ok(Self::Validate),
            other => Err(format!("unknown payment mode: {other}")),
        }
    }
}

/// Payment gateway trait
pub trait PaymentGateway: Send + Sync {
    /// Charge `amount` to `details` on behalf of `customer_id`.
    ///
    /// Declines are reported through [`PaymentOutcome::success`], never as
    /// an error.
    fn process_payment(
        &self,
        amount: Money,
        details: PaymentDetails,
        customer_id: String,
    ) -> GatewayFuture<PaymentOutcome>;

    /// Refund a previously approved transaction
    ///
    /// # Errors
    ///
    /// Returns error if the refund cannot be issued
    fn refund_payment(&self, transaction_id: &str, amount: Money) -> GatewayFuture<GatewayResult<String>>;
}

/// Local stand-in for the card, wallet and interbank providers.
pub struct PaymentSimulator {
    mode: PaymentMode,
    min_delay: Duration,
    max_delay: Duration,
    rng: Mutex<StdRng>,
}

impl PaymentSimulator {
    /// Simulator with the given mode and a delay drawn from
    /// `min_delay..=max_delay`.
    #[must_use]
    pub fn new(mode: PaymentMode, min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            mode,
            min_delay,
            max_delay: max_delay.max(min_delay),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// No delay; for tests.
    #[must_use]
    pub fn instant(mode: PaymentMode) -> Self {
        Self::new(mode, Duration::ZERO, Duration::ZERO)
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(self) -> Arc<dyn PaymentGateway> {
        Arc::new(self)
    }

    fn next_delay(&self) -> Duration {
        if self.max_delay == self.min_delay {
            return self.min_delay;
        }
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(self.min_delay..=self.max_delay)
    }
}

impl Default for PaymentSimulator {
    fn default() -> Self {
        Self::new(
            PaymentMode::AlwaysApprove,
            Duration::from_millis(300),
            Duration::from_millis(800),
        )
    }
}

impl std::fmt::Debug for PaymentSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentSimulator")
            .field("mode", &self.mode)
            .field("min_delay", &self.min_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl PaymentGateway for PaymentSimulator {
    fn process_payment(
        &self,
        amount: Money,
        details: PaymentDetails,
        customer_id: String,
    ) -> GatewayFuture<PaymentOutcome> {
        let delay = self.next_delay();
        let mode = self.mode;

        Box::pin(async move {
            // Simulate provider latency
            tokio::time::sleep(delay).await;

            let verdict = match mode {
                PaymentMode::AlwaysApprove => Ok(()),
                PaymentMode::Validate => details.validate(),
            };

            let outcome = match verdict {
                Ok(()) => {
                    let transaction_id = format!("sim_txn_{}", uuid::Uuid::new_v4().simple());
                    tracing::info!(
                        method = details.method_name(),
                        amount = amount.minor_units(),
                        customer_id = %customer_id,
                        transaction_id = %transaction_id,
                        "Payment approved"
                    );
                    PaymentOutcome {
                        success: true,
                        message: format!("Payment via {} approved", details.method_name()),
                        transaction_id: Some(transaction_id),
                    }
                },
                Err(message) => {
                    tracing::warn!(
                        method = details.method_name(),
                        amount = amount.minor_units(),
                        customer_id = %customer_id,
                        reason = %message,
                        "Payment declined"
                    );
                    PaymentOutcome {
                        success: false,
                        message,
                        transaction_id: None,
                    }
                },
            };

            crate::metrics::record_payment(outcome.success);
            outcome
        })
    }

    fn refund_payment(&self, transaction_id: &str, amount: Money) -> GatewayFuture<GatewayResult<String>> {
        let transaction_id = transaction_id.to_string();
        let delay = self.next_delay();

        Box::pin(async move {
            tokio::time::sleep(delay).await;

            if !transaction_id.starts_with("sim_txn_") {
                return Err(PaymentError::UnknownTransaction(transaction_id));
            }

            let refund_id = format!("sim_refund_{}", uuid::Uuid::new_v4().simple());
            tracing::info!(
                transaction_id = %transaction_id,
                amount = amount.minor_units(),
                refund_id = %refund_id,
                "Payment refunded"
            );
            Ok(refund_id)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn card(number: &str) -> PaymentDetails {
        PaymentDetails::Card {
            number: number.to_string(),
            holder: "ANITA SHRESTHA".to_string(),
            expiry: "12/29".to_string(),
            cvv: "123".to_string(),
        }
    }

    #[test]
    fn luhn() {
        assert!(luhn_valid("4242424242424242"));
        assert!(!luhn_valid("4242424242424241"));
    }

    #[test]
    fn method_tags_match_provider_names() {
        let json = serde_json::to_value(PaymentDetails::ConnectIps {
            bank_code: "NABIL".into(),
            account: "0011".into(),
        })
        .unwrap();
        assert_eq!(json["method"], "CONNECTIPS");
        assert_eq!(PaymentDetails::Khalti { phone: "9801234567".into() }.method_name(), "KHALTI");
    }

    #[test]
    fn validation_per_method() {
        assert!(card("4242 4242 4242 4242").validate().is_ok());
        assert!(card("").validate().is_err());
        assert!(card("4242424242424241").validate().is_err());
        assert!(PaymentDetails::Esewa { phone: "9841234567".into() }.validate().is_ok());
        assert!(PaymentDetails::Khalti { phone: "123".into() }.validate().is_err());
        assert!(
            PaymentDetails::Fonepay {
                bank_code: " ".into(),
                account: "0011".into()
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn debug_hides_details() {
        assert_eq!(format!("{:?}", card("4242424242424242")), "PaymentDetails::CARD");
    }

    #[test]
    fn payment_mode_parses() {
        assert_eq!("validate".parse::<PaymentMode>(), Ok(PaymentMode::Validate));
        assert_eq!("ALWAYS_APPROVE".parse::<PaymentMode>(), Ok(PaymentMode::AlwaysApprove));
        assert!("sometimes".parse::<PaymentMode>().is_err());
    }

    #[tokio::test]
    async fn demo_mode_approves_empty_card() {
        let gateway = PaymentSimulator::instant(PaymentMode::AlwaysApprove);
        let outcome = gateway
            .process_payment(Money::from_minor(100), card(""), "anon-1".into())
            .await;
        assert!(outcome.success);
        assert!(outcome.transaction_id.unwrap().starts_with("sim_txn_"));
    }

    #[tokio::test]
    async fn validate_mode_declines_with_message() {
        let gateway = PaymentSimulator::instant(PaymentMode::Validate);
        let outcome = gateway
            .process_payment(Money::from_minor(100), card(""), "anon-1".into())
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Card number must be 13 to 19 digits");
        assert_eq!(outcome.transaction_id, None);
    }

    #[tokio::test]
    async fn refund_requires_known_transaction() {
        let gateway = PaymentSimulator::instant(PaymentMode::AlwaysApprove);
        assert!(gateway.refund_payment("sim_txn_abc", Money::from_minor(10)).await.is_ok());
        assert_eq!(
            gateway.refund_payment("other", Money::from_minor(10)).await,
            Err(PaymentError::UnknownTransaction("other".into()))
        );
    }
}
