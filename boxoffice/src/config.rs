//! Configuration management for the box office.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unparseable values fall back to the default instead of failing.

use crate::issuance::PersistencePolicy;
use crate::payment_gateway::PaymentMode;
use boxoffice_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Hosted backend
    pub backend: BackendConfig,
    /// Payment simulator
    pub payment: PaymentConfig,
    /// Checkout flow
    pub checkout: CheckoutConfig,
    /// Outbox and inbox polling
    pub notifications: NotificationConfig,
    /// Backoff for store writes and inventory claims
    pub retry: RetryConfig,
    /// Ticket codes
    pub codes: CodesConfig,
    /// Session cache
    pub session: SessionConfig,
}

/// Hosted backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project URL; `None` runs against the in-memory backend
    pub url: Option<String>,
    /// Public anon key sent as `apikey`
    pub anon_key: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: String::new(),
            request_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    /// Per-request timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Payment simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Approve everything or validate details
    pub mode: PaymentMode,
    /// Shortest simulated latency in milliseconds
    pub min_delay_ms: u64,
    /// Longest simulated latency in milliseconds
    pub max_delay_ms: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            mode: PaymentMode::AlwaysApprove,
            min_delay_ms: 300,
            max_delay_ms: 800,
        }
    }
}

/// Checkout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// Largest quantity a single checkout may request
    pub quantity_cap: u32,
    /// How long a caller waits for a checkout to finish, in seconds
    pub wait_timeout_secs: u64,
    /// What to do when the ticket write fails
    pub persistence_policy: PersistencePolicy,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            quantity_cap: 10,
            wait_timeout_secs: 30,
            persistence_policy: PersistencePolicy::Degrade,
        }
    }
}

impl CheckoutConfig {
    /// Wait timeout as a `Duration`
    #[must_use]
    pub const fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Bounded outbox capacity
    pub outbox_capacity: usize,
    /// Inbox poll interval in seconds
    pub poll_interval_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 128,
            poll_interval_secs: 30,
        }
    }
}

impl NotificationConfig {
    /// Poll interval as a `Duration`
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff cap in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryConfig {
    /// Build the runtime retry policy
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .build()
    }
}

/// Code generator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodesConfig {
    /// Base of the QR verification URL
    pub verify_base_url: String,
}

impl Default for CodesConfig {
    fn default() -> Self {
        Self {
            verify_base_url: "https://boxoffice.local".to_string(),
        }
    }
}

/// Session cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// JSON file the session snapshot is kept in; in-memory when unset
    pub cache_path: Option<PathBuf>,
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            backend: BackendConfig {
                url: env::var("BOXOFFICE_BACKEND_URL").ok().filter(|s| !s.is_empty()),
                anon_key: env::var("BOXOFFICE_BACKEND_ANON_KEY").unwrap_or_default(),
                request_timeout_secs: parsed("BOXOFFICE_BACKEND_TIMEOUT")
                    .unwrap_or(defaults.backend.request_timeout_secs),
            },
            payment: PaymentConfig {
                mode: parsed("BOXOFFICE_PAYMENT_MODE").unwrap_or(defaults.payment.mode),
                min_delay_ms: parsed("BOXOFFICE_PAYMENT_MIN_DELAY_MS")
                    .unwrap_or(defaults.payment.min_delay_ms),
                max_delay_ms: parsed("BOXOFFICE_PAYMENT_MAX_DELAY_MS")
                    .unwrap_or(defaults.payment.max_delay_ms),
            },
            checkout: CheckoutConfig {
                quantity_cap: parsed("BOXOFFICE_CHECKOUT_QUANTITY_CAP")
                    .unwrap_or(defaults.checkout.quantity_cap),
                wait_timeout_secs: parsed("BOXOFFICE_CHECKOUT_TIMEOUT")
                    .unwrap_or(defaults.checkout.wait_timeout_secs),
                persistence_policy: parsed("BOXOFFICE_PERSISTENCE_POLICY")
                    .unwrap_or(defaults.checkout.persistence_policy),
            },
            notifications: NotificationConfig {
                outbox_capacity: parsed("BOXOFFICE_OUTBOX_CAPACITY")
                    .unwrap_or(defaults.notifications.outbox_capacity),
                poll_interval_secs: parsed("BOXOFFICE_INBOX_POLL_INTERVAL")
                    .unwrap_or(defaults.notifications.poll_interval_secs),
            },
            retry: RetryConfig {
                max_retries: parsed("BOXOFFICE_RETRY_MAX").unwrap_or(defaults.retry.max_retries),
                initial_delay_ms: parsed("BOXOFFICE_RETRY_INITIAL_DELAY_MS")
                    .unwrap_or(defaults.retry.initial_delay_ms),
                max_delay_ms: parsed("BOXOFFICE_RETRY_MAX_DELAY_MS")
                    .unwrap_or(defaults.retry.max_delay_ms),
            },
            codes: CodesConfig {
                verify_base_url: env::var("BOXOFFICE_VERIFY_BASE_URL")
                    .unwrap_or(defaults.codes.verify_base_url),
            },
            session: SessionConfig {
                cache_path: env::var("BOXOFFICE_SESSION_CACHE").ok().map(PathBuf::from),
            },
        }
    }
}
