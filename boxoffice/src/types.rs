//! Domain types for the box office.
//!
//! Value objects, entities and identity types shared by the checkout,
//! issuance and retrieval modules. Everything here is plain data; the
//! behavior lives in the modules that own each step of the pipeline.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId
);
uuid_id!(
    /// Identity issued by the hosted identity provider
    UserId
);
uuid_id!(
    /// Unique identifier for an inbox entry
    NotificationId
);
uuid_id!(
    /// Correlates the actions of one checkout run
    CheckoutId
);

/// Display identifier of a ticket (`TKT-XXXXXXXX`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    /// Wrap an already generated identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money
// ============================================================================

/// Amount in integer minor units, currency-agnostic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(units: u64) -> Self {
        Self(units)
    }

    /// Returns the amount in minor units
    #[must_use]
    pub const fn minor_units(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies by a quantity with overflow checking
    #[must_use]
    pub fn checked_mul(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(u64::from(quantity)).map(Self)
    }

    /// `percent`% of this amount, rounded down
    #[must_use]
    pub fn percent(self, percent: u32) -> Option<Self> {
        self.0.checked_mul(u64::from(percent)).map(|scaled| Self(scaled / 100))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Closed set of event categories
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Concerts and live music
    Music,
    /// Theatre, exhibitions, heritage
    Culture,
    /// Multi-day festivals
    Festival,
    /// Matches and races
    Sports,
    /// Food and drink
    Food,
    /// Outdoor trips
    Adventure,
}

impl Category {
    /// Wire name (`MUSIC`, `FOOD`, ...)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Music => "MUSIC",
            Self::Culture => "CULTURE",
            Self::Festival => "FESTIVAL",
            Self::Sports => "SPORTS",
            Self::Food => "FOOD",
            Self::Adventure => "ADVENTURE",
        }
    }
}

/// Kind of admission a ticket grants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketType {
    /// General admission
    Standard,
    /// VIP area access
    Vip,
    /// Discounted early purchase
    EarlyBird,
    /// Standing area by the stage; upgrade only
    FanZone,
}

impl TicketType {
    /// Wire name (`STANDARD`, `FAN_ZONE`, ...)
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Vip => "VIP",
            Self::EarlyBird => "EARLY_BIRD",
            Self::FanZone => "FAN_ZONE",
        }
    }

    /// Whether the type can be bought directly. `FanZone` is reachable only
    /// through an upgrade.
    #[must_use]
    pub const fn is_offered_at_checkout(&self) -> bool {
        !matches!(self, Self::FanZone)
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event listed in the catalog.
///
/// `available_tickets` never exceeds `total_tickets`; it is only changed by
/// inventory claims and releases.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    pub id: EventId,
    /// Title
    pub title: String,
    /// Long description
    pub description: String,
    /// One-line teaser
    pub short_description: String,
    /// Calendar date
    pub date: NaiveDate,
    /// Door time
    pub time: NaiveTime,
    /// Free-text venue
    pub location: String,
    /// Unit price
    pub price: Money,
    /// Category
    pub category: Category,
    /// Cover image reference
    pub image_url: String,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Shown on the front page
    #[serde(default)]
    pub featured: bool,
    /// Organizer who created the event
    #[serde(default)]
    pub organizer_id: Option<UserId>,
    /// Capacity
    pub total_tickets: u32,
    /// Tickets left
    pub available_tickets: u32,
}

impl Event {
    /// Whether `quantity` tickets are currently available
    #[must_use]
    pub const fn has_capacity(&self, quantity: u32) -> bool {
        quantity <= self.available_tickets
    }
}

/// Fields an organizer provides when listing a new event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEvent {
    /// Title
    pub title: String,
    /// Long description
    pub description: String,
    /// One-line teaser
    pub short_description: String,
    /// Calendar date
    pub date: NaiveDate,
    /// Door time
    pub time: NaiveTime,
    /// Free-text venue
    pub location: String,
    /// Unit price
    pub price: Money,
    /// Category
    pub category: Category,
    /// Cover image reference
    pub image_url: String,
    /// Free-form tags
    pub tags: Vec<String>,
    /// Shown on the front page
    pub featured: bool,
    /// Capacity; all of it starts available
    pub total_tickets: u32,
}

// ============================================================================
// People
// ============================================================================

/// Role stored on a user's profile
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Buys tickets
    #[default]
    User,
    /// Lists events
    Organizer,
    /// Moderates the catalog
    Admin,
}

impl Role {
    /// Organizers and admins may list events
    #[must_use]
    pub const fn can_create_events(&self) -> bool {
        matches!(self, Self::Organizer | Self::Admin)
    }

    /// Only admins may delete events
    #[must_use]
    pub const fn can_delete_events(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Contact details entered at checkout. Never persisted on its own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Full name
    pub name: String,
    /// Email address
    pub email: String,
    /// Phone number
    pub phone: String,
}

impl Customer {
    /// Check the fields are usable.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason for the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {},
            _ => return Err(format!("invalid email address: {email}")),
        }
        let digits = self.phone.chars().filter(char::is_ascii_digit).count();
        if digits < 9 {
            return Err(format!("invalid phone number: {}", self.phone));
        }
        Ok(())
    }
}

/// The principal a ticket is issued to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Holder {
    /// Signed-in user
    Authenticated {
        /// User ID
        user_id: UserId,
    },
    /// Guest checkout under a synthesized id
    Anonymous {
        /// Synthesized `anon-…` id
        id: String,
    },
}

impl Holder {
    /// Fresh anonymous holder
    #[must_use]
    pub fn anonymous() -> Self {
        Self::Anonymous {
            id: format!("anon-{}", Uuid::new_v4().simple()),
        }
    }

    /// Identifier stored as the ticket's `customer_id`
    #[must_use]
    pub fn customer_id(&self) -> String {
        match self {
            Self::Authenticated { user_id } => user_id.to_string(),
            Self::Anonymous { id } => id.clone(),
        }
    }

    /// User ID, if signed in
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Authenticated { user_id } => Some(*user_id),
            Self::Anonymous { .. } => None,
        }
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// A ticket as stored and shown to the holder.
///
/// `qr_code`, `barcode` and `access_code` are generated once at issuance.
/// `used` only ever moves from `false` to `true`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalTicket {
    /// Display ID
    pub id: TicketId,
    /// Event the ticket admits to
    pub event_id: EventId,
    /// Holder's customer id (user id or `anon-…`)
    pub customer_id: String,
    /// Admission kind
    pub ticket_type: TicketType,
    /// Number of admissions
    pub quantity: u32,
    /// When it was issued
    pub purchase_date: DateTime<Utc>,
    /// Scanned at the door
    pub used: bool,
    /// Verification URL encoded in the QR image
    pub qr_code: String,
    /// 13-digit barcode
    pub barcode: String,
    /// 6-digit manual entry code
    pub access_code: String,
}

impl DigitalTicket {
    /// Flip `used`. Returns `false` when it was already set.
    pub fn mark_used(&mut self) -> bool {
        if self.used {
            return false;
        }
        self.used = true;
        true
    }
}

/// Why an issued ticket was not written to the store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EphemeralReason {
    /// Guest checkouts are never persisted
    AnonymousHolder,
    /// The write failed after retries
    StoreUnavailable(String),
}

/// Where an issued ticket lives
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Persistence {
    /// Written to the hosted store
    Persisted,
    /// Returned to the caller only
    Ephemeral {
        /// Reason
        reason: EphemeralReason,
    },
}

/// Result of ticket issuance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedTicket {
    /// The ticket
    pub ticket: DigitalTicket,
    /// Whether it reached the store
    pub persistence: Persistence,
}

impl IssuedTicket {
    /// `true` when the ticket was written to the store
    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        matches!(self.persistence, Persistence::Persisted)
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Severity shown next to an inbox entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Something went well
    Success,
    /// Something failed
    Error,
    /// Neutral information
    Info,
    /// Needs attention
    Warning,
}

/// An inbox entry. `user_id == None` is a broadcast visible to everyone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID
    pub id: NotificationId,
    /// Recipient, or `None` for broadcast
    pub user_id: Option<UserId>,
    /// Title
    pub title: String,
    /// Body
    pub message: String,
    /// Kind
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Read flag
    pub read: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Reads
// ============================================================================

/// A read result that may have been served from seed data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lookup<T> {
    /// The value
    pub value: T,
    /// `true` when the store was unreachable and seed data was used
    pub degraded: bool,
}

impl<T> Lookup<T> {
    /// Served by the store
    pub const fn fresh(value: T) -> Self {
        Self { value, degraded: false }
    }

    /// Served from seed data
    pub const fn fallback(value: T) -> Self {
        Self { value, degraded: true }
    }

    /// Transform the value, keeping the flag
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        Lookup {
            value: f(self.value),
            degraded: self.degraded,
        }
    }
}
