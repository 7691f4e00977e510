//! Process-local backend.
//!
//! Tables are held behind one `tokio::sync::RwLock`, which makes every
//! conditional update atomic. Fault switches let tests make individual
//! tables fail the way an unreachable hosted store would.

use super::{EventRepository, NotificationRepository, StoreError, StoreResult, TicketRepository};
use crate::session::{AuthSession, IdentityProvider, SessionError, SessionUser, SignUp};
use crate::types::{DigitalTicket, Event, EventId, Notification, NotificationId, Role, TicketId, TicketType, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    tickets: Vec<DigitalTicket>,
    notifications: Vec<Notification>,
}

/// In-memory implementation of every repository.
#[derive(Default)]
pub struct InMemoryBackend {
    tables: RwLock<Tables>,
    fail_events: AtomicBool,
    fail_ticket_writes: AtomicBool,
    fail_notification_writes: AtomicBool,
    pending_claim_conflicts: AtomicU32,
}

impl InMemoryBackend {
    /// Empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend preloaded with `events`
    #[must_use]
    pub fn with_events(events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                events: events.into_iter().map(|e| (e.id, e)).collect(),
                ..Tables::default()
            }),
            ..Self::default()
        }
    }

    /// Make every events-table call (reads, claims, releases) fail with
    /// [`StoreError::Unavailable`].
    pub fn fail_events(&self, fail: bool) {
        self.fail_events.store(fail, Ordering::SeqCst);
    }

    /// Make ticket writes fail with [`StoreError::Unavailable`].
    pub fn fail_ticket_writes(&self, fail: bool) {
        self.fail_ticket_writes.store(fail, Ordering::SeqCst);
    }

    /// Make notification writes fail with [`StoreError::Unavailable`].
    pub fn fail_notification_writes(&self, fail: bool) {
        self.fail_notification_writes.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` claims lose a simulated race.
    pub fn inject_claim_conflicts(&self, count: u32) {
        self.pending_claim_conflicts.store(count, Ordering::SeqCst);
    }

    /// Current available count of an event, bypassing fault switches.
    pub async fn available_tickets(&self, id: EventId) -> Option<u32> {
        self.tables.read().await.events.get(&id).map(|e| e.available_tickets)
    }

    /// Every stored ticket, bypassing fault switches.
    pub async fn stored_tickets(&self) -> Vec<DigitalTicket> {
        self.tables.read().await.tickets.clone()
    }

    fn check(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("{what} unavailable")))
        } else {
            Ok(())
        }
    }

    fn take_conflict(&self) -> bool {
        self.pending_claim_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl EventRepository for InMemoryBackend {
    async fn fetch_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        Self::check(&self.fail_events, "events")?;
        Ok(self.tables.read().await.events.get(&id).cloned())
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        Self::check(&self.fail_events, "events")?;
        let mut events: Vec<_> = self.tables.read().await.events.values().cloned().collect();
        events.sort_by(|a, b| (a.date, a.time, &a.title).cmp(&(b.date, b.time, &b.title)));
        Ok(events)
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.events.contains_key(&event.id) {
            return Err(StoreError::Api {
                status: 409,
                message: format!("event {} already exists", event.id),
            });
        }
        tables.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn delete_event(&self, id: EventId) -> StoreResult<bool> {
        Ok(self.tables.write().await.events.remove(&id).is_some())
    }

    async fn claim_tickets(&self, id: EventId, quantity: u32) -> StoreResult<u32> {
        Self::check(&self.fail_events, "events")?;
        if self.take_conflict() {
            return Err(StoreError::Conflict);
        }

        let mut tables = self.tables.write().await;
        let event = tables
            .events
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("event {id}")))?;

        if event.available_tickets < quantity {
            return Err(StoreError::InsufficientInventory {
                requested: quantity,
                available: event.available_tickets,
            });
        }
        event.available_tickets -= quantity;
        Ok(event.available_tickets)
    }

    async fn release_tickets(&self, id: EventId, quantity: u32) -> StoreResult<u32> {
        Self::check(&self.fail_events, "events")?;
        let mut tables = self.tables.write().await;
        let event = tables
            .events
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("event {id}")))?;

        event.available_tickets = event.available_tickets.saturating_add(quantity).min(event.total_tickets);
        Ok(event.available_tickets)
    }
}

#[async_trait]
impl TicketRepository for InMemoryBackend {
    async fn insert_ticket(&self, ticket: &DigitalTicket) -> StoreResult<()> {
        Self::check(&self.fail_ticket_writes, "tickets")?;
        self.tables.write().await.tickets.push(ticket.clone());
        Ok(())
    }

    async fn tickets_for_customer(&self, customer_id: &str) -> StoreResult<Vec<DigitalTicket>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tickets
            .iter()
            .rev()
            .filter(|t| t.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn fetch_ticket(&self, id: &TicketId) -> StoreResult<Option<DigitalTicket>> {
        Ok(self.tables.read().await.tickets.iter().find(|t| &t.id == id).cloned())
    }

    async fn find_by_access_code(&self, access_code: &str) -> StoreResult<Option<DigitalTicket>> {
        Ok(self
            .tables
            .read()
            .await
            .tickets
            .iter()
            .find(|t| t.access_code == access_code)
            .cloned())
    }

    async fn mark_used(&self, id: &TicketId) -> StoreResult<bool> {
        Self::check(&self.fail_ticket_writes, "tickets")?;
        let mut tables = self.tables.write().await;
        let ticket = tables
            .tickets
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("ticket {id}")))?;
        Ok(ticket.mark_used())
    }

    async fn update_ticket_type(&self, id: &TicketId, ticket_type: TicketType) -> StoreResult<bool> {
        Self::check(&self.fail_ticket_writes, "tickets")?;
        let mut tables = self.tables.write().await;
        let ticket = tables
            .tickets
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("ticket {id}")))?;
        if ticket.used {
            return Ok(false);
        }
        ticket.ticket_type = ticket_type;
        Ok(true)
    }
}

#[async_trait]
impl NotificationRepository for InMemoryBackend {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        Self::check(&self.fail_notification_writes, "notifications")?;
        self.tables.write().await.notifications.push(notification.clone());
        Ok(())
    }

    async fn notifications_for(&self, user_id: Option<UserId>) -> StoreResult<Vec<Notification>> {
        let tables = self.tables.read().await;
        Ok(tables
            .notifications
            .iter()
            .rev()
            .filter(|n| n.user_id.is_none() || n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: NotificationId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let notification = tables
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("notification {id}")))?;
        notification.read = true;
        Ok(())
    }

    async fn mark_all_read(&self, user_id: UserId) -> StoreResult<usize> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for notification in tables
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == Some(user_id) && !n.read)
        {
            notification.read = true;
            changed += 1;
        }
        Ok(changed)
    }
}

struct Account {
    password: String,
    user: SessionUser,
}

/// Identity provider keeping accounts in memory.
///
/// New accounts get [`Role::User`]; use [`InMemoryIdentityProvider::with_account`]
/// to seed organizers and admins.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    accounts: RwLock<HashMap<String, Account>>,
    tokens: RwLock<HashMap<String, UserId>>,
}

impl InMemoryIdentityProvider {
    /// Provider without accounts
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with a given role.
    pub async fn with_account(&self, email: &str, password: &str, full_name: &str, role: Role) -> SessionUser {
        let user = SessionUser {
            id: UserId::new(),
            email: email.to_lowercase(),
            full_name: full_name.to_string(),
            role,
        };
        self.accounts.write().await.insert(
            user.email.clone(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        user
    }

    /// Number of sessions not yet signed out
    pub async fn active_sessions(&self) -> usize {
        self.tokens.read().await.len()
    }

    async fn issue_token(&self, user: SessionUser) -> AuthSession {
        let access_token = format!("mem_{}", uuid::Uuid::new_v4().simple());
        self.tokens.write().await.insert(access_token.clone(), user.id);
        AuthSession { user, access_token }
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn sign_up(&self, form: &SignUp) -> Result<AuthSession, SessionError> {
        let email = form.email.to_lowercase();
        if self.accounts.read().await.contains_key(&email) {
            return Err(SessionError::EmailTaken(email));
        }
        let user = self
            .with_account(&email, &form.password, &form.full_name, Role::User)
            .await;
        Ok(self.issue_token(user).await)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, SessionError> {
        let user = {
            let accounts = self.accounts.read().await;
            match accounts.get(&email.to_lowercase()) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(SessionError::InvalidCredentials),
            }
        };
        Ok(self.issue_token(user).await)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), SessionError> {
        self.tokens.write().await.remove(access_token);
        Ok(())
    }

    async fn resume(&self, access_token: &str) -> Result<(), SessionError> {
        if self.tokens.read().await.contains_key(access_token) {
            Ok(())
        } else {
            Err(SessionError::InvalidCredentials)
        }
    }
}
