//! Inbox notifications.
//!
//! Notifications are a best-effort side channel. Producers push drafts into a
//! bounded [`NotificationOutbox`] and move on; a separate consumer task
//! writes them to the store through a [`Notifier`]. A full queue or a failed
//! write is logged and counted, never reported back to the producer's caller.
//!
//! Reading happens through [`Inbox`], optionally refreshed in the background
//! by an [`InboxPoller`].

use crate::backend::NotificationRepository;
use crate::types::{Notification, NotificationId, NotificationKind, TicketId, TicketType, UserId};
use boxoffice_core::environment::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A notification waiting to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationDraft {
    /// Recipient, or `None` for broadcast
    pub user_id: Option<UserId>,
    /// Title
    pub title: String,
    /// Body
    pub message: String,
    /// Kind
    pub kind: NotificationKind,
}

impl NotificationDraft {
    /// Arbitrary draft
    #[must_use]
    pub fn new(
        user_id: Option<UserId>,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: NotificationKind,
    ) -> Self {
        Self {
            user_id,
            title: title.into(),
            message: message.into(),
            kind,
        }
    }

    /// Sent after sign-up
    #[must_use]
    pub fn welcome(user_id: UserId, full_name: &str) -> Self {
        Self::new(
            Some(user_id),
            "Welcome!",
            format!("Hi {full_name}, your account is ready. Enjoy discovering events."),
            NotificationKind::Success,
        )
    }

    /// Sent after sign-in
    #[must_use]
    pub fn signed_in(user_id: UserId) -> Self {
        Self::new(
            Some(user_id),
            "Signed in",
            "You have signed in successfully.",
            NotificationKind::Info,
        )
    }

    /// Sent after issuance
    #[must_use]
    pub fn ticket_issued(user_id: UserId, ticket_id: &TicketId, event_title: &str, quantity: u32) -> Self {
        Self::new(
            Some(user_id),
            "Ticket purchased",
            format!("{quantity} ticket(s) for {event_title} confirmed. Ticket ID: {ticket_id}"),
            NotificationKind::Success,
        )
    }

    /// Sent when payment is declined
    #[must_use]
    pub fn payment_failed(user_id: UserId, event_title: &str, reason: &str) -> Self {
        Self::new(
            Some(user_id),
            "Payment failed",
            format!("Payment for {event_title} was declined: {reason}"),
            NotificationKind::Error,
        )
    }

    /// Sent after a ticket file download
    #[must_use]
    pub fn ticket_downloaded(user_id: UserId, ticket_id: &TicketId) -> Self {
        Self::new(
            Some(user_id),
            "Ticket downloaded",
            format!("Ticket {ticket_id} was saved to your device."),
            NotificationKind::Info,
        )
    }

    /// Sent after an upgrade
    #[must_use]
    pub fn ticket_upgraded(user_id: UserId, ticket_id: &TicketId, ticket_type: TicketType) -> Self {
        Self::new(
            Some(user_id),
            "Ticket upgraded",
            format!("Ticket {ticket_id} is now {ticket_type}."),
            NotificationKind::Success,
        )
    }
}

/// Writes notifications to the store.
#[derive(Clone)]
pub struct Notifier {
    repository: Arc<dyn NotificationRepository>,
    clock: Arc<dyn Clock>,
}

impl Notifier {
    /// Notifier writing through `repository`
    #[must_use]
    pub fn new(repository: Arc<dyn NotificationRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Write one notification. Returns `false` if the write failed.
    pub async fn notify(
        &self,
        title: &str,
        message: &str,
        kind: NotificationKind,
        user_id: Option<UserId>,
    ) -> bool {
        self.deliver(NotificationDraft::new(user_id, title, message, kind)).await
    }

    /// Write a draft. Returns `false` if the write failed.
    pub async fn deliver(&self, draft: NotificationDraft) -> bool {
        let notification = Notification {
            id: NotificationId::new(),
            user_id: draft.user_id,
            title: draft.title,
            message: draft.message,
            kind: draft.kind,
            read: false,
            created_at: self.clock.now(),
        };

        match self.repository.insert_notification(&notification).await {
            Ok(()) => {
                tracing::debug!(notification_id = %notification.id, title = %notification.title, "Notification delivered");
                crate::metrics::record_notification("delivered");
                true
            },
            Err(error) => {
                tracing::warn!(title = %notification.title, %error, "Failed to write notification");
                crate::metrics::record_notification("failed");
                false
            },
        }
    }
}

/// Producer side of the notification queue.
#[derive(Clone, Debug)]
pub struct NotificationOutbox {
    sender: mpsc::Sender<NotificationDraft>,
}

impl NotificationOutbox {
    /// Spawn the consumer task draining into `notifier`.
    ///
    /// The task ends once every outbox clone has been dropped.
    #[must_use]
    pub fn spawn(notifier: Notifier, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<NotificationDraft>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(draft) = receiver.recv().await {
                notifier.deliver(draft).await;
            }
            tracing::debug!("Notification outbox closed");
        });

        (Self { sender }, handle)
    }

    /// Queue a draft without waiting. Returns `false` when it was dropped.
    pub fn emit(&self, draft: NotificationDraft) -> bool {
        match self.sender.try_send(draft) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(draft)) => {
                tracing::warn!(title = %draft.title, "Notification outbox full, dropping");
                crate::metrics::record_notification("dropped");
                false
            },
            Err(mpsc::error::TrySendError::Closed(draft)) => {
                tracing::warn!(title = %draft.title, "Notification outbox closed, dropping");
                crate::metrics::record_notification("dropped");
                false
            },
        }
    }
}

/// Read side of the notification table.
#[derive(Clone)]
pub struct Inbox {
    repository: Arc<dyn NotificationRepository>,
}

impl Inbox {
    /// Inbox reading through `repository`
    #[must_use]
    pub fn new(repository: Arc<dyn NotificationRepository>) -> Self {
        Self { repository }
    }

    /// The user's notifications plus broadcasts, newest first. Empty when
    /// the store is unreachable.
    pub async fn list(&self, user_id: Option<UserId>) -> Vec<Notification> {
        match self.repository.notifications_for(user_id).await {
            Ok(mut notifications) => {
                notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                notifications
            },
            Err(error) => {
                tracing::warn!(%error, "Failed to load notifications");
                Vec::new()
            },
        }
    }

    /// Number of unread entries
    pub async fn unread_count(&self, user_id: Option<UserId>) -> usize {
        self.list(user_id).await.iter().filter(|n| !n.read).count()
    }

    /// Mark one entry read. Returns `false` if the write failed.
    pub async fn mark_as_read(&self, id: NotificationId) -> bool {
        match self.repository.mark_read(id).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(notification_id = %id, %error, "Failed to mark notification read");
                false
            },
        }
    }

    /// Mark every entry addressed to `user_id` read. Returns how many changed.
    pub async fn mark_all_as_read(&self, user_id: UserId) -> usize {
        match self.repository.mark_all_read(user_id).await {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!(user_id = %user_id, %error, "Failed to mark notifications read");
                0
            },
        }
    }
}

/// What an [`InboxPoller`] publishes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InboxSnapshot {
    /// Newest first
    pub notifications: Vec<Notification>,
    /// Unread entries in `notifications`
    pub unread: usize,
}

/// Refreshes an inbox on a fixed interval.
///
/// The background task stops when the poller is dropped.
#[derive(Debug)]
pub struct InboxPoller {
    snapshots: watch::Receiver<InboxSnapshot>,
    handle: JoinHandle<()>,
}

impl InboxPoller {
    /// Start polling. The first poll happens immediately.
    #[must_use]
    pub fn spawn(inbox: Inbox, user_id: Option<UserId>, interval: Duration) -> Self {
        let (sender, snapshots) = watch::channel(InboxSnapshot::default());

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let notifications = inbox.list(user_id).await;
                let unread = notifications.iter().filter(|n| !n.read).count();
                if sender.send(InboxSnapshot { notifications, unread }).is_err() {
                    break;
                }
            }
        });

        Self { snapshots, handle }
    }

    /// Watch snapshots as they arrive
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<InboxSnapshot> {
        self.snapshots.clone()
    }

    /// Most recent snapshot
    #[must_use]
    pub fn latest(&self) -> InboxSnapshot {
        self.snapshots.borrow().clone()
    }
}

impl Drop for InboxPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
