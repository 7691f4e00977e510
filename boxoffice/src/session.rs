//! Sessions and identity.
//!
//! Authentication itself is delegated to a hosted identity provider behind
//! [`IdentityProvider`]. The box office only keeps an explicit [`Session`]
//! value that callers pass into every operation; there is no ambient
//! "current user". [`SessionManager`] is the single place that session
//! changes (sign-up, sign-in, sign-out) and mirrors the result into a
//! [`SessionCache`] so a restart can restore it.

use crate::notifications::{NotificationDraft, NotificationOutbox};
use crate::types::{Holder, Role, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Session errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Wrong email or password
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Sign-up with an email that already has an account
    #[error("Email already registered: {0}")]
    EmailTaken(String),

    /// Sign-up form rejected
    #[error("Invalid sign-up: {0}")]
    InvalidSignUp(String),

    /// Identity provider unreachable or failing
    #[error("Identity provider error: {0}")]
    Provider(String),

    /// Session cache could not be read or written
    #[error("Session cache error: {0}")]
    Cache(String),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// The signed-in user, with the role from their profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    /// User ID
    pub id: UserId,
    /// Email address
    pub email: String,
    /// Display name
    pub full_name: String,
    /// Role
    pub role: Role,
}

/// What the identity provider returns on sign-in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthSession {
    /// The user
    pub user: SessionUser,
    /// Bearer token for subsequent requests
    pub access_token: String,
}

/// Sign-up form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignUp {
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
    /// Display name
    pub full_name: String,
}

impl SignUp {
    fn validate(&self) -> Result<()> {
        if !self.email.contains('@') {
            return Err(SessionError::InvalidSignUp(format!("invalid email: {}", self.email)));
        }
        if self.password.len() < 6 {
            return Err(SessionError::InvalidSignUp(
                "password must be at least 6 characters".to_string(),
            ));
        }
        if self.full_name.trim().is_empty() {
            return Err(SessionError::InvalidSignUp("full name is required".to_string()));
        }
        Ok(())
    }
}

/// Hosted identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account and sign it in.
    async fn sign_up(&self, form: &SignUp) -> Result<AuthSession>;

    /// Exchange credentials for a session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Revoke a session.
    async fn sign_out(&self, access_token: &str) -> Result<()>;

    /// Re-attach a cached access token after a restart.
    ///
    /// Returns [`SessionError::InvalidCredentials`] when the provider no
    /// longer accepts the token.
    async fn resume(&self, access_token: &str) -> Result<()>;
}

/// Explicit session context passed to box office operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Who tickets are issued to
    pub holder: Holder,
    /// Signed-in user, if any
    pub user: Option<SessionUser>,
}

impl Session {
    /// Guest session under a fresh `anon-…` id.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            holder: Holder::anonymous(),
            user: None,
        }
    }

    /// Session for a signed-in user.
    #[must_use]
    pub fn authenticated(user: SessionUser) -> Self {
        Self {
            holder: Holder::Authenticated { user_id: user.id },
            user: Some(user),
        }
    }

    /// Whether a user is signed in
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Role of the signed-in user, `None` for guests
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }

    /// User ID of the signed-in user
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user.as_ref().map(|u| u.id)
    }

    fn snapshot(&self, access_token: Option<String>) -> SessionSnapshot {
        SessionSnapshot {
            user: self.user.clone(),
            is_authenticated: self.is_authenticated(),
            access_token,
        }
    }
}

/// Persisted form of a session: `{ user, isAuthenticated, accessToken }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Signed-in user
    pub user: Option<SessionUser>,
    /// Whether `user` is signed in
    pub is_authenticated: bool,
    /// Provider token for the signed-in user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

/// Where the session snapshot is kept between runs.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Read the snapshot, if any.
    async fn load(&self) -> Result<Option<SessionSnapshot>>;

    /// Replace the snapshot.
    async fn store(&self, snapshot: &SessionSnapshot) -> Result<()>;

    /// Remove the snapshot.
    async fn clear(&self) -> Result<()>;
}

/// Process-local session cache.
#[derive(Debug, Default)]
pub struct InMemorySessionCache {
    snapshot: Mutex<Option<SessionSnapshot>>,
}

impl InMemorySessionCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCache for InMemorySessionCache {
    async fn load(&self) -> Result<Option<SessionSnapshot>> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn store(&self, snapshot: &SessionSnapshot) -> Result<()> {
        *self.snapshot.lock().await = Some(snapshot.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.snapshot.lock().await = None;
        Ok(())
    }
}

/// Session cache backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionCache {
    path: PathBuf,
}

impl FileSessionCache {
    /// Cache stored at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SessionCache for FileSessionCache {
    async fn load(&self) -> Result<Option<SessionSnapshot>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| SessionError::Cache(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SessionError::Cache(e.to_string())),
        }
    }

    async fn store(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|e| SessionError::Cache(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SessionError::Cache(e.to_string()))?;
        }
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| SessionError::Cache(e.to_string()))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Cache(e.to_string())),
        }
    }
}

struct Current {
    session: Session,
    access_token: Option<String>,
}

/// Owns the active session and the only path that changes it.
pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    cache: Arc<dyn SessionCache>,
    outbox: NotificationOutbox,
    current: RwLock<Current>,
}

impl SessionManager {
    /// Manager starting from a guest session.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>, cache: Arc<dyn SessionCache>, outbox: NotificationOutbox) -> Self {
        Self {
            provider,
            cache,
            outbox,
            current: RwLock::new(Current {
                session: Session::anonymous(),
                access_token: None,
            }),
        }
    }

    /// Restore the cached session, if any, and hand its token back to the
    /// identity provider. A broken cache, a snapshot without a token or a
    /// token the provider rejects all end in a guest session.
    pub async fn restore(&self) -> Session {
        let snapshot = match self.cache.load().await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(%error, "Ignoring unreadable session cache");
                None
            },
        };

        let (session, access_token) = match snapshot {
            Some(SessionSnapshot {
                user: Some(user),
                is_authenticated: true,
                access_token: Some(token),
            }) => match self.provider.resume(&token).await {
                Ok(()) => {
                    tracing::info!(user_id = %user.id, "Session restored");
                    (Session::authenticated(user), Some(token))
                },
                Err(SessionError::InvalidCredentials) => {
                    tracing::warn!(user_id = %user.id, "Cached session expired");
                    self.forget().await;
                    (Session::anonymous(), None)
                },
                Err(error) => {
                    tracing::warn!(%error, user_id = %user.id, "Could not verify cached session, keeping it");
                    (Session::authenticated(user), Some(token))
                },
            },
            Some(SessionSnapshot { is_authenticated: true, .. }) => {
                tracing::warn!("Cached session has no access token");
                self.forget().await;
                (Session::anonymous(), None)
            },
            _ => (Session::anonymous(), None),
        };

        let mut current = self.current.write().await;
        current.session = session.clone();
        current.access_token = access_token;
        session
    }

    /// The active session
    pub async fn current(&self) -> Session {
        self.current.read().await.session.clone()
    }

    /// Create an account, sign it in and send a welcome notification.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the form is invalid or the provider
    /// rejects it.
    pub async fn sign_up(&self, form: SignUp) -> Result<Session> {
        form.validate()?;
        let auth = self.provider.sign_up(&form).await?;
        tracing::info!(user_id = %auth.user.id, "Account created");

        self.outbox.emit(NotificationDraft::welcome(auth.user.id, &auth.user.full_name));
        self.activate(auth).await
    }

    /// Sign in and send a sign-in notice.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidCredentials`] for wrong credentials
    /// and [`SessionError::Provider`] when the provider fails.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let auth = self.provider.sign_in(email, password).await?;
        tracing::info!(user_id = %auth.user.id, role = ?auth.user.role, "Signed in");

        self.outbox.emit(NotificationDraft::signed_in(auth.user.id));
        self.activate(auth).await
    }

    /// Sign out and clear the cache. Always ends in a guest session; provider
    /// and cache failures are logged.
    pub async fn sign_out(&self) -> Session {
        let token = {
            let mut current = self.current.write().await;
            current.session = Session::anonymous();
            current.access_token.take()
        };

        if let Some(token) = token {
            if let Err(error) = self.provider.sign_out(&token).await {
                tracing::warn!(%error, "Identity provider sign-out failed");
            }
        }
        self.forget().await;

        tracing::info!("Signed out");
        self.current().await
    }

    async fn forget(&self) {
        if let Err(error) = self.cache.clear().await {
            tracing::warn!(%error, "Failed to clear session cache");
        }
    }

    async fn activate(&self, auth: AuthSession) -> Result<Session> {
        let session = Session::authenticated(auth.user);
        let snapshot = session.snapshot(Some(auth.access_token.clone()));
        {
            let mut current = self.current.write().await;
            current.session = session.clone();
            current.access_token = Some(auth.access_token);
        }

        if let Err(error) = self.cache.store(&snapshot).await {
            tracing::warn!(%error, "Failed to persist session");
        }
        Ok(session)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> SessionUser {
        SessionUser {
            id: UserId::from_uuid(Uuid::nil()),
            email: "an@example.com".to_string(),
            full_name: "Asha Gurung".to_string(),
            role: Role::Organizer,
        }
    }

    #[test]
    fn snapshot_uses_camel_case() {
        let json = serde_json::to_value(Session::authenticated(user()).snapshot(Some("jwt".into()))).unwrap();
        assert_eq!(json["isAuthenticated"], true);
        assert_eq!(json["accessToken"], "jwt");
        assert_eq!(json["user"]["fullName"], "Asha Gurung");
        assert_eq!(json["user"]["role"], "organizer");
    }

    #[test]
    fn guest_session_has_no_role() {
        let session = Session::anonymous();
        assert!(!session.is_authenticated());
        assert_eq!(session.role(), None);
        assert!(session.holder.customer_id().starts_with("anon-"));
    }

    #[test]
    fn sign_up_form_validation() {
        let form = SignUp {
            email: "an@example.com".into(),
            password: "secret".into(),
            full_name: "An".into(),
        };
        assert!(form.validate().is_ok());
        assert!(SignUp { password: "123".into(), ..form.clone() }.validate().is_err());
        assert!(SignUp { email: "an".into(), ..form }.validate().is_err());
    }

    #[tokio::test]
    async fn file_cache_round_trip_and_clear() {
        let path = std::env::temp_dir().join(format!("boxoffice-session-{}.json", Uuid::new_v4()));
        let cache = FileSessionCache::new(&path);

        assert_eq!(cache.load().await.unwrap(), None);

        let snapshot = Session::authenticated(user()).snapshot(Some("jwt".into()));
        cache.store(&snapshot).await.unwrap();
        assert_eq!(cache.load().await.unwrap(), Some(snapshot));

        cache.clear().await.unwrap();
        assert_eq!(cache.load().await.unwrap(), None);
        cache.clear().await.expect("clearing twice is fine");
    }

    #[test]
    fn snapshot_without_token_still_parses() {
        let snapshot: SessionSnapshot = serde_json::from_value(serde_json::json!({
            "user": null,
            "isAuthenticated": false,
        }))
        .unwrap();
        assert_eq!(snapshot.access_token, None);
        assert!(!serde_json::to_value(&snapshot).unwrap().as_object().unwrap().contains_key("accessToken"));
    }
}
