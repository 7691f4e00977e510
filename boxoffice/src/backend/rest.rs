//! Hosted backend over HTTPS.
//!
//! Tables are read and written through the PostgREST dialect
//! (`/rest/v1/<table>`, filters such as `id=eq.<value>`), authentication goes
//! through the GoTrue endpoints under `/auth/v1`. Every request carries the
//! project's anon key as `apikey`; the bearer token is the signed-in user's
//! access token when there is one, the anon key otherwise. A token cached
//! from an earlier run is checked against `/auth/v1/user` and re-attached by
//! [`IdentityProvider::resume`].
//!
//! Inventory claims are optimistic: read `available_tickets`, then
//! `PATCH … ?available_tickets=eq.<observed>`. An empty result means another
//! writer got there first and is reported as [`StoreError::Conflict`].

use super::{EventRepository, NotificationRepository, StoreError, StoreResult, TicketRepository};
use crate::session::{AuthSession, IdentityProvider, SessionError, SessionUser, SignUp};
use crate::types::{DigitalTicket, Event, EventId, Notification, NotificationId, Role, TicketId, TicketType, UserId};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// Client for the hosted store and identity provider.
pub struct RestBackend {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: RwLock<Option<String>>,
}

impl RestBackend {
    /// Client for the project at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            access_token: RwLock::new(None),
        })
    }

    fn bearer(&self) -> String {
        self.access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/rest/v1/{table}", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    fn auth(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/auth/v1/{path}", self.base_url))
            .header("apikey", &self.anon_key)
    }

    async fn send(request: RequestBuilder) -> StoreResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Unauthorized(body),
            StatusCode::NOT_FOUND => StoreError::NotFound(body),
            StatusCode::TOO_MANY_REQUESTS => StoreError::Unavailable(format!("rate limited: {body}")),
            s if s.is_server_error() => StoreError::Unavailable(format!("{}: {body}", s.as_u16())),
            s => StoreError::Api {
                status: s.as_u16(),
                message: body,
            },
        })
    }

    async fn rows<T: DeserializeOwned>(request: RequestBuilder) -> StoreResult<Vec<T>> {
        Self::send(request)
            .await?
            .json::<Vec<T>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn first<T: DeserializeOwned>(request: RequestBuilder) -> StoreResult<Option<T>> {
        Ok(Self::rows(request).await?.into_iter().next())
    }

    async fn inventory(&self, id: EventId) -> StoreResult<InventoryRow> {
        Self::first(
            self.table(Method::GET, "events")
                .query(&[("select", "available_tickets,total_tickets"), ("id", format!("eq.{id}").as_str())]),
        )
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("event {id}")))
    }

    async fn set_available(&self, id: EventId, observed: u32, next: u32) -> StoreResult<u32> {
        let updated: Vec<InventoryRow> = Self::rows(
            self.table(Method::PATCH, "events")
                .query(&[
                    ("id", format!("eq.{id}")),
                    ("available_tickets", format!("eq.{observed}")),
                    ("select", "available_tickets,total_tickets".to_string()),
                ])
                .header("Prefer", "return=representation")
                .json(&json!({ "available_tickets": next })),
        )
        .await?;

        match updated.first() {
            Some(row) => Ok(row.available_tickets),
            None => Err(StoreError::Conflict),
        }
    }

    async fn profile(&self, user_id: UserId) -> StoreResult<Option<ProfileRow>> {
        Self::first(
            self.table(Method::GET, "profiles")
                .query(&[("select", "full_name,role"), ("id", format!("eq.{user_id}").as_str())]),
        )
        .await
    }
}

#[derive(Deserialize)]
struct InventoryRow {
    available_tickets: u32,
    total_tickets: u32,
}

#[derive(Deserialize)]
struct ProfileRow {
    full_name: Option<String>,
    role: Role,
}

#[derive(Serialize)]
struct NewProfile<'a> {
    id: UserId,
    email: &'a str,
    full_name: &'a str,
    role: Role,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
}

fn provider_error(error: StoreError) -> SessionError {
    SessionError::Provider(error.to_string())
}

#[async_trait]
impl EventRepository for RestBackend {
    async fn fetch_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        Self::first(
            self.table(Method::GET, "events")
                .query(&[("select", "*"), ("id", format!("eq.{id}").as_str())]),
        )
        .await
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        Self::rows(
            self.table(Method::GET, "events")
                .query(&[("select", "*"), ("order", "date.asc,time.asc")]),
        )
        .await
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        Self::send(
            self.table(Method::POST, "events")
                .header("Prefer", "return=minimal")
                .json(event),
        )
        .await?;
        Ok(())
    }

    async fn delete_event(&self, id: EventId) -> StoreResult<bool> {
        let deleted: Vec<serde_json::Value> = Self::rows(
            self.table(Method::DELETE, "events")
                .query(&[("id", format!("eq.{id}")), ("select", "id".to_string())])
                .header("Prefer", "return=representation"),
        )
        .await?;
        Ok(!deleted.is_empty())
    }

    async fn claim_tickets(&self, id: EventId, quantity: u32) -> StoreResult<u32> {
        let row = self.inventory(id).await?;
        if row.available_tickets < quantity {
            return Err(StoreError::InsufficientInventory {
                requested: quantity,
                available: row.available_tickets,
            });
        }
        self.set_available(id, row.available_tickets, row.available_tickets - quantity)
            .await
    }

    async fn release_tickets(&self, id: EventId, quantity: u32) -> StoreResult<u32> {
        let row = self.inventory(id).await?;
        let next = row.available_tickets.saturating_add(quantity).min(row.total_tickets);
        self.set_available(id, row.available_tickets, next).await
    }
}

#[async_trait]
impl TicketRepository for RestBackend {
    async fn insert_ticket(&self, ticket: &DigitalTicket) -> StoreResult<()> {
        Self::send(
            self.table(Method::POST, "tickets")
                .header("Prefer", "return=minimal")
                .json(ticket),
        )
        .await?;
        Ok(())
    }

    async fn tickets_for_customer(&self, customer_id: &str) -> StoreResult<Vec<DigitalTicket>> {
        Self::rows(self.table(Method::GET, "tickets").query(&[
            ("select", "*".to_string()),
            ("customer_id", format!("eq.{customer_id}")),
            ("order", "purchase_date.desc".to_string()),
        ]))
        .await
    }

    async fn fetch_ticket(&self, id: &TicketId) -> StoreResult<Option<DigitalTicket>> {
        Self::first(
            self.table(Method::GET, "tickets")
                .query(&[("select", "*".to_string()), ("id", format!("eq.{id}"))]),
        )
        .await
    }

    async fn find_by_access_code(&self, access_code: &str) -> StoreResult<Option<DigitalTicket>> {
        Self::first(
            self.table(Method::GET, "tickets")
                .query(&[("select", "*".to_string()), ("access_code", format!("eq.{access_code}"))]),
        )
        .await
    }

    async fn mark_used(&self, id: &TicketId) -> StoreResult<bool> {
        let updated: Vec<serde_json::Value> = Self::rows(
            self.table(Method::PATCH, "tickets")
                .query(&[
                    ("id", format!("eq.{id}")),
                    ("used", "eq.false".to_string()),
                    ("select", "id".to_string()),
                ])
                .header("Prefer", "return=representation")
                .json(&json!({ "used": true })),
        )
        .await?;

        if !updated.is_empty() {
            return Ok(true);
        }
        match self.fetch_ticket(id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("ticket {id}"))),
        }
    }

    async fn update_ticket_type(&self, id: &TicketId, ticket_type: TicketType) -> StoreResult<bool> {
        let updated: Vec<serde_json::Value> = Self::rows(
            self.table(Method::PATCH, "tickets")
                .query(&[
                    ("id", format!("eq.{id}")),
                    ("used", "eq.false".to_string()),
                    ("select", "id".to_string()),
                ])
                .header("Prefer", "return=representation")
                .json(&json!({ "ticket_type": ticket_type })),
        )
        .await?;

        if !updated.is_empty() {
            return Ok(true);
        }
        match self.fetch_ticket(id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("ticket {id}"))),
        }
    }
}

#[async_trait]
impl NotificationRepository for RestBackend {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        Self::send(
            self.table(Method::POST, "notifications")
                .header("Prefer", "return=minimal")
                .json(notification),
        )
        .await?;
        Ok(())
    }

    async fn notifications_for(&self, user_id: Option<UserId>) -> StoreResult<Vec<Notification>> {
        let audience = match user_id {
            Some(user_id) => ("or", format!("(user_id.eq.{user_id},user_id.is.null)")),
            None => ("user_id", "is.null".to_string()),
        };
        Self::rows(self.table(Method::GET, "notifications").query(&[
            ("select", "*".to_string()),
            (audience.0, audience.1),
            ("order", "created_at.desc".to_string()),
        ]))
        .await
    }

    async fn mark_read(&self, id: NotificationId) -> StoreResult<()> {
        Self::send(
            self.table(Method::PATCH, "notifications")
                .query(&[("id", format!("eq.{id}"))])
                .header("Prefer", "return=minimal")
                .json(&json!({ "read": true })),
        )
        .await?;
        Ok(())
    }

    async fn mark_all_read(&self, user_id: UserId) -> StoreResult<usize> {
        let updated: Vec<serde_json::Value> = Self::rows(
            self.table(Method::PATCH, "notifications")
                .query(&[
                    ("user_id", format!("eq.{user_id}")),
                    ("read", "eq.false".to_string()),
                    ("select", "id".to_string()),
                ])
                .header("Prefer", "return=representation")
                .json(&json!({ "read": true })),
        )
        .await?;
        Ok(updated.len())
    }
}

#[async_trait]
impl IdentityProvider for RestBackend {
    async fn sign_up(&self, form: &SignUp) -> Result<AuthSession, SessionError> {
        let response = Self::send(self.auth("signup").json(&json!({
            "email": form.email,
            "password": form.password,
            "data": { "full_name": form.full_name },
        })))
        .await;

        let token: TokenResponse = match response {
            Ok(response) => response
                .json()
                .await
                .map_err(|e| SessionError::Provider(e.to_string()))?,
            Err(StoreError::Api { status: 422, .. }) => return Err(SessionError::EmailTaken(form.email.clone())),
            Err(error) => return Err(provider_error(error)),
        };

        self.set_access_token(Some(token.access_token.clone()));
        let user = SessionUser {
            id: token.user.id,
            email: token.user.email.unwrap_or_else(|| form.email.clone()),
            full_name: form.full_name.clone(),
            role: Role::User,
        };

        Self::send(
            self.table(Method::POST, "profiles")
                .header("Prefer", "return=minimal")
                .json(&NewProfile {
                    id: user.id,
                    email: &user.email,
                    full_name: &user.full_name,
                    role: user.role,
                }),
        )
        .await
        .map_err(provider_error)?;

        Ok(AuthSession {
            user,
            access_token: token.access_token,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, SessionError> {
        let response = Self::send(
            self.auth("token")
                .query(&[("grant_type", "password")])
                .json(&json!({ "email": email, "password": password })),
        )
        .await;

        let token: TokenResponse = match response {
            Ok(response) => response
                .json()
                .await
                .map_err(|e| SessionError::Provider(e.to_string()))?,
            Err(StoreError::Api { status: 400, .. } | StoreError::Unauthorized(_)) => {
                return Err(SessionError::InvalidCredentials);
            },
            Err(error) => return Err(provider_error(error)),
        };

        self.set_access_token(Some(token.access_token.clone()));
        let email = token.user.email.unwrap_or_else(|| email.to_string());
        let profile = self.profile(token.user.id).await.map_err(provider_error)?;
        let (full_name, role) = match profile {
            Some(profile) => (profile.full_name.unwrap_or_else(|| email.clone()), profile.role),
            None => (email.clone(), Role::User),
        };

        Ok(AuthSession {
            user: SessionUser {
                id: token.user.id,
                email,
                full_name,
                role,
            },
            access_token: token.access_token,
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), SessionError> {
        self.set_access_token(None);
        Self::send(self.auth("logout").bearer_auth(access_token))
            .await
            .map_err(provider_error)?;
        Ok(())
    }

    async fn resume(&self, access_token: &str) -> Result<(), SessionError> {
        let response = Self::send(
            self.client
                .get(format!("{}/auth/v1/user", self.base_url))
                .header("apikey", &self.anon_key)
                .bearer_auth(access_token),
        )
        .await;

        match response {
            Ok(_) => {
                self.set_access_token(Some(access_token.to_string()));
                Ok(())
            },
            Err(StoreError::Unauthorized(_)) => Err(SessionError::InvalidCredentials),
            Err(error) => {
                // Provider unreachable: keep the token.
                self.set_access_token(Some(access_token.to_string()));
                Err(provider_error(error))
            },
        }
    }
}
