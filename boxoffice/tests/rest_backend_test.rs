//! `RestBackend` against a mock hosted project.

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use boxoffice::backend::{
    EventRepository, NotificationRepository, RestBackend, StoreError, TicketRepository,
};
use boxoffice::catalog::EventCatalog;
use boxoffice::config::Config;
use boxoffice::seed;
use boxoffice::session::{IdentityProvider, SessionError};
use boxoffice::types::{Role, TicketId, TicketType, UserId};
use boxoffice::{Backends, BoxOffice};
use boxoffice_runtime::retry::RetryPolicy;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ANON_KEY: &str = "anon-key";

fn backend(server: &MockServer) -> RestBackend {
    RestBackend::new(server.uri(), ANON_KEY, Duration::from_secs(5)).unwrap()
}

fn inventory(available: u32) -> serde_json::Value {
    json!([{ "available_tickets": available, "total_tickets": 10 }])
}

#[tokio::test]
async fn fetch_event_sends_project_headers() {
    let server = MockServer::start().await;
    let event = seed::events().remove(0);

    Mock::given(method("GET"))
        .and(path("/rest/v1/events"))
        .and(query_param("id", format!("eq.{}", event.id)))
        .and(header("apikey", ANON_KEY))
        .and(header("authorization", format!("Bearer {ANON_KEY}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([event])))
        .expect(1)
        .mount(&server)
        .await;

    let fetched = backend(&server).fetch_event(event.id).await.unwrap();
    assert_eq!(fetched, Some(event));
}

#[tokio::test]
async fn missing_event_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert_eq!(backend(&server).fetch_event(seed::events()[0].id).await, Ok(None));
}

#[tokio::test]
async fn claim_is_conditional_on_observed_count() {
    let server = MockServer::start().await;
    let id = seed::events()[0].id;

    Mock::given(method("GET"))
        .and(path("/rest/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(inventory(5)))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/events"))
        .and(query_param("id", format!("eq.{id}")))
        .and(query_param("available_tickets", "eq.5"))
        .and(header("prefer", "return=representation"))
        .and(body_json(json!({ "available_tickets": 3 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(inventory(3)))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(backend(&server).claim_tickets(id, 2).await, Ok(3));
}

#[tokio::test]
async fn lost_race_is_a_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(inventory(5)))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert_eq!(
        backend(&server).claim_tickets(seed::events()[0].id, 2).await,
        Err(StoreError::Conflict)
    );
}

#[tokio::test]
async fn insufficient_inventory_never_patches() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(inventory(1)))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(inventory(0)))
        .expect(0)
        .mount(&server)
        .await;

    assert_eq!(
        backend(&server).claim_tickets(seed::events()[0].id, 2).await,
        Err(StoreError::InsufficientInventory {
            requested: 2,
            available: 1
        })
    );
}

#[tokio::test]
async fn catalog_retries_conflicts_until_claim_lands() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(inventory(5)))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(inventory(4)))
        .expect(1)
        .mount(&server)
        .await;

    let retry = RetryPolicy::builder()
        .max_retries(3)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(5))
        .build();
    let catalog = EventCatalog::new(Arc::new(backend(&server)), retry);

    assert_eq!(catalog.claim(seed::events()[0].id, 1).await, Ok(4));
}

#[tokio::test]
async fn http_failures_map_to_store_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/events"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/tickets"))
        .respond_with(ResponseTemplate::new(401).set_body_string("JWT expired"))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let events = backend.list_events().await.unwrap_err();
    assert!(matches!(events, StoreError::Unavailable(_)));
    assert!(events.is_transient());

    let tickets = backend.tickets_for_customer("someone").await.unwrap_err();
    assert_eq!(tickets, StoreError::Unauthorized("JWT expired".to_string()));
}

#[tokio::test]
async fn garbage_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/events"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    assert!(matches!(backend(&server).list_events().await, Err(StoreError::Decode(_))));
}

#[tokio::test]
async fn second_scan_reports_unchanged() {
    let server = MockServer::start().await;
    let id = TicketId::new("TKT-AAAA1111");
    let ticket = json!([{
        "id": "TKT-AAAA1111",
        "event_id": seed::events()[0].id,
        "customer_id": "anon-1",
        "ticket_type": "STANDARD",
        "quantity": 1,
        "purchase_date": "2026-01-01T00:00:00Z",
        "used": true,
        "qr_code": "https://tickets.test/verify/TKT-AAAA1111",
        "barcode": "0000000000001",
        "access_code": "123456",
    }]);

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/tickets"))
        .and(query_param("used", "eq.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/tickets"))
        .and(query_param("id", "eq.TKT-AAAA1111"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ticket))
        .mount(&server)
        .await;

    assert_eq!(backend(&server).mark_used(&id).await, Ok(false));
}

#[tokio::test]
async fn inbox_query_includes_broadcasts() {
    let server = MockServer::start().await;
    let user = UserId::new();

    Mock::given(method("GET"))
        .and(path("/rest/v1/notifications"))
        .and(query_param("or", format!("(user_id.eq.{user},user_id.is.null)")))
        .and(query_param("order", "created_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "user_id": null,
            "title": "Festival season",
            "message": "New events are live",
            "type": "INFO",
            "read": false,
            "created_at": "2026-01-01T00:00:00Z",
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let notifications = backend(&server).notifications_for(Some(user)).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, None);
}

#[tokio::test]
async fn sign_in_reads_role_and_switches_bearer() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(body_json(json!({ "email": "org@example.com", "password": "pw" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-jwt",
            "user": { "id": user_id, "email": "org@example.com" },
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", format!("eq.{user_id}")))
        .and(header("authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "full_name": "Org Anizer", "role": "organizer" }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/tickets"))
        .and(header("authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend(&server);
    let session = backend.sign_in("org@example.com", "pw").await.unwrap();

    assert_eq!(session.user.id, UserId::from_uuid(user_id));
    assert_eq!(session.user.role, Role::Organizer);
    assert_eq!(session.user.full_name, "Org Anizer");
    assert_eq!(session.access_token, "user-jwt");
    assert!(backend.tickets_for_customer(&user_id.to_string()).await.unwrap().is_empty());
}

#[tokio::test]
async fn wrong_password_is_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
        .mount(&server)
        .await;

    assert_eq!(
        backend(&server).sign_in("x@example.com", "nope").await.unwrap_err(),
        SessionError::InvalidCredentials
    );
}

fn office_on(server: &MockServer, config: Config) -> BoxOffice {
    BoxOffice::builder(config, Backends::rest(Arc::new(backend(server)))).build()
}

#[tokio::test]
async fn restored_session_uses_the_cached_token() {
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();
    let dir = std::env::temp_dir().join(format!("boxoffice-rest-session-{}", Uuid::new_v4().simple()));
    let mut config = Config::default();
    config.session.cache_path = Some(dir.join("session.json"));

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-jwt",
            "user": { "id": user_id, "email": "fan@example.com" },
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "full_name": "Fan", "role": "user" }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": user_id })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/tickets"))
        .and(query_param("customer_id", format!("eq.{user_id}")))
        .and(header("authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", "Bearer user-jwt"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let first = office_on(&server, config.clone());
    let session = first.sessions().sign_in("fan@example.com", "pw").await.unwrap();
    first.shutdown().await;

    let restarted = office_on(&server, config);
    let restored = restarted.sessions().restore().await;
    assert_eq!(restored.user, session.user);
    assert!(restarted.tickets_for_current_holder(&restored).await.is_empty());

    restarted.sessions().sign_out().await;
    assert!(!restarted.sessions().restore().await.is_authenticated());

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn expired_token_is_not_resumed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "msg": "JWT expired" })))
        .mount(&server)
        .await;

    assert_eq!(
        backend(&server).resume("stale-jwt").await,
        Err(SessionError::InvalidCredentials)
    );
}

#[tokio::test]
async fn upgrade_is_conditional_on_unused() {
    let server = MockServer::start().await;
    let id = TicketId::new("TKT-BBBB2222");

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/tickets"))
        .and(query_param("id", "eq.TKT-BBBB2222"))
        .and(query_param("used", "eq.false"))
        .and(body_json(json!({ "ticket_type": "VIP" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/tickets"))
        .and(query_param("id", "eq.TKT-BBBB2222"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "TKT-BBBB2222",
            "event_id": seed::events()[0].id,
            "customer_id": "anon-1",
            "ticket_type": "STANDARD",
            "quantity": 1,
            "purchase_date": "2026-01-01T00:00:00Z",
            "used": true,
            "qr_code": "https://tickets.test/verify/TKT-BBBB2222",
            "barcode": "0000000000002",
            "access_code": "654321",
        }])))
        .mount(&server)
        .await;

    assert_eq!(backend(&server).update_ticket_type(&id, TicketType::Vip).await, Ok(false));
}
