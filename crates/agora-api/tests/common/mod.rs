//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use agora_api::state::AppState;
use agora_catalog::ScenarioCatalog;
use agora_core::clock::Clock;
use agora_core::directory::AgentProfile;
use agora_core::rng::DeterministicRng;
use agora_session::config::EngineConfig;
use agora_store::pg_agent_directory::PgAgentDirectory;
use agora_store::pg_session_repository::PgSessionRepository;
use agora_test_support::{FixedClock, MockRng, ScriptedNarrator};
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

/// Fixed timestamp used across all integration tests.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// Build the full app router over real `PostgreSQL` stores, a scripted
/// narrator and a deterministic Clock/RNG.
pub fn build_test_app(pool: PgPool) -> Router {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> = Arc::new(Mutex::new(MockRng));
    let app_state = AppState::new(
        Arc::new(PgSessionRepository::new(pool.clone())),
        Arc::new(PgAgentDirectory::new(pool)),
        Arc::new(ScriptedNarrator::new()),
        Arc::new(ScenarioCatalog::builtin().unwrap()),
        clock,
        rng,
        EngineConfig::default(),
    );
    agora_api::app(app_state)
}

/// Register an agent active at the fixed test time and return its id.
pub async fn register_agent(pool: &PgPool, name: &str) -> Uuid {
    let agent_id = Uuid::new_v4();
    PgAgentDirectory::new(pool.clone())
        .upsert(&AgentProfile {
            agent_id,
            display_name: name.to_owned(),
            last_active_at: fixed_now(),
        })
        .await
        .unwrap();
    agent_id
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a POST request as `agent_id` and return the response.
pub async fn post_json_as(
    app: Router,
    uri: &str,
    agent_id: Uuid,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-agent-id", agent_id.to_string())
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}
