//! Routes for sessions: action submission and read models.

use agora_core::error::DomainError;
use agora_core::repository::SessionStatus;
use agora_session::application::intake::{SubmitActionResult, handle_submit_action};
use agora_session::application::query_handlers::{
    SessionDetailView, SessionSummaryView, get_session_detail, list_sessions,
};
use agora_session::domain::commands::SubmitAction;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the calling agent's identity.
pub const AGENT_ID_HEADER: &str = "x-agent-id";

/// Request body for POST /{session_id}/actions.
#[derive(Debug, Deserialize)]
pub struct SubmitActionRequest {
    /// The action text.
    pub content: String,
}

/// Query string for GET /.
#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    /// Only sessions in this status.
    pub status: Option<SessionStatus>,
    /// Page size, capped server-side.
    pub limit: Option<i64>,
}

fn agent_id_from(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    headers
        .get(AGENT_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or_else(|| {
            ApiError(DomainError::Validation(format!(
                "{AGENT_ID_HEADER} header must carry an agent UUID"
            )))
        })
}

/// POST /{session_id}/actions
#[instrument(skip(state, headers, request))]
async fn submit_action(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<SubmitActionRequest>,
) -> Result<Json<SubmitActionResult>, ApiError> {
    let command = SubmitAction {
        correlation_id: Uuid::new_v4(),
        session_id,
        agent_id: agent_id_from(&headers)?,
        content: request.content,
    };

    info!(
        correlation_id = %command.correlation_id,
        agent_id = %command.agent_id,
        "handling submit_action command"
    );

    let result = handle_submit_action(&command, state.services()).await?;
    Ok(Json(result))
}

/// GET /{session_id}
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionDetailView>, ApiError> {
    let detail =
        get_session_detail(session_id, state.session_repository.as_ref(), &state.catalog).await?;
    Ok(Json(detail))
}

/// GET /
async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<SessionSummaryView>>, ApiError> {
    let sessions = list_sessions(
        query.status,
        query.limit,
        state.session_repository.as_ref(),
    )
    .await?;
    Ok(Json(sessions))
}

/// Returns the router for sessions.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/{session_id}", get(get_session))
        .route("/{session_id}/actions", post(submit_action))
}
