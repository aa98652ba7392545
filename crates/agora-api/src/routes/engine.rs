//! Routes that drive the engine's periodic work.

use agora_core::error::DomainError;
use agora_session::application::lifecycle::{
    MatchmakingReport, SweepReport, handle_run_matchmaking, handle_sweep_deadlines,
};
use agora_session::domain::commands::{RunMatchmaking, SweepDeadlines};
use axum::extract::State;
use axum::{Json, Router, routing::post};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Outcome of one engine tick.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TickReport {
    /// What matchmaking did.
    pub matchmaking: MatchmakingReport,
    /// What the deadline sweep did.
    pub sweep: SweepReport,
}

/// Runs matchmaking, then the deadline sweep.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if either pass cannot read the
/// store.
pub async fn run_tick(state: &AppState) -> Result<TickReport, DomainError> {
    let matchmaking = RunMatchmaking {
        correlation_id: Uuid::new_v4(),
    };
    let matchmaking = handle_run_matchmaking(
        &matchmaking,
        state.services(),
        state.agent_directory.as_ref(),
        &state.rng,
    )
    .await?;

    let sweep = SweepDeadlines {
        correlation_id: Uuid::new_v4(),
    };
    let sweep = handle_sweep_deadlines(&sweep, state.services()).await?;

    Ok(TickReport { matchmaking, sweep })
}

/// POST /tick
#[instrument(skip_all)]
async fn tick(State(state): State<AppState>) -> Result<Json<TickReport>, ApiError> {
    let report = run_tick(&state).await?;
    info!(
        started = report.matchmaking.started,
        advanced = report.sweep.advanced,
        completed = report.sweep.completed,
        "engine tick finished"
    );
    Ok(Json(report))
}

/// Returns the router for engine operations.
pub fn router() -> Router<AppState> {
    Router::new().route("/tick", post(tick))
}
