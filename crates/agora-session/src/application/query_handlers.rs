//! Read models for sessions.

use agora_catalog::ScenarioCatalog;
use agora_core::error::DomainError;
use agora_core::repository::{
    ParticipantStatus, SessionRecord, SessionRepository, SessionStatus, TranscriptEntry,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Default and maximum page size for session listings.
pub const LIST_LIMIT: i64 = 50;

/// A participant as shown in session detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantView {
    /// Agent identifier.
    pub agent_id: Uuid,
    /// Name snapshot taken when the agent was seated.
    pub display_name: String,
    /// Seat order.
    pub seat: i32,
    /// Current status.
    pub status: ParticipantStatus,
    /// Round in which the participant forfeited.
    pub forfeited_at_round: Option<i32>,
}

/// A resolved round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptRoundView {
    /// Round number.
    pub round: i32,
    /// Prompt issued for the round.
    pub prompt: String,
    /// Actions considered, forfeits included.
    pub entries: Vec<TranscriptEntry>,
    /// Resolved narrative.
    pub resolution: String,
    /// When the round was resolved.
    pub resolved_at: DateTime<Utc>,
}

/// An action submitted to the round in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingActionView {
    /// Acting agent.
    pub agent_id: Uuid,
    /// Acting agent's name snapshot.
    pub display_name: String,
    /// Submitted content.
    pub content: String,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

/// The unresolved current round of an active session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentRoundView {
    /// Round number.
    pub round: i32,
    /// Prompt participants are answering.
    pub prompt: Option<String>,
    /// When the round is force-resolved.
    pub deadline: Option<DateTime<Utc>>,
    /// Actions stored so far.
    pub actions: Vec<PendingActionView>,
    /// Active participants who have not acted yet.
    pub awaiting: Vec<Uuid>,
}

/// Full session detail: the transcript plus a preview of the round in
/// flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionDetailView {
    /// Session identifier.
    pub session_id: Uuid,
    /// Scenario identifier.
    pub scenario_id: String,
    /// Scenario display name, if the scenario is still in the catalog.
    pub scenario_name: Option<String>,
    /// Version of the catalog the session was created from.
    pub catalog_version: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Current round number.
    pub round: i32,
    /// Total rounds.
    pub round_budget: i32,
    /// Participants in seat order.
    pub participants: Vec<ParticipantView>,
    /// Resolved rounds in order.
    pub transcript: Vec<TranscriptRoundView>,
    /// The unresolved round, for active sessions.
    pub current_round: Option<CurrentRoundView>,
    /// Final summary, once completed.
    pub summary: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion or cancellation time.
    pub completed_at: Option<DateTime<Utc>>,
}

/// One row of a session listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummaryView {
    /// Session identifier.
    pub session_id: Uuid,
    /// Scenario identifier.
    pub scenario_id: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Current round number.
    pub round: i32,
    /// Total rounds.
    pub round_budget: i32,
    /// Current round deadline.
    pub round_deadline: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<SessionRecord> for SessionSummaryView {
    fn from(session: SessionRecord) -> Self {
        Self {
            session_id: session.id,
            scenario_id: session.scenario_id,
            status: session.status,
            round: session.round,
            round_budget: session.round_budget,
            round_deadline: session.round_deadline,
            created_at: session.created_at,
        }
    }
}

/// Returns the detail view for a session.
///
/// # Errors
///
/// Returns `DomainError::SessionNotFound` if the session does not exist,
/// or `DomainError::Infrastructure` if the store fails.
pub async fn get_session_detail(
    session_id: Uuid,
    repo: &dyn SessionRepository,
    catalog: &ScenarioCatalog,
) -> Result<SessionDetailView, DomainError> {
    let session = repo
        .load_session(session_id)
        .await?
        .ok_or(DomainError::SessionNotFound(session_id))?;
    let participants = repo.load_participants(session_id).await?;
    let transcript = repo.load_transcript(session_id).await?;

    let current_round = if session.status == SessionStatus::Active {
        let actions = repo.load_actions(session_id, session.round).await?;
        let name_of = |agent_id: Uuid| {
            participants
                .iter()
                .find(|p| p.agent_id == agent_id)
                .map(|p| p.display_name.clone())
                .unwrap_or_default()
        };
        let awaiting = participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Active)
            .filter(|p| !actions.iter().any(|a| a.agent_id == p.agent_id))
            .map(|p| p.agent_id)
            .collect();
        Some(CurrentRoundView {
            round: session.round,
            prompt: session.prompt.clone(),
            deadline: session.round_deadline,
            actions: actions
                .into_iter()
                .map(|a| PendingActionView {
                    display_name: name_of(a.agent_id),
                    agent_id: a.agent_id,
                    content: a.content,
                    submitted_at: a.submitted_at,
                })
                .collect(),
            awaiting,
        })
    } else {
        None
    };

    Ok(SessionDetailView {
        session_id,
        scenario_name: catalog
            .get(&session.scenario_id)
            .ok()
            .map(|s| s.name.clone()),
        scenario_id: session.scenario_id,
        catalog_version: session.catalog_version,
        status: session.status,
        round: session.round,
        round_budget: session.round_budget,
        participants: participants
            .into_iter()
            .map(|p| ParticipantView {
                agent_id: p.agent_id,
                display_name: p.display_name,
                seat: p.seat,
                status: p.status,
                forfeited_at_round: p.forfeited_at_round,
            })
            .collect(),
        transcript: transcript
            .into_iter()
            .map(|t| TranscriptRoundView {
                round: t.round,
                prompt: t.prompt,
                entries: t.entries,
                resolution: t.resolution,
                resolved_at: t.resolved_at,
            })
            .collect(),
        current_round,
        summary: session.summary,
        created_at: session.created_at,
        started_at: session.started_at,
        completed_at: session.completed_at,
    })
}

/// Lists sessions newest first, optionally filtered by status.
///
/// `limit` is clamped to `1..=LIST_LIMIT`.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the store fails.
pub async fn list_sessions(
    status: Option<SessionStatus>,
    limit: Option<i64>,
    repo: &dyn SessionRepository,
) -> Result<Vec<SessionSummaryView>, DomainError> {
    let limit = limit.unwrap_or(LIST_LIMIT).clamp(1, LIST_LIMIT);
    Ok(repo
        .list_sessions(status, limit)
        .await?
        .into_iter()
        .map(SessionSummaryView::from)
        .collect())
}
