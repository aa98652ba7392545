//! Action intake: validates and stores one participant action, then gives
//! the advancement primitive one chance to resolve the round.

use agora_core::command::Command;
use agora_core::error::DomainError;
use agora_core::repository::{
    ActionInsert, ActionRecord, ParticipantRecord, ParticipantStatus, SessionRecord,
    SessionStatus,
};
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::application::advancement::{AdvanceOutcome, advance_round};
use crate::application::services::SessionServices;
use crate::domain::commands::SubmitAction;

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitActionResult {
    /// The session acted in.
    pub session_id: Uuid,
    /// The session's current round after the advancement attempt.
    pub round: i32,
    /// The session's current status after the advancement attempt.
    pub status: SessionStatus,
    /// Whether the advancement primitive was invoked, including attempts
    /// that failed.
    pub advancement_attempted: bool,
    /// Whether that attempt resolved the round.
    pub round_advanced: bool,
}

fn ensure_active(session: &SessionRecord) -> Result<(), DomainError> {
    if session.status == SessionStatus::Active {
        Ok(())
    } else {
        Err(DomainError::NotActive {
            session_id: session.id,
            status: session.status.to_string(),
        })
    }
}

fn ensure_participant(
    session_id: Uuid,
    agent_id: Uuid,
    participants: &[ParticipantRecord],
) -> Result<(), DomainError> {
    let active = participants
        .iter()
        .any(|p| p.agent_id == agent_id && p.status == ParticipantStatus::Active);
    if active {
        Ok(())
    } else {
        Err(DomainError::NotParticipant {
            session_id,
            agent_id,
        })
    }
}

fn validate_content(
    services: SessionServices<'_>,
    session: &SessionRecord,
    content: &str,
) -> Result<String, DomainError> {
    if content.trim().is_empty() {
        return Err(DomainError::ContentInvalid("content must not be empty".into()));
    }
    let limit = services.config.max_action_chars;
    let length = content.chars().count();
    if length > limit {
        return Err(DomainError::ContentInvalid(format!(
            "content is {length} characters, the limit is {limit}"
        )));
    }
    let scenario = services.catalog.get(&session.scenario_id)?;
    let round = u32::try_from(session.round).unwrap_or_default();
    scenario.scene_for_round(round).action.normalize(content)
}

/// Explains why the store refused an action that passed validation.
async fn closed_reason(
    services: SessionServices<'_>,
    session_id: Uuid,
    agent_id: Uuid,
    round: i32,
) -> DomainError {
    let current = async {
        let session = services.repo.load_session(session_id).await?;
        let participants = services.repo.load_participants(session_id).await?;
        Ok::<_, DomainError>((session, participants))
    }
    .await;
    match current {
        Ok((None, _)) => DomainError::SessionNotFound(session_id),
        Ok((Some(session), participants)) => ensure_active(&session)
            .and_then(|()| ensure_participant(session_id, agent_id, &participants))
            .err()
            .unwrap_or(DomainError::RoundClosed { session_id, round }),
        Err(e) => e,
    }
}

/// Handles the `SubmitAction` command.
///
/// Stores the action, then invokes the advancement primitive exactly once.
/// The caller learns whether advancement ran and whether it moved the
/// round, never the resolution itself. An advancement failure is logged and
/// does not fail the accepted action; the round stays retryable.
///
/// # Errors
///
/// Returns `DomainError::SessionNotFound`, `NotActive`, `NotParticipant`,
/// `ContentInvalid`, `DuplicateSubmission` or `RoundClosed` for a rejected
/// action, and `DomainError::Infrastructure` if the store fails.
#[instrument(
    skip(command, services),
    fields(
        correlation_id = %command.correlation_id(),
        session_id = %command.session_id,
        agent_id = %command.agent_id
    )
)]
pub async fn handle_submit_action(
    command: &SubmitAction,
    services: SessionServices<'_>,
) -> Result<SubmitActionResult, DomainError> {
    let session_id = command.session_id;
    let agent_id = command.agent_id;

    let session = services
        .repo
        .load_session(session_id)
        .await?
        .ok_or(DomainError::SessionNotFound(session_id))?;
    ensure_active(&session)?;
    let participants = services.repo.load_participants(session_id).await?;
    ensure_participant(session_id, agent_id, &participants)?;
    let content = validate_content(services, &session, &command.content)?;

    let now = services.clock.now();
    let action = ActionRecord {
        session_id,
        round: session.round,
        agent_id,
        content,
        submitted_at: now,
    };
    match services.repo.insert_action(&action, now).await? {
        ActionInsert::Inserted => {}
        ActionInsert::Duplicate => {
            return Err(DomainError::DuplicateSubmission {
                session_id,
                round: session.round,
                agent_id,
            });
        }
        ActionInsert::RoundClosed => {
            return Err(closed_reason(services, session_id, agent_id, session.round).await);
        }
    }
    info!(round = session.round, "action accepted");

    // The action is stored whatever the advancement attempt does.
    let (round, status, round_advanced) =
        match advance_round(services, session_id, session.round).await {
            Ok(AdvanceOutcome::Advanced { round }) => (round, SessionStatus::Active, true),
            Ok(AdvanceOutcome::Completed { round }) => (round, SessionStatus::Completed, true),
            Ok(_) => (session.round, session.status, false),
            Err(e) => {
                error!(error = %e, "advancement failed after action was stored");
                (session.round, session.status, false)
            }
        };

    Ok(SubmitActionResult {
        session_id,
        round,
        status,
        advancement_attempted: true,
        round_advanced,
    })
}
