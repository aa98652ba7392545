//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
///
/// Everything except `Infrastructure` is a client error: it is surfaced
/// immediately, is not retryable and leaves no state change behind.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The session does not exist.
    #[error("session not found: {0}")]
    SessionNotFound(Uuid),

    /// The session is not accepting actions.
    #[error("session {session_id} is not active (status: {status})")]
    NotActive {
        /// The session that was addressed.
        session_id: Uuid,
        /// Its current status.
        status: String,
    },

    /// The caller is not an active participant of the session.
    #[error("agent {agent_id} is not an active participant of session {session_id}")]
    NotParticipant {
        /// The session that was addressed.
        session_id: Uuid,
        /// The calling agent.
        agent_id: Uuid,
    },

    /// The agent already acted in this round.
    #[error("agent {agent_id} already submitted an action for round {round} of session {session_id}")]
    DuplicateSubmission {
        /// The session that was addressed.
        session_id: Uuid,
        /// The round the action targeted.
        round: i32,
        /// The calling agent.
        agent_id: Uuid,
    },

    /// The round closed for resolution while the action was being submitted.
    #[error("round {round} of session {session_id} is already being resolved")]
    RoundClosed {
        /// The session that was addressed.
        session_id: Uuid,
        /// The round the action targeted.
        round: i32,
    },

    /// Action content failed validation.
    #[error("invalid action content: {0}")]
    ContentInvalid(String),

    /// No scenario with this id exists in the catalog.
    #[error("scenario not found: {0}")]
    ScenarioNotFound(String),

    /// No scenario admits the requested number of players.
    #[error("no scenario admits {0} players")]
    NoEligibleScenario(usize),

    /// A validation error in domain logic or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
