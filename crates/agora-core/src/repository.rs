//! Session repository abstraction.
//!
//! The store is the only synchronization primitive the engine has. Every
//! state transition is a conditional write that reports whether it applied;
//! a write that did not apply means another invocation got there first.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Formed by matchmaking, waiting to start.
    Pending,
    /// Accepting actions for its current round.
    Active,
    /// All rounds resolved (terminal).
    Completed,
    /// Matchmaking timed out before the session started (terminal).
    Cancelled,
}

impl SessionStatus {
    /// Stable string form used in storage and responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::Infrastructure(format!(
                "unknown session status: {other}"
            ))),
        }
    }
}

/// Status of a participant within a session. Forfeiture is permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Expected to act every round.
    Active,
    /// Missed a round deadline; excluded from readiness checks.
    Forfeited,
}

impl ParticipantStatus {
    /// Stable string form used in storage and responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Forfeited => "forfeited",
        }
    }
}

impl FromStr for ParticipantStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "forfeited" => Ok(Self::Forfeited),
            other => Err(DomainError::Infrastructure(format!(
                "unknown participant status: {other}"
            ))),
        }
    }
}

/// A resolving marker held by the invocation that won a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundClaim {
    /// Token identifying the claiming invocation.
    pub token: Uuid,
    /// The round being resolved.
    pub round: i32,
    /// After this instant the claim is considered abandoned.
    pub expires_at: DateTime<Utc>,
}

/// Persisted session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Session identifier.
    pub id: Uuid,
    /// Catalog scenario this session runs.
    pub scenario_id: String,
    /// Catalog digest at creation time.
    pub catalog_version: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Current round, 0-based.
    pub round: i32,
    /// Total number of rounds.
    pub round_budget: i32,
    /// Deadline of the current round (unset until started).
    pub round_deadline: Option<DateTime<Utc>>,
    /// Prompt issued for the current round (unset until started).
    pub prompt: Option<String>,
    /// Final summary (set on completion).
    pub summary: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// When the session became active.
    pub started_at: Option<DateTime<Utc>>,
    /// When the session reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Resolution claim, if one is outstanding.
    pub claim: Option<RoundClaim>,
}

/// Persisted participant row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRecord {
    /// Owning session.
    pub session_id: Uuid,
    /// Agent identifier.
    pub agent_id: Uuid,
    /// Display name captured when the agent joined.
    pub display_name: String,
    /// Join order, 0-based.
    pub seat: i32,
    /// Participation status.
    pub status: ParticipantStatus,
    /// Round in which the participant forfeited.
    pub forfeited_at_round: Option<i32>,
    /// When the agent joined.
    pub joined_at: DateTime<Utc>,
}

/// Persisted action row. Unique per (session, round, agent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    /// Owning session.
    pub session_id: Uuid,
    /// Round the action belongs to.
    pub round: i32,
    /// Acting agent.
    pub agent_id: Uuid,
    /// Submitted content.
    pub content: String,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
}

/// One participant's line in a resolved round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Agent identifier.
    pub agent_id: Uuid,
    /// Display name snapshot.
    pub display_name: String,
    /// What the agent submitted, `None` for a forfeit.
    pub content: Option<String>,
    /// Whether this entry is a forfeit marker.
    pub forfeited: bool,
}

/// The immutable record of a resolved round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRound {
    /// Owning session.
    pub session_id: Uuid,
    /// Round number.
    pub round: i32,
    /// Prompt issued for the round.
    pub prompt: String,
    /// Actions considered, in seat order.
    pub entries: Vec<TranscriptEntry>,
    /// Narrative resolution.
    pub resolution: String,
    /// Resolution time.
    pub resolved_at: DateTime<Utc>,
}

/// A participant to seat in a new or pending session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParticipant {
    /// Agent identifier.
    pub agent_id: Uuid,
    /// Display name snapshot.
    pub display_name: String,
}

/// A session to create in `pending` status.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Session identifier.
    pub id: Uuid,
    /// Catalog scenario.
    pub scenario_id: String,
    /// Catalog digest.
    pub catalog_version: String,
    /// Total number of rounds.
    pub round_budget: i32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Initial participants, in seat order.
    pub participants: Vec<NewParticipant>,
}

/// Opening state written when a session goes from pending to active.
#[derive(Debug, Clone)]
pub struct SessionStart {
    /// Prompt for round 0.
    pub prompt: String,
    /// Deadline for round 0.
    pub deadline: DateTime<Utc>,
    /// Start time.
    pub started_at: DateTime<Utc>,
}

/// What happens to the session after a round is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Open the next round.
    Continue {
        /// Prompt for the next round.
        prompt: String,
        /// Deadline for the next round.
        deadline: DateTime<Utc>,
    },
    /// The session is over.
    Complete {
        /// Session summary.
        summary: String,
        /// Completion time.
        completed_at: DateTime<Utc>,
    },
}

/// Everything written by a round resolution, applied as one unit.
#[derive(Debug, Clone)]
pub struct RoundFinalization {
    /// Token of the claim that authorizes the write.
    pub claim_token: Uuid,
    /// The transcript entry for the resolved round.
    pub transcript: TranscriptRound,
    /// Agents whose status flips to forfeited in this round.
    pub forfeits: Vec<Uuid>,
    /// Session transition.
    pub outcome: RoundOutcome,
}

/// Result of an action insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionInsert {
    /// The action was stored.
    Inserted,
    /// An action already exists for (session, round, agent).
    Duplicate,
    /// The session moved past the round, left `active`, holds a live claim
    /// on it, or the agent is no longer an active participant.
    RoundClosed,
}

/// Persistence port for the session engine.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Creates a session in `pending` status along with its participants.
    /// Returns `false` and writes nothing if any participant is already
    /// engaged in a pending or active session.
    async fn create_session(&self, session: &NewSession) -> Result<bool, DomainError>;

    /// Loads a session row.
    async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>, DomainError>;

    /// Lists sessions newest first, optionally filtered by status.
    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        limit: i64,
    ) -> Result<Vec<SessionRecord>, DomainError>;

    /// Loads participants in seat order.
    async fn load_participants(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ParticipantRecord>, DomainError>;

    /// Loads the actions stored for one round.
    async fn load_actions(
        &self,
        session_id: Uuid,
        round: i32,
    ) -> Result<Vec<ActionRecord>, DomainError>;

    /// Loads the transcript in round order.
    async fn load_transcript(&self, session_id: Uuid)
    -> Result<Vec<TranscriptRound>, DomainError>;

    /// Stores an action if the session is still `active` at `action.round`,
    /// the round is not claimed (as of `now`) and the agent is an active
    /// participant. Never overwrites an existing action.
    async fn insert_action(
        &self,
        action: &ActionRecord,
        now: DateTime<Utc>,
    ) -> Result<ActionInsert, DomainError>;

    /// Seats an agent in a `pending` session. Returns `false` if the session
    /// is no longer pending, is full, or the agent is already engaged.
    async fn join_pending(
        &self,
        session_id: Uuid,
        participant: &NewParticipant,
        max_players: usize,
        joined_at: DateTime<Utc>,
    ) -> Result<bool, DomainError>;

    /// Transitions `pending → active` and opens round 0.
    async fn start_session(
        &self,
        session_id: Uuid,
        start: &SessionStart,
    ) -> Result<bool, DomainError>;

    /// Transitions `pending → cancelled`.
    async fn cancel_session(
        &self,
        session_id: Uuid,
        cancelled_at: DateTime<Utc>,
    ) -> Result<bool, DomainError>;

    /// Claims `round` for resolution if the session is `active` at that
    /// round and holds no live claim as of `now`.
    async fn claim_round(
        &self,
        session_id: Uuid,
        round: i32,
        claim: &RoundClaim,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError>;

    /// Drops a claim held under `token`, leaving the round untouched.
    async fn release_claim(&self, session_id: Uuid, token: Uuid) -> Result<bool, DomainError>;

    /// Writes a resolved round: advances or completes the session, appends
    /// the transcript round, flips forfeits and clears the claim, all in one
    /// unit. Applies only while the claim under `claim_token` is still held
    /// for `transcript.round`.
    async fn finalize_round(&self, finalization: &RoundFinalization)
    -> Result<bool, DomainError>;

    /// Active sessions whose deadline is at or before `now`, or whose claim
    /// expired at or before `now`.
    async fn list_due_sessions(&self, now: DateTime<Utc>)
    -> Result<Vec<SessionRecord>, DomainError>;

    /// Pending sessions, oldest first.
    async fn list_pending_sessions(&self) -> Result<Vec<SessionRecord>, DomainError>;

    /// Agents currently seated in a pending or active session.
    async fn engaged_agent_ids(&self) -> Result<Vec<Uuid>, DomainError>;
}
