//! `PostgreSQL` implementation of the `SessionRepository` trait.
//!
//! Every transition is a single conditional `UPDATE` (or a transaction
//! opened by one) whose `WHERE` clause restates the state the caller
//! observed. Zero affected rows means another invocation won.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use agora_core::error::DomainError;
use agora_core::repository::{
    ActionInsert, ActionRecord, NewParticipant, NewSession, ParticipantRecord, RoundClaim,
    RoundFinalization, RoundOutcome, SessionRecord, SessionRepository, SessionStart,
    SessionStatus, TranscriptEntry, TranscriptRound,
};

use crate::schema::{ENGAGED_STATUSES, SEATING_LOCK_KEY, SELECT_PARTICIPANT, SELECT_SESSION};

#[allow(clippy::needless_pass_by_value)]
fn db_err(e: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(e.to_string())
}

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    scenario_id: String,
    catalog_version: String,
    status: String,
    round: i32,
    round_budget: i32,
    round_deadline: Option<DateTime<Utc>>,
    prompt: Option<String>,
    summary: Option<String>,
    claim_token: Option<Uuid>,
    claim_round: Option<i32>,
    claim_expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = DomainError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let claim = match (row.claim_token, row.claim_round, row.claim_expires_at) {
            (Some(token), Some(round), Some(expires_at)) => Some(RoundClaim {
                token,
                round,
                expires_at,
            }),
            _ => None,
        };
        Ok(Self {
            id: row.id,
            scenario_id: row.scenario_id,
            catalog_version: row.catalog_version,
            status: row.status.parse()?,
            round: row.round,
            round_budget: row.round_budget,
            round_deadline: row.round_deadline,
            prompt: row.prompt,
            summary: row.summary,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            claim,
        })
    }
}

#[derive(FromRow)]
struct ParticipantRow {
    session_id: Uuid,
    agent_id: Uuid,
    display_name: String,
    seat: i32,
    status: String,
    forfeited_at_round: Option<i32>,
    joined_at: DateTime<Utc>,
}

impl TryFrom<ParticipantRow> for ParticipantRecord {
    type Error = DomainError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        Ok(Self {
            session_id: row.session_id,
            agent_id: row.agent_id,
            display_name: row.display_name,
            seat: row.seat,
            status: row.status.parse()?,
            forfeited_at_round: row.forfeited_at_round,
            joined_at: row.joined_at,
        })
    }
}

#[derive(FromRow)]
struct TranscriptRow {
    session_id: Uuid,
    round: i32,
    prompt: String,
    entries: Json<Vec<TranscriptEntry>>,
    resolution: String,
    resolved_at: DateTime<Utc>,
}

impl From<TranscriptRow> for TranscriptRound {
    fn from(row: TranscriptRow) -> Self {
        Self {
            session_id: row.session_id,
            round: row.round,
            prompt: row.prompt,
            entries: row.entries.0,
            resolution: row.resolution,
            resolved_at: row.resolved_at,
        }
    }
}

fn into_sessions(rows: Vec<SessionRow>) -> Result<Vec<SessionRecord>, DomainError> {
    rows.into_iter().map(SessionRecord::try_from).collect()
}

fn seat_number(index: usize) -> Result<i32, DomainError> {
    i32::try_from(index).map_err(|_| DomainError::Validation("too many participants".into()))
}

/// PostgreSQL-backed session repository.
#[derive(Debug, Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Creates a new `PgSessionRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_participant(
        tx: &mut sqlx::PgConnection,
        session_id: Uuid,
        participant: &NewParticipant,
        seat: i32,
        joined_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r"
            INSERT INTO participants
                (session_id, agent_id, display_name, seat, status, joined_at)
            VALUES ($1, $2, $3, $4, 'active', $5)",
        )
        .bind(session_id)
        .bind(participant.agent_id)
        .bind(&participant.display_name)
        .bind(seat)
        .bind(joined_at)
        .execute(tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Serializes every transaction that seats agents until it commits.
    async fn lock_seating(tx: &mut sqlx::PgConnection) -> Result<(), DomainError> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SEATING_LOCK_KEY)
            .execute(tx)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn any_engaged(
        tx: &mut sqlx::PgConnection,
        agent_ids: &[Uuid],
    ) -> Result<bool, DomainError> {
        let (engaged,): (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM participants p
                JOIN sessions s ON s.id = p.session_id
                WHERE p.agent_id = ANY($1)
                  AND p.status = 'active'
                  AND s.status = ANY($2)
            )",
        )
        .bind(agent_ids)
        .bind(ENGAGED_STATUSES)
        .fetch_one(tx)
        .await
        .map_err(db_err)?;
        Ok(engaged)
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create_session(&self, session: &NewSession) -> Result<bool, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        Self::lock_seating(&mut tx).await?;

        let agent_ids: Vec<Uuid> = session.participants.iter().map(|p| p.agent_id).collect();
        if Self::any_engaged(&mut tx, &agent_ids).await? {
            debug!(session_id = %session.id, "create skipped, a participant is already engaged");
            return Ok(false);
        }

        sqlx::query(
            r"
            INSERT INTO sessions
                (id, scenario_id, catalog_version, status, round, round_budget, created_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, $5)",
        )
        .bind(session.id)
        .bind(&session.scenario_id)
        .bind(&session.catalog_version)
        .bind(session.round_budget)
        .bind(session.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for (index, participant) in session.participants.iter().enumerate() {
            Self::insert_participant(
                &mut tx,
                session.id,
                participant,
                seat_number(index)?,
                session.created_at,
            )
            .await?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>, DomainError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!("{SELECT_SESSION} WHERE id = $1"))
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(SessionRecord::try_from).transpose()
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        limit: i64,
    ) -> Result<Vec<SessionRecord>, DomainError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "{SELECT_SESSION} WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY created_at DESC, id LIMIT $2"
        ))
        .bind(status.map(SessionStatus::as_str))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_sessions(rows)
    }

    async fn load_participants(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ParticipantRecord>, DomainError> {
        let rows: Vec<ParticipantRow> = sqlx::query_as(&format!(
            "{SELECT_PARTICIPANT} WHERE session_id = $1 ORDER BY seat"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(ParticipantRecord::try_from).collect()
    }

    async fn load_actions(
        &self,
        session_id: Uuid,
        round: i32,
    ) -> Result<Vec<ActionRecord>, DomainError> {
        let rows: Vec<(Uuid, i32, Uuid, String, DateTime<Utc>)> = sqlx::query_as(
            r"
            SELECT session_id, round, agent_id, content, submitted_at
            FROM actions
            WHERE session_id = $1 AND round = $2
            ORDER BY submitted_at, agent_id",
        )
        .bind(session_id)
        .bind(round)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .map(
                |(session_id, round, agent_id, content, submitted_at)| ActionRecord {
                    session_id,
                    round,
                    agent_id,
                    content,
                    submitted_at,
                },
            )
            .collect())
    }

    async fn load_transcript(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<TranscriptRound>, DomainError> {
        let rows: Vec<TranscriptRow> = sqlx::query_as(
            r"
            SELECT session_id, round, prompt, entries, resolution, resolved_at
            FROM transcript_rounds
            WHERE session_id = $1
            ORDER BY round",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(TranscriptRound::from).collect())
    }

    async fn insert_action(
        &self,
        action: &ActionRecord,
        now: DateTime<Utc>,
    ) -> Result<ActionInsert, DomainError> {
        // FOR SHARE makes a concurrent claim wait for this insert, or makes
        // this insert see the committed claim and store nothing.
        let result = sqlx::query(
            r"
            INSERT INTO actions (session_id, round, agent_id, content, submitted_at)
            SELECT s.id, s.round, p.agent_id, $4, $5
            FROM sessions s
            JOIN participants p
              ON p.session_id = s.id AND p.agent_id = $3 AND p.status = 'active'
            WHERE s.id = $1
              AND s.status = 'active'
              AND s.round = $2
              AND (s.claim_token IS NULL OR s.claim_expires_at <= $6)
            FOR SHARE OF s
            ON CONFLICT (session_id, round, agent_id) DO NOTHING",
        )
        .bind(action.session_id)
        .bind(action.round)
        .bind(action.agent_id)
        .bind(&action.content)
        .bind(action.submitted_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 1 {
            return Ok(ActionInsert::Inserted);
        }

        let (exists,): (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM actions
                WHERE session_id = $1 AND round = $2 AND agent_id = $3
            )",
        )
        .bind(action.session_id)
        .bind(action.round)
        .bind(action.agent_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(if exists {
            ActionInsert::Duplicate
        } else {
            ActionInsert::RoundClosed
        })
    }

    async fn join_pending(
        &self,
        session_id: Uuid,
        participant: &NewParticipant,
        max_players: usize,
        joined_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        Self::lock_seating(&mut tx).await?;

        let locked: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM sessions WHERE id = $1 AND status = 'pending' FOR UPDATE",
        )
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;
        if locked.is_none() {
            return Ok(false);
        }

        if Self::any_engaged(&mut tx, &[participant.agent_id]).await? {
            return Ok(false);
        }

        let (seated,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM participants WHERE session_id = $1")
                .bind(session_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(db_err)?;
        let seated = usize::try_from(seated).unwrap_or(usize::MAX);
        if seated >= max_players {
            return Ok(false);
        }

        Self::insert_participant(&mut tx, session_id, participant, seat_number(seated)?, joined_at)
            .await?;
        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn start_session(
        &self,
        session_id: Uuid,
        start: &SessionStart,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r"
            UPDATE sessions
            SET status = 'active', round = 0, prompt = $2, round_deadline = $3, started_at = $4
            WHERE id = $1 AND status = 'pending'",
        )
        .bind(session_id)
        .bind(&start.prompt)
        .bind(start.deadline)
        .bind(start.started_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn cancel_session(
        &self,
        session_id: Uuid,
        cancelled_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r"
            UPDATE sessions
            SET status = 'cancelled', completed_at = $2
            WHERE id = $1 AND status = 'pending'",
        )
        .bind(session_id)
        .bind(cancelled_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_round(
        &self,
        session_id: Uuid,
        round: i32,
        claim: &RoundClaim,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r"
            UPDATE sessions
            SET claim_token = $3, claim_round = $2, claim_expires_at = $4
            WHERE id = $1
              AND status = 'active'
              AND round = $2
              AND (claim_token IS NULL OR claim_expires_at <= $5)",
        )
        .bind(session_id)
        .bind(round)
        .bind(claim.token)
        .bind(claim.expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, session_id: Uuid, token: Uuid) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r"
            UPDATE sessions
            SET claim_token = NULL, claim_round = NULL, claim_expires_at = NULL
            WHERE id = $1 AND claim_token = $2",
        )
        .bind(session_id)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn finalize_round(
        &self,
        finalization: &RoundFinalization,
    ) -> Result<bool, DomainError> {
        let transcript = &finalization.transcript;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let advanced = match &finalization.outcome {
            RoundOutcome::Continue { prompt, deadline } => sqlx::query(
                r"
                UPDATE sessions
                SET round = round + 1, prompt = $4, round_deadline = $5,
                    claim_token = NULL, claim_round = NULL, claim_expires_at = NULL
                WHERE id = $1 AND status = 'active' AND round = $2 AND claim_token = $3",
            )
            .bind(transcript.session_id)
            .bind(transcript.round)
            .bind(finalization.claim_token)
            .bind(prompt)
            .bind(deadline)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?,
            RoundOutcome::Complete {
                summary,
                completed_at,
            } => sqlx::query(
                r"
                UPDATE sessions
                SET status = 'completed', summary = $4, completed_at = $5,
                    claim_token = NULL, claim_round = NULL, claim_expires_at = NULL
                WHERE id = $1 AND status = 'active' AND round = $2 AND claim_token = $3",
            )
            .bind(transcript.session_id)
            .bind(transcript.round)
            .bind(finalization.claim_token)
            .bind(summary)
            .bind(completed_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?,
        };
        if advanced.rows_affected() != 1 {
            debug!(session_id = %transcript.session_id, "finalize skipped, claim not held");
            return Ok(false);
        }

        if !finalization.forfeits.is_empty() {
            sqlx::query(
                r"
                UPDATE participants
                SET status = 'forfeited', forfeited_at_round = $3
                WHERE session_id = $1 AND agent_id = ANY($2) AND status = 'active'",
            )
            .bind(transcript.session_id)
            .bind(&finalization.forfeits)
            .bind(transcript.round)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        sqlx::query(
            r"
            INSERT INTO transcript_rounds
                (session_id, round, prompt, entries, resolution, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(transcript.session_id)
        .bind(transcript.round)
        .bind(&transcript.prompt)
        .bind(Json(&transcript.entries))
        .bind(&transcript.resolution)
        .bind(transcript.resolved_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn list_due_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, DomainError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "{SELECT_SESSION} WHERE status = 'active' \
             AND (round_deadline <= $1 OR claim_expires_at <= $1) \
             ORDER BY round_deadline"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_sessions(rows)
    }

    async fn list_pending_sessions(&self) -> Result<Vec<SessionRecord>, DomainError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "{SELECT_SESSION} WHERE status = 'pending' ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        into_sessions(rows)
    }

    async fn engaged_agent_ids(&self) -> Result<Vec<Uuid>, DomainError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r"
            SELECT DISTINCT p.agent_id
            FROM participants p
            JOIN sessions s ON s.id = p.session_id
            WHERE p.status = 'active' AND s.status = ANY($1)
            ORDER BY p.agent_id",
        )
        .bind(ENGAGED_STATUSES)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
