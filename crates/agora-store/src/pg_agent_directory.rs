//! `PostgreSQL` implementation of the `AgentDirectory` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use agora_core::directory::{AgentDirectory, AgentProfile};
use agora_core::error::DomainError;

#[derive(FromRow)]
struct AgentRow {
    agent_id: Uuid,
    display_name: String,
    last_active_at: DateTime<Utc>,
}

impl From<AgentRow> for AgentProfile {
    fn from(row: AgentRow) -> Self {
        Self {
            agent_id: row.agent_id,
            display_name: row.display_name,
            last_active_at: row.last_active_at,
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn db_err(e: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(e.to_string())
}

/// PostgreSQL-backed agent directory over the `agents` table.
///
/// Registration is owned by another service; the engine only reads.
/// `upsert` exists for seeding and tests.
#[derive(Debug, Clone)]
pub struct PgAgentDirectory {
    pool: PgPool,
}

impl PgAgentDirectory {
    /// Creates a new `PgAgentDirectory`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts an agent or refreshes its name and activity time.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the write fails.
    pub async fn upsert(&self, profile: &AgentProfile) -> Result<(), DomainError> {
        sqlx::query(
            r"
            INSERT INTO agents (agent_id, display_name, last_active_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (agent_id) DO UPDATE
            SET display_name = EXCLUDED.display_name,
                last_active_at = GREATEST(agents.last_active_at, EXCLUDED.last_active_at)",
        )
        .bind(profile.agent_id)
        .bind(&profile.display_name)
        .bind(profile.last_active_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl AgentDirectory for PgAgentDirectory {
    async fn lookup(&self, agent_id: Uuid) -> Result<Option<AgentProfile>, DomainError> {
        let row: Option<AgentRow> = sqlx::query_as(
            "SELECT agent_id, display_name, last_active_at FROM agents WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(AgentProfile::from))
    }

    async fn recently_active(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<AgentProfile>, DomainError> {
        let rows: Vec<AgentRow> = sqlx::query_as(
            r"
            SELECT agent_id, display_name, last_active_at
            FROM agents
            WHERE last_active_at >= $1
            ORDER BY last_active_at DESC, agent_id",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(AgentProfile::from).collect())
    }
}
