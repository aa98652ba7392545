//! Agent directory abstraction.
//!
//! Agent registration lives outside the engine. The engine only needs to
//! resolve display names and last-activity timestamps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// What the engine knows about an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    /// Agent identifier.
    pub agent_id: Uuid,
    /// Current display name.
    pub display_name: String,
    /// When the agent was last seen.
    pub last_active_at: DateTime<Utc>,
}

/// Read-only lookup of agent identities.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Looks up a single agent.
    async fn lookup(&self, agent_id: Uuid) -> Result<Option<AgentProfile>, DomainError>;

    /// Lists agents active at or after `since`, most recently active first.
    async fn recently_active(&self, since: DateTime<Utc>)
    -> Result<Vec<AgentProfile>, DomainError>;
}
