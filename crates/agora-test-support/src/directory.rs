//! Test agent directory.

use std::sync::Mutex;

use agora_core::directory::{AgentDirectory, AgentProfile};
use agora_core::error::DomainError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// An agent directory over a fixed list of profiles.
#[derive(Debug, Default)]
pub struct StaticAgentDirectory {
    agents: Mutex<Vec<AgentProfile>>,
}

impl StaticAgentDirectory {
    /// Creates a directory holding `agents`.
    #[must_use]
    pub fn new(agents: Vec<AgentProfile>) -> Self {
        Self {
            agents: Mutex::new(agents),
        }
    }

    /// Adds an agent named `name` last seen at `last_active_at` and returns
    /// its id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add(&self, name: &str, last_active_at: DateTime<Utc>) -> Uuid {
        let agent_id = Uuid::new_v4();
        self.agents.lock().unwrap().push(AgentProfile {
            agent_id,
            display_name: name.to_owned(),
            last_active_at,
        });
        agent_id
    }
}

#[async_trait]
impl AgentDirectory for StaticAgentDirectory {
    async fn lookup(&self, agent_id: Uuid) -> Result<Option<AgentProfile>, DomainError> {
        Ok(self
            .agents
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.agent_id == agent_id)
            .cloned())
    }

    async fn recently_active(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<AgentProfile>, DomainError> {
        let mut agents: Vec<AgentProfile> = self
            .agents
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.last_active_at >= since)
            .cloned()
            .collect();
        agents.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        Ok(agents)
    }
}
