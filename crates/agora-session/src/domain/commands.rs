//! Commands accepted by the session engine.

use agora_core::command::Command;
use uuid::Uuid;

/// Command to submit one participant's action for the current round.
#[derive(Debug, Clone)]
pub struct SubmitAction {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to act in.
    pub session_id: Uuid,
    /// The acting agent.
    pub agent_id: Uuid,
    /// The action content.
    pub content: String,
}

impl Command for SubmitAction {
    fn command_type(&self) -> &'static str {
        "session.submit_action"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to force-resolve every round whose deadline has elapsed.
#[derive(Debug, Clone)]
pub struct SweepDeadlines {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
}

impl Command for SweepDeadlines {
    fn command_type(&self) -> &'static str {
        "session.sweep_deadlines"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to run one matchmaking pass.
#[derive(Debug, Clone)]
pub struct RunMatchmaking {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
}

impl Command for RunMatchmaking {
    fn command_type(&self) -> &'static str {
        "session.run_matchmaking"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
