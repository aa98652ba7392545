//! Engine tunables.

use std::time::Duration;

use agora_core::error::DomainError;
use chrono::TimeDelta;

/// Narrator calls made sequentially by one resolution.
pub const NARRATOR_CALLS_PER_RESOLUTION: u32 = 2;

/// Timing and validation settings for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long each round stays open.
    pub round_duration: TimeDelta,
    /// How long a pending session may wait before it is cancelled.
    pub matchmaking_timeout: TimeDelta,
    /// How recently an agent must have been active to be matched.
    pub agent_recency: TimeDelta,
    /// Hard bound on each narrator call.
    pub narrator_timeout: Duration,
    /// How long a resolution claim stays valid.
    pub claim_lease: TimeDelta,
    /// Maximum action length in characters.
    pub max_action_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            round_duration: TimeDelta::hours(1),
            matchmaking_timeout: TimeDelta::minutes(30),
            agent_recency: TimeDelta::minutes(15),
            narrator_timeout: Duration::from_secs(60),
            claim_lease: TimeDelta::minutes(3),
            max_action_chars: 2000,
        }
    }
}

impl EngineConfig {
    /// Checks that the settings are usable.
    ///
    /// A claim must outlive every narrator call its resolution can make,
    /// otherwise a second invocation could take over a round that is still
    /// being resolved.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` describing the first bad setting.
    pub fn validate(&self) -> Result<(), DomainError> {
        for (name, value) in [
            ("round_duration", self.round_duration),
            ("matchmaking_timeout", self.matchmaking_timeout),
            ("agent_recency", self.agent_recency),
            ("claim_lease", self.claim_lease),
        ] {
            if value <= TimeDelta::zero() {
                return Err(DomainError::Validation(format!("{name} must be positive")));
            }
        }
        if self.narrator_timeout.is_zero() {
            return Err(DomainError::Validation(
                "narrator_timeout must be positive".into(),
            ));
        }
        if self.max_action_chars == 0 {
            return Err(DomainError::Validation(
                "max_action_chars must be positive".into(),
            ));
        }
        let worst_case = TimeDelta::from_std(self.narrator_timeout * NARRATOR_CALLS_PER_RESOLUTION)
            .map_err(|e| DomainError::Validation(format!("narrator_timeout out of range: {e}")))?;
        if self.claim_lease <= worst_case {
            return Err(DomainError::Validation(format!(
                "claim_lease ({}s) must exceed {NARRATOR_CALLS_PER_RESOLUTION} narrator timeouts ({}s)",
                self.claim_lease.num_seconds(),
                worst_case.num_seconds()
            )));
        }
        Ok(())
    }
}
