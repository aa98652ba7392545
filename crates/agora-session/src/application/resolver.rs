//! Round resolver: turns a claimed round into narrative through the narrator.
//!
//! The resolver only computes. It never touches the store, so a failure at
//! any point leaves nothing behind and the round can be retried with the
//! same stored actions.

use agora_catalog::Scenario;
use agora_core::narrator::{NarratorError, NarratorPrompt};
use agora_core::repository::{RoundOutcome, SessionRecord, TranscriptRound};
use agora_narrator::prompts;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::application::services::SessionServices;
use crate::domain::round::RoundPlan;

/// Narrative produced for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResolution {
    /// The round's resolved narrative.
    pub narrative: String,
    /// What happens to the session next.
    pub outcome: RoundOutcome,
}

/// Why a resolution could not be produced.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A narrator call failed or timed out. Retryable.
    #[error(transparent)]
    Narrator(#[from] NarratorError),

    /// The session refers to a scenario the catalog does not hold.
    #[error("scenario {0} is not in the catalog")]
    UnknownScenario(String),
}

async fn call_narrator(
    services: SessionServices<'_>,
    prompt: &NarratorPrompt,
) -> Result<String, NarratorError> {
    let limit = services.config.narrator_timeout;
    match tokio::time::timeout(limit, services.narrator.generate(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(NarratorError::Timeout(
            u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

fn scenario_for<'a>(
    services: SessionServices<'a>,
    session: &SessionRecord,
) -> Result<&'a Scenario, ResolveError> {
    services
        .catalog
        .get(&session.scenario_id)
        .map_err(|_| ResolveError::UnknownScenario(session.scenario_id.clone()))
}

/// Resolves `session`'s current round.
///
/// Issues the resolution call, then either the next-round prompt call or,
/// when the budget is spent or nobody is left to act, the summary call.
///
/// # Errors
///
/// Returns `ResolveError::Narrator` if any narrator call fails, and
/// `ResolveError::UnknownScenario` if the scenario is missing.
#[instrument(skip_all, fields(session_id = %session.id, round = session.round))]
pub async fn resolve_round(
    services: SessionServices<'_>,
    session: &SessionRecord,
    plan: &RoundPlan,
    history: &[TranscriptRound],
) -> Result<RoundResolution, ResolveError> {
    let scenario = scenario_for(services, session)?;
    let round_prompt = session.prompt.as_deref().unwrap_or_default();

    let narrative = call_narrator(
        services,
        &prompts::resolution_request(
            scenario,
            session.round,
            round_prompt,
            &plan.entries,
            history,
        ),
    )
    .await?;

    let next_round = session.round + 1;
    let outcome = if next_round < session.round_budget && !plan.remaining.is_empty() {
        let text = call_narrator(
            services,
            &prompts::next_prompt_request(scenario, next_round, &narrative, &plan.remaining),
        )
        .await?;
        debug!(next_round, "next round prompt generated");
        RoundOutcome::Continue {
            prompt: prompts::with_instructions(scenario, next_round, &text),
            deadline: services.clock.now() + services.config.round_duration,
        }
    } else {
        let summary = call_narrator(
            services,
            &prompts::summary_request(scenario, history, &narrative),
        )
        .await?;
        debug!("session summary generated");
        RoundOutcome::Complete {
            summary,
            completed_at: services.clock.now(),
        }
    };

    Ok(RoundResolution { narrative, outcome })
}
