//! The advancement primitive shared by action intake and the deadline sweep.
//!
//! A round is resolved in two steps against the store. A conditional write
//! first claims the round under a fresh token with a lease, before any
//! narrator call, so concurrent invocations see the claim and back off. A
//! single finalize write conditioned on that token then appends the
//! transcript round, flips forfeits and advances or completes the session.
//! A narrator failure releases the claim; a crash leaves a claim that lapses
//! at its expiry, after which the sweep picks the round up again.

use agora_core::error::DomainError;
use agora_core::repository::{
    RoundClaim, RoundFinalization, RoundOutcome, SessionStatus, TranscriptRound,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::application::resolver::{self, ResolveError};
use crate::application::services::SessionServices;
use crate::domain::round::{self, RoundPlan};

/// What one advancement attempt did. None of these is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The session is gone, not active, or already past the observed round.
    Stale,
    /// Actions are outstanding and the deadline has not passed.
    NotReady,
    /// Another invocation holds the round.
    Busy,
    /// The narrator failed; the round is unchanged and retryable.
    Deferred,
    /// The round resolved and `round` is now open.
    Advanced {
        /// The newly opened round.
        round: i32,
    },
    /// The final round resolved and the session completed.
    Completed {
        /// The last resolved round.
        round: i32,
    },
}

impl AdvanceOutcome {
    /// Whether this attempt resolved a round.
    #[must_use]
    pub fn resolved(self) -> bool {
        matches!(self, Self::Advanced { .. } | Self::Completed { .. })
    }
}

async fn release(services: SessionServices<'_>, session_id: Uuid, token: Uuid) {
    match services.repo.release_claim(session_id, token).await {
        Ok(true) => debug!("claim released"),
        Ok(false) => warn!("claim was already gone when releasing"),
        Err(e) => warn!(error = %e, "failed to release claim, it will lapse at expiry"),
    }
}

/// Resolves `observed_round` of a session if it is ready and nobody else is
/// resolving it.
///
/// Safe to call any number of times, concurrently, from any trigger: at most
/// one call per round gets past the claim.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` when the store fails, and
/// `DomainError::ScenarioNotFound` when the session's scenario is no longer
/// in the catalog. A claim taken by this call is released before returning
/// an error.
#[instrument(skip(services), fields(session_id = %session_id, round = observed_round))]
pub async fn advance_round(
    services: SessionServices<'_>,
    session_id: Uuid,
    observed_round: i32,
) -> Result<AdvanceOutcome, DomainError> {
    let repo = services.repo;
    let now = services.clock.now();

    let Some(session) = repo.load_session(session_id).await? else {
        debug!("session not found, nothing to advance");
        return Ok(AdvanceOutcome::Stale);
    };
    if session.status != SessionStatus::Active || session.round != observed_round {
        debug!(
            status = %session.status,
            current_round = session.round,
            "round already moved on"
        );
        return Ok(AdvanceOutcome::Stale);
    }
    if session.claim.is_some_and(|c| c.expires_at > now) {
        debug!("round is being resolved elsewhere");
        return Ok(AdvanceOutcome::Busy);
    }

    let participants = repo.load_participants(session_id).await?;
    let actions = repo.load_actions(session_id, observed_round).await?;
    let readiness = round::assess(&participants, &actions, session.round_deadline, now);
    if !readiness.is_ready() {
        return Ok(AdvanceOutcome::NotReady);
    }

    let claim = RoundClaim {
        token: Uuid::new_v4(),
        round: observed_round,
        expires_at: now + services.config.claim_lease,
    };
    if !repo.claim_round(session_id, observed_round, &claim, now).await? {
        debug!("lost the claim race");
        return Ok(AdvanceOutcome::Busy);
    }
    info!(?readiness, "claimed round for resolution");

    // No action can be stored for a claimed round, so these reads are final.
    let inputs = async {
        let participants = repo.load_participants(session_id).await?;
        let actions = repo.load_actions(session_id, observed_round).await?;
        let history = repo.load_transcript(session_id).await?;
        Ok::<_, DomainError>((participants, actions, history))
    }
    .await;
    let (participants, actions, history) = match inputs {
        Ok(inputs) => inputs,
        Err(e) => {
            release(services, session_id, claim.token).await;
            return Err(e);
        }
    };
    let plan = RoundPlan::build(&participants, &actions);

    let resolution = match resolver::resolve_round(services, &session, &plan, &history).await {
        Ok(resolution) => resolution,
        Err(ResolveError::Narrator(e)) => {
            warn!(error = %e, "narrator failed, round deferred");
            release(services, session_id, claim.token).await;
            return Ok(AdvanceOutcome::Deferred);
        }
        Err(ResolveError::UnknownScenario(id)) => {
            release(services, session_id, claim.token).await;
            return Err(DomainError::ScenarioNotFound(id));
        }
    };

    let completes = matches!(resolution.outcome, RoundOutcome::Complete { .. });
    let forfeit_count = plan.forfeits.len();
    let finalization = RoundFinalization {
        claim_token: claim.token,
        transcript: TranscriptRound {
            session_id,
            round: observed_round,
            prompt: session.prompt.clone().unwrap_or_default(),
            entries: plan.entries,
            resolution: resolution.narrative,
            resolved_at: services.clock.now(),
        },
        forfeits: plan.forfeits,
        outcome: resolution.outcome,
    };

    match repo.finalize_round(&finalization).await {
        Ok(true) if completes => {
            info!(forfeits = forfeit_count, "final round resolved, session completed");
            Ok(AdvanceOutcome::Completed {
                round: observed_round,
            })
        }
        Ok(true) => {
            info!(
                forfeits = forfeit_count,
                next_round = observed_round + 1,
                "round resolved"
            );
            Ok(AdvanceOutcome::Advanced {
                round: observed_round + 1,
            })
        }
        Ok(false) => {
            warn!("claim was taken over before the round could be written");
            Ok(AdvanceOutcome::Stale)
        }
        Err(e) => {
            release(services, session_id, claim.token).await;
            Err(e)
        }
    }
}
