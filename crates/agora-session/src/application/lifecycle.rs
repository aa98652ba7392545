//! Session lifecycle: matchmaking and the deadline sweep.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use agora_catalog::Scenario;
use agora_core::command::Command;
use agora_core::directory::{AgentDirectory, AgentProfile};
use agora_core::error::DomainError;
use agora_core::repository::{NewParticipant, NewSession, SessionStart};
use agora_core::rng::{DeterministicRng, shuffle};
use agora_narrator::prompts;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::application::advancement::{AdvanceOutcome, advance_round};
use crate::application::services::SessionServices;
use crate::domain::commands::{RunMatchmaking, SweepDeadlines};

/// Counts from one matchmaking pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchmakingReport {
    /// Pending sessions cancelled for waiting too long.
    pub cancelled: usize,
    /// Agents seated in existing pending sessions.
    pub joined: usize,
    /// Sessions created.
    pub created: usize,
    /// Sessions moved from pending to active.
    pub started: usize,
    /// Agents left waiting in a newly opened pending session.
    pub waiting: usize,
}

/// Counts from one deadline sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Sessions found with an elapsed deadline or lapsed claim.
    pub due: usize,
    /// Rounds resolved into a next round.
    pub advanced: usize,
    /// Sessions completed.
    pub completed: usize,
    /// Rounds deferred by a narrator failure.
    pub deferred: usize,
    /// Sessions another invocation was already handling.
    pub skipped: usize,
    /// Sessions whose advancement failed.
    pub failed: usize,
}

fn lock_rng<'a>(
    rng: &'a Mutex<dyn DeterministicRng + Send + 'static>,
) -> Result<MutexGuard<'a, dyn DeterministicRng + Send + 'static>, DomainError> {
    rng.lock()
        .map_err(|e| DomainError::Infrastructure(format!("RNG mutex poisoned: {e}")))
}

fn seat(agent: &AgentProfile) -> NewParticipant {
    NewParticipant {
        agent_id: agent.agent_id,
        display_name: agent.display_name.clone(),
    }
}

async fn create_session(
    services: SessionServices<'_>,
    scenario: &Scenario,
    agents: &[AgentProfile],
    now: DateTime<Utc>,
) -> Result<Option<Uuid>, DomainError> {
    let round_budget = i32::try_from(scenario.round_budget()).map_err(|_| {
        DomainError::Validation(format!("scenario {} has too many rounds", scenario.id))
    })?;
    let session = NewSession {
        id: Uuid::new_v4(),
        scenario_id: scenario.id.clone(),
        catalog_version: services.catalog.version().to_owned(),
        round_budget,
        created_at: now,
        participants: agents.iter().map(seat).collect(),
    };
    if !services.repo.create_session(&session).await? {
        debug!(
            scenario_id = %scenario.id,
            "group no longer idle, another pass seated one of its agents"
        );
        return Ok(None);
    }
    info!(
        session_id = %session.id,
        scenario_id = %scenario.id,
        players = agents.len(),
        "session created"
    );
    Ok(Some(session.id))
}

/// Moves a pending session to active and opens round 0 with a prompt built
/// from the scenario's first scene.
async fn start_session(
    services: SessionServices<'_>,
    session_id: Uuid,
    scenario: &Scenario,
) -> Result<bool, DomainError> {
    let now = services.clock.now();
    let start = SessionStart {
        prompt: prompts::opening_prompt(scenario),
        deadline: now + services.config.round_duration,
        started_at: now,
    };
    let started = services.repo.start_session(session_id, &start).await?;
    if started {
        info!(session_id = %session_id, scenario_id = %scenario.id, "session started");
    }
    Ok(started)
}

/// Handles the `RunMatchmaking` command.
///
/// One pass does, in order:
/// 1. cancels pending sessions older than the matchmaking timeout;
/// 2. seats idle agents in the remaining pending sessions, oldest first,
///    and starts every one that reaches its scenario's minimum;
/// 3. forms the largest groups some scenario admits from the agents left,
///    picking a scenario at random for each, and starts them;
/// 4. parks any remainder too small for every scenario in a new pending
///    session, unless one is already waiting.
///
/// Idle means active within the recency window and not seated in a pending
/// or active session. The store rechecks engagement when it seats a group,
/// so an overlapping pass that picked the same agents creates nothing.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the store, the directory or the
/// RNG fails.
#[instrument(skip_all, fields(correlation_id = %command.correlation_id()))]
pub async fn handle_run_matchmaking(
    command: &RunMatchmaking,
    services: SessionServices<'_>,
    directory: &dyn AgentDirectory,
    rng: &Mutex<dyn DeterministicRng + Send>,
) -> Result<MatchmakingReport, DomainError> {
    let repo = services.repo;
    let now = services.clock.now();
    let mut report = MatchmakingReport::default();

    let mut lobbies = Vec::new();
    for session in repo.list_pending_sessions().await? {
        if now - session.created_at >= services.config.matchmaking_timeout {
            if repo.cancel_session(session.id, now).await? {
                info!(session_id = %session.id, "matchmaking timed out, session cancelled");
                report.cancelled += 1;
            }
        } else {
            lobbies.push(session);
        }
    }

    let engaged: HashSet<Uuid> = repo.engaged_agent_ids().await?.into_iter().collect();
    let mut idle: Vec<AgentProfile> = directory
        .recently_active(now - services.config.agent_recency)
        .await?
        .into_iter()
        .filter(|agent| !engaged.contains(&agent.agent_id))
        .collect();
    shuffle(&mut *lock_rng(rng)?, &mut idle);
    debug!(idle = idle.len(), lobbies = lobbies.len(), "matchmaking candidates");

    let mut open_lobbies = 0;
    for lobby in &lobbies {
        let scenario = match services.catalog.get(&lobby.scenario_id) {
            Ok(scenario) => scenario,
            Err(e) => {
                warn!(session_id = %lobby.id, error = %e, "pending session has unknown scenario");
                continue;
            }
        };
        let mut seated = repo.load_participants(lobby.id).await?.len();
        while seated < scenario.max_players {
            let Some(agent) = idle.pop() else { break };
            if repo
                .join_pending(lobby.id, &seat(&agent), scenario.max_players, now)
                .await?
            {
                seated += 1;
                report.joined += 1;
            }
        }
        if seated >= scenario.min_players {
            if start_session(services, lobby.id, scenario).await? {
                report.started += 1;
            }
        } else {
            open_lobbies += 1;
        }
    }

    while let Some(size) = services.catalog.largest_feasible_group(idle.len()) {
        let group = idle.split_off(idle.len() - size);
        let scenario = services.catalog.pick_for(size, &mut *lock_rng(rng)?)?;
        let Some(session_id) = create_session(services, scenario, &group, now).await? else {
            continue;
        };
        report.created += 1;
        if start_session(services, session_id, scenario).await? {
            report.started += 1;
        }
    }

    if !idle.is_empty() && open_lobbies == 0 {
        let picked = services.catalog.pick_lobby(idle.len(), &mut *lock_rng(rng)?);
        match picked {
            Ok(scenario) => {
                if create_session(services, scenario, &idle, now).await?.is_some() {
                    report.created += 1;
                    report.waiting = idle.len();
                }
            }
            Err(e) => debug!(error = %e, "no scenario can seat the remaining agents"),
        }
    }

    info!(
        cancelled = report.cancelled,
        joined = report.joined,
        created = report.created,
        started = report.started,
        waiting = report.waiting,
        "matchmaking pass finished"
    );
    Ok(report)
}

/// Handles the `SweepDeadlines` command.
///
/// Runs the advancement primitive for every active session whose round
/// deadline has elapsed or whose resolution claim has lapsed. A failure on
/// one session is logged and does not stop the sweep.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the due sessions cannot be
/// listed.
#[instrument(skip_all, fields(correlation_id = %command.correlation_id()))]
pub async fn handle_sweep_deadlines(
    command: &SweepDeadlines,
    services: SessionServices<'_>,
) -> Result<SweepReport, DomainError> {
    let due = services.repo.list_due_sessions(services.clock.now()).await?;
    let mut report = SweepReport {
        due: due.len(),
        ..SweepReport::default()
    };

    for session in &due {
        match advance_round(services, session.id, session.round).await {
            Ok(AdvanceOutcome::Advanced { .. }) => report.advanced += 1,
            Ok(AdvanceOutcome::Completed { .. }) => report.completed += 1,
            Ok(AdvanceOutcome::Deferred) => report.deferred += 1,
            Ok(AdvanceOutcome::Stale | AdvanceOutcome::Busy | AdvanceOutcome::NotReady) => {
                report.skipped += 1;
            }
            Err(e) => {
                error!(session_id = %session.id, error = %e, "sweep failed to advance session");
                report.failed += 1;
            }
        }
    }

    if report.due > 0 {
        info!(
            due = report.due,
            advanced = report.advanced,
            completed = report.completed,
            deferred = report.deferred,
            failed = report.failed,
            "deadline sweep finished"
        );
    }
    Ok(report)
}
