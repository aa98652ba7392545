//! Pure round logic: readiness and the shape of a resolved round.

use std::collections::HashMap;

use agora_core::repository::{ActionRecord, ParticipantRecord, ParticipantStatus, TranscriptEntry};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Whether a round may be resolved now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Every active participant has acted.
    AllActed,
    /// The deadline passed with actions missing; resolution is forced.
    DeadlineElapsed,
    /// Actions are outstanding and the deadline has not passed.
    Waiting,
}

impl Readiness {
    /// Whether resolution may proceed.
    #[must_use]
    pub fn is_ready(self) -> bool {
        !matches!(self, Self::Waiting)
    }
}

/// Decides whether the round described by `participants` and `actions` is
/// ready to resolve at `now`.
#[must_use]
pub fn assess(
    participants: &[ParticipantRecord],
    actions: &[ActionRecord],
    deadline: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Readiness {
    let mut active = participants
        .iter()
        .filter(|p| p.status == ParticipantStatus::Active)
        .peekable();
    let all_acted = active.peek().is_some()
        && active.all(|p| actions.iter().any(|a| a.agent_id == p.agent_id));

    if all_acted {
        Readiness::AllActed
    } else if deadline.is_some_and(|d| now >= d) {
        Readiness::DeadlineElapsed
    } else {
        Readiness::Waiting
    }
}

/// The inputs of one resolution, in seat order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundPlan {
    /// One entry per participant.
    pub entries: Vec<TranscriptEntry>,
    /// Active participants who did not act and forfeit in this round.
    pub forfeits: Vec<Uuid>,
    /// Names of participants still active after this round.
    pub remaining: Vec<String>,
}

impl RoundPlan {
    /// Builds the plan for a round.
    ///
    /// Previously forfeited participants appear as forfeited entries. An
    /// active participant without an action forfeits in this round.
    #[must_use]
    pub fn build(participants: &[ParticipantRecord], actions: &[ActionRecord]) -> Self {
        let by_agent: HashMap<Uuid, &ActionRecord> =
            actions.iter().map(|a| (a.agent_id, a)).collect();

        let mut plan = Self {
            entries: Vec::with_capacity(participants.len()),
            forfeits: Vec::new(),
            remaining: Vec::new(),
        };

        for participant in participants {
            let action = match participant.status {
                ParticipantStatus::Forfeited => None,
                ParticipantStatus::Active => by_agent.get(&participant.agent_id),
            };
            match action {
                Some(action) => {
                    plan.remaining.push(participant.display_name.clone());
                    plan.entries.push(TranscriptEntry {
                        agent_id: participant.agent_id,
                        display_name: participant.display_name.clone(),
                        content: Some(action.content.clone()),
                        forfeited: false,
                    });
                }
                None => {
                    if participant.status == ParticipantStatus::Active {
                        plan.forfeits.push(participant.agent_id);
                    }
                    plan.entries.push(TranscriptEntry {
                        agent_id: participant.agent_id,
                        display_name: participant.display_name.clone(),
                        content: None,
                        forfeited: true,
                    });
                }
            }
        }

        plan
    }
}
