//! Test repositories — `SessionRepository` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use agora_core::error::DomainError;
use agora_core::repository::{
    ActionInsert, ActionRecord, NewParticipant, NewSession, ParticipantRecord, ParticipantStatus,
    RoundClaim, RoundFinalization, RoundOutcome, SessionRecord, SessionRepository, SessionStart,
    SessionStatus, TranscriptRound,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    sessions: Vec<SessionRecord>,
    participants: HashMap<Uuid, Vec<ParticipantRecord>>,
    actions: Vec<ActionRecord>,
    transcript: HashMap<Uuid, Vec<TranscriptRound>>,
}

impl State {
    fn session_mut(&mut self, session_id: Uuid) -> Option<&mut SessionRecord> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    fn is_engaged(&self, agent_id: Uuid) -> bool {
        self.sessions
            .iter()
            .filter(|s| matches!(s.status, SessionStatus::Pending | SessionStatus::Active))
            .any(|s| {
                self.participants.get(&s.id).is_some_and(|ps| {
                    ps.iter()
                        .any(|p| p.agent_id == agent_id && p.status == ParticipantStatus::Active)
                })
            })
    }
}

fn claim_is_live(session: &SessionRecord, round: i32, now: DateTime<Utc>) -> bool {
    session
        .claim
        .is_some_and(|c| c.round == round && c.expires_at > now)
}

/// An in-memory store with the same conditional-write contract as the
/// PostgreSQL store. A single mutex makes every call atomic.
#[derive(Debug, Default)]
pub struct InMemorySessionRepository {
    state: Mutex<State>,
    fail_next_finalize: AtomicBool,
}

impl InMemorySessionRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a session row and its participants directly, bypassing the
    /// lifecycle. Used to set up a session at an arbitrary round.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed(&self, session: SessionRecord, participants: Vec<ParticipantRecord>) {
        let mut state = self.state.lock().unwrap();
        state.participants.insert(session.id, participants);
        state.sessions.push(session);
    }

    /// Makes the next `finalize_round` call fail with an infrastructure error
    /// without applying anything.
    pub fn fail_next_finalize(&self) {
        self.fail_next_finalize.store(true, Ordering::SeqCst);
    }

    /// Snapshot of a session row.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn session(&self, session_id: Uuid) -> Option<SessionRecord> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
    }

    /// Snapshot of a session's transcript.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn transcript(&self, session_id: Uuid) -> Vec<TranscriptRound> {
        self.state
            .lock()
            .unwrap()
            .transcript
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of a session's participants.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn participants(&self, session_id: Uuid) -> Vec<ParticipantRecord> {
        self.state
            .lock()
            .unwrap()
            .participants
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of every stored session, in creation order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn all_sessions(&self) -> Vec<SessionRecord> {
        self.state.lock().unwrap().sessions.clone()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create_session(&self, session: &NewSession) -> Result<bool, DomainError> {
        let mut state = self.state.lock().unwrap();
        if state.sessions.iter().any(|s| s.id == session.id) {
            return Err(DomainError::Infrastructure(format!(
                "duplicate session id {}",
                session.id
            )));
        }
        if session
            .participants
            .iter()
            .any(|p| state.is_engaged(p.agent_id))
        {
            return Ok(false);
        }
        let participants = session
            .participants
            .iter()
            .zip(0..)
            .map(|(p, seat)| ParticipantRecord {
                session_id: session.id,
                agent_id: p.agent_id,
                display_name: p.display_name.clone(),
                seat,
                status: ParticipantStatus::Active,
                forfeited_at_round: None,
                joined_at: session.created_at,
            })
            .collect();
        state.participants.insert(session.id, participants);
        state.sessions.push(SessionRecord {
            id: session.id,
            scenario_id: session.scenario_id.clone(),
            catalog_version: session.catalog_version.clone(),
            status: SessionStatus::Pending,
            round: 0,
            round_budget: session.round_budget,
            round_deadline: None,
            prompt: None,
            summary: None,
            created_at: session.created_at,
            started_at: None,
            completed_at: None,
            claim: None,
        });
        Ok(true)
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Option<SessionRecord>, DomainError> {
        Ok(self.session(session_id))
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
        limit: i64,
    ) -> Result<Vec<SessionRecord>, DomainError> {
        let state = self.state.lock().unwrap();
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut sessions: Vec<SessionRecord> = state
            .sessions
            .iter()
            .rev()
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn load_participants(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ParticipantRecord>, DomainError> {
        Ok(self.participants(session_id))
    }

    async fn load_actions(
        &self,
        session_id: Uuid,
        round: i32,
    ) -> Result<Vec<ActionRecord>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .actions
            .iter()
            .filter(|a| a.session_id == session_id && a.round == round)
            .cloned()
            .collect())
    }

    async fn load_transcript(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<TranscriptRound>, DomainError> {
        Ok(self.transcript(session_id))
    }

    async fn insert_action(
        &self,
        action: &ActionRecord,
        now: DateTime<Utc>,
    ) -> Result<ActionInsert, DomainError> {
        let mut state = self.state.lock().unwrap();
        let Some(session) = state.sessions.iter().find(|s| s.id == action.session_id) else {
            return Ok(ActionInsert::RoundClosed);
        };
        if session.status != SessionStatus::Active
            || session.round != action.round
            || claim_is_live(session, action.round, now)
        {
            return Ok(ActionInsert::RoundClosed);
        }
        let participant_active = state.participants.get(&action.session_id).is_some_and(|ps| {
            ps.iter()
                .any(|p| p.agent_id == action.agent_id && p.status == ParticipantStatus::Active)
        });
        if !participant_active {
            return Ok(ActionInsert::RoundClosed);
        }
        let duplicate = state.actions.iter().any(|a| {
            a.session_id == action.session_id
                && a.round == action.round
                && a.agent_id == action.agent_id
        });
        if duplicate {
            return Ok(ActionInsert::Duplicate);
        }
        state.actions.push(action.clone());
        Ok(ActionInsert::Inserted)
    }

    async fn join_pending(
        &self,
        session_id: Uuid,
        participant: &NewParticipant,
        max_players: usize,
        joined_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.lock().unwrap();
        let pending = state
            .sessions
            .iter()
            .any(|s| s.id == session_id && s.status == SessionStatus::Pending);
        if !pending || state.is_engaged(participant.agent_id) {
            return Ok(false);
        }
        let seats = state.participants.entry(session_id).or_default();
        if seats.len() >= max_players {
            return Ok(false);
        }
        let seat = i32::try_from(seats.len()).unwrap_or(i32::MAX);
        seats.push(ParticipantRecord {
            session_id,
            agent_id: participant.agent_id,
            display_name: participant.display_name.clone(),
            seat,
            status: ParticipantStatus::Active,
            forfeited_at_round: None,
            joined_at,
        });
        Ok(true)
    }

    async fn start_session(
        &self,
        session_id: Uuid,
        start: &SessionStart,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.lock().unwrap();
        let Some(session) = state.session_mut(session_id) else {
            return Ok(false);
        };
        if session.status != SessionStatus::Pending {
            return Ok(false);
        }
        session.status = SessionStatus::Active;
        session.round = 0;
        session.prompt = Some(start.prompt.clone());
        session.round_deadline = Some(start.deadline);
        session.started_at = Some(start.started_at);
        Ok(true)
    }

    async fn cancel_session(
        &self,
        session_id: Uuid,
        cancelled_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.lock().unwrap();
        let Some(session) = state.session_mut(session_id) else {
            return Ok(false);
        };
        if session.status != SessionStatus::Pending {
            return Ok(false);
        }
        session.status = SessionStatus::Cancelled;
        session.completed_at = Some(cancelled_at);
        Ok(true)
    }

    async fn claim_round(
        &self,
        session_id: Uuid,
        round: i32,
        claim: &RoundClaim,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.lock().unwrap();
        let Some(session) = state.session_mut(session_id) else {
            return Ok(false);
        };
        if session.status != SessionStatus::Active
            || session.round != round
            || session.claim.is_some_and(|c| c.expires_at > now)
        {
            return Ok(false);
        }
        session.claim = Some(*claim);
        Ok(true)
    }

    async fn release_claim(&self, session_id: Uuid, token: Uuid) -> Result<bool, DomainError> {
        let mut state = self.state.lock().unwrap();
        let Some(session) = state.session_mut(session_id) else {
            return Ok(false);
        };
        if session.claim.is_some_and(|c| c.token == token) {
            session.claim = None;
            return Ok(true);
        }
        Ok(false)
    }

    async fn finalize_round(
        &self,
        finalization: &RoundFinalization,
    ) -> Result<bool, DomainError> {
        if self.fail_next_finalize.swap(false, Ordering::SeqCst) {
            return Err(DomainError::Infrastructure(
                "simulated write failure".into(),
            ));
        }
        let mut state = self.state.lock().unwrap();
        let transcript = &finalization.transcript;
        let session_id = transcript.session_id;
        let Some(session) = state.session_mut(session_id) else {
            return Ok(false);
        };
        let holds_claim = session
            .claim
            .is_some_and(|c| c.token == finalization.claim_token && c.round == transcript.round);
        if session.status != SessionStatus::Active
            || session.round != transcript.round
            || !holds_claim
        {
            return Ok(false);
        }

        session.claim = None;
        match &finalization.outcome {
            RoundOutcome::Continue { prompt, deadline } => {
                session.round += 1;
                session.prompt = Some(prompt.clone());
                session.round_deadline = Some(*deadline);
            }
            RoundOutcome::Complete {
                summary,
                completed_at,
            } => {
                session.status = SessionStatus::Completed;
                session.summary = Some(summary.clone());
                session.completed_at = Some(*completed_at);
            }
        }

        if let Some(participants) = state.participants.get_mut(&session_id) {
            for participant in participants.iter_mut() {
                if finalization.forfeits.contains(&participant.agent_id)
                    && participant.status == ParticipantStatus::Active
                {
                    participant.status = ParticipantStatus::Forfeited;
                    participant.forfeited_at_round = Some(transcript.round);
                }
            }
        }
        state
            .transcript
            .entry(session_id)
            .or_default()
            .push(transcript.clone());
        Ok(true)
    }

    async fn list_due_sessions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, DomainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Active)
            .filter(|s| {
                s.round_deadline.is_some_and(|d| d <= now)
                    || s.claim.is_some_and(|c| c.expires_at <= now)
            })
            .cloned()
            .collect())
    }

    async fn list_pending_sessions(&self) -> Result<Vec<SessionRecord>, DomainError> {
        let mut pending: Vec<SessionRecord> = self
            .state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    async fn engaged_agent_ids(&self) -> Result<Vec<Uuid>, DomainError> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<Uuid> = state
            .sessions
            .iter()
            .filter(|s| matches!(s.status, SessionStatus::Pending | SessionStatus::Active))
            .filter_map(|s| state.participants.get(&s.id))
            .flatten()
            .filter(|p| p.status == ParticipantStatus::Active)
            .map(|p| p.agent_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

/// A repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingSessionRepository;

fn unavailable<T>() -> Result<T, DomainError> {
    Err(DomainError::Infrastructure("connection refused".into()))
}

#[async_trait]
impl SessionRepository for FailingSessionRepository {
    async fn create_session(&self, _session: &NewSession) -> Result<bool, DomainError> {
        unavailable()
    }

    async fn load_session(&self, _session_id: Uuid) -> Result<Option<SessionRecord>, DomainError> {
        unavailable()
    }

    async fn list_sessions(
        &self,
        _status: Option<SessionStatus>,
        _limit: i64,
    ) -> Result<Vec<SessionRecord>, DomainError> {
        unavailable()
    }

    async fn load_participants(
        &self,
        _session_id: Uuid,
    ) -> Result<Vec<ParticipantRecord>, DomainError> {
        unavailable()
    }

    async fn load_actions(
        &self,
        _session_id: Uuid,
        _round: i32,
    ) -> Result<Vec<ActionRecord>, DomainError> {
        unavailable()
    }

    async fn load_transcript(
        &self,
        _session_id: Uuid,
    ) -> Result<Vec<TranscriptRound>, DomainError> {
        unavailable()
    }

    async fn insert_action(
        &self,
        _action: &ActionRecord,
        _now: DateTime<Utc>,
    ) -> Result<ActionInsert, DomainError> {
        unavailable()
    }

    async fn join_pending(
        &self,
        _session_id: Uuid,
        _participant: &NewParticipant,
        _max_players: usize,
        _joined_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        unavailable()
    }

    async fn start_session(
        &self,
        _session_id: Uuid,
        _start: &SessionStart,
    ) -> Result<bool, DomainError> {
        unavailable()
    }

    async fn cancel_session(
        &self,
        _session_id: Uuid,
        _cancelled_at: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        unavailable()
    }

    async fn claim_round(
        &self,
        _session_id: Uuid,
        _round: i32,
        _claim: &RoundClaim,
        _now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        unavailable()
    }

    async fn release_claim(&self, _session_id: Uuid, _token: Uuid) -> Result<bool, DomainError> {
        unavailable()
    }

    async fn finalize_round(
        &self,
        _finalization: &RoundFinalization,
    ) -> Result<bool, DomainError> {
        unavailable()
    }

    async fn list_due_sessions(
        &self,
        _now: DateTime<Utc>,
    ) -> Result<Vec<SessionRecord>, DomainError> {
        unavailable()
    }

    async fn list_pending_sessions(&self) -> Result<Vec<SessionRecord>, DomainError> {
        unavailable()
    }

    async fn engaged_agent_ids(&self) -> Result<Vec<Uuid>, DomainError> {
        unavailable()
    }
}
