//! Fixtures shared by the engine's unit tests.

use agora_catalog::ScenarioCatalog;
use agora_core::clock::Clock;
use agora_core::narrator::Narrator;
use agora_core::repository::{
    ActionInsert, ActionRecord, ParticipantRecord, ParticipantStatus, SessionRecord,
    SessionRepository, SessionStatus,
};
use agora_test_support::{InMemorySessionRepository, ManualClock};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::application::services::SessionServices;
use crate::config::EngineConfig;

pub(crate) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

pub(crate) struct Fixture {
    pub repo: InMemorySessionRepository,
    pub catalog: ScenarioCatalog,
    pub clock: ManualClock,
    pub config: EngineConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            repo: InMemorySessionRepository::new(),
            catalog: ScenarioCatalog::builtin().unwrap(),
            clock: ManualClock::new(start()),
            config: EngineConfig::default(),
        }
    }

    pub fn services<'a>(&'a self, narrator: &'a dyn Narrator) -> SessionServices<'a> {
        SessionServices {
            repo: &self.repo,
            narrator,
            catalog: &self.catalog,
            clock: &self.clock,
            config: &self.config,
        }
    }

    /// Seeds an active `vault-job` session at `round` with one participant
    /// per name and returns the session id and agent ids in seat order.
    pub fn seed_vault(&self, round: i32, names: &[&str]) -> (Uuid, Vec<Uuid>) {
        let session_id = Uuid::new_v4();
        let now = self.clock_now();
        let participants: Vec<ParticipantRecord> = names
            .iter()
            .zip(0..)
            .map(|(name, seat)| ParticipantRecord {
                session_id,
                agent_id: Uuid::new_v4(),
                display_name: (*name).to_owned(),
                seat,
                status: ParticipantStatus::Active,
                forfeited_at_round: None,
                joined_at: now,
            })
            .collect();
        let agents = participants.iter().map(|p| p.agent_id).collect();
        self.repo.seed(
            SessionRecord {
                id: session_id,
                scenario_id: "vault-job".to_owned(),
                catalog_version: self.catalog.version().to_owned(),
                status: SessionStatus::Active,
                round,
                round_budget: 4,
                round_deadline: Some(now + self.config.round_duration),
                prompt: Some(format!("Prompt for round {round}.")),
                summary: None,
                created_at: now,
                started_at: Some(now),
                completed_at: None,
                claim: None,
            },
            participants,
        );
        (session_id, agents)
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Moves the clock past the current round deadline.
    pub fn pass_deadline(&self) {
        self.clock
            .advance(self.config.round_duration + chrono::Duration::seconds(1));
    }

    /// Stores an action directly, bypassing intake validation.
    pub async fn submit_raw(&self, session_id: Uuid, round: i32, agent_id: Uuid, content: &str) {
        let inserted = self
            .repo
            .insert_action(
                &ActionRecord {
                    session_id,
                    round,
                    agent_id,
                    content: content.to_owned(),
                    submitted_at: self.clock_now(),
                },
                self.clock_now(),
            )
            .await
            .unwrap();
        assert_eq!(inserted, ActionInsert::Inserted);
    }
}
