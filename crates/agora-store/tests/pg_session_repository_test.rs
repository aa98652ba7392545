//! Integration tests for `PgSessionRepository` against a real database.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use agora_core::repository::{
    ActionInsert, ActionRecord, NewParticipant, NewSession, ParticipantStatus, RoundClaim,
    RoundFinalization, RoundOutcome, SessionRepository, SessionStart, SessionStatus,
    TranscriptEntry, TranscriptRound,
};
use agora_store::pg_session_repository::PgSessionRepository;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

fn seat(name: &str) -> NewParticipant {
    NewParticipant {
        agent_id: Uuid::new_v4(),
        display_name: name.to_owned(),
    }
}

async fn create_pending(repo: &PgSessionRepository, names: &[&str]) -> (Uuid, Vec<Uuid>) {
    let participants: Vec<NewParticipant> = names.iter().map(|n| seat(n)).collect();
    let agents = participants.iter().map(|p| p.agent_id).collect();
    let session = NewSession {
        id: Uuid::new_v4(),
        scenario_id: "vault-job".to_owned(),
        catalog_version: "test-catalog".to_owned(),
        round_budget: 2,
        created_at: t0(),
        participants,
    };
    assert!(repo.create_session(&session).await.unwrap());
    (session.id, agents)
}

async fn create_active(repo: &PgSessionRepository, names: &[&str]) -> (Uuid, Vec<Uuid>) {
    let (session_id, agents) = create_pending(repo, names).await;
    let start = SessionStart {
        prompt: "Opening prompt.".to_owned(),
        deadline: t0() + TimeDelta::hours(1),
        started_at: t0(),
    };
    assert!(repo.start_session(session_id, &start).await.unwrap());
    (session_id, agents)
}

fn action(session_id: Uuid, round: i32, agent_id: Uuid, content: &str) -> ActionRecord {
    ActionRecord {
        session_id,
        round,
        agent_id,
        content: content.to_owned(),
        submitted_at: t0() + TimeDelta::minutes(5),
    }
}

fn claim(round: i32) -> RoundClaim {
    RoundClaim {
        token: Uuid::new_v4(),
        round,
        expires_at: t0() + TimeDelta::minutes(3),
    }
}

fn finalization(session_id: Uuid, round: i32, token: Uuid, outcome: RoundOutcome) -> RoundFinalization {
    RoundFinalization {
        claim_token: token,
        transcript: TranscriptRound {
            session_id,
            round,
            prompt: "Opening prompt.".to_owned(),
            entries: vec![TranscriptEntry {
                agent_id: Uuid::nil(),
                display_name: "Ash".to_owned(),
                content: Some("Pick the lock.".to_owned()),
                forfeited: false,
            }],
            resolution: "The lock gives.".to_owned(),
            resolved_at: t0() + TimeDelta::minutes(10),
        },
        forfeits: vec![],
        outcome,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_create_session_persists_pending_session_and_seats(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);

    // Act
    let (session_id, agents) = create_pending(&repo, &["Ash", "Bea"]).await;

    // Assert
    let session = repo.load_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Pending);
    assert_eq!(session.round, 0);
    assert_eq!(session.round_budget, 2);
    assert!(session.claim.is_none());
    let participants = repo.load_participants(session_id).await.unwrap();
    assert_eq!(participants.len(), 2);
    assert_eq!(participants[0].agent_id, agents[0]);
    assert_eq!(participants[0].seat, 0);
    assert_eq!(participants[1].display_name, "Bea");
    assert_eq!(participants[1].status, ParticipantStatus::Active);
}

fn new_session(participants: Vec<NewParticipant>) -> NewSession {
    NewSession {
        id: Uuid::new_v4(),
        scenario_id: "vault-job".to_owned(),
        catalog_version: "test-catalog".to_owned(),
        round_budget: 2,
        created_at: t0(),
        participants,
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_create_session_refuses_engaged_agents(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);
    let (_, busy) = create_active(&repo, &["Cy"]).await;
    let cy = NewParticipant {
        agent_id: busy[0],
        display_name: "Cy".to_owned(),
    };
    let session = new_session(vec![seat("Ash"), cy]);

    // Act
    let created = repo.create_session(&session).await.unwrap();

    // Assert
    assert!(!created);
    assert!(repo.load_session(session.id).await.unwrap().is_none());
    assert!(repo.load_participants(session.id).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_creates_seat_an_agent_once(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);
    let (ash, bea) = (seat("Ash"), seat("Bea"));
    let first = new_session(vec![ash.clone(), bea.clone()]);
    let second = new_session(vec![bea, ash]);

    // Act
    let (a, b) = tokio::join!(repo.create_session(&first), repo.create_session(&second));

    // Assert
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a != b, "exactly one create should win");
    let pending = repo.list_pending_sessions().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(repo.load_participants(pending[0].id).await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_load_unknown_session_returns_none(pool: PgPool) {
    let repo = PgSessionRepository::new(pool);

    let session = repo.load_session(Uuid::new_v4()).await.unwrap();

    assert!(session.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_start_and_cancel_only_apply_to_pending(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);
    let (active_id, _) = create_active(&repo, &["Ash"]).await;
    let (pending_id, _) = create_pending(&repo, &["Bea"]).await;

    // Act
    let cancelled_active = repo.cancel_session(active_id, t0()).await.unwrap();
    let cancelled_pending = repo.cancel_session(pending_id, t0()).await.unwrap();
    let start = SessionStart {
        prompt: "Too late.".to_owned(),
        deadline: t0(),
        started_at: t0(),
    };
    let started_cancelled = repo.start_session(pending_id, &start).await.unwrap();

    // Assert
    assert!(!cancelled_active);
    assert!(cancelled_pending);
    assert!(!started_cancelled);
    let cancelled = repo.load_session(pending_id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, SessionStatus::Cancelled);
    assert_eq!(cancelled.completed_at, Some(t0()));
    let active = repo.load_session(active_id).await.unwrap().unwrap();
    assert_eq!(active.prompt.as_deref(), Some("Opening prompt."));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_action_rejects_duplicates_and_keeps_original(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);
    let (session_id, agents) = create_active(&repo, &["Ash", "Bea"]).await;

    // Act
    let first = repo
        .insert_action(&action(session_id, 0, agents[0], "Pick the lock."), t0())
        .await
        .unwrap();
    let second = repo
        .insert_action(&action(session_id, 0, agents[0], "Run."), t0())
        .await
        .unwrap();

    // Assert
    assert_eq!(first, ActionInsert::Inserted);
    assert_eq!(second, ActionInsert::Duplicate);
    let actions = repo.load_actions(session_id, 0).await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].content, "Pick the lock.");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_insert_action_is_closed_for_wrong_round_stranger_or_live_claim(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);
    let (session_id, agents) = create_active(&repo, &["Ash", "Bea"]).await;

    // Act
    let wrong_round = repo
        .insert_action(&action(session_id, 1, agents[0], "Early."), t0())
        .await
        .unwrap();
    let stranger = repo
        .insert_action(&action(session_id, 0, Uuid::new_v4(), "Hi."), t0())
        .await
        .unwrap();
    assert!(repo.claim_round(session_id, 0, &claim(0), t0()).await.unwrap());
    let while_claimed = repo
        .insert_action(&action(session_id, 0, agents[1], "Late."), t0())
        .await
        .unwrap();
    let after_expiry = repo
        .insert_action(
            &action(session_id, 0, agents[1], "Later."),
            t0() + TimeDelta::minutes(3),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(wrong_round, ActionInsert::RoundClosed);
    assert_eq!(stranger, ActionInsert::RoundClosed);
    assert_eq!(while_claimed, ActionInsert::RoundClosed);
    assert_eq!(after_expiry, ActionInsert::Inserted);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_claim_is_exclusive_until_released_or_expired(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);
    let (session_id, _) = create_active(&repo, &["Ash"]).await;
    let first = claim(0);

    // Act
    let won = repo.claim_round(session_id, 0, &first, t0()).await.unwrap();
    let contested = repo.claim_round(session_id, 0, &claim(0), t0()).await.unwrap();
    let wrong_round = repo.claim_round(session_id, 1, &claim(1), t0()).await.unwrap();
    let stored = repo.load_session(session_id).await.unwrap().unwrap().claim;
    let foreign_release = repo.release_claim(session_id, Uuid::new_v4()).await.unwrap();
    let released = repo.release_claim(session_id, first.token).await.unwrap();
    let reclaimed = repo.claim_round(session_id, 0, &claim(0), t0()).await.unwrap();
    let taken_over = repo
        .claim_round(session_id, 0, &claim(0), t0() + TimeDelta::minutes(3))
        .await
        .unwrap();

    // Assert
    assert!(won);
    assert!(!contested);
    assert!(!wrong_round);
    assert_eq!(stored, Some(first));
    assert!(!foreign_release);
    assert!(released);
    assert!(reclaimed);
    assert!(taken_over);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_finalize_continue_advances_round_and_flips_forfeits(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);
    let (session_id, agents) = create_active(&repo, &["Ash", "Bea"]).await;
    let held = claim(0);
    assert!(repo.claim_round(session_id, 0, &held, t0()).await.unwrap());
    let next_deadline = t0() + TimeDelta::hours(2);
    let mut write = finalization(
        session_id,
        0,
        held.token,
        RoundOutcome::Continue {
            prompt: "Round two.".to_owned(),
            deadline: next_deadline,
        },
    );
    write.forfeits = vec![agents[1]];

    // Act
    let applied = repo.finalize_round(&write).await.unwrap();
    let replayed = repo.finalize_round(&write).await.unwrap();

    // Assert
    assert!(applied);
    assert!(!replayed);
    let session = repo.load_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.round, 1);
    assert_eq!(session.prompt.as_deref(), Some("Round two."));
    assert_eq!(session.round_deadline, Some(next_deadline));
    assert!(session.claim.is_none());
    let participants = repo.load_participants(session_id).await.unwrap();
    assert_eq!(participants[0].status, ParticipantStatus::Active);
    assert_eq!(participants[1].status, ParticipantStatus::Forfeited);
    assert_eq!(participants[1].forfeited_at_round, Some(0));
    let transcript = repo.load_transcript(session_id).await.unwrap();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0], write.transcript);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_finalize_complete_sets_summary(pool: PgPool) {
    let repo = PgSessionRepository::new(pool);
    let (session_id, _) = create_active(&repo, &["Ash"]).await;
    let held = claim(0);
    assert!(repo.claim_round(session_id, 0, &held, t0()).await.unwrap());
    let completed_at = t0() + TimeDelta::minutes(10);

    let applied = repo
        .finalize_round(&finalization(
            session_id,
            0,
            held.token,
            RoundOutcome::Complete {
                summary: "They got away.".to_owned(),
                completed_at,
            },
        ))
        .await
        .unwrap();

    assert!(applied);
    let session = repo.load_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.summary.as_deref(), Some("They got away."));
    assert_eq!(session.completed_at, Some(completed_at));
    assert!(session.claim.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_finalize_without_claim_writes_nothing(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);
    let (session_id, _) = create_active(&repo, &["Ash"]).await;
    let write = finalization(
        session_id,
        0,
        Uuid::new_v4(),
        RoundOutcome::Continue {
            prompt: "Round two.".to_owned(),
            deadline: t0(),
        },
    );

    // Act
    let applied = repo.finalize_round(&write).await.unwrap();

    // Assert
    assert!(!applied);
    assert!(repo.load_transcript(session_id).await.unwrap().is_empty());
    let session = repo.load_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.round, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_transcript_rounds_are_append_only(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool.clone());
    let (session_id, _) = create_active(&repo, &["Ash"]).await;
    let held = claim(0);
    assert!(repo.claim_round(session_id, 0, &held, t0()).await.unwrap());
    let write = finalization(
        session_id,
        0,
        held.token,
        RoundOutcome::Continue {
            prompt: "Round two.".to_owned(),
            deadline: t0(),
        },
    );
    assert!(repo.finalize_round(&write).await.unwrap());

    // Act
    let result = sqlx::query("UPDATE transcript_rounds SET resolution = 'rewritten'")
        .execute(&pool)
        .await;

    // Assert
    assert!(result.is_err());
    let transcript = repo.load_transcript(session_id).await.unwrap();
    assert_eq!(transcript[0].resolution, "The lock gives.");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_join_pending_respects_capacity_and_engagement(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);
    let (lobby_id, _) = create_pending(&repo, &["Ash"]).await;
    let (_, busy) = create_active(&repo, &["Cy"]).await;
    let bea = seat("Bea");
    let cy = NewParticipant {
        agent_id: busy[0],
        display_name: "Cy".to_owned(),
    };

    // Act
    let engaged = repo.join_pending(lobby_id, &cy, 3, t0()).await.unwrap();
    let joined = repo.join_pending(lobby_id, &bea, 3, t0()).await.unwrap();
    let again = repo.join_pending(lobby_id, &bea, 3, t0()).await.unwrap();
    let full = repo.join_pending(lobby_id, &seat("Dee"), 2, t0()).await.unwrap();

    // Assert
    assert!(!engaged);
    assert!(joined);
    assert!(!again);
    assert!(!full);
    let participants = repo.load_participants(lobby_id).await.unwrap();
    assert_eq!(participants.len(), 2);
    assert_eq!(participants[1].agent_id, bea.agent_id);
    assert_eq!(participants[1].seat, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_due_sessions_include_passed_deadlines_and_expired_claims(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);
    let (on_time, _) = create_active(&repo, &["Ash"]).await;
    let (abandoned, _) = create_active(&repo, &["Bea"]).await;
    create_pending(&repo, &["Cy"]).await;
    assert!(repo.claim_round(abandoned, 0, &claim(0), t0()).await.unwrap());

    // Act
    let before = repo.list_due_sessions(t0() + TimeDelta::minutes(1)).await.unwrap();
    let after_lease = repo.list_due_sessions(t0() + TimeDelta::minutes(3)).await.unwrap();
    let after_deadline = repo.list_due_sessions(t0() + TimeDelta::hours(1)).await.unwrap();

    // Assert
    assert!(before.is_empty());
    assert_eq!(after_lease.len(), 1);
    assert_eq!(after_lease[0].id, abandoned);
    let mut due: Vec<Uuid> = after_deadline.iter().map(|s| s.id).collect();
    due.sort();
    let mut expected = vec![on_time, abandoned];
    expected.sort();
    assert_eq!(due, expected);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_listing_and_engagement_queries(pool: PgPool) {
    // Arrange
    let repo = PgSessionRepository::new(pool);
    let (pending_id, pending_agents) = create_pending(&repo, &["Ash"]).await;
    let (active_id, active_agents) = create_active(&repo, &["Bea"]).await;
    let (cancelled_id, _) = create_pending(&repo, &["Cy"]).await;
    assert!(repo.cancel_session(cancelled_id, t0()).await.unwrap());

    // Act
    let pending = repo.list_pending_sessions().await.unwrap();
    let active = repo.list_sessions(Some(SessionStatus::Active), 50).await.unwrap();
    let all = repo.list_sessions(None, 50).await.unwrap();
    let limited = repo.list_sessions(None, 1).await.unwrap();
    let mut engaged = repo.engaged_agent_ids().await.unwrap();

    // Assert
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, pending_id);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, active_id);
    assert_eq!(all.len(), 3);
    assert_eq!(limited.len(), 1);
    engaged.sort();
    let mut expected = vec![pending_agents[0], active_agents[0]];
    expected.sort();
    assert_eq!(engaged, expected);
}
