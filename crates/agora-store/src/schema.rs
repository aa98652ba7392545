//! SQL shared by the store's queries.
//!
//! Tables are created by the migrations in the repository's `migrations/`
//! directory; this module only holds the read projections.

/// Columns selected for a `SessionRow`.
pub const SELECT_SESSION: &str = r"
SELECT id, scenario_id, catalog_version, status, round, round_budget,
       round_deadline, prompt, summary, claim_token, claim_round,
       claim_expires_at, created_at, started_at, completed_at
FROM sessions";

/// Columns selected for a `ParticipantRow`.
pub const SELECT_PARTICIPANT: &str = r"
SELECT session_id, agent_id, display_name, seat, status,
       forfeited_at_round, joined_at
FROM participants";

/// Session statuses that keep an agent engaged.
pub const ENGAGED_STATUSES: &[&str] = &["pending", "active"];

/// Advisory lock key held by transactions that seat agents.
pub const SEATING_LOCK_KEY: i64 = 0x6167_6f72_6173_6561;
