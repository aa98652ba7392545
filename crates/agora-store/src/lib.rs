//! PostgreSQL-backed persistence for the Agora session engine.

pub mod pg_agent_directory;
pub mod pg_session_repository;
pub mod schema;
