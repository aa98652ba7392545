//! Agora — turn-based multi-agent session engine.
//!
//! Responsible for matchmaking, action intake, round advancement and
//! resolution, and the deadline sweep. No state lives in memory between
//! invocations: every entry point rebuilds what it needs from the store, and
//! the store's conditional writes are the only synchronization.

pub mod application;
pub mod config;
pub mod domain;

#[cfg(test)]
mod testing;
