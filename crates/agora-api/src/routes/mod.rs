//! Route modules.

pub mod engine;
pub mod health;
pub mod scenarios;
pub mod sessions;
