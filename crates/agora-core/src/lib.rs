//! Agora Core — shared domain abstractions.
//!
//! This crate defines the fundamental traits and types that the engine
//! crates depend on: time, randomness, persistence, the narrator and the
//! agent directory. It contains no infrastructure code.

pub mod clock;
pub mod command;
pub mod directory;
pub mod error;
pub mod narrator;
pub mod repository;
pub mod rng;
