//! Agora — Narrator adapter.
//!
//! Prompt construction for round resolution, next-round prompts and session
//! summaries, plus an HTTP narrator speaking the OpenAI-compatible chat
//! completions protocol.

pub mod http;
pub mod prompts;

pub use http::{HttpNarrator, HttpNarratorConfig};
