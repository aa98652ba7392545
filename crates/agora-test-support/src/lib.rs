//! Shared test mocks and utilities for the Agora session engine.

mod clock;
mod directory;
mod narrator;
mod repository;
mod rng;

pub use clock::{FixedClock, ManualClock};
pub use directory::StaticAgentDirectory;
pub use narrator::{FailingNarrator, GatedNarrator, ScriptedNarrator};
pub use repository::{FailingSessionRepository, InMemorySessionRepository};
pub use rng::{MockRng, SequenceRng};
