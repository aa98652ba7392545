//! Dependencies shared by the engine entry points.

use agora_catalog::ScenarioCatalog;
use agora_core::clock::Clock;
use agora_core::narrator::Narrator;
use agora_core::repository::SessionRepository;

use crate::config::EngineConfig;

/// Borrowed collaborators for one engine call.
#[derive(Clone, Copy)]
pub struct SessionServices<'a> {
    /// Session store.
    pub repo: &'a dyn SessionRepository,
    /// Narrative generator.
    pub narrator: &'a dyn Narrator,
    /// Scenario catalog.
    pub catalog: &'a ScenarioCatalog,
    /// Time source.
    pub clock: &'a dyn Clock,
    /// Engine settings.
    pub config: &'a EngineConfig,
}
