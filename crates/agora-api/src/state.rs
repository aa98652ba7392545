//! Shared application state.

use std::sync::{Arc, Mutex};

use agora_catalog::ScenarioCatalog;
use agora_core::clock::Clock;
use agora_core::directory::AgentDirectory;
use agora_core::narrator::Narrator;
use agora_core::repository::SessionRepository;
use agora_core::rng::DeterministicRng;
use agora_session::application::services::SessionServices;
use agora_session::config::EngineConfig;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session store.
    pub session_repository: Arc<dyn SessionRepository>,
    /// Agent directory used by matchmaking.
    pub agent_directory: Arc<dyn AgentDirectory>,
    /// Narrative generator.
    pub narrator: Arc<dyn Narrator>,
    /// Scenario catalog, loaded once at startup.
    pub catalog: Arc<ScenarioCatalog>,
    /// Clock for deadlines and timestamps.
    pub clock: Arc<dyn Clock>,
    /// RNG for matchmaking.
    pub rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    /// Engine tunables.
    pub config: Arc<EngineConfig>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        session_repository: Arc<dyn SessionRepository>,
        agent_directory: Arc<dyn AgentDirectory>,
        narrator: Arc<dyn Narrator>,
        catalog: Arc<ScenarioCatalog>,
        clock: Arc<dyn Clock>,
        rng: Arc<Mutex<dyn DeterministicRng + Send>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            session_repository,
            agent_directory,
            narrator,
            catalog,
            clock,
            rng,
            config: Arc::new(config),
        }
    }

    /// Borrows the engine collaborators for one call.
    #[must_use]
    pub fn services(&self) -> SessionServices<'_> {
        SessionServices {
            repo: self.session_repository.as_ref(),
            narrator: self.narrator.as_ref(),
            catalog: &self.catalog,
            clock: self.clock.as_ref(),
            config: &self.config,
        }
    }
}
