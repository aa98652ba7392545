//! The read-only scenario catalog.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use agora_core::error::DomainError;
use agora_core::rng::{DeterministicRng, pick_index};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::application::loader::{CatalogError, parse_all};
use crate::domain::scenario::Scenario;

const BUILTIN_SOURCES: [(&str, &str); 3] = [
    (
        "vault-job.md",
        include_str!("../../scenarios/vault-job.md"),
    ),
    (
        "harbor-council.md",
        include_str!("../../scenarios/harbor-council.md"),
    ),
    (
        "salvage-rights.md",
        include_str!("../../scenarios/salvage-rights.md"),
    ),
];

/// Static table of scenario definitions, indexed by id.
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    scenarios: Vec<Scenario>,
    index: HashMap<String, usize>,
    version: String,
}

impl ScenarioCatalog {
    /// Builds a catalog from `(source name, document)` pairs.
    ///
    /// The catalog version is a SHA-256 digest over the sources in the order
    /// given.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if any document fails to parse or validate.
    pub fn from_sources<'a, I>(sources: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)> + Clone,
    {
        let mut hasher = Sha256::new();
        for (name, text) in sources.clone() {
            hasher.update(name.as_bytes());
            hasher.update([0]);
            hasher.update(text.as_bytes());
            hasher.update([0]);
        }
        let digest = hasher.finalize();
        let mut version = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(version, "{byte:02x}");
        }

        let scenarios = parse_all(sources)?;
        let index = scenarios
            .iter()
            .enumerate()
            .map(|(i, scenario)| (scenario.id.clone(), i))
            .collect();

        Ok(Self {
            scenarios,
            index,
            version,
        })
    }

    /// The scenarios shipped with the engine.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if a built-in document is malformed.
    pub fn builtin() -> Result<Self, CatalogError> {
        let catalog = Self::from_sources(BUILTIN_SOURCES)?;
        info!(
            scenarios = catalog.scenarios.len(),
            version = %catalog.version,
            "loaded built-in scenario catalog"
        );
        Ok(catalog)
    }

    /// Loads every `*.md` file in `dir`, in file-name order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Io` if the directory cannot be read, or a
    /// parse/validation error for a malformed document.
    pub fn from_dir(dir: &Path) -> Result<Self, CatalogError> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in &paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            documents.push((name, std::fs::read_to_string(path)?));
        }

        let catalog = Self::from_sources(
            documents
                .iter()
                .map(|(name, text)| (name.as_str(), text.as_str())),
        )?;
        info!(
            dir = %dir.display(),
            scenarios = catalog.scenarios.len(),
            version = %catalog.version,
            "loaded scenario catalog"
        );
        Ok(catalog)
    }

    /// Digest identifying this catalog's content.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// All scenarios in load order.
    #[must_use]
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Looks up a scenario by id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ScenarioNotFound` for an unknown id.
    pub fn get(&self, id: &str) -> Result<&Scenario, DomainError> {
        self.index
            .get(id)
            .map(|&i| &self.scenarios[i])
            .ok_or_else(|| DomainError::ScenarioNotFound(id.to_owned()))
    }

    /// Scenarios admitting exactly `players` participants.
    #[must_use]
    pub fn admitting(&self, players: usize) -> Vec<&Scenario> {
        self.scenarios
            .iter()
            .filter(|scenario| scenario.admits(players))
            .collect()
    }

    /// Picks uniformly at random among scenarios admitting `players`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NoEligibleScenario` when no scenario fits.
    pub fn pick_for(
        &self,
        players: usize,
        rng: &mut dyn DeterministicRng,
    ) -> Result<&Scenario, DomainError> {
        let candidates = self.admitting(players);
        pick_index(rng, candidates.len())
            .map(|i| candidates[i])
            .ok_or(DomainError::NoEligibleScenario(players))
    }

    /// Picks uniformly at random among scenarios that can still seat
    /// `players` agents, so a lobby opened for them has room to grow.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NoEligibleScenario` when every scenario is too
    /// small.
    pub fn pick_lobby(
        &self,
        players: usize,
        rng: &mut dyn DeterministicRng,
    ) -> Result<&Scenario, DomainError> {
        let candidates: Vec<&Scenario> = self
            .scenarios
            .iter()
            .filter(|scenario| scenario.max_players >= players)
            .collect();
        pick_index(rng, candidates.len())
            .map(|i| candidates[i])
            .ok_or(DomainError::NoEligibleScenario(players))
    }

    /// Largest group size no greater than `available` that some scenario
    /// admits.
    #[must_use]
    pub fn largest_feasible_group(&self, available: usize) -> Option<usize> {
        (1..=available)
            .rev()
            .find(|&size| self.scenarios.iter().any(|s| s.admits(size)))
    }
}
