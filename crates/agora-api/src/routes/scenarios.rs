//! Routes for the scenario catalog.

use agora_catalog::{ActionSpec, Scenario};
use axum::extract::State;
use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::state::AppState;

/// A scene as listed by the catalog endpoint.
#[derive(Debug, Serialize)]
pub struct SceneSummary {
    /// Scene name.
    pub name: String,
    /// Rounds the scene lasts.
    pub rounds: u32,
    /// How participants act.
    pub action: ActionSpec,
}

/// A scenario as listed by the catalog endpoint.
#[derive(Debug, Serialize)]
pub struct ScenarioSummary {
    /// Catalog identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Fewest players.
    pub min_players: usize,
    /// Most players.
    pub max_players: usize,
    /// Total rounds.
    pub round_budget: u32,
    /// Scenes in order.
    pub scenes: Vec<SceneSummary>,
}

impl From<&Scenario> for ScenarioSummary {
    fn from(scenario: &Scenario) -> Self {
        Self {
            id: scenario.id.clone(),
            name: scenario.name.clone(),
            min_players: scenario.min_players,
            max_players: scenario.max_players,
            round_budget: scenario.round_budget(),
            scenes: scenario
                .scenes
                .iter()
                .map(|scene| SceneSummary {
                    name: scene.name.clone(),
                    rounds: scene.rounds,
                    action: scene.action.clone(),
                })
                .collect(),
        }
    }
}

/// Response body for GET /.
#[derive(Debug, Serialize)]
pub struct CatalogResponse {
    /// Catalog digest.
    pub version: String,
    /// Scenarios in catalog order.
    pub scenarios: Vec<ScenarioSummary>,
}

/// GET /
async fn list_scenarios(State(state): State<AppState>) -> Json<CatalogResponse> {
    Json(CatalogResponse {
        version: state.catalog.version().to_owned(),
        scenarios: state
            .catalog
            .scenarios()
            .iter()
            .map(ScenarioSummary::from)
            .collect(),
    })
}

/// Returns the router for the scenario catalog.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_scenarios))
}
