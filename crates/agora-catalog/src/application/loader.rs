//! Scenario document parsing.
//!
//! A scenario document is Markdown with a YAML front-matter block:
//!
//! ```text
//! ---
//! id: harbor-council
//! name: The Harbor Council
//! min_players: 3
//! max_players: 6
//! scenes:
//!   - name: Opening statements
//!     description: ...
//!     rounds: 2
//!     action: { kind: free_text, cue: "State your position." }
//! ---
//! # Premise
//! Markdown body with the premise and rules.
//! ```

use std::collections::HashSet;

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::scenario::{ActionSpec, Scenario, Scene};

const FRONT_MATTER_FENCE: &str = "---";

/// Errors raised while loading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A document could not be parsed.
    #[error("failed to parse scenario document {source_name}: {message}")]
    Parse {
        /// Which document failed.
        source_name: String,
        /// What went wrong.
        message: String,
    },

    /// A scenario parsed but is not usable.
    #[error("invalid scenario {id}: {reason}")]
    Invalid {
        /// Scenario id.
        id: String,
        /// Which rule it breaks.
        reason: String,
    },

    /// Two documents declare the same id.
    #[error("duplicate scenario id: {0}")]
    DuplicateId(String),

    /// The catalog has no scenarios.
    #[error("scenario catalog is empty")]
    Empty,

    /// Reading a scenario directory failed.
    #[error("failed to read scenario source: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct FrontMatter {
    id: String,
    name: String,
    min_players: usize,
    max_players: usize,
    #[serde(default)]
    default_rounds: Option<u32>,
    scenes: Vec<Scene>,
}

/// Parses one scenario document.
///
/// # Errors
///
/// Returns `CatalogError::Parse` if the front matter is missing or malformed,
/// and `CatalogError::Invalid` if the scenario breaks a structural rule.
pub fn parse_scenario(source_name: &str, text: &str) -> Result<Scenario, CatalogError> {
    let (yaml, body) = split_front_matter(text).ok_or_else(|| CatalogError::Parse {
        source_name: source_name.to_owned(),
        message: "missing YAML front matter".to_owned(),
    })?;

    let front: FrontMatter = serde_yaml::from_str(yaml).map_err(|e| CatalogError::Parse {
        source_name: source_name.to_owned(),
        message: e.to_string(),
    })?;

    let scenario = Scenario {
        id: front.id,
        name: front.name,
        premise: markdown_to_plain_text(body),
        min_players: front.min_players,
        max_players: front.max_players,
        default_rounds: front.default_rounds,
        scenes: front.scenes,
    };
    validate(&scenario)?;
    Ok(scenario)
}

/// Parses a set of documents, rejecting duplicate ids.
///
/// # Errors
///
/// Returns the first `CatalogError` encountered, or `CatalogError::Empty`.
pub fn parse_all<'a, I>(sources: I) -> Result<Vec<Scenario>, CatalogError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut seen = HashSet::new();
    let mut scenarios = Vec::new();
    for (name, text) in sources {
        let scenario = parse_scenario(name, text)?;
        if !seen.insert(scenario.id.clone()) {
            return Err(CatalogError::DuplicateId(scenario.id));
        }
        scenarios.push(scenario);
    }
    if scenarios.is_empty() {
        return Err(CatalogError::Empty);
    }
    Ok(scenarios)
}

fn split_front_matter(text: &str) -> Option<(&str, &str)> {
    let rest = text.trim_start_matches('\u{feff}').strip_prefix(FRONT_MATTER_FENCE)?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_FENCE {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((yaml, body));
        }
        offset += line.len();
    }
    None
}

fn invalid(scenario: &Scenario, reason: impl Into<String>) -> CatalogError {
    CatalogError::Invalid {
        id: scenario.id.clone(),
        reason: reason.into(),
    }
}

fn validate(scenario: &Scenario) -> Result<(), CatalogError> {
    if scenario.id.trim().is_empty() {
        return Err(invalid(scenario, "id must not be empty"));
    }
    if scenario.min_players == 0 || scenario.min_players > scenario.max_players {
        return Err(invalid(
            scenario,
            format!(
                "player bounds must satisfy 1 <= min <= max (got {}..={})",
                scenario.min_players, scenario.max_players
            ),
        ));
    }
    if scenario.scenes.is_empty() {
        return Err(invalid(scenario, "at least one scene is required"));
    }
    if scenario.default_rounds == Some(0) {
        return Err(invalid(scenario, "default_rounds must be at least 1"));
    }
    let scene_total = scenario
        .scene_rounds()
        .and_then(|total| i32::try_from(total).ok());
    if scene_total.is_none() || i32::try_from(scenario.round_budget()).is_err() {
        return Err(invalid(scenario, "round budget is too large"));
    }
    for scene in &scenario.scenes {
        if scene.rounds == 0 {
            return Err(invalid(
                scenario,
                format!("scene '{}' must last at least one round", scene.name),
            ));
        }
        if let ActionSpec::Choice { options } = &scene.action {
            let distinct: HashSet<String> = options
                .iter()
                .map(|option| option.trim().to_ascii_lowercase())
                .filter(|option| !option.is_empty())
                .collect();
            if distinct.len() < 2 || distinct.len() != options.len() {
                return Err(invalid(
                    scenario,
                    format!(
                        "choice scene '{}' needs at least two distinct, non-empty options",
                        scene.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Flattens Markdown to plain text suitable for a narrator prompt.
#[must_use]
pub fn markdown_to_plain_text(markdown: &str) -> String {
    let mut out = String::new();
    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::Start(Tag::Item) => out.push_str("- "),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => {
                out.push('\n');
            }
            _ => {}
        }
    }
    out.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "---
id: duel
name: The Duel
min_players: 2
max_players: 2
scenes:
  - name: Standoff
    description: Two rivals face off.
    rounds: 2
    action:
      kind: free_text
      cue: Describe your move.
  - name: Decision
    description: Draw or walk away.
    rounds: 1
    action:
      kind: choice
      options: [Draw, Walk away]
---
# Premise

Two rivals meet at **noon**.

- No seconds
- No retreat
";

    #[test]
    fn test_parse_scenario_reads_front_matter_and_body() {
        let scenario = parse_scenario("duel.md", VALID).unwrap();

        assert_eq!(scenario.id, "duel");
        assert_eq!(scenario.min_players, 2);
        assert_eq!(scenario.scenes.len(), 2);
        assert_eq!(scenario.round_budget(), 3);
        assert_eq!(
            scenario.scenes[1].action,
            ActionSpec::Choice {
                options: vec!["Draw".to_owned(), "Walk away".to_owned()],
            }
        );
        assert!(scenario.premise.contains("Two rivals meet at noon."));
        assert!(scenario.premise.contains("- No retreat"));
        assert!(!scenario.premise.contains("**"));
    }

    #[test]
    fn test_parse_scenario_requires_front_matter() {
        let result = parse_scenario("bare.md", "# Just markdown");

        assert!(matches!(result, Err(CatalogError::Parse { .. })));
    }

    #[test]
    fn test_parse_scenario_rejects_inverted_player_bounds() {
        let text = VALID.replace("min_players: 2", "min_players: 3");

        match parse_scenario("duel.md", &text) {
            Err(CatalogError::Invalid { id, reason }) => {
                assert_eq!(id, "duel");
                assert!(reason.contains("player bounds"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_scenario_rejects_overflowing_scene_rounds() {
        let text = VALID
            .replace("rounds: 2", "rounds: 4294967295")
            .replace("rounds: 1", "rounds: 4294967295");

        match parse_scenario("duel.md", &text) {
            Err(CatalogError::Invalid { id, reason }) => {
                assert_eq!(id, "duel");
                assert!(reason.contains("round budget"));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_scenario_rejects_zero_round_scene() {
        let text = VALID.replace("rounds: 1", "rounds: 0");

        assert!(matches!(
            parse_scenario("duel.md", &text),
            Err(CatalogError::Invalid { .. })
        ));
    }

    #[test]
    fn test_parse_scenario_rejects_single_option_choice() {
        let text = VALID.replace("[Draw, Walk away]", "[Draw]");

        assert!(matches!(
            parse_scenario("duel.md", &text),
            Err(CatalogError::Invalid { .. })
        ));
    }

    #[test]
    fn test_parse_all_rejects_duplicate_ids() {
        let result = parse_all([("a.md", VALID), ("b.md", VALID)]);

        match result {
            Err(CatalogError::DuplicateId(id)) => assert_eq!(id, "duel"),
            other => panic!("expected DuplicateId, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_all_rejects_empty_input() {
        let result = parse_all(Vec::<(&str, &str)>::new());

        assert!(matches!(result, Err(CatalogError::Empty)));
    }
}
