//! Scenario, scene and action specification types.

use agora_core::error::DomainError;
use serde::{Deserialize, Serialize};

/// How participants act during a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Any text, guided by a cue.
    FreeText {
        /// What the participant is asked to describe.
        cue: String,
    },
    /// One of an enumerated set of options.
    Choice {
        /// The allowed options, in display order.
        options: Vec<String>,
    },
}

impl ActionSpec {
    /// Checks `content` against this specification and returns the form
    /// to store.
    ///
    /// Free text is trimmed. A choice is matched case-insensitively against
    /// the option set and stored in the declared option's spelling.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ContentInvalid` if a choice does not match any
    /// declared option.
    pub fn normalize(&self, content: &str) -> Result<String, DomainError> {
        let trimmed = content.trim();
        match self {
            Self::FreeText { .. } => Ok(trimmed.to_owned()),
            Self::Choice { options } => options
                .iter()
                .find(|option| option.trim().eq_ignore_ascii_case(trimmed))
                .cloned()
                .ok_or_else(|| {
                    DomainError::ContentInvalid(format!(
                        "'{trimmed}' is not one of: {}",
                        options.join(", ")
                    ))
                }),
        }
    }

    /// Instructions appended to a round prompt.
    #[must_use]
    pub fn instructions(&self) -> String {
        match self {
            Self::FreeText { cue } => format!("Respond in free text: {cue}"),
            Self::Choice { options } => {
                format!("Respond with exactly one of: {}", options.join(" | "))
            }
        }
    }
}

/// A phase of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Scene name.
    pub name: String,
    /// What is going on in this phase.
    pub description: String,
    /// How participants act during this scene.
    pub action: ActionSpec,
    /// Number of rounds the scene lasts.
    pub rounds: u32,
}

/// An immutable simulation template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    /// Catalog identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Premise and rules, as plain text.
    pub premise: String,
    /// Fewest players the scenario admits.
    pub min_players: usize,
    /// Most players the scenario admits.
    pub max_players: usize,
    /// Explicit round budget overriding the scene sum.
    pub default_rounds: Option<u32>,
    /// Ordered scenes.
    pub scenes: Vec<Scene>,
}

impl Scenario {
    /// Total rounds: the explicit default, or the sum of scene rounds.
    /// Saturates at `u32::MAX` if the scene sum overflows.
    #[must_use]
    pub fn round_budget(&self) -> u32 {
        self.default_rounds
            .or_else(|| self.scene_rounds())
            .unwrap_or(u32::MAX)
    }

    /// Sum of scene rounds, or `None` if it overflows.
    #[must_use]
    pub fn scene_rounds(&self) -> Option<u32> {
        self.scenes
            .iter()
            .try_fold(0_u32, |total, scene| total.checked_add(scene.rounds))
    }

    /// Whether a group of `players` fits the player-count bounds.
    #[must_use]
    pub fn admits(&self, players: usize) -> bool {
        (self.min_players..=self.max_players).contains(&players)
    }

    /// The scene a round belongs to. Rounds past the scene sum stay in the
    /// last scene.
    ///
    /// # Panics
    ///
    /// Panics if the scenario has no scenes. The loader rejects those.
    #[must_use]
    pub fn scene_for_round(&self, round: u32) -> &Scene {
        let mut remaining = round;
        for scene in &self.scenes {
            if remaining < scene.rounds {
                return scene;
            }
            remaining -= scene.rounds;
        }
        self.scenes
            .last()
            .expect("scenario has at least one scene")
    }

    /// Whether `round` is the first round of its scene.
    #[must_use]
    pub fn opens_scene(&self, round: u32) -> bool {
        let mut start = 0_u32;
        for scene in &self.scenes {
            if start == round {
                return true;
            }
            let Some(next) = start.checked_add(scene.rounds) else {
                return false;
            };
            start = next;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_text(name: &str, rounds: u32) -> Scene {
        Scene {
            name: name.to_owned(),
            description: format!("{name} description"),
            action: ActionSpec::FreeText {
                cue: "What do you do?".to_owned(),
            },
            rounds,
        }
    }

    fn choice(name: &str, rounds: u32) -> Scene {
        Scene {
            name: name.to_owned(),
            description: format!("{name} description"),
            action: ActionSpec::Choice {
                options: vec!["Cooperate".to_owned(), "Defect".to_owned()],
            },
            rounds,
        }
    }

    fn scenario(scenes: Vec<Scene>, default_rounds: Option<u32>) -> Scenario {
        Scenario {
            id: "test".to_owned(),
            name: "Test".to_owned(),
            premise: "A test.".to_owned(),
            min_players: 2,
            max_players: 4,
            default_rounds,
            scenes,
        }
    }

    #[test]
    fn test_round_budget_sums_scene_rounds() {
        let s = scenario(vec![free_text("a", 3), choice("b", 1)], None);
        assert_eq!(s.round_budget(), 4);
    }

    #[test]
    fn test_round_budget_prefers_explicit_default() {
        let s = scenario(vec![free_text("a", 3)], Some(6));
        assert_eq!(s.round_budget(), 6);
    }

    #[test]
    fn test_scene_for_round_walks_cumulative_counts() {
        let s = scenario(vec![free_text("a", 3), choice("b", 1)], None);

        assert_eq!(s.scene_for_round(0).name, "a");
        assert_eq!(s.scene_for_round(2).name, "a");
        assert_eq!(s.scene_for_round(3).name, "b");
    }

    #[test]
    fn test_scene_for_round_past_sum_stays_in_last_scene() {
        let s = scenario(vec![free_text("a", 1), choice("b", 1)], Some(5));
        assert_eq!(s.scene_for_round(4).name, "b");
    }

    #[test]
    fn test_opens_scene_marks_scene_boundaries() {
        let s = scenario(vec![free_text("a", 3), choice("b", 1)], None);

        assert!(s.opens_scene(0));
        assert!(!s.opens_scene(1));
        assert!(s.opens_scene(3));
        assert!(!s.opens_scene(4));
    }

    #[test]
    fn test_admits_honors_bounds() {
        let s = scenario(vec![free_text("a", 1)], None);

        assert!(!s.admits(1));
        assert!(s.admits(2));
        assert!(s.admits(4));
        assert!(!s.admits(5));
    }

    #[test]
    fn test_choice_normalize_canonicalizes_spelling() {
        let spec = ActionSpec::Choice {
            options: vec!["Cooperate".to_owned(), "Defect".to_owned()],
        };

        assert_eq!(spec.normalize("  defect ").unwrap(), "Defect");
    }

    #[test]
    fn test_choice_normalize_rejects_unknown_option() {
        let spec = ActionSpec::Choice {
            options: vec!["Cooperate".to_owned(), "Defect".to_owned()],
        };

        match spec.normalize("betray") {
            Err(DomainError::ContentInvalid(msg)) => assert!(msg.contains("betray")),
            other => panic!("expected ContentInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_free_text_normalize_trims() {
        let spec = ActionSpec::FreeText {
            cue: "Speak".to_owned(),
        };

        assert_eq!(spec.normalize("  I wait.\n").unwrap(), "I wait.");
    }
}
