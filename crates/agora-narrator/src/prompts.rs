//! Narrator prompt construction.
//!
//! Every builder is a pure function of catalog data and stored rows, so a
//! retried resolution sends the narrator the same request as the failed one.

use std::fmt::Write as _;

use agora_catalog::Scenario;
use agora_core::narrator::NarratorPrompt;
use agora_core::repository::{TranscriptEntry, TranscriptRound};

/// How many earlier resolutions are replayed to the narrator as context.
pub const HISTORY_WINDOW: usize = 3;

fn round_index(round: i32) -> u32 {
    u32::try_from(round).unwrap_or_default()
}

/// Standing instructions for every narrator call in a scenario.
#[must_use]
pub fn system_prompt(scenario: &Scenario) -> String {
    format!(
        "You are the narrator of \"{name}\", a turn-based scenario played by \
         autonomous agents. Stay consistent with the premise and rules below, \
         never act on behalf of a participant, and write in the third person.\n\n\
         {premise}",
        name = scenario.name,
        premise = scenario.premise,
    )
}

/// Appends the scene header and the action instructions for `round` to a
/// narrative prompt.
#[must_use]
pub fn with_instructions(scenario: &Scenario, round: i32, text: &str) -> String {
    let index = round_index(round);
    let scene = scenario.scene_for_round(index);
    let mut out = String::new();
    if scenario.opens_scene(index) {
        let _ = writeln!(out, "Scene: {} - {}", scene.name, scene.description);
        out.push('\n');
    }
    out.push_str(text.trim());
    out.push_str("\n\n");
    out.push_str(&scene.action.instructions());
    out
}

/// The round-0 prompt, composed from the catalog without a narrator call.
#[must_use]
pub fn opening_prompt(scenario: &Scenario) -> String {
    let scene = scenario.scene_for_round(0);
    format!(
        "Scene: {} - {}\n\n{}",
        scene.name,
        scene.description,
        scene.action.instructions()
    )
}

fn describe_entries(entries: &[TranscriptEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        match (&entry.content, entry.forfeited) {
            (Some(content), false) => {
                let _ = writeln!(out, "- {}: {}", entry.display_name, content);
            }
            _ => {
                let _ = writeln!(
                    out,
                    "- {}: (forfeited - took no action this round)",
                    entry.display_name
                );
            }
        }
    }
    out
}

fn describe_history(history: &[TranscriptRound]) -> String {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut out = String::new();
    for past in &history[start..] {
        let _ = writeln!(out, "Round {}: {}", past.round + 1, past.resolution.trim());
    }
    out
}

/// Asks the narrator to merge a round's actions into one resolution.
#[must_use]
pub fn resolution_request(
    scenario: &Scenario,
    round: i32,
    round_prompt: &str,
    entries: &[TranscriptEntry],
    history: &[TranscriptRound],
) -> NarratorPrompt {
    let scene = scenario.scene_for_round(round_index(round));
    let mut user = String::new();
    if !history.is_empty() {
        let _ = writeln!(user, "Story so far:\n{}", describe_history(history));
    }
    let _ = writeln!(
        user,
        "Round {} of {} (scene: {}).\nPrompt given to the participants:\n{}\n",
        round + 1,
        scenario.round_budget(),
        scene.name,
        round_prompt.trim()
    );
    let _ = writeln!(user, "Actions taken:\n{}", describe_entries(entries));
    user.push_str(
        "Resolve all of these actions together into one coherent account of \
         what happens this round, applying the scenario rules. Forfeiting \
         participants do nothing. Reply with the narrative only.",
    );

    NarratorPrompt {
        system: system_prompt(scenario),
        user,
    }
}

/// Asks the narrator for the prompt that opens `next_round`.
#[must_use]
pub fn next_prompt_request(
    scenario: &Scenario,
    next_round: i32,
    resolution: &str,
    active_names: &[String],
) -> NarratorPrompt {
    let scene = scenario.scene_for_round(round_index(next_round));
    let mut user = String::new();
    let _ = writeln!(user, "What just happened:\n{}\n", resolution.trim());
    let _ = writeln!(
        user,
        "Round {} of {} begins (scene: {} - {}).",
        next_round + 1,
        scenario.round_budget(),
        scene.name,
        scene.description
    );
    let _ = writeln!(user, "Participants still acting: {}.\n", active_names.join(", "));
    user.push_str(
        "Write the short situation prompt the participants will read before \
         acting this round. Do not decide their actions. Reply with the prompt only.",
    );

    NarratorPrompt {
        system: system_prompt(scenario),
        user,
    }
}

/// Asks the narrator for the session summary once the last round resolved.
#[must_use]
pub fn summary_request(
    scenario: &Scenario,
    transcript: &[TranscriptRound],
    final_resolution: &str,
) -> NarratorPrompt {
    let mut user = String::from("The session is over. Full record:\n");
    for past in transcript {
        let _ = writeln!(user, "Round {}: {}", past.round + 1, past.resolution.trim());
    }
    let _ = writeln!(user, "Final round: {}\n", final_resolution.trim());
    user.push_str(
        "Summarize how the session unfolded and how it ended for each \
         participant. Where the rules define scores or outcomes, state them.",
    );

    NarratorPrompt {
        system: system_prompt(scenario),
        user,
    }
}
