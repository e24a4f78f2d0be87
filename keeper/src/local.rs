//! Deterministic local capabilities.
//!
//! A rule-based stand-in for model-backed capabilities so the demo runs
//! offline. Actions are interpreted by keyword: searching finds things,
//! resting heals, attacking hurts, traveling moves. Crude on purpose.

use async_trait::async_trait;
use keeper_core::{
    ActionProposal, CandidateFact, CapabilityError, CharacterState, Confidence,
    DecisionCapability, GameState, NarrationCapability, Outcome, ReasoningTrace, Resolution,
    ResolutionCapability, StateDelta, SummarizeCapability, SummaryOutcome, TimelineItem,
    TurnRecord, Visibility,
};

const IDLE_ACTIONS: &[&str] = &[
    "look around carefully",
    "search the area for anything useful",
    "talk with whoever is nearby",
    "rest for a while",
    "travel to the old mill",
];

/// Picks the next action from a fixed rotation, keyed off how much the
/// character has already seen.
pub struct LocalDecider;

#[async_trait]
impl DecisionCapability for LocalDecider {
    async fn decide(
        &self,
        view: &[TimelineItem],
        character: &CharacterState,
    ) -> Result<ActionProposal, CapabilityError> {
        let index = (view.len() + character.name.len()) % IDLE_ACTIONS.len();
        Ok(ActionProposal::new(IDLE_ACTIONS[index]))
    }
}

/// Resolves actions by keyword, producing typed deltas.
pub struct LocalResolver;

#[async_trait]
impl ResolutionCapability for LocalResolver {
    async fn resolve(
        &self,
        proposal: &ActionProposal,
        actor: &CharacterState,
        _keeper_view: &[TimelineItem],
        _state: &GameState,
    ) -> Result<Resolution, CapabilityError> {
        let action = proposal.text.to_lowercase();

        let (resolution, conclusion) = if action.contains("search") || action.contains("look") {
            (
                Resolution::new(Outcome::Success, "The search turns up a length of rope.")
                    .with_delta(StateDelta::ItemGained {
                        character: actor.id,
                        item: "rope".to_string(),
                    }),
                "a thorough search turns something up",
            )
        } else if action.contains("rest") {
            (
                Resolution::new(Outcome::Success, "A short rest restores some strength.")
                    .with_delta(StateDelta::Health {
                        character: actor.id,
                        change: 10,
                    }),
                "rest restores vigor",
            )
        } else if action.contains("attack") || action.contains("fight") {
            (
                Resolution::new(Outcome::Partial, "The blow lands, but so does the counter.")
                    .with_delta(StateDelta::Health {
                        character: actor.id,
                        change: -10,
                    }),
                "violence has a cost",
            )
        } else if let Some(destination) = action
            .split("travel to ")
            .nth(1)
            .or_else(|| action.split("go to ").nth(1))
        {
            (
                Resolution::new(
                    Outcome::Success,
                    format!("The road leads to {destination}."),
                )
                .with_delta(StateDelta::Moved {
                    character: actor.id,
                    to: destination.to_string(),
                }),
                "the road is open",
            )
        } else if action.contains("talk") {
            (
                Resolution::new(Outcome::Success, "The conversation passes pleasantly."),
                "words cost nothing",
            )
        } else {
            (
                Resolution::new(Outcome::Uncertain, "It is hard to say what comes of it."),
                "no rule covers this",
            )
        };

        let reasoning = ReasoningTrace::new(format!("{} tries to {}", actor.name, action))
            .conclude(conclusion);
        Ok(resolution.with_reasoning(reasoning))
    }
}

/// Narrates by wrapping the outcome text with the scene.
pub struct LocalNarrator;

#[async_trait]
impl NarrationCapability for LocalNarrator {
    async fn narrate(
        &self,
        state: &GameState,
        resolution: &Resolution,
    ) -> Result<String, CapabilityError> {
        let scene = state
            .world_flags
            .get("scene")
            .map(String::as_str)
            .unwrap_or("the road");
        Ok(format!("{} ({})", resolution.outcome_text, scene))
    }
}

/// Condenses turns into a recap and extracts durable facts from deltas.
pub struct LocalSummarizer;

#[async_trait]
impl SummarizeCapability for LocalSummarizer {
    async fn summarize(&self, turns: &[TurnRecord]) -> Result<SummaryOutcome, CapabilityError> {
        if turns.is_empty() {
            return Err(CapabilityError::Failed("nothing to summarize".to_string()));
        }
        let condensed = format!(
            "Turns {} through {}: {}",
            turns[0].sequence,
            turns[turns.len() - 1].sequence,
            turns
                .iter()
                .map(|t| t.action.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        );

        let mut facts = Vec::new();
        for turn in turns {
            for delta in &turn.deltas {
                match delta {
                    StateDelta::Moved { to, .. } => facts.push(CandidateFact {
                        subject: to.clone(),
                        predicate: "has been visited".to_string(),
                        confidence: Confidence::Certain,
                        visibility: Visibility::Public,
                    }),
                    StateDelta::ItemGained { character, item } => facts.push(CandidateFact {
                        subject: item.clone(),
                        predicate: "was picked up".to_string(),
                        confidence: Confidence::Likely,
                        visibility: Visibility::known_to([*character]),
                    }),
                    _ => {}
                }
            }
        }

        Ok(SummaryOutcome { condensed, facts })
    }
}
