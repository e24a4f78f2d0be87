//! Rulings: action proposals, resolution outcomes, and reasoning traces.
//!
//! The resolution capability returns a `Resolution` with an explicit
//! reasoning trace so that every ruling is auditable after the fact.

use crate::world::StateDelta;
use serde::{Deserialize, Serialize};

/// An action proposed by a player (agent or manual override).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionProposal {
    /// Free-text action, first person ("I search the room").
    pub text: String,
    /// Optional target character or object name.
    pub target: Option<String>,
}

impl ActionProposal {
    /// Create a proposal with no target.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: None,
        }
    }

    /// Set the target.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Outcome of a resolved action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
    Uncertain,
}

impl Outcome {
    /// Display name for prompts and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failure => "FAILURE",
            Outcome::Partial => "PARTIAL",
            Outcome::Uncertain => "UNCERTAIN",
        }
    }
}

/// A single step in a reasoning trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// 1-based step number.
    pub step_number: usize,
    /// What this step examined.
    pub description: String,
    /// Facts considered by this step.
    pub relevant_facts: Vec<String>,
    /// Conclusion drawn, if any.
    pub conclusion: Option<String>,
}

/// Explicit reasoning trace attached to every ruling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasoningTrace {
    /// The situation being ruled on.
    pub situation: String,
    /// Ordered reasoning steps.
    pub steps: Vec<ReasoningStep>,
    /// Final conclusion the outcome was derived from.
    pub conclusion: String,
}

impl ReasoningTrace {
    /// Start a trace for a situation.
    pub fn new(situation: impl Into<String>) -> Self {
        Self {
            situation: situation.into(),
            steps: Vec::new(),
            conclusion: String::new(),
        }
    }

    /// Append a reasoning step.
    pub fn add_step(
        &mut self,
        description: impl Into<String>,
        relevant_facts: Vec<String>,
        conclusion: Option<String>,
    ) {
        self.steps.push(ReasoningStep {
            step_number: self.steps.len() + 1,
            description: description.into(),
            relevant_facts,
            conclusion,
        });
    }

    /// Set the final conclusion.
    pub fn conclude(mut self, conclusion: impl Into<String>) -> Self {
        self.conclusion = conclusion.into();
        self
    }
}

/// A ruling on a player action: outcome, narrative, reasoning, and the
/// state deltas the outcome implies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    /// Outcome of the action.
    pub outcome: Outcome,
    /// Outcome text describing what happened mechanically.
    pub outcome_text: String,
    /// Why the keeper ruled this way.
    pub reasoning: ReasoningTrace,
    /// Proposed state changes. Validated before acceptance.
    pub deltas: Vec<StateDelta>,
}

impl Resolution {
    /// Create a resolution with no deltas.
    pub fn new(outcome: Outcome, outcome_text: impl Into<String>) -> Self {
        Self {
            outcome,
            outcome_text: outcome_text.into(),
            reasoning: ReasoningTrace::default(),
            deltas: Vec::new(),
        }
    }

    /// Attach a reasoning trace.
    pub fn with_reasoning(mut self, reasoning: ReasoningTrace) -> Self {
        self.reasoning = reasoning;
        self
    }

    /// Add a proposed delta.
    pub fn with_delta(mut self, delta: StateDelta) -> Self {
        self.deltas.push(delta);
        self
    }

    /// Add several proposed deltas.
    pub fn with_deltas(mut self, deltas: impl IntoIterator<Item = StateDelta>) -> Self {
        self.deltas.extend(deltas);
        self
    }
}
