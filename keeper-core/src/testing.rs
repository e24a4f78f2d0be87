//! Testing utilities.
//!
//! Deterministic capability implementations for integration tests without
//! any external model calls, plus a `TestHarness` that wires a full engine
//! and assertion helpers for the common checks.

use crate::capability::{
    Capabilities, CapabilityError, DecisionCapability, NarrationCapability, ResolutionCapability,
    SummarizeCapability, SummaryOutcome,
};
use crate::config::EngineConfig;
use crate::engine::{EngineError, GameEngine};
use crate::memory::{CandidateFact, Fact, TimelineItem, TurnRecord};
use crate::ruling::{ActionProposal, Outcome, Resolution};
use crate::world::{CharacterId, CharacterSpec, CharacterState, GameId, GameState};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A decider that replays a queue of scripted actions.
///
/// With the queue empty it returns the default action if one is set and
/// fails otherwise.
pub struct ScriptedDecider {
    queue: Mutex<VecDeque<String>>,
    default: Option<String>,
}

impl ScriptedDecider {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default: None,
        }
    }

    /// Queue an action.
    pub fn push(self, action: impl Into<String>) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(action.into());
        }
        self
    }

    /// Set the action returned once the queue is drained.
    pub fn with_default(mut self, action: impl Into<String>) -> Self {
        self.default = Some(action.into());
        self
    }

    /// Queue an action on a shared instance.
    pub fn enqueue(&self, action: impl Into<String>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(action.into());
        }
    }
}

impl Default for ScriptedDecider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DecisionCapability for ScriptedDecider {
    async fn decide(
        &self,
        _view: &[TimelineItem],
        _character: &CharacterState,
    ) -> Result<ActionProposal, CapabilityError> {
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match next.or_else(|| self.default.clone()) {
            Some(action) => Ok(ActionProposal::new(action)),
            None => Err(CapabilityError::Failed(
                "no scripted action left".to_string(),
            )),
        }
    }
}

/// A resolver that replays a queue of scripted resolutions.
pub struct ScriptedResolver {
    queue: Mutex<VecDeque<Resolution>>,
    default: Option<Resolution>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default: None,
        }
    }

    /// Queue a resolution.
    pub fn push(self, resolution: Resolution) -> Self {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(resolution);
        }
        self
    }

    /// Set the resolution returned once the queue is drained.
    pub fn with_default(mut self, resolution: Resolution) -> Self {
        self.default = Some(resolution);
        self
    }

    /// Queue a resolution on a shared instance.
    pub fn enqueue(&self, resolution: Resolution) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(resolution);
        }
    }
}

impl Default for ScriptedResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResolutionCapability for ScriptedResolver {
    async fn resolve(
        &self,
        _proposal: &ActionProposal,
        _actor: &CharacterState,
        _keeper_view: &[TimelineItem],
        _state: &GameState,
    ) -> Result<Resolution, CapabilityError> {
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match next.or_else(|| self.default.clone()) {
            Some(resolution) => Ok(resolution),
            None => Err(CapabilityError::Failed(
                "no scripted resolution left".to_string(),
            )),
        }
    }
}

/// A narrator that echoes the resolution's outcome text.
#[derive(Debug, Default)]
pub struct EchoNarrator;

#[async_trait]
impl NarrationCapability for EchoNarrator {
    async fn narrate(
        &self,
        _state: &GameState,
        resolution: &Resolution,
    ) -> Result<String, CapabilityError> {
        Ok(resolution.outcome_text.clone())
    }
}

/// A summarizer producing a deterministic recap plus any scripted facts.
///
/// The scripted facts are emitted on every call, which makes supersession
/// paths easy to exercise.
#[derive(Debug, Default, Clone)]
pub struct RecapSummarizer {
    facts: Vec<CandidateFact>,
}

impl RecapSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fact emitted with each summary.
    pub fn with_fact(mut self, fact: CandidateFact) -> Self {
        self.facts.push(fact);
        self
    }
}

#[async_trait]
impl SummarizeCapability for RecapSummarizer {
    async fn summarize(&self, turns: &[TurnRecord]) -> Result<SummaryOutcome, CapabilityError> {
        if turns.is_empty() {
            return Err(CapabilityError::Failed("nothing to summarize".to_string()));
        }
        let condensed = format!(
            "Turns {} to {}: {} actions resolved.",
            turns[0].sequence,
            turns[turns.len() - 1].sequence,
            turns.len()
        );
        Ok(SummaryOutcome {
            condensed,
            facts: self.facts.clone(),
        })
    }
}

/// A summarizer that fails its first `n` calls, then recaps normally.
#[derive(Debug, Default)]
pub struct FailingSummarizer {
    remaining: AtomicUsize,
    inner: RecapSummarizer,
}

impl FailingSummarizer {
    pub fn new(failures: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(failures),
            inner: RecapSummarizer::new(),
        }
    }
}

#[async_trait]
impl SummarizeCapability for FailingSummarizer {
    async fn summarize(&self, turns: &[TurnRecord]) -> Result<SummaryOutcome, CapabilityError> {
        let remaining = self.remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(CapabilityError::Failed("summarizer down".to_string()));
        }
        self.inner.summarize(turns).await
    }
}

/// A decider that fails its first `n` calls, then returns a fixed action.
#[derive(Debug)]
pub struct FlakyDecider {
    remaining: AtomicUsize,
    action: String,
}

impl FlakyDecider {
    pub fn new(failures: usize, action: impl Into<String>) -> Self {
        Self {
            remaining: AtomicUsize::new(failures),
            action: action.into(),
        }
    }
}

#[async_trait]
impl DecisionCapability for FlakyDecider {
    async fn decide(
        &self,
        _view: &[TimelineItem],
        _character: &CharacterState,
    ) -> Result<ActionProposal, CapabilityError> {
        let remaining = self.remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != usize::MAX {
                self.remaining.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(CapabilityError::Failed("decider down".to_string()));
        }
        Ok(ActionProposal::new(self.action.clone()))
    }
}

/// Capabilities that always succeed with bland deterministic output.
pub fn harness_capabilities() -> Capabilities {
    Capabilities {
        decision: Arc::new(ScriptedDecider::new().with_default("press on")),
        resolution: Arc::new(
            ScriptedResolver::new()
                .with_default(Resolution::new(Outcome::Success, "It goes as planned.")),
        ),
        narration: Arc::new(EchoNarrator),
        summarize: Arc::new(RecapSummarizer::new()),
    }
}

/// A config tuned for fast tests: single attempt, millisecond backoff.
pub fn harness_config() -> EngineConfig {
    EngineConfig::new()
        .with_capability_retries(1)
        .with_backoff_base(Duration::from_millis(1))
        .with_capability_timeout(Duration::from_secs(5))
}

/// Test harness wiring a full engine around one game.
pub struct TestHarness {
    pub engine: GameEngine,
    pub game_id: GameId,
    characters: Vec<CharacterId>,
}

impl TestHarness {
    /// An engine with `count` characters named "Player 1".."Player N",
    /// all at the same starting location.
    pub fn new(count: usize) -> Self {
        Self::with_capabilities(count, harness_capabilities())
    }

    /// Same, with caller-supplied capabilities.
    pub fn with_capabilities(count: usize, capabilities: Capabilities) -> Self {
        let specs = (1..=count)
            .map(|i| CharacterSpec::new(format!("Player {i}")))
            .collect();
        let mut engine = GameEngine::new(capabilities, harness_config());
        let game_id = engine.create_game(specs);
        let characters = engine
            .get_state(game_id)
            .map(|s| s.characters.iter().map(|c| c.id).collect())
            .unwrap_or_default();
        Self {
            engine,
            game_id,
            characters,
        }
    }

    /// Character id by creation index.
    pub fn character(&self, index: usize) -> CharacterId {
        self.characters[index]
    }

    /// Run `n` turns, returning the committed records.
    pub async fn run(&mut self, n: usize) -> Result<Vec<TurnRecord>, EngineError> {
        self.engine.run_turns(self.game_id, n).await
    }

    /// Run one turn with a manual action.
    pub async fn act(&mut self, action: &str) -> Result<TurnRecord, EngineError> {
        self.engine
            .advance_turn_with_action(self.game_id, action)
            .await
    }

    pub fn state(&self) -> &GameState {
        self.engine
            .get_state(self.game_id)
            .unwrap_or_else(|_| panic!("harness game missing"))
    }

    /// One character's filtered view.
    pub fn view(&self, index: usize, max_items: usize) -> Vec<TimelineItem> {
        self.engine
            .view_for(self.game_id, self.character(index), max_items)
            .unwrap_or_default()
    }

    /// One character's known facts.
    pub fn facts(&self, index: usize) -> Vec<Fact> {
        self.engine
            .known_facts(self.game_id, self.character(index))
            .unwrap_or_default()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert a view contains the raw turn with the given sequence.
#[track_caller]
pub fn assert_view_includes_turn(view: &[TimelineItem], sequence: u64) {
    assert!(
        view.iter()
            .any(|i| i.as_turn().map(|t| t.sequence == sequence).unwrap_or(false)),
        "expected view to include raw turn {sequence}"
    );
}

/// Assert a view does not contain the raw turn with the given sequence.
#[track_caller]
pub fn assert_view_excludes_turn(view: &[TimelineItem], sequence: u64) {
    assert!(
        !view
            .iter()
            .any(|i| i.as_turn().map(|t| t.sequence == sequence).unwrap_or(false)),
        "expected view to exclude raw turn {sequence}"
    );
}

/// Assert the fact list contains a current fact about the subject.
#[track_caller]
pub fn assert_knows_fact(facts: &[Fact], subject: &str) {
    assert!(
        facts.iter().any(|f| f.subject.eq_ignore_ascii_case(subject)),
        "expected a known fact about '{subject}', got {} facts",
        facts.len()
    );
}

/// Assert the fact list has no fact about the subject.
#[track_caller]
pub fn assert_unaware_of_fact(facts: &[Fact], subject: &str) {
    assert!(
        !facts.iter().any(|f| f.subject.eq_ignore_ascii_case(subject)),
        "expected no known fact about '{subject}'"
    );
}

/// Assert actors repeat in a fixed cycle of the given length.
#[track_caller]
pub fn assert_round_robin(records: &[TurnRecord], cycle: usize) {
    for (i, record) in records.iter().enumerate().skip(cycle) {
        assert_eq!(
            record.actor,
            records[i - cycle].actor,
            "round-robin broken at turn {}",
            record.sequence
        );
    }
}
