//! End-to-end engine tests with deterministic capabilities.

use keeper_core::testing::{
    assert_knows_fact, assert_round_robin, assert_unaware_of_fact, assert_view_excludes_turn,
    harness_capabilities, harness_config, EchoNarrator, FlakyDecider, RecapSummarizer,
    ScriptedDecider, ScriptedResolver, TestHarness,
};
use keeper_core::{
    Capabilities, CandidateFact, CharacterSpec, Confidence, EngineConfig, EngineError, GameEngine,
    Outcome, Resolution, StateDelta, TimelineItem, TurnError, Visibility,
};
use std::sync::Arc;
use std::time::Duration;

fn quick_config() -> EngineConfig {
    harness_config()
}

#[tokio::test]
async fn round_robin_is_fair_over_many_turns() {
    let mut harness = TestHarness::new(3);
    let records = harness.run(9).await.expect("turns should run");

    assert_eq!(records.len(), 9);
    assert_round_robin(&records, 3);
    for i in 0..3 {
        let actor = harness.character(i);
        assert_eq!(records.iter().filter(|r| r.actor == actor).count(), 3);
    }
}

#[tokio::test]
async fn sequences_are_contiguous_and_monotonic() {
    let mut harness = TestHarness::new(2);
    let records = harness.run(10).await.expect("turns should run");

    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.sequence, i as u64 + 1);
    }
    assert_eq!(harness.state().last_sequence, 10);
}

#[tokio::test]
async fn resolution_failure_commits_nothing() {
    let capabilities = Capabilities {
        decision: Arc::new(ScriptedDecider::new().with_default("press on")),
        // Empty queue and no default: every resolve call fails.
        resolution: Arc::new(ScriptedResolver::new()),
        narration: Arc::new(EchoNarrator),
        summarize: Arc::new(RecapSummarizer::new()),
    };
    let mut harness = TestHarness::with_capabilities(2, capabilities);

    let err = harness.engine.advance_turn(harness.game_id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Turn(TurnError::Capability(_))
    ));

    assert_eq!(harness.state().last_sequence, 0);
    assert!(harness.view(0, 30).is_empty());
}

#[tokio::test]
async fn consolidation_replaces_old_turns_with_a_summary() {
    let mut engine = GameEngine::new(
        harness_capabilities(),
        quick_config()
            .with_window_size(5)
            .with_consolidation_threshold(8),
    );
    let game_id = engine.create_game(vec![CharacterSpec::new("Ava")]);
    let ava = engine.get_state(game_id).expect("state").characters[0].id;

    engine.run_turns(game_id, 8).await.expect("turns should run");

    let view = engine.view_for(game_id, ava, 30).expect("view");
    let summaries: Vec<_> = view.iter().filter_map(|i| i.as_summary()).collect();
    let turns: Vec<_> = view.iter().filter_map(|i| i.as_turn()).collect();

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].start_sequence, 1);
    assert_eq!(summaries[0].end_sequence, 3);
    assert_eq!(turns.len(), 5);
    for sequence in 1..=3 {
        assert_view_excludes_turn(&view, sequence);
    }
}

#[tokio::test]
async fn perspective_isolation_holds_for_separated_characters() {
    let mut engine = GameEngine::new(
        harness_capabilities(),
        quick_config()
            .with_window_size(2)
            .with_consolidation_threshold(4),
    );
    let game_id = engine.create_game(vec![
        CharacterSpec::new("Ava").with_location("cellar"),
        CharacterSpec::new("Brin").with_location("tavern"),
    ]);
    let state = engine.get_state(game_id).expect("state");
    let ava = state.characters[0].id;
    let brin = state.characters[1].id;

    engine.run_turns(game_id, 10).await.expect("turns should run");

    // Nobody shares a location, so nobody sees the other's turns.
    let ava_view = engine.view_for(game_id, ava, 30).expect("view");
    for item in &ava_view {
        if let TimelineItem::Turn(turn) = item {
            assert_eq!(turn.actor, ava);
        }
    }
    let brin_view = engine.view_for(game_id, brin, 30).expect("view");
    for item in &brin_view {
        if let TimelineItem::Turn(turn) = item {
            assert_eq!(turn.actor, brin);
        }
    }
}

// Capabilities whose summarizer leaks a secret fact scoped to nobody.
fn harness_capabilities_with_secret() -> Capabilities {
    Capabilities {
        summarize: Arc::new(RecapSummarizer::new().with_fact(CandidateFact {
            subject: "ledger".to_string(),
            predicate: "is hidden in the cellar".to_string(),
            confidence: Confidence::Certain,
            visibility: Visibility::known_to([]),
        })),
        ..harness_capabilities()
    }
}

#[tokio::test]
async fn scoped_facts_stay_hidden_from_outsiders() {
    let mut engine = GameEngine::new(
        harness_capabilities_with_secret(),
        quick_config()
            .with_window_size(2)
            .with_consolidation_threshold(4),
    );
    let game_id = engine.create_game(vec![CharacterSpec::new("Ava"), CharacterSpec::new("Brin")]);
    let state = engine.get_state(game_id).expect("state");
    let ava = state.characters[0].id;

    engine.run_turns(game_id, 8).await.expect("turns should run");

    // The fact was extracted but scoped to no character.
    let facts = engine.known_facts(game_id, ava).expect("facts");
    assert_unaware_of_fact(&facts, "ledger");
}

#[tokio::test]
async fn public_facts_are_known_to_everyone() {
    let capabilities = Capabilities {
        summarize: Arc::new(RecapSummarizer::new().with_fact(CandidateFact {
            subject: "bridge".to_string(),
            predicate: "has collapsed".to_string(),
            confidence: Confidence::Likely,
            visibility: Visibility::Public,
        })),
        ..harness_capabilities()
    };
    let mut engine = GameEngine::new(
        capabilities,
        quick_config()
            .with_window_size(2)
            .with_consolidation_threshold(4),
    );
    let game_id = engine.create_game(vec![CharacterSpec::new("Ava"), CharacterSpec::new("Brin")]);
    let state = engine.get_state(game_id).expect("state");
    let brin = state.characters[1].id;

    engine.run_turns(game_id, 8).await.expect("turns should run");

    let facts = engine.known_facts(game_id, brin).expect("facts");
    assert_knows_fact(&facts, "bridge");
}

#[tokio::test]
async fn lethal_damage_incapacitates_and_skips_the_actor() {
    let resolver = Arc::new(
        ScriptedResolver::new()
            .with_default(Resolution::new(Outcome::Success, "It goes as planned.")),
    );
    let capabilities = Capabilities {
        resolution: resolver.clone(),
        ..harness_capabilities()
    };
    let mut engine = GameEngine::new(capabilities, quick_config());
    let game_id = engine.create_game(vec![CharacterSpec::new("Ava"), CharacterSpec::new("Brin")]);
    let ava = engine.get_state(game_id).expect("state").characters[0].id;

    // First turn: Ava takes lethal damage from her own reckless action.
    resolver.enqueue(
        Resolution::new(Outcome::Failure, "The trap springs.").with_delta(StateDelta::Health {
            character: ava,
            change: -200,
        }),
    );

    let first = engine.advance_turn(game_id).await.expect("first turn");
    assert_eq!(first.actor, ava);

    let state = engine.get_state(game_id).expect("state");
    let fallen = state.character(ava).expect("ava");
    assert_eq!(fallen.health, 0);
    assert!(fallen.incapacitated);

    // Every remaining turn goes to Brin.
    let records = engine.run_turns(game_id, 4).await.expect("turns");
    for record in &records {
        assert_ne!(record.actor, ava);
    }
}

#[tokio::test]
async fn invalid_delta_rejects_the_whole_turn() {
    let resolver = Arc::new(ScriptedResolver::new());
    let capabilities = Capabilities {
        resolution: resolver.clone(),
        ..harness_capabilities()
    };
    let mut harness = TestHarness::with_capabilities(1, capabilities);
    let ava = harness.character(0);

    // Losing an item that was never held rejects every delta in the turn.
    resolver.enqueue(
        Resolution::new(Outcome::Success, "You hand it over.").with_delta(StateDelta::ItemLost {
            character: ava,
            item: "crown".to_string(),
        }),
    );

    let err = harness.engine.advance_turn(harness.game_id).await.unwrap_err();
    assert!(matches!(err, EngineError::Turn(TurnError::InvalidDelta(_))));
    assert_eq!(harness.state().last_sequence, 0);
    assert!(harness.state().characters[0].inventory.is_empty());
}

#[tokio::test]
async fn transient_capability_failures_are_retried() {
    let capabilities = Capabilities {
        decision: Arc::new(FlakyDecider::new(1, "push through")),
        ..harness_capabilities()
    };
    let config = quick_config()
        .with_capability_retries(3)
        .with_backoff_base(Duration::from_millis(1));
    let mut engine = GameEngine::new(capabilities, config);
    let game_id = engine.create_game(vec![CharacterSpec::new("Ava")]);

    let record = engine.advance_turn(game_id).await.expect("retried turn");
    assert_eq!(record.action, "push through");
}

#[tokio::test]
async fn capability_exhaustion_skips_to_the_next_actor() {
    let capabilities = Capabilities {
        decision: Arc::new(FlakyDecider::new(usize::MAX, "never")),
        ..harness_capabilities()
    };
    let config = quick_config()
        .with_capability_retries(2)
        .with_backoff_base(Duration::from_millis(1));
    let mut engine = GameEngine::new(capabilities, config);
    let game_id = engine.create_game(vec![CharacterSpec::new("Ava"), CharacterSpec::new("Brin")]);
    let state = engine.get_state(game_id).expect("state");
    let ava = state.characters[0].id;
    let brin = state.characters[1].id;

    let err = engine.advance_turn(game_id).await.unwrap_err();
    assert!(matches!(err, EngineError::Turn(TurnError::Capability(_))));
    assert_eq!(engine.get_state(game_id).expect("state").last_sequence, 0);

    // Manual action bypasses the broken decider; the skip offset moved on.
    let record = engine
        .advance_turn_with_action(game_id, "step forward")
        .await
        .expect("manual turn");
    assert_eq!(record.actor, brin);
    let _ = ava;
}

#[tokio::test]
async fn manual_action_drives_the_selected_character() {
    let mut harness = TestHarness::new(2);
    let record = harness.act("light a torch").await.expect("manual turn");
    assert_eq!(record.action, "light a torch");
    assert_eq!(record.actor, harness.character(0));
}

#[tokio::test]
async fn stopped_game_runs_no_further_turns() {
    let mut harness = TestHarness::new(2);
    harness.run(3).await.expect("turns should run");
    harness.engine.stop(harness.game_id).expect("stop");

    let records = harness.run(5).await.expect("run after stop");
    assert!(records.is_empty());
    assert_eq!(harness.state().last_sequence, 3);
}
