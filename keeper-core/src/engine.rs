//! The game engine: owns every running game and composes the orchestrator,
//! the memory vault, and persistence behind one API.

use crate::capability::Capabilities;
use crate::config::EngineConfig;
use crate::memory::{Fact, MemoryVault, TimelineItem, TurnRecord};
use crate::orchestrator::{Orchestrator, TurnError};
use crate::persist::{GameStore, PersistError, SavedGame};
use crate::world::{CharacterId, CharacterSpec, GameId, GameState};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown game: {0}")]
    UnknownGame(GameId),

    #[error(transparent)]
    Turn(#[from] TurnError),

    #[error("no game store configured")]
    NoStore,

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// One running game: world state, its vault, and its scheduler.
struct Game {
    state: GameState,
    vault: MemoryVault,
    orchestrator: Orchestrator,
}

/// Owns games and drives them turn by turn.
pub struct GameEngine {
    capabilities: Capabilities,
    config: EngineConfig,
    store: Option<GameStore>,
    games: HashMap<GameId, Game>,
}

impl GameEngine {
    /// Build an in-memory engine (no persistence).
    pub fn new(capabilities: Capabilities, config: EngineConfig) -> Self {
        Self {
            capabilities,
            config,
            store: None,
            games: HashMap::new(),
        }
    }

    /// Attach a game store; each completed turn is then persisted
    /// best-effort.
    pub fn with_store(mut self, store: GameStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a new game from character specs. The opening scene lands in
    /// the world flags so the first resolutions have a setting to draw on.
    pub fn create_game(&mut self, specs: Vec<CharacterSpec>) -> GameId {
        let game_id = GameId::new();
        let mut state = GameState::new(game_id, specs);
        state
            .world_flags
            .insert("scene".to_string(), self.config.opening_scene.clone());
        let game = Game {
            state,
            vault: MemoryVault::new(self.config.vault_config()),
            orchestrator: Orchestrator::new(),
        };
        info!(game = %game_id, characters = game.state.characters.len(), "game created");
        self.games.insert(game_id, game);
        game_id
    }

    /// Run one turn with the decision capability choosing the action.
    pub async fn advance_turn(&mut self, game_id: GameId) -> Result<TurnRecord, EngineError> {
        self.advance(game_id, None).await
    }

    /// Run one turn with a caller-supplied action replacing the decision
    /// capability's output for the selected character.
    pub async fn advance_turn_with_action(
        &mut self,
        game_id: GameId,
        action: impl Into<String>,
    ) -> Result<TurnRecord, EngineError> {
        self.advance(game_id, Some(action.into())).await
    }

    async fn advance(
        &mut self,
        game_id: GameId,
        manual_action: Option<String>,
    ) -> Result<TurnRecord, EngineError> {
        let Self {
            games,
            capabilities,
            config,
            store,
        } = self;
        let game = games
            .get_mut(&game_id)
            .ok_or(EngineError::UnknownGame(game_id))?;

        let record = game
            .orchestrator
            .run_turn(
                &mut game.state,
                &mut game.vault,
                capabilities,
                config,
                manual_action,
            )
            .await?;

        // Persistence never fails a committed turn.
        if let Some(store) = store.as_ref() {
            let saved = SavedGame::new(
                game.state.clone(),
                game.vault.clone(),
                game.orchestrator.skip_offset(),
            );
            if let Err(err) = store.record_turn(&record, &saved).await {
                warn!(game = %game_id, error = %err, "failed to persist turn");
            }
        }

        Ok(record)
    }

    /// Run up to `n` turns. Stops early when the game stops or nobody can
    /// act. A turn abandoned for a skippable reason (capability exhaustion,
    /// rejected deltas) is logged and counted, and the loop moves on to the
    /// next actor.
    pub async fn run_turns(
        &mut self,
        game_id: GameId,
        n: usize,
    ) -> Result<Vec<TurnRecord>, EngineError> {
        let mut records = Vec::new();
        for _ in 0..n {
            match self.advance(game_id, None).await {
                Ok(record) => records.push(record),
                Err(EngineError::Turn(TurnError::Stopped))
                | Err(EngineError::Turn(TurnError::NoActivePlayers)) => break,
                Err(EngineError::Turn(TurnError::Capability(err))) => {
                    warn!(game = %game_id, error = %err, "turn skipped");
                }
                Err(EngineError::Turn(TurnError::InvalidDelta(err))) => {
                    warn!(game = %game_id, error = %err, "turn skipped");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(records)
    }

    /// Stop a game. Terminal.
    pub fn stop(&mut self, game_id: GameId) -> Result<(), EngineError> {
        let game = self
            .games
            .get_mut(&game_id)
            .ok_or(EngineError::UnknownGame(game_id))?;
        let Game {
            state, orchestrator, ..
        } = game;
        orchestrator.stop(state);
        info!(game = %game_id, "game stopped");
        Ok(())
    }

    /// The full current world state.
    pub fn get_state(&self, game_id: GameId) -> Result<&GameState, EngineError> {
        self.games
            .get(&game_id)
            .map(|g| &g.state)
            .ok_or(EngineError::UnknownGame(game_id))
    }

    /// A character's perspective-filtered timeline, most-recent-first.
    pub fn view_for(
        &self,
        game_id: GameId,
        character: CharacterId,
        max_items: usize,
    ) -> Result<Vec<TimelineItem>, EngineError> {
        self.games
            .get(&game_id)
            .map(|g| g.vault.view_for(character, max_items))
            .ok_or(EngineError::UnknownGame(game_id))
    }

    /// Current facts a character knows.
    pub fn known_facts(
        &self,
        game_id: GameId,
        character: CharacterId,
    ) -> Result<Vec<Fact>, EngineError> {
        self.games
            .get(&game_id)
            .map(|g| g.vault.known_facts(character).into_iter().cloned().collect())
            .ok_or(EngineError::UnknownGame(game_id))
    }

    /// Restore a game from its snapshot. The saved vault keeps its own
    /// window settings.
    pub async fn load_game(&mut self, game_id: GameId) -> Result<(), EngineError> {
        let store = self.store.as_ref().ok_or(EngineError::NoStore)?;
        let saved = store.snapshots().get(game_id).await?;
        info!(game = %game_id, last_sequence = saved.state.last_sequence, "game loaded");
        self.games.insert(
            game_id,
            Game {
                state: saved.state,
                vault: saved.vault,
                orchestrator: Orchestrator::restore(saved.skip_offset),
            },
        );
        Ok(())
    }

    /// The complete persisted turn history for a game.
    pub async fn history(&self, game_id: GameId) -> Result<Vec<TurnRecord>, EngineError> {
        let store = self.store.as_ref().ok_or(EngineError::NoStore)?;
        Ok(store.events().replay(game_id).await?)
    }
}
