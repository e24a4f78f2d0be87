//! Game world state: characters, world flags, and typed state deltas.
//!
//! `GameState` is the aggregate mutated only by the turn orchestrator.
//! Deltas are validated and applied atomically: either every delta in a
//! turn commits, or none do.

use crate::orchestrator::TurnPhase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    /// Create a new unique character ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CharacterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameId(pub Uuid);

impl GameId {
    /// Create a new unique game ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GameId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input specification for a character when creating a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSpec {
    /// Character name.
    pub name: String,
    /// Starting (and maximum) health.
    pub health: i32,
    /// Starting inventory.
    pub inventory: Vec<String>,
    /// Personality traits fed to the decision capability.
    pub traits: Vec<String>,
    /// Secret objective known only to this character.
    pub secret_objective: Option<String>,
    /// Starting location name.
    pub location: String,
}

impl CharacterSpec {
    /// Create a spec with sensible defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            health: 100,
            inventory: Vec::new(),
            traits: Vec::new(),
            secret_objective: None,
            location: "the crossroads".to_string(),
        }
    }

    /// Set starting health.
    pub fn with_health(mut self, health: i32) -> Self {
        self.health = health;
        self
    }

    /// Add a starting item.
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.inventory.push(item.into());
        self
    }

    /// Add a personality trait.
    pub fn with_trait(mut self, t: impl Into<String>) -> Self {
        self.traits.push(t.into());
        self
    }

    /// Set the secret objective.
    pub fn with_secret_objective(mut self, objective: impl Into<String>) -> Self {
        self.secret_objective = Some(objective.into());
        self
    }

    /// Set the starting location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

/// A character participating in the game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterState {
    /// Unique identifier.
    pub id: CharacterId,
    /// Character name.
    pub name: String,
    /// Current health. Clamped to `[0, max_health]`.
    pub health: i32,
    /// Maximum health.
    pub max_health: i32,
    /// Items carried.
    pub inventory: Vec<String>,
    /// Personality traits.
    pub traits: Vec<String>,
    /// Secret objective, if any. Never included in other viewers' context.
    pub secret_objective: Option<String>,
    /// Current location name.
    pub location: String,
    /// Incapacitated characters are skipped by player selection.
    pub incapacitated: bool,
}

impl CharacterState {
    /// Build a character from a spec.
    pub fn from_spec(spec: CharacterSpec) -> Self {
        Self {
            id: CharacterId::new(),
            name: spec.name,
            health: spec.health,
            max_health: spec.health,
            inventory: spec.inventory,
            traits: spec.traits,
            secret_objective: spec.secret_objective,
            location: spec.location,
            incapacitated: false,
        }
    }

    /// Check if the character carries an item (case-insensitive).
    pub fn has_item(&self, item: &str) -> bool {
        self.inventory.iter().any(|i| i.eq_ignore_ascii_case(item))
    }
}

/// A typed change to the game state, proposed by the resolution capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateDelta {
    /// Health change; negative for damage, positive for healing.
    Health { character: CharacterId, change: i32 },
    /// An item added to a character's inventory.
    ItemGained { character: CharacterId, item: String },
    /// An item removed from a character's inventory.
    ItemLost { character: CharacterId, item: String },
    /// A character moved to a new location.
    Moved { character: CharacterId, to: String },
    /// A world flag set or updated.
    WorldFlag { key: String, value: String },
}

/// A delta that violates a game-state invariant.
///
/// These are never auto-corrected: the whole turn is rejected and the
/// offending delta is surfaced for caller-level correction.
#[derive(Debug, Clone, Error)]
pub enum DeltaError {
    #[error("delta references unknown character {0}")]
    UnknownCharacter(CharacterId),

    #[error("{character} does not carry '{item}'")]
    ItemNotHeld { character: CharacterId, item: String },
}

/// The aggregate game state.
///
/// Turn history lives in the memory vault, not here; this struct holds only
/// what the orchestrator mutates during a turn cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// Game identifier.
    pub game_id: GameId,
    /// Ordered list of characters. Order determines round-robin selection.
    pub characters: Vec<CharacterState>,
    /// World flags (scene, weather, opened doors, ...).
    pub world_flags: BTreeMap<String, String>,
    /// Sequence number of the last completed turn (0 before the first).
    pub last_sequence: u64,
    /// Current orchestration phase.
    pub phase: TurnPhase,
}

impl GameState {
    /// Create a fresh game state from character specs.
    pub fn new(game_id: GameId, specs: Vec<CharacterSpec>) -> Self {
        Self {
            game_id,
            characters: specs.into_iter().map(CharacterState::from_spec).collect(),
            world_flags: BTreeMap::new(),
            last_sequence: 0,
            phase: TurnPhase::SelectPlayer,
        }
    }

    /// Find a character by id.
    pub fn character(&self, id: CharacterId) -> Option<&CharacterState> {
        self.characters.iter().find(|c| c.id == id)
    }

    /// Find a character by name (case-insensitive exact match).
    pub fn character_by_name(&self, name: &str) -> Option<&CharacterState> {
        self.characters
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn character_mut(&mut self, id: CharacterId) -> Option<&mut CharacterState> {
        self.characters.iter_mut().find(|c| c.id == id)
    }

    /// Characters eligible to act, preserving declaration order.
    pub fn active_characters(&self) -> Vec<&CharacterState> {
        self.characters.iter().filter(|c| !c.incapacitated).collect()
    }

    /// Characters present at the given location (observer-set derivation).
    pub fn characters_at(&self, location: &str) -> Vec<&CharacterState> {
        self.characters
            .iter()
            .filter(|c| c.location.eq_ignore_ascii_case(location))
            .collect()
    }

    /// Validate deltas without mutating state.
    ///
    /// Runs the full application against a scratch copy so that deltas are
    /// checked in order (an `ItemLost` after the matching `ItemGained` in the
    /// same turn is legal).
    pub fn validate_deltas(&self, deltas: &[StateDelta]) -> Result<(), DeltaError> {
        let mut scratch = self.clone();
        for delta in deltas {
            scratch.apply_one(delta)?;
        }
        Ok(())
    }

    /// Apply deltas atomically: all-or-nothing per turn.
    pub fn apply_deltas(&mut self, deltas: &[StateDelta]) -> Result<(), DeltaError> {
        let mut scratch = self.clone();
        for delta in deltas {
            scratch.apply_one(delta)?;
        }
        *self = scratch;
        Ok(())
    }

    fn apply_one(&mut self, delta: &StateDelta) -> Result<(), DeltaError> {
        match delta {
            StateDelta::Health { character, change } => {
                let c = self
                    .character_mut(*character)
                    .ok_or(DeltaError::UnknownCharacter(*character))?;
                c.health = c.health.saturating_add(*change).clamp(0, c.max_health);
                if c.health == 0 {
                    c.incapacitated = true;
                } else if c.incapacitated && *change > 0 {
                    // Healing back above zero restores the character to play.
                    c.incapacitated = false;
                }
            }
            StateDelta::ItemGained { character, item } => {
                let c = self
                    .character_mut(*character)
                    .ok_or(DeltaError::UnknownCharacter(*character))?;
                if !c.has_item(item) {
                    c.inventory.push(item.clone());
                }
            }
            StateDelta::ItemLost { character, item } => {
                let c = self
                    .character_mut(*character)
                    .ok_or(DeltaError::UnknownCharacter(*character))?;
                if !c.has_item(item) {
                    return Err(DeltaError::ItemNotHeld {
                        character: *character,
                        item: item.clone(),
                    });
                }
                c.inventory.retain(|i| !i.eq_ignore_ascii_case(item));
            }
            StateDelta::Moved { character, to } => {
                let c = self
                    .character_mut(*character)
                    .ok_or(DeltaError::UnknownCharacter(*character))?;
                c.location = to.clone();
            }
            StateDelta::WorldFlag { key, value } => {
                self.world_flags.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }
}
