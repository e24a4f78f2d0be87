//! Game persistence: an append-only turn event log plus versioned JSON
//! snapshots, composed over one data directory.
//!
//! The event log is the ground truth for what happened (one `TurnRecord`
//! per JSONL line); the snapshot is a point-in-time capture of everything
//! needed to resume play without replaying.

use crate::memory::{MemoryVault, TurnRecord};
use crate::world::{GameId, GameState};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Event log gap for game {game_id}: expected sequence {expected}, got {got}")]
    SequenceGap {
        game_id: GameId,
        expected: u64,
        got: u64,
    },

    #[error("No snapshot for game {0}")]
    NoSnapshot(GameId),
}

/// Current save file version.
const SAVE_VERSION: u32 = 1;

/// A saved game with all state needed to resume play.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedGame {
    /// Save format version for compatibility checking.
    pub version: u32,

    /// When the save was created (unix seconds).
    pub saved_at: u64,

    /// The complete world state.
    pub state: GameState,

    /// The memory vault: timeline, summaries, and fact store.
    pub vault: MemoryVault,

    /// Round-robin skip offset, so scheduling resumes where it left off.
    pub skip_offset: u64,

    /// Quick-access metadata.
    pub metadata: GameMetadata,
}

/// Metadata about a saved game for listing without a full load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMetadata {
    pub game_id: GameId,
    pub character_names: Vec<String>,
    pub last_sequence: u64,
    #[serde(default)]
    pub saved_at: u64,
}

impl SavedGame {
    pub fn new(state: GameState, vault: MemoryVault, skip_offset: u64) -> Self {
        let saved_at = crate::memory::turn::unix_now();
        let metadata = GameMetadata {
            game_id: state.game_id,
            character_names: state.characters.iter().map(|c| c.name.clone()).collect(),
            last_sequence: state.last_sequence,
            saved_at,
        };
        Self {
            version: SAVE_VERSION,
            saved_at,
            state,
            vault,
            skip_offset,
            metadata,
        }
    }
}

/// Append-only JSONL turn log, one file per game.
#[derive(Debug, Clone)]
pub struct EventLog {
    dir: PathBuf,
}

impl EventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, game_id: GameId) -> PathBuf {
        self.dir.join(format!("events_{}.jsonl", game_id.0))
    }

    /// Append one turn record as a single JSONL line.
    pub async fn append(&self, game_id: GameId, turn: &TurnRecord) -> Result<(), PersistError> {
        let mut line = serde_json::to_string(turn)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(game_id))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read the full turn history back, checking sequence continuity.
    pub async fn replay(&self, game_id: GameId) -> Result<Vec<TurnRecord>, PersistError> {
        let path = self.path_for(game_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path).await?;
        let mut turns = Vec::new();
        let mut expected = 1u64;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let turn: TurnRecord = serde_json::from_str(line)?;
            if turn.sequence != expected {
                return Err(PersistError::SequenceGap {
                    game_id,
                    expected,
                    got: turn.sequence,
                });
            }
            expected += 1;
            turns.push(turn);
        }
        Ok(turns)
    }
}

/// Keyed JSON snapshots, one file per game.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, game_id: GameId) -> PathBuf {
        self.dir.join(format!("snapshot_{}.json", game_id.0))
    }

    /// Write or replace the snapshot for a game.
    pub async fn put(&self, saved: &SavedGame) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(saved)?;
        fs::write(self.path_for(saved.metadata.game_id), content).await?;
        Ok(())
    }

    /// Load the snapshot for a game.
    pub async fn get(&self, game_id: GameId) -> Result<SavedGame, PersistError> {
        let path = self.path_for(game_id);
        if !path.exists() {
            return Err(PersistError::NoSnapshot(game_id));
        }
        let content = fs::read_to_string(path).await?;
        let saved: SavedGame = serde_json::from_str(&content)?;
        if saved.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: saved.version,
            });
        }
        Ok(saved)
    }

    /// Get metadata without deserializing the full save.
    pub async fn peek_metadata(&self, game_id: GameId) -> Result<GameMetadata, PersistError> {
        let content = fs::read_to_string(self.path_for(game_id)).await?;

        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: GameMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;
        if partial.version != SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION,
                found: partial.version,
            });
        }
        Ok(partial.metadata)
    }

    /// List metadata for every readable snapshot, newest first.
    pub async fn list(&self) -> Result<Vec<GameMetadata>, PersistError> {
        let mut games = Vec::new();
        if !self.dir.exists() {
            return Ok(games);
        }
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("snapshot_") || !name.ends_with(".json") {
                continue;
            }
            if let Ok(content) = fs::read_to_string(&path).await {
                #[derive(Deserialize)]
                struct Partial {
                    metadata: GameMetadata,
                }
                if let Ok(partial) = serde_json::from_str::<Partial>(&content) {
                    games.push(partial.metadata);
                }
            }
        }
        games.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(games)
    }
}

/// Event log and snapshot store over one data directory.
#[derive(Debug, Clone)]
pub struct GameStore {
    events: EventLog,
    snapshots: SnapshotStore,
}

impl GameStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, PersistError> {
        let dir = dir.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir).await?;
        }
        Ok(Self {
            events: EventLog::new(dir),
            snapshots: SnapshotStore::new(dir),
        })
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Persist one completed turn: event-log append plus snapshot refresh.
    pub async fn record_turn(
        &self,
        turn: &TurnRecord,
        saved: &SavedGame,
    ) -> Result<(), PersistError> {
        self.events.append(saved.metadata.game_id, turn).await?;
        self.snapshots.put(saved).await?;
        Ok(())
    }
}
