//! Multi-participant narrative game engine with bounded per-viewer memory.
//!
//! This crate provides:
//! - A turn orchestrator driving a keeper (narrator) and player characters
//!   through a five-phase cycle
//! - A memory vault with a bounded live window, automatic consolidation
//!   into summary blocks, and durable fact extraction
//! - An append-only fact store with confidence levels, visibility scoping,
//!   and supersession
//! - Perspective filtering so each character only ever sees what it
//!   witnessed or was told
//! - Event-log plus snapshot persistence
//!
//! The model calls behind deciding, resolving, narrating, and summarizing
//! are opaque async capabilities; the engine runs them under a bounded
//! retry policy and commits nothing until they all succeed.
//!
//! # Quick Start
//!
//! ```ignore
//! use keeper_core::{CharacterSpec, EngineConfig, GameEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let capabilities = my_capabilities();
//!     let mut engine = GameEngine::new(capabilities, EngineConfig::from_env());
//!
//!     let game_id = engine.create_game(vec![
//!         CharacterSpec::new("Ava").with_secret_objective("find the ledger"),
//!         CharacterSpec::new("Brin"),
//!     ]);
//!
//!     for record in engine.run_turns(game_id, 10).await? {
//!         println!("[{}] {}", record.sequence, record.narrative);
//!     }
//!     Ok(())
//! }
//! ```

pub mod capability;
pub mod config;
pub mod engine;
pub mod memory;
pub mod orchestrator;
pub mod persist;
pub mod ruling;
pub mod testing;
pub mod world;

// Primary public API
pub use capability::{
    Capabilities, CapabilityError, DecisionCapability, NarrationCapability, ResolutionCapability,
    RetryPolicy, SummarizeCapability, SummaryOutcome,
};
pub use config::EngineConfig;
pub use engine::{EngineError, GameEngine};
pub use memory::{
    CandidateFact, Confidence, Fact, FactId, FactStore, MemoryError, MemoryVault, SummaryBlock,
    TimelineItem, TurnRecord, VaultConfig, Visibility,
};
pub use orchestrator::{Orchestrator, TurnError, TurnPhase};
pub use persist::{GameStore, PersistError, SavedGame};
pub use ruling::{ActionProposal, Outcome, ReasoningStep, ReasoningTrace, Resolution};
pub use world::{CharacterId, CharacterSpec, CharacterState, GameId, GameState, StateDelta};
