//! Per-game narrative memory: the turn timeline, consolidation, and the
//! append-only fact store.

pub mod fact;
pub mod turn;
pub mod vault;

pub use fact::{CandidateFact, Confidence, Fact, FactId, FactStore, Visibility};
pub use turn::{SummaryBlock, TimelineItem, TurnRecord};
pub use vault::{MemoryError, MemoryVault, VaultConfig};
