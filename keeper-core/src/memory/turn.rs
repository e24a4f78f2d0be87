//! Timeline records: verbatim turns and consolidated summary blocks.

use crate::memory::fact::FactId;
use crate::ruling::Outcome;
use crate::world::{CharacterId, StateDelta};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// One completed game turn. Immutable once appended to the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Monotonic sequence number, 1-based and unique per game.
    pub sequence: u64,
    /// The acting character.
    pub actor: CharacterId,
    /// The action text as proposed.
    pub action: String,
    /// Resolution outcome.
    pub outcome: Outcome,
    /// Narrative text produced for this turn.
    pub narrative: String,
    /// State deltas that were committed this turn.
    pub deltas: Vec<StateDelta>,
    /// Unix timestamp (seconds) of completion.
    pub timestamp: u64,
    /// Characters present and eligible to perceive this turn.
    pub observers: BTreeSet<CharacterId>,
}

impl TurnRecord {
    /// Whether the given character observed this turn.
    pub fn observed_by(&self, character: CharacterId) -> bool {
        self.observers.contains(&character)
    }
}

/// Replaces a contiguous run of turns once consolidated. Immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryBlock {
    /// First covered sequence number.
    pub start_sequence: u64,
    /// Last covered sequence number (inclusive).
    pub end_sequence: u64,
    /// Condensed text for the covered range.
    pub condensed: String,
    /// Facts extracted from the covered range.
    pub fact_ids: Vec<FactId>,
    /// Union of the covered turns' observer sets.
    pub observers: BTreeSet<CharacterId>,
}

impl SummaryBlock {
    /// The covered sequence range.
    pub fn range(&self) -> RangeInclusive<u64> {
        self.start_sequence..=self.end_sequence
    }

    /// Whether the character observed at least one covered turn.
    pub fn observed_by(&self, character: CharacterId) -> bool {
        self.observers.contains(&character)
    }
}

/// An item on the vault timeline: either a verbatim turn from the live
/// window or a summary of an already-consolidated range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineItem {
    Turn(TurnRecord),
    Summary(SummaryBlock),
}

impl TimelineItem {
    /// Sequence range covered by this item.
    pub fn range(&self) -> RangeInclusive<u64> {
        match self {
            TimelineItem::Turn(t) => t.sequence..=t.sequence,
            TimelineItem::Summary(s) => s.range(),
        }
    }

    /// Last sequence number covered.
    pub fn end_sequence(&self) -> u64 {
        *self.range().end()
    }

    /// Observer set of this item.
    pub fn observers(&self) -> &BTreeSet<CharacterId> {
        match self {
            TimelineItem::Turn(t) => &t.observers,
            TimelineItem::Summary(s) => &s.observers,
        }
    }

    /// The verbatim turn, if this item is one.
    pub fn as_turn(&self) -> Option<&TurnRecord> {
        match self {
            TimelineItem::Turn(t) => Some(t),
            TimelineItem::Summary(_) => None,
        }
    }

    /// The summary block, if this item is one.
    pub fn as_summary(&self) -> Option<&SummaryBlock> {
        match self {
            TimelineItem::Turn(_) => None,
            TimelineItem::Summary(s) => Some(s),
        }
    }
}

/// Current unix timestamp in seconds.
pub(crate) fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
