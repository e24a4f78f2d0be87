//! The memory vault: bounded live window, consolidation, and
//! perspective-scoped reads.
//!
//! The vault exclusively owns the timeline. Recent turns are kept verbatim
//! (the live window); once enough un-consolidated turns pile up, the oldest
//! are compressed into a `SummaryBlock` and their durable facts land in the
//! fact store.
//!
//! Core invariant: the union of summary ranges plus live turn sequences is
//! exactly `1..=last_sequence`, with no gaps and no overlaps.

use crate::capability::{CapabilityError, RetryPolicy, SummarizeCapability};
use crate::memory::fact::{Fact, FactStore};
use crate::memory::turn::{SummaryBlock, TimelineItem, TurnRecord};
use crate::world::CharacterId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from vault operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Timeline integrity violation. Fatal to the call, never corrected.
    #[error("out-of-order append: expected sequence {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    /// Benign: consolidation was requested but the window holds nothing
    /// beyond the verbatim tail.
    #[error("nothing to consolidate")]
    NothingToConsolidate,

    /// The summarization capability failed past its retry bound.
    #[error("summarizer failed: {0}")]
    Summarizer(#[from] CapabilityError),
}

/// Vault tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Number of most-recent turns always kept verbatim.
    pub window_size: usize,
    /// Un-consolidated turn count that triggers consolidation on append.
    pub consolidation_threshold: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            consolidation_threshold: 20,
        }
    }
}

/// Owns the turn timeline and the fact store; answers filtered views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryVault {
    /// Summaries first, live turns last, ordered by sequence range.
    timeline: Vec<TimelineItem>,
    facts: FactStore,
    config: VaultConfig,
    /// Set when a triggered consolidation failed and should be retried on
    /// the next append.
    consolidation_pending: bool,
}

impl MemoryVault {
    /// Create an empty vault.
    pub fn new(config: VaultConfig) -> Self {
        Self {
            timeline: Vec::new(),
            facts: FactStore::new(),
            config,
            consolidation_pending: false,
        }
    }

    /// Sequence number of the newest covered turn (0 when empty).
    pub fn last_sequence(&self) -> u64 {
        self.timeline.last().map(|i| i.end_sequence()).unwrap_or(0)
    }

    /// The full timeline, oldest first.
    pub fn timeline(&self) -> &[TimelineItem] {
        &self.timeline
    }

    /// The fact store.
    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    /// Number of live (un-consolidated) turns.
    pub fn live_turn_count(&self) -> usize {
        self.timeline.iter().filter(|i| i.as_turn().is_some()).count()
    }

    /// Append a completed turn.
    ///
    /// Requires `turn.sequence == last_sequence() + 1`; rejects with
    /// `MemoryError::OutOfOrder` otherwise, leaving the vault unchanged.
    ///
    /// When the append pushes the un-consolidated count to the threshold
    /// (or a previous consolidation is still pending), consolidation runs
    /// synchronously before returning. A summarizer failure there does not
    /// fail the append: the turns stay in the live window and consolidation
    /// is re-attempted on the next append.
    pub async fn append(
        &mut self,
        turn: TurnRecord,
        summarizer: &dyn SummarizeCapability,
        retry: &RetryPolicy,
    ) -> Result<Option<SummaryBlock>, MemoryError> {
        let expected = self.last_sequence() + 1;
        if turn.sequence != expected {
            return Err(MemoryError::OutOfOrder {
                expected,
                got: turn.sequence,
            });
        }

        debug!(sequence = turn.sequence, "appending turn");
        self.timeline.push(TimelineItem::Turn(turn));

        let due = self.live_turn_count() >= self.config.consolidation_threshold
            || self.consolidation_pending;
        if !due {
            return Ok(None);
        }

        match self.consolidate(summarizer, retry).await {
            Ok(block) => {
                self.consolidation_pending = false;
                Ok(Some(block))
            }
            Err(MemoryError::NothingToConsolidate) => {
                self.consolidation_pending = false;
                Ok(None)
            }
            Err(err) => {
                // No data loss: the live window still holds every turn.
                warn!(error = %err, "consolidation deferred");
                self.consolidation_pending = true;
                Ok(None)
            }
        }
    }

    /// Consolidate the oldest live turns, keeping the most recent
    /// `window_size` verbatim.
    ///
    /// Re-invocation with no new turns since the last consolidation fails
    /// with `MemoryError::NothingToConsolidate`.
    pub async fn consolidate(
        &mut self,
        summarizer: &dyn SummarizeCapability,
        retry: &RetryPolicy,
    ) -> Result<SummaryBlock, MemoryError> {
        let live = self.live_turn_count();
        let to_consolidate = live.saturating_sub(self.config.window_size);
        if to_consolidate == 0 {
            return Err(MemoryError::NothingToConsolidate);
        }

        // Live turns are the contiguous tail of the timeline.
        let first_live = self.timeline.len() - live;
        let block_turns: Vec<TurnRecord> = self.timeline
            [first_live..first_live + to_consolidate]
            .iter()
            .filter_map(|i| i.as_turn().cloned())
            .collect();
        if block_turns.is_empty() {
            return Err(MemoryError::NothingToConsolidate);
        }

        let outcome = retry
            .call("summarize", || summarizer.summarize(&block_turns))
            .await?;

        let start_sequence = block_turns[0].sequence;
        let end_sequence = block_turns[block_turns.len() - 1].sequence;
        let observers: BTreeSet<CharacterId> = block_turns
            .iter()
            .flat_map(|t| t.observers.iter().copied())
            .collect();

        let mut fact_ids = Vec::with_capacity(outcome.facts.len());
        for candidate in outcome.facts {
            let prior = self
                .facts
                .current_on_topic(&candidate.subject, &candidate.predicate)
                .map(|f| f.id);
            let id = self.facts.insert(candidate, start_sequence, end_sequence);
            if let Some(old) = prior {
                self.facts.supersede(old, id);
            }
            fact_ids.push(id);
        }

        let block = SummaryBlock {
            start_sequence,
            end_sequence,
            condensed: outcome.condensed,
            fact_ids,
            observers,
        };

        info!(
            start = start_sequence,
            end = end_sequence,
            facts = block.fact_ids.len(),
            "consolidated turns into summary block"
        );

        self.timeline.splice(
            first_live..first_live + to_consolidate,
            [TimelineItem::Summary(block.clone())],
        );

        Ok(block)
    }

    /// Perspective-filtered view: the most recent `max_items` timeline items
    /// the character may see, most-recent-first.
    ///
    /// A turn is visible only to its observers. A summary block is visible
    /// to a character who observed at least one covered turn; otherwise it
    /// is visible only when it derived at least one fact and every derived
    /// fact is public. Visible summary text is shared verbatim; there is no
    /// per-viewer redaction.
    pub fn view_for(&self, character: CharacterId, max_items: usize) -> Vec<TimelineItem> {
        self.timeline
            .iter()
            .rev()
            .filter(|item| self.item_visible_to(item, character))
            .take(max_items)
            .cloned()
            .collect()
    }

    /// The keeper's unfiltered view, most-recent-first.
    pub fn keeper_view(&self, max_items: usize) -> Vec<TimelineItem> {
        self.timeline
            .iter()
            .rev()
            .take(max_items)
            .cloned()
            .collect()
    }

    fn item_visible_to(&self, item: &TimelineItem, character: CharacterId) -> bool {
        match item {
            TimelineItem::Turn(t) => t.observed_by(character),
            TimelineItem::Summary(s) => {
                if s.observed_by(character) {
                    return true;
                }
                !s.fact_ids.is_empty()
                    && s.fact_ids.iter().all(|id| {
                        self.facts
                            .get(*id)
                            .map(|f| f.visibility.is_public())
                            .unwrap_or(false)
                    })
            }
        }
    }

    /// Current facts the character knows.
    pub fn known_facts(&self, character: CharacterId) -> Vec<&Fact> {
        self.facts.visible_to(character)
    }

    /// Facts the character knows, superseded ones included.
    pub fn known_facts_with_superseded(&self, character: CharacterId) -> Vec<&Fact> {
        self.facts.visible_to_with_superseded(character)
    }

    /// Verify the core timeline invariant: contiguous, gapless,
    /// non-overlapping coverage of `1..=last_sequence`.
    pub fn verify_coverage(&self) -> bool {
        let mut next = 1u64;
        for item in &self.timeline {
            let range = item.range();
            if *range.start() != next || range.end() < range.start() {
                return false;
            }
            next = range.end() + 1;
        }
        next == self.last_sequence() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::fact::{CandidateFact, Confidence, Visibility};
    use crate::ruling::Outcome;
    use crate::testing::RecapSummarizer;
    use std::collections::BTreeSet;

    fn turn(sequence: u64, actor: CharacterId, observers: &[CharacterId]) -> TurnRecord {
        TurnRecord {
            sequence,
            actor,
            action: format!("action {sequence}"),
            outcome: Outcome::Success,
            narrative: format!("narrative {sequence}"),
            deltas: Vec::new(),
            timestamp: 0,
            observers: observers.iter().copied().collect(),
        }
    }

    fn vault(window: usize, threshold: usize) -> MemoryVault {
        MemoryVault::new(VaultConfig {
            window_size: window,
            consolidation_threshold: threshold,
        })
    }

    #[tokio::test]
    async fn test_out_of_order_append_rejected() {
        let mut vault = vault(5, 8);
        let summarizer = RecapSummarizer::new();
        let retry = RetryPolicy::default();
        let a = CharacterId::new();

        vault.append(turn(1, a, &[a]), &summarizer, &retry).await.unwrap();
        let err = vault
            .append(turn(3, a, &[a]), &summarizer, &retry)
            .await
            .unwrap_err();

        assert!(matches!(err, MemoryError::OutOfOrder { expected: 2, got: 3 }));
        assert_eq!(vault.last_sequence(), 1);
        assert!(vault.verify_coverage());
    }

    #[tokio::test]
    async fn test_threshold_triggers_consolidation() {
        // Window 5, threshold 8, turns 1..=8.
        let mut vault = vault(5, 8);
        let summarizer = RecapSummarizer::new();
        let retry = RetryPolicy::default();
        let a = CharacterId::new();

        let mut block = None;
        for seq in 1..=8 {
            block = vault
                .append(turn(seq, a, &[a]), &summarizer, &retry)
                .await
                .unwrap();
        }

        let block = block.expect("8th append should consolidate");
        assert_eq!(block.start_sequence, 1);
        assert_eq!(block.end_sequence, 3);
        assert_eq!(vault.live_turn_count(), 5);
        assert!(vault.verify_coverage());
    }

    #[tokio::test]
    async fn test_consolidate_with_nothing_pending() {
        let mut vault = vault(5, 8);
        let summarizer = RecapSummarizer::new();
        let retry = RetryPolicy::default();
        let a = CharacterId::new();

        for seq in 1..=8 {
            vault
                .append(turn(seq, a, &[a]), &summarizer, &retry)
                .await
                .unwrap();
        }
        let facts_before = vault.facts().len();

        let err = vault.consolidate(&summarizer, &retry).await.unwrap_err();
        assert!(matches!(err, MemoryError::NothingToConsolidate));
        assert_eq!(vault.facts().len(), facts_before);
        assert!(vault.verify_coverage());
    }

    #[tokio::test]
    async fn test_coverage_invariant_over_many_appends() {
        let mut vault = vault(3, 4);
        let summarizer = RecapSummarizer::new();
        let retry = RetryPolicy::default();
        let a = CharacterId::new();

        for seq in 1..=25 {
            vault
                .append(turn(seq, a, &[a]), &summarizer, &retry)
                .await
                .unwrap();
            assert!(vault.verify_coverage(), "coverage broken at turn {seq}");
        }
        assert_eq!(vault.last_sequence(), 25);
    }

    #[tokio::test]
    async fn test_summary_visible_to_partial_observer() {
        let mut vault = vault(5, 8);
        let summarizer = RecapSummarizer::new();
        let retry = RetryPolicy::default();
        let a = CharacterId::new();
        let b = CharacterId::new();

        for seq in 1..=8 {
            // b is present only for turn 2.
            let observers: Vec<CharacterId> = if seq == 2 { vec![a, b] } else { vec![a] };
            vault
                .append(turn(seq, a, &observers), &summarizer, &retry)
                .await
                .unwrap();
        }

        let view = vault.view_for(b, 30);
        assert!(view.iter().any(|i| i.as_summary().is_some()));
        assert!(
            !view
                .iter()
                .any(|i| i.as_turn().map(|t| t.sequence == 2).unwrap_or(false)),
            "raw turn 2 must be consolidated away, not shown verbatim"
        );
    }

    #[tokio::test]
    async fn test_summary_hidden_from_non_observer() {
        let mut vault = vault(5, 8);
        let summarizer = RecapSummarizer::new()
            .with_fact(CandidateFact {
                subject: "cellar".to_string(),
                predicate: "hides a ledger".to_string(),
                confidence: Confidence::Certain,
                visibility: Visibility::known_to([]),
            });
        let retry = RetryPolicy::default();
        let a = CharacterId::new();
        let outsider = CharacterId::new();

        for seq in 1..=8 {
            vault
                .append(turn(seq, a, &[a]), &summarizer, &retry)
                .await
                .unwrap();
        }

        // Non-public derived fact: the block stays hidden from outsiders.
        assert!(vault.view_for(outsider, 30).is_empty());
    }

    #[tokio::test]
    async fn test_public_facts_make_summary_public() {
        let mut vault = vault(5, 8);
        let summarizer = RecapSummarizer::new().with_fact(CandidateFact {
            subject: "village".to_string(),
            predicate: "burned down".to_string(),
            confidence: Confidence::Certain,
            visibility: Visibility::Public,
        });
        let retry = RetryPolicy::default();
        let a = CharacterId::new();
        let outsider = CharacterId::new();

        for seq in 1..=8 {
            vault
                .append(turn(seq, a, &[a]), &summarizer, &retry)
                .await
                .unwrap();
        }

        let view = vault.view_for(outsider, 30);
        assert_eq!(view.len(), 1);
        assert!(view[0].as_summary().is_some());
    }

    #[tokio::test]
    async fn test_view_truncates_most_recent_first() {
        let mut vault = vault(50, 100);
        let summarizer = RecapSummarizer::new();
        let retry = RetryPolicy::default();
        let a = CharacterId::new();

        for seq in 1..=10 {
            vault
                .append(turn(seq, a, &[a]), &summarizer, &retry)
                .await
                .unwrap();
        }

        let view = vault.view_for(a, 3);
        let sequences: Vec<u64> = view
            .iter()
            .filter_map(|i| i.as_turn().map(|t| t.sequence))
            .collect();
        assert_eq!(sequences, vec![10, 9, 8]);
    }

    #[tokio::test]
    async fn test_failed_summarizer_defers_consolidation() {
        use crate::testing::FailingSummarizer;

        let mut vault = vault(2, 4);
        let retry = RetryPolicy {
            attempts: 2,
            base_delay: std::time::Duration::from_millis(1),
            timeout: std::time::Duration::from_secs(1),
        };
        let a = CharacterId::new();

        let broken = FailingSummarizer::new(usize::MAX);
        for seq in 1..=4 {
            let block = vault.append(turn(seq, a, &[a]), &broken, &retry).await.unwrap();
            assert!(block.is_none());
        }
        // Everything still live, nothing lost.
        assert_eq!(vault.live_turn_count(), 4);
        assert!(vault.verify_coverage());

        // Next append with a working summarizer picks the work back up.
        let working = RecapSummarizer::new();
        let block = vault
            .append(turn(5, a, &[a]), &working, &retry)
            .await
            .unwrap()
            .expect("pending consolidation should fire");
        assert_eq!(block.start_sequence, 1);
        assert_eq!(block.end_sequence, 3);
        assert!(vault.verify_coverage());
    }

    #[tokio::test]
    async fn test_fact_supersession_on_repeated_topic() {
        let mut vault = vault(1, 2);
        let retry = RetryPolicy::default();
        let a = CharacterId::new();

        let summarizer = RecapSummarizer::new().with_fact(CandidateFact {
            subject: "door".to_string(),
            predicate: "is locked".to_string(),
            confidence: Confidence::Likely,
            visibility: Visibility::Public,
        });

        for seq in 1..=6 {
            vault
                .append(turn(seq, a, &[a]), &summarizer, &retry)
                .await
                .unwrap();
        }

        // Same topic extracted repeatedly: all kept, only the last current.
        let current: Vec<_> = vault.known_facts(a);
        assert_eq!(current.len(), 1);
        assert!(vault.facts().len() > 1);
        assert!(vault.known_facts_with_superseded(a).len() > 1);
    }
}
