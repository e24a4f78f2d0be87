//! Durable world-knowledge facts with confidence and visibility scoping.
//!
//! The fact store is append-only: a later fact may supersede an earlier one
//! on the same subject and predicate, but the earlier fact is never deleted.

use crate::world::CharacterId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Unique identifier for a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactId(pub Uuid);

impl FactId {
    /// Create a new unique fact ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FactId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How strongly a fact is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Overheard or inferred; may be wrong.
    Rumored,
    /// Strongly supported but not directly witnessed.
    Likely,
    /// Directly observed.
    Certain,
}

/// Who knows a fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Visibility {
    /// Everyone knows this.
    Public,
    /// Only the listed characters know this.
    Known { characters: BTreeSet<CharacterId> },
}

impl Visibility {
    /// Visibility restricted to the given characters.
    pub fn known_to(characters: impl IntoIterator<Item = CharacterId>) -> Self {
        Visibility::Known {
            characters: characters.into_iter().collect(),
        }
    }

    /// Whether the character is inside this scope.
    pub fn includes(&self, character: CharacterId) -> bool {
        match self {
            Visibility::Public => true,
            Visibility::Known { characters } => characters.contains(&character),
        }
    }

    /// Whether this scope is public.
    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public)
    }
}

/// A fact as produced by the summarization capability, before the store
/// assigns it an identity and sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFact {
    /// What the fact is about.
    pub subject: String,
    /// The assertion in natural language.
    pub predicate: String,
    /// Confidence at extraction time.
    pub confidence: Confidence,
    /// Who may know this.
    pub visibility: Visibility,
}

/// A durable world-knowledge assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Unique identifier.
    pub id: FactId,
    /// What the fact is about.
    pub subject: String,
    /// The assertion in natural language.
    pub predicate: String,
    /// Confidence level.
    pub confidence: Confidence,
    /// Visibility scope.
    pub visibility: Visibility,
    /// First turn sequence of the range this fact was extracted from.
    pub source_start: u64,
    /// Last turn sequence of the range this fact was extracted from.
    pub source_end: u64,
    /// Store-assigned creation sequence, strictly increasing.
    pub created_sequence: u64,
    /// Back-reference set when a later fact supersedes this one.
    pub superseded_by: Option<FactId>,
}

impl Fact {
    /// Whether this fact is still current.
    pub fn is_current(&self) -> bool {
        self.superseded_by.is_none()
    }

    /// Whether a later fact on the same subject and predicate topic should
    /// supersede this one. Matching is exact on subject, case-insensitive.
    pub fn same_topic(&self, other_subject: &str, other_predicate: &str) -> bool {
        self.subject.eq_ignore_ascii_case(other_subject)
            && self.predicate.eq_ignore_ascii_case(other_predicate)
    }
}

/// Append-only repository of extracted facts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactStore {
    facts: Vec<Fact>,
    next_sequence: u64,
}

impl FactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate, assigning a fresh id and a creation sequence
    /// greater than any existing fact's.
    pub fn insert(&mut self, candidate: CandidateFact, source_start: u64, source_end: u64) -> FactId {
        self.next_sequence += 1;
        let fact = Fact {
            id: FactId::new(),
            subject: candidate.subject,
            predicate: candidate.predicate,
            confidence: candidate.confidence,
            visibility: candidate.visibility,
            source_start,
            source_end,
            created_sequence: self.next_sequence,
            superseded_by: None,
        };
        let id = fact.id;
        self.facts.push(fact);
        id
    }

    /// Mark `old` as superseded by `new`. Returns false if either id is
    /// unknown. The old fact stays in the store for auditability.
    pub fn supersede(&mut self, old: FactId, new: FactId) -> bool {
        if self.get(new).is_none() {
            return false;
        }
        match self.facts.iter_mut().find(|f| f.id == old) {
            Some(f) => {
                f.superseded_by = Some(new);
                true
            }
            None => false,
        }
    }

    /// Look up a fact by id.
    pub fn get(&self, id: FactId) -> Option<&Fact> {
        self.facts.iter().find(|f| f.id == id)
    }

    /// All current facts visible to the character.
    pub fn visible_to(&self, character: CharacterId) -> Vec<&Fact> {
        self.facts
            .iter()
            .filter(|f| f.is_current() && f.visibility.includes(character))
            .collect()
    }

    /// All facts visible to the character, including superseded ones.
    pub fn visible_to_with_superseded(&self, character: CharacterId) -> Vec<&Fact> {
        self.facts
            .iter()
            .filter(|f| f.visibility.includes(character))
            .collect()
    }

    /// The most recent current fact on a subject+predicate topic, if any.
    pub fn current_on_topic(&self, subject: &str, predicate: &str) -> Option<&Fact> {
        self.facts
            .iter()
            .rev()
            .find(|f| f.is_current() && f.same_topic(subject, predicate))
    }

    /// Iterate over every stored fact in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.facts.iter()
    }

    /// Total number of stored facts, superseded included.
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    /// Whether the store holds no facts.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}
