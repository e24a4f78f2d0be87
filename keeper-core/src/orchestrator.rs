//! The turn orchestrator: a five-phase state machine that turns one
//! character's action into exactly one committed `TurnRecord`.
//!
//! Phase order: `SelectPlayer` → `PlayerAction` → `KeeperResolve` →
//! `UpdateState` → `KeeperNarrate`, then back to `SelectPlayer`. `Stopped`
//! is terminal. All mutation is staged: the world state and the vault are
//! only touched once every capability call has succeeded, so a failure in
//! any phase leaves the game exactly where it was.

use crate::capability::{Capabilities, CapabilityError};
use crate::config::EngineConfig;
use crate::memory::turn::unix_now;
use crate::memory::{MemoryError, MemoryVault, TurnRecord};
use crate::ruling::ActionProposal;
use crate::world::{CharacterId, DeltaError, GameState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Where a game is in its turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnPhase {
    SelectPlayer,
    PlayerAction,
    KeeperResolve,
    UpdateState,
    KeeperNarrate,
    /// Terminal. No further turns run.
    Stopped,
}

/// Errors from running a turn.
#[derive(Debug, Error)]
pub enum TurnError {
    /// Every character is incapacitated.
    #[error("no active players remain")]
    NoActivePlayers,

    /// The game has been stopped.
    #[error("game is stopped")]
    Stopped,

    /// The resolution produced deltas the world rejected.
    #[error("invalid state delta: {0}")]
    InvalidDelta(#[from] DeltaError),

    /// Vault integrity or consolidation failure.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// A capability failed past its retry bound.
    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

/// Drives turns for one game. Holds only the scheduling state that must
/// survive a save: the round-robin skip offset and the stop flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Orchestrator {
    skip_offset: u64,
    stopped: bool,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a saved skip offset.
    pub fn restore(skip_offset: u64) -> Self {
        Self {
            skip_offset,
            stopped: false,
        }
    }

    pub fn skip_offset(&self) -> u64 {
        self.skip_offset
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop the game. Terminal: any in-flight work is discarded and later
    /// `run_turn` calls fail with `TurnError::Stopped`.
    pub fn stop(&mut self, state: &mut GameState) {
        self.stopped = true;
        state.phase = TurnPhase::Stopped;
    }

    /// Run one full turn cycle: pick the actor, obtain an action, resolve
    /// it, commit the outcome, and append the narrated record to the vault.
    ///
    /// `manual_action` replaces the decision capability's output when set.
    ///
    /// On capability exhaustion or invalid deltas the actor is skipped
    /// (the skip offset advances) and the error is returned; the game
    /// state and the vault are unchanged.
    #[tracing::instrument(skip_all, fields(game = %state.game_id, sequence = state.last_sequence + 1))]
    pub async fn run_turn(
        &mut self,
        state: &mut GameState,
        vault: &mut MemoryVault,
        capabilities: &Capabilities,
        config: &EngineConfig,
        manual_action: Option<String>,
    ) -> Result<TurnRecord, TurnError> {
        if self.stopped || state.phase == TurnPhase::Stopped {
            return Err(TurnError::Stopped);
        }
        let retry = config.retry_policy();

        // SelectPlayer: round-robin over characters still standing.
        state.phase = TurnPhase::SelectPlayer;
        let active = state.active_characters();
        if active.is_empty() {
            warn!("no active players remain, stopping game");
            self.stop(state);
            return Err(TurnError::NoActivePlayers);
        }
        let index = ((state.last_sequence + self.skip_offset) % active.len() as u64) as usize;
        let actor = active[index].clone();
        debug!(actor = %actor.name, "selected actor");

        // PlayerAction: the actor's scoped view feeds the decision.
        state.phase = TurnPhase::PlayerAction;
        if self.check_stopped(state) {
            return Err(TurnError::Stopped);
        }
        let proposal = match manual_action {
            Some(text) => ActionProposal::new(text),
            None => {
                let view = vault.view_for(actor.id, config.max_context_items);
                match retry
                    .call("decide", || capabilities.decision.decide(&view, &actor))
                    .await
                {
                    Ok(proposal) => proposal,
                    Err(err) => return Err(self.skip_actor(state, &actor.name, err.into())),
                }
            }
        };

        // KeeperResolve: resolve against the unfiltered view, then dry-run
        // the proposed deltas before accepting them.
        state.phase = TurnPhase::KeeperResolve;
        if self.check_stopped(state) {
            return Err(TurnError::Stopped);
        }
        let keeper_view = vault.keeper_view(config.max_context_items);
        let resolution = match retry
            .call("resolve", || {
                capabilities
                    .resolution
                    .resolve(&proposal, &actor, &keeper_view, state)
            })
            .await
        {
            Ok(resolution) => resolution,
            Err(err) => return Err(self.skip_actor(state, &actor.name, err.into())),
        };
        if let Err(err) = state.validate_deltas(&resolution.deltas) {
            return Err(self.skip_actor(state, &actor.name, err.into()));
        }

        // UpdateState: apply deltas to a staged copy. The live state is
        // not committed until the whole turn has succeeded.
        state.phase = TurnPhase::UpdateState;
        if self.check_stopped(state) {
            return Err(TurnError::Stopped);
        }
        let mut updated = state.clone();
        if let Err(err) = updated.apply_deltas(&resolution.deltas) {
            return Err(self.skip_actor(state, &actor.name, err.into()));
        }

        // KeeperNarrate: narrate against the post-update world.
        state.phase = TurnPhase::KeeperNarrate;
        if self.check_stopped(state) {
            return Err(TurnError::Stopped);
        }
        let narrative = match retry
            .call("narrate", || {
                capabilities.narration.narrate(&updated, &resolution)
            })
            .await
        {
            Ok(narrative) => narrative,
            Err(err) => return Err(self.skip_actor(state, &actor.name, err.into())),
        };

        // Observers are whoever shares the actor's location after the
        // update; the actor always observes their own turn.
        let mut observers: BTreeSet<CharacterId> = updated
            .character(actor.id)
            .map(|a| {
                updated
                    .characters_at(&a.location)
                    .iter()
                    .map(|c| c.id)
                    .collect()
            })
            .unwrap_or_default();
        observers.insert(actor.id);

        let record = TurnRecord {
            sequence: state.last_sequence + 1,
            actor: actor.id,
            action: proposal.text,
            outcome: resolution.outcome,
            narrative,
            deltas: resolution.deltas.clone(),
            timestamp: unix_now(),
            observers,
        };

        // Commit point: vault append first. An integrity error here is
        // surfaced without advancing the skip offset.
        if let Err(err) = vault
            .append(record.clone(), capabilities.summarize.as_ref(), &retry)
            .await
        {
            state.phase = TurnPhase::SelectPlayer;
            return Err(err.into());
        }

        *state = updated;
        state.last_sequence = record.sequence;
        state.phase = TurnPhase::SelectPlayer;

        info!(
            actor = %actor.name,
            outcome = record.outcome.name(),
            deltas = record.deltas.len(),
            "turn committed"
        );
        Ok(record)
    }

    fn check_stopped(&self, state: &mut GameState) -> bool {
        if self.stopped {
            state.phase = TurnPhase::Stopped;
        }
        self.stopped
    }

    fn skip_actor(&mut self, state: &mut GameState, actor: &str, err: TurnError) -> TurnError {
        warn!(actor, error = %err, "turn abandoned, skipping actor");
        self.skip_offset += 1;
        state.phase = TurnPhase::SelectPlayer;
        err
    }
}
