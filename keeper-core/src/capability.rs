//! External capability interfaces.
//!
//! The engine depends on four opaque, possibly-latent, possibly-failing
//! capabilities: player decision, action resolution, narration, and
//! summarization. They are modeled as async traits; implementations live
//! outside this crate (LLM-backed adapters, scripted mocks, local rules).
//!
//! Every call goes through `RetryPolicy`: a per-attempt timeout and
//! exponential backoff up to a configured bound.

use crate::memory::fact::CandidateFact;
use crate::memory::turn::{TimelineItem, TurnRecord};
use crate::ruling::{ActionProposal, Resolution};
use crate::world::{CharacterState, GameState};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors from capability calls.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("capability '{capability}' timed out after {timeout:?}")]
    Timeout {
        capability: String,
        timeout: Duration,
    },

    #[error("capability failed: {0}")]
    Failed(String),
}

/// Decides the next action for a character, given that character's
/// perspective-filtered view of history.
#[async_trait]
pub trait DecisionCapability: Send + Sync {
    async fn decide(
        &self,
        view: &[TimelineItem],
        character: &CharacterState,
    ) -> Result<ActionProposal, CapabilityError>;
}

/// Resolves an action proposal into an outcome, reasoning trace, and
/// proposed state deltas. Receives the keeper's unfiltered view.
#[async_trait]
pub trait ResolutionCapability: Send + Sync {
    async fn resolve(
        &self,
        proposal: &ActionProposal,
        actor: &CharacterState,
        keeper_view: &[TimelineItem],
        state: &GameState,
    ) -> Result<Resolution, CapabilityError>;
}

/// Produces narrative text from the updated state and the resolution.
#[async_trait]
pub trait NarrationCapability: Send + Sync {
    async fn narrate(
        &self,
        state: &GameState,
        resolution: &Resolution,
    ) -> Result<String, CapabilityError>;
}

/// What the summarizer returns for a block of turns.
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    /// Condensed text covering the whole block.
    pub condensed: String,
    /// Durable facts extracted from the block.
    pub facts: Vec<CandidateFact>,
}

/// Compresses an ordered run of turns into condensed text plus candidate
/// facts.
#[async_trait]
pub trait SummarizeCapability: Send + Sync {
    async fn summarize(&self, turns: &[TurnRecord]) -> Result<SummaryOutcome, CapabilityError>;
}

/// The full set of capabilities the engine runs against.
#[derive(Clone)]
pub struct Capabilities {
    pub decision: Arc<dyn DecisionCapability>,
    pub resolution: Arc<dyn ResolutionCapability>,
    pub narration: Arc<dyn NarrationCapability>,
    pub summarize: Arc<dyn SummarizeCapability>,
}

/// Bounded retry with per-attempt timeout and exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts (first try included). At least 1.
    pub attempts: u32,
    /// Backoff before attempt N is `base_delay * 2^(N-1)`.
    pub base_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Run `op` under this policy. Returns the first success, or the last
    /// error once attempts are exhausted.
    pub async fn call<T, F, Fut>(&self, capability: &str, mut op: F) -> Result<T, CapabilityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let attempts = self.attempts.max(1);
        let mut last_err = CapabilityError::Failed("no attempts made".to_string());

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = self.base_delay * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(backoff).await;
            }

            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::Timeout {
                    capability: capability.to_string(),
                    timeout: self.timeout,
                }),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        capability,
                        attempt = attempt + 1,
                        attempts,
                        error = %err,
                        "capability call failed"
                    );
                    last_err = err;
                }
            }
        }

        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
        };
        let calls = AtomicU32::new(0);

        let result = policy
            .call("decision", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(CapabilityError::Failed("flaky".to_string()))
                } else {
                    Ok(42u32)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_error() {
        let policy = RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
        };
        let calls = AtomicU32::new(0);

        let result: Result<u32, _> = policy
            .call("resolution", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CapabilityError::Failed("down".to_string()))
            })
            .await;

        assert!(matches!(result, Err(CapabilityError::Failed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let policy = RetryPolicy {
            attempts: 1,
            base_delay: Duration::from_millis(1),
            timeout: Duration::from_millis(10),
        };

        let result: Result<u32, _> = policy
            .call("narration", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await;

        assert!(matches!(result, Err(CapabilityError::Timeout { .. })));
    }
}
