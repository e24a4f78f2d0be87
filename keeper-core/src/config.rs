//! Engine configuration.

use crate::capability::RetryPolicy;
use crate::memory::VaultConfig;
use std::time::Duration;

/// Configuration for creating a new game.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of most-recent turns each viewer keeps verbatim.
    pub window_size: usize,

    /// Un-consolidated turn count that triggers memory consolidation.
    pub consolidation_threshold: usize,

    /// Maximum timeline items handed to a capability as context.
    pub max_context_items: usize,

    /// Attempts per capability call before the turn is abandoned.
    pub capability_retries: u32,

    /// Wall-clock bound on a single capability attempt.
    pub capability_timeout: Duration,

    /// First retry delay; doubles on each subsequent attempt.
    pub backoff_base: Duration,

    /// Narration seeding the world before the first turn.
    pub opening_scene: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            consolidation_threshold: 20,
            max_context_items: 30,
            capability_retries: 3,
            capability_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_millis(250),
            opening_scene: "The story begins at a quiet crossroads.".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the verbatim turn window per viewer.
    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size;
        self
    }

    /// Set the consolidation trigger threshold.
    pub fn with_consolidation_threshold(mut self, threshold: usize) -> Self {
        self.consolidation_threshold = threshold;
        self
    }

    /// Set the context item cap for capability calls.
    pub fn with_max_context_items(mut self, items: usize) -> Self {
        self.max_context_items = items;
        self
    }

    /// Set retry attempts for capability calls.
    pub fn with_capability_retries(mut self, retries: u32) -> Self {
        self.capability_retries = retries;
        self
    }

    /// Set the per-attempt capability timeout.
    pub fn with_capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = timeout;
        self
    }

    /// Set the base backoff delay between retries.
    pub fn with_backoff_base(mut self, delay: Duration) -> Self {
        self.backoff_base = delay;
        self
    }

    /// Set the opening scene narration.
    pub fn with_opening_scene(mut self, scene: impl Into<String>) -> Self {
        self.opening_scene = scene.into();
        self
    }

    /// Build a config from the process environment, falling back to
    /// defaults for anything unset or unparseable.
    ///
    /// Recognized variables: `KEEPER_WINDOW_SIZE`,
    /// `KEEPER_CONSOLIDATION_THRESHOLD`, `KEEPER_MAX_CONTEXT_ITEMS`,
    /// `KEEPER_CAPABILITY_RETRIES`, `KEEPER_CAPABILITY_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse::<usize>("KEEPER_WINDOW_SIZE") {
            config.window_size = v;
        }
        if let Some(v) = env_parse::<usize>("KEEPER_CONSOLIDATION_THRESHOLD") {
            config.consolidation_threshold = v;
        }
        if let Some(v) = env_parse::<usize>("KEEPER_MAX_CONTEXT_ITEMS") {
            config.max_context_items = v;
        }
        if let Some(v) = env_parse::<u32>("KEEPER_CAPABILITY_RETRIES") {
            config.capability_retries = v;
        }
        if let Some(v) = env_parse::<u64>("KEEPER_CAPABILITY_TIMEOUT_MS") {
            config.capability_timeout = Duration::from_millis(v);
        }
        config
    }

    /// Vault settings derived from this config.
    pub fn vault_config(&self) -> VaultConfig {
        VaultConfig {
            window_size: self.window_size,
            consolidation_threshold: self.consolidation_threshold,
        }
    }

    /// Retry policy derived from this config.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.capability_retries,
            base_delay: self.backoff_base,
            timeout: self.capability_timeout,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.window_size, 10);
        assert_eq!(config.consolidation_threshold, 20);
        assert_eq!(config.max_context_items, 30);
        assert_eq!(config.capability_retries, 3);
        assert_eq!(config.capability_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_chain() {
        let config = EngineConfig::new()
            .with_window_size(5)
            .with_consolidation_threshold(8)
            .with_opening_scene("A storm rolls in.");
        assert_eq!(config.window_size, 5);
        assert_eq!(config.consolidation_threshold, 8);
        assert_eq!(config.opening_scene, "A storm rolls in.");
        assert_eq!(config.vault_config().window_size, 5);
    }
}
