//! Engine configuration options

use memo_core::{KeyCanonicalizer, KeyStrategy};

/// Construction-time configuration for a [`Memoizer`](crate::Memoizer)
#[derive(Debug, Clone)]
pub struct MemoConfig {
    /// Order keyword arguments by name before keying. Other maps in the
    /// arguments are always ordered.
    pub sort_kwargs: bool,
    /// How arguments are encoded into call keys
    pub key_strategy: KeyStrategy,
    /// Downgrade store and policy faults to a direct, uncached call
    pub resilient: bool,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            sort_kwargs: true,
            key_strategy: KeyStrategy::Json,
            resilient: false,
        }
    }
}

impl MemoConfig {
    /// Default configuration with fault downgrading enabled
    pub fn resilient() -> Self {
        Self {
            resilient: true,
            ..Default::default()
        }
    }

    /// Enable or disable keyword-order normalization
    pub fn with_sort_kwargs(mut self, sort_kwargs: bool) -> Self {
        self.sort_kwargs = sort_kwargs;
        self
    }

    /// Set the key encoding strategy
    pub fn with_key_strategy(mut self, key_strategy: KeyStrategy) -> Self {
        self.key_strategy = key_strategy;
        self
    }

    /// Enable or disable fault downgrading
    pub fn with_resilient(mut self, resilient: bool) -> Self {
        self.resilient = resilient;
        self
    }

    /// Build the canonicalizer described by this configuration
    pub fn canonicalizer(&self) -> KeyCanonicalizer {
        KeyCanonicalizer::new(self.key_strategy.clone(), self.sort_kwargs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MemoConfig::default();
        assert!(config.sort_kwargs);
        assert!(!config.resilient);
        assert!(matches!(config.key_strategy, KeyStrategy::Json));
    }

    #[test]
    fn test_resilient_config() {
        let config = MemoConfig::resilient();
        assert!(config.resilient);
        assert!(config.sort_kwargs);
    }

    #[test]
    fn test_builder_pattern() {
        let config = MemoConfig::default()
            .with_sort_kwargs(false)
            .with_resilient(true)
            .with_key_strategy(KeyStrategy::custom(|tree| Ok(tree.to_string())));

        assert!(!config.sort_kwargs);
        assert!(config.resilient);
        assert!(!config.canonicalizer().sorts_kwargs());
        assert!(matches!(config.key_strategy, KeyStrategy::Custom(_)));
    }
}
