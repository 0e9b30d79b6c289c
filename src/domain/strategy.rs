//! Strategy registry
//!
//! Maps a strategy key to its trigger channel and backend API prefix. The
//! registry is an explicit value owned by its user and replaced wholesale on
//! reload.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StrategyConfig {
    pub strategy_key: String,
    #[serde(default)]
    pub redis_channel: Option<String>,
    #[serde(default)]
    pub api_prefix: Option<String>,
}

impl StrategyConfig {
    /// API prefix normalized to start and end with `/`
    pub fn normalized_prefix(&self) -> Option<String> {
        let prefix = self.api_prefix.as_deref()?.trim();
        if prefix.is_empty() {
            return None;
        }
        let mut out = String::with_capacity(prefix.len() + 2);
        if !prefix.starts_with('/') {
            out.push('/');
        }
        out.push_str(prefix);
        if !prefix.ends_with('/') {
            out.push('/');
        }
        Some(out)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    by_key: HashMap<String, StrategyConfig>,
}

impl StrategyRegistry {
    pub fn new(strategies: Vec<StrategyConfig>) -> Self {
        let mut registry = Self::default();
        registry.replace(strategies);
        registry
    }

    /// Swap in a freshly fetched strategy list
    pub fn replace(&mut self, strategies: Vec<StrategyConfig>) {
        self.by_key = strategies
            .into_iter()
            .filter(|s| !s.strategy_key.trim().is_empty())
            .map(|s| (s.strategy_key.clone(), s))
            .collect();
    }

    pub fn get(&self, strategy_key: &str) -> Option<&StrategyConfig> {
        self.by_key.get(strategy_key)
    }

    /// Strategy subscribed on the given channel
    pub fn by_channel(&self, channel: &str) -> Option<&StrategyConfig> {
        self.by_key
            .values()
            .find(|s| s.redis_channel.as_deref() == Some(channel))
    }

    /// Channels to subscribe to, sorted and deduplicated
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .by_key
            .values()
            .filter_map(|s| s.redis_channel.clone())
            .filter(|c| !c.trim().is_empty())
            .collect();
        channels.sort();
        channels.dedup();
        channels
    }

    /// Strategies that expose a temp-wallet API, in key order
    pub fn with_api_prefix(&self) -> Vec<&StrategyConfig> {
        let mut strategies: Vec<&StrategyConfig> = self
            .by_key
            .values()
            .filter(|s| s.normalized_prefix().is_some())
            .collect();
        strategies.sort_by(|a, b| a.strategy_key.cmp(&b.strategy_key));
        strategies
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(key: &str, channel: Option<&str>, prefix: Option<&str>) -> StrategyConfig {
        StrategyConfig {
            strategy_key: key.to_string(),
            redis_channel: channel.map(String::from),
            api_prefix: prefix.map(String::from),
        }
    }

    #[test]
    fn test_lookup_and_channels() {
        let registry = StrategyRegistry::new(vec![
            strategy("alpha", Some("payouts:alpha"), Some("/api/alpha/")),
            strategy("beta", Some("payouts:beta"), None),
            strategy("gamma", Some("payouts:alpha"), Some("api/gamma")),
        ]);

        assert_eq!(registry.len(), 3);
        assert!(registry.get("beta").is_some());
        assert!(registry.get("delta").is_none());
        assert_eq!(
            registry.channels(),
            vec!["payouts:alpha".to_string(), "payouts:beta".to_string()]
        );
    }

    #[test]
    fn test_prefix_normalization() {
        let s = strategy("gamma", None, Some("api/gamma"));
        assert_eq!(s.normalized_prefix().as_deref(), Some("/api/gamma/"));
        let empty = strategy("x", None, Some("  "));
        assert_eq!(empty.normalized_prefix(), None);
    }

    #[test]
    fn test_only_strategies_with_prefix_are_polled() {
        let registry = StrategyRegistry::new(vec![
            strategy("b", None, Some("/api/b/")),
            strategy("a", None, Some("/api/a/")),
            strategy("c", None, None),
        ]);
        let keys: Vec<&str> = registry
            .with_api_prefix()
            .iter()
            .map(|s| s.strategy_key.as_str())
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_replace_drops_stale_entries() {
        let mut registry = StrategyRegistry::new(vec![strategy("old", None, None)]);
        registry.replace(vec![strategy("new", Some("ch"), None)]);
        assert!(registry.get("old").is_none());
        assert_eq!(registry.by_channel("ch").map(|s| s.strategy_key.as_str()), Some("new"));
    }
}
