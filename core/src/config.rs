//! Runtime configuration, loaded from TOML with environment overrides.
//!
//! Every threshold and deadline that should be tunable without a rebuild
//! lives here rather than as a scattered literal.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Embedding vector width, fixed system-wide.
pub const EMBEDDING_DIM: usize = 1024;

/// Top-level configuration for one running core instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub thresholds: Thresholds,
    pub ttls: Ttls,
    pub deadlines: Deadlines,
    pub agent_loop: AgentLoopConfig,
    pub discovery: DiscoveryConfig,
    pub hybrid_search: HybridSearchWeights,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            ttls: Ttls::default(),
            deadlines: Deadlines::default(),
            agent_loop: AgentLoopConfig::default(),
            discovery: DiscoveryConfig::default(),
            hybrid_search: HybridSearchWeights::default(),
        }
    }
}

impl Config {
    /// Parse configuration from a TOML document. Missing sections fall back
    /// to defaults.
    pub fn from_toml(s: &str) -> crate::error::Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

/// Similarity thresholds used throughout discovery/knowledge retrieval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Cache-hit / discovery-reuse threshold: 0.85.
    pub cache_and_discovery_reuse: f32,
    /// Permissive `search_knowledge` tool threshold: 0.65.
    pub knowledge_surfacing: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cache_and_discovery_reuse: 0.85,
            knowledge_surfacing: 0.65,
        }
    }
}

/// Store-level time-to-live windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Ttls {
    pub working_memory: Duration,
    pub shared_handoff: Duration,
    pub knowledge_cache_days: i64,
}

impl Default for Ttls {
    fn default() -> Self {
        Self {
            working_memory: Duration::from_secs(2 * 60 * 60),
            shared_handoff: Duration::from_secs(5 * 60),
            knowledge_cache_days: 7,
        }
    }
}

/// Deadlines for each class of suspension point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Deadlines {
    pub llm: Duration,
    pub external_tool: Duration,
    pub embedding: Duration,
    pub store: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            llm: Duration::from_secs(60),
            external_tool: Duration::from_secs(30),
            embedding: Duration::from_secs(10),
            store: Duration::from_secs(5),
        }
    }
}

/// Tier-3 LLM reasoning loop configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLoopConfig {
    pub max_iterations: u32,
    /// Whether the system-prompt prefix is marked cacheable at the
    /// transport layer. Behavioural equivalence between on/off is a
    /// property under test, not a feature switch visible to users.
    pub prompt_caching_enabled: bool,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 8,
            prompt_caching_enabled: true,
        }
    }
}

/// Tier-4 discovery agent configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Discovery is opt-in; the built-in tool loop is always on.
    pub enabled: bool,
    pub summarize_threshold_chars: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            summarize_threshold_chars: 800,
        }
    }
}

/// Hybrid search fusion weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSearchWeights {
    pub vector: f32,
    pub text: f32,
}

impl Default for HybridSearchWeights {
    fn default() -> Self {
        Self {
            vector: 0.6,
            text: 0.4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let cfg = Config::default();
        assert_eq!(cfg.thresholds.cache_and_discovery_reuse, 0.85);
        assert_eq!(cfg.thresholds.knowledge_surfacing, 0.65);
        assert_eq!(cfg.agent_loop.max_iterations, 8);
        assert_eq!(cfg.ttls.knowledge_cache_days, 7);
        assert!(!cfg.discovery.enabled);
    }

    #[test]
    fn parses_partial_toml_with_fallback_defaults() {
        let cfg = Config::from_toml("[discovery]\nenabled = true\n").unwrap();
        assert!(cfg.discovery.enabled);
        assert_eq!(cfg.thresholds.cache_and_discovery_reuse, 0.85);
    }
}
