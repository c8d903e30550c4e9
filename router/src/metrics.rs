//! Ambient in-process observability. Not a user-facing feature and not a
//! full metrics exporter — just enough structured counting to answer
//! "which tier served this request" and "is discovery mode earning its
//! keep" from logs/tests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Which stage of the cascade ultimately served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierHit {
    PatternMatcher,
    CommandParser,
    AgentLoop,
    Discovery,
}

#[derive(Debug, Default)]
struct Counters {
    pattern_matcher: AtomicU64,
    command_parser: AtomicU64,
    agent_loop: AtomicU64,
    discovery: AtomicU64,
    knowledge_cache_hits: AtomicU64,
    discovery_reuse_hits: AtomicU64,
    fresh_discoveries: AtomicU64,
}

/// Process-wide counters, cheap to increment on every request — under the
/// parallel-cooperative-tasks scheduling model contention here is never
/// the bottleneck.
#[derive(Debug, Default)]
pub struct Metrics {
    counters: Counters,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tier_hit(&self, tier: TierHit) {
        let counter = match tier {
            TierHit::PatternMatcher => &self.counters.pattern_matcher,
            TierHit::CommandParser => &self.counters.command_parser,
            TierHit::AgentLoop => &self.counters.agent_loop,
            TierHit::Discovery => &self.counters.discovery,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_knowledge_cache_hit(&self) {
        self.counters.knowledge_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discovery_reuse_hit(&self) {
        self.counters.discovery_reuse_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fresh_discovery(&self) {
        self.counters.fresh_discoveries.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pattern_matcher: self.counters.pattern_matcher.load(Ordering::Relaxed),
            command_parser: self.counters.command_parser.load(Ordering::Relaxed),
            agent_loop: self.counters.agent_loop.load(Ordering::Relaxed),
            discovery: self.counters.discovery.load(Ordering::Relaxed),
            knowledge_cache_hits: self.counters.knowledge_cache_hits.load(Ordering::Relaxed),
            discovery_reuse_hits: self.counters.discovery_reuse_hits.load(Ordering::Relaxed),
            fresh_discoveries: self.counters.fresh_discoveries.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time read of every counter, for logging or a future `/metrics`
/// endpoint (out of scope here).
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub pattern_matcher: u64,
    pub command_parser: u64,
    pub agent_loop: u64,
    pub discovery: u64,
    pub knowledge_cache_hits: u64,
    pub discovery_reuse_hits: u64,
    pub fresh_discoveries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        let metrics = Metrics::new();
        metrics.record_tier_hit(TierHit::PatternMatcher);
        metrics.record_tier_hit(TierHit::PatternMatcher);
        metrics.record_tier_hit(TierHit::Discovery);
        metrics.record_knowledge_cache_hit();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pattern_matcher, 2);
        assert_eq!(snapshot.discovery, 1);
        assert_eq!(snapshot.command_parser, 0);
        assert_eq!(snapshot.knowledge_cache_hits, 1);
    }
}
