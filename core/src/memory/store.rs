//! `MemoryStore` — the uniform API over the seven memory stores.
//!
//! All mutations funnel through here; no component keeps a private durable
//! cache. Each store is guarded by its own `parking_lot::Mutex`;
//! `times_used`/`times_accessed` increments and `consume_pending` happen
//! while holding that store's single lock, which keeps them atomic
//! single-statement operations. `clear_session` touches two stores without
//! a cross-store transaction; that's fine since session teardown isn't
//! required to be atomic across stores.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::clients::EmbeddingClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{EntityType, Embedding, HandoffStatus, PreferenceSource};

use super::model::{
    DiscoveryRecord, DiscoverySolution, EpisodicEvent, EpisodicSummary, KnowledgeCacheEntry,
    PreferenceRecord, ProceduralRule, RuleType, SharedHandoff, WorkflowTemplate,
    WorkingMemoryEntry, WorkingType,
};

/// A scored hit returned by `search_knowledge`.
#[derive(Debug, Clone)]
pub struct KnowledgeHit {
    pub entry: KnowledgeCacheEntry,
    pub score: f32,
}

/// Filters accepted by `list_episodic`.
#[derive(Debug, Clone, Default)]
pub struct EpisodicFilter {
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub action_type: Option<String>,
    pub limit: usize,
}

/// The memory fabric: working, shared, episodic, semantic (preference +
/// knowledge cache), procedural, discovery, and episodic-summary stores.
pub struct MemoryStore {
    working: Mutex<HashMap<(String, WorkingType), WorkingMemoryEntry>>,
    shared: Mutex<HashMap<Uuid, SharedHandoff>>,
    episodic: Mutex<Vec<EpisodicEvent>>,
    preferences: Mutex<HashMap<(String, String), PreferenceRecord>>,
    rules: Mutex<HashMap<(String, String), ProceduralRule>>,
    knowledge_cache: Mutex<Vec<KnowledgeCacheEntry>>,
    discoveries: Mutex<Vec<DiscoveryRecord>>,
    summaries: Mutex<HashMap<(EntityType, String), Vec<EpisodicSummary>>>,
    embedder: Arc<dyn EmbeddingClient>,
    config: Config,
}

impl MemoryStore {
    #[must_use]
    pub fn new(embedder: Arc<dyn EmbeddingClient>, config: Config) -> Self {
        Self {
            working: Mutex::new(HashMap::new()),
            shared: Mutex::new(HashMap::new()),
            episodic: Mutex::new(Vec::new()),
            preferences: Mutex::new(HashMap::new()),
            rules: Mutex::new(HashMap::new()),
            knowledge_cache: Mutex::new(Vec::new()),
            discoveries: Mutex::new(Vec::new()),
            summaries: Mutex::new(HashMap::new()),
            embedder,
            config,
        }
    }

    // ---------------------------------------------------------------- working

    #[instrument(skip(self, value, metadata))]
    pub fn set_working(
        &self,
        session_id: &str,
        working_type: WorkingType,
        value: String,
        metadata: HashMap<String, Value>,
    ) {
        let now = Utc::now();
        let entry = WorkingMemoryEntry {
            session_id: session_id.to_string(),
            working_type,
            value,
            metadata,
            created_at: now,
            expires_at: now
                + ChronoDuration::from_std(self.config.ttls.working_memory)
                    .unwrap_or_else(|_| ChronoDuration::hours(2)),
        };
        self.working
            .lock()
            .insert((session_id.to_string(), working_type), entry);
    }

    #[must_use]
    pub fn get_working(&self, session_id: &str, working_type: WorkingType) -> Option<WorkingMemoryEntry> {
        let guard = self.working.lock();
        let entry = guard.get(&(session_id.to_string(), working_type))?;
        if entry.expires_at < Utc::now() {
            return None;
        }
        Some(entry.clone())
    }

    pub fn clear_session(&self, session_id: &str) {
        self.working.lock().retain(|(s, _), _| s != session_id);
        self.shared
            .lock()
            .retain(|_, h| h.session_id != session_id);
    }

    // --------------------------------------------------------------- episodic

    #[instrument(skip(self, description, metadata))]
    pub async fn record_episodic(
        &self,
        user_id: &str,
        action_type: &str,
        description: &str,
        metadata: HashMap<String, Value>,
        embed: bool,
    ) -> Result<Uuid> {
        let embedding = if embed {
            Some(self.embedder.embed(description).await?)
        } else {
            None
        };
        let id = Uuid::new_v4();
        let event = EpisodicEvent {
            id,
            user_id: user_id.to_string(),
            action_type: action_type.to_string(),
            description: description.to_string(),
            metadata,
            embedding,
            created_at: Utc::now(),
        };
        self.episodic.lock().push(event);
        Ok(id)
    }

    #[must_use]
    pub fn list_episodic(&self, user_id: &str, filter: EpisodicFilter) -> Vec<EpisodicEvent> {
        let guard = self.episodic.lock();
        let mut events: Vec<EpisodicEvent> = guard
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter(|e| match &filter.time_range {
                Some((from, to)) => e.created_at >= *from && e.created_at <= *to,
                None => true,
            })
            .filter(|e| match &filter.action_type {
                Some(at) => &e.action_type == at,
                None => true,
            })
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if filter.limit > 0 {
            events.truncate(filter.limit);
        }
        events
    }

    pub async fn search_episodic(&self, user_id: &str, text: &str, limit: usize) -> Result<Vec<EpisodicEvent>> {
        let query_vec = self.embedder.embed(text).await?;
        let guard = self.episodic.lock();
        let mut scored: Vec<(f32, EpisodicEvent)> = guard
            .iter()
            .filter(|e| e.user_id == user_id)
            .filter_map(|e| {
                let emb = e.embedding.as_ref()?;
                Some((query_vec.cosine_similarity(emb), e.clone()))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, e)| e).collect())
    }

    // -------------------------------------------------------- semantic: prefs

    pub fn upsert_preference(
        &self,
        user_id: &str,
        key: &str,
        value: String,
        source: PreferenceSource,
        confidence: f32,
    ) {
        let mut guard = self.preferences.lock();
        let record_key = (user_id.to_string(), key.to_string());
        let times_used = guard.get(&record_key).map_or(0, |r| r.times_used);
        guard.insert(
            record_key,
            PreferenceRecord {
                user_id: user_id.to_string(),
                key: key.to_string(),
                value,
                source,
                confidence,
                times_used,
                updated_at: Utc::now(),
            },
        );
    }

    #[must_use]
    pub fn get_preferences(&self, user_id: &str, min_conf: f32) -> Vec<PreferenceRecord> {
        let mut guard = self.preferences.lock();
        let mut out = Vec::new();
        for ((uid, _), record) in guard.iter_mut() {
            if uid == user_id && record.confidence >= min_conf {
                record.times_used += 1;
                out.push(record.clone());
            }
        }
        out.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// Single-key lookup. `times_used` increments atomically with the read.
    #[must_use]
    pub fn get_preference(&self, user_id: &str, key: &str) -> Option<PreferenceRecord> {
        let mut guard = self.preferences.lock();
        let record = guard.get_mut(&(user_id.to_string(), key.to_string()))?;
        record.times_used += 1;
        Some(record.clone())
    }

    // ------------------------------------------------------- procedural: rules

    #[allow(clippy::too_many_arguments)]
    pub fn upsert_rule(
        &self,
        user_id: &str,
        trigger: &str,
        action_tag: &str,
        parameters: HashMap<String, Value>,
        confidence: f32,
    ) {
        let normalized = ProceduralRule::normalize(trigger);
        let mut guard = self.rules.lock();
        let record_key = (user_id.to_string(), normalized.clone());
        let (times_used, last_used) = guard
            .get(&record_key)
            .map_or((0, None), |r| (r.times_used, r.last_used));
        guard.insert(
            record_key,
            ProceduralRule {
                user_id: user_id.to_string(),
                trigger: trigger.to_string(),
                normalized_trigger: normalized,
                rule_type: RuleType::Rule,
                action_tag: action_tag.to_string(),
                parameters,
                confidence,
                times_used,
                last_used,
                template: None,
            },
        );
    }

    /// Stores (or replaces) a workflow template under `rule_type = Template`.
    pub fn upsert_template(&self, user_id: &str, trigger: &str, template: WorkflowTemplate) {
        let normalized = ProceduralRule::normalize(trigger);
        let mut guard = self.rules.lock();
        let record_key = (user_id.to_string(), normalized.clone());
        let times_used = guard.get(&record_key).map_or(0, |r| r.times_used);
        guard.insert(
            record_key,
            ProceduralRule {
                user_id: user_id.to_string(),
                trigger: trigger.to_string(),
                normalized_trigger: normalized,
                rule_type: RuleType::Template,
                action_tag: "workflow_template".to_string(),
                parameters: HashMap::new(),
                confidence: 1.0,
                times_used,
                last_used: None,
                template: Some(template),
            },
        );
    }

    /// `get_rule_for_trigger` — increments `times_used` atomically with the
    /// lookup.
    pub fn get_rule_for_trigger(&self, user_id: &str, trigger: &str) -> Option<ProceduralRule> {
        let normalized = ProceduralRule::normalize(trigger);
        let mut guard = self.rules.lock();
        let record = guard.get_mut(&(user_id.to_string(), normalized))?;
        record.times_used += 1;
        record.last_used = Some(Utc::now());
        Some(record.clone())
    }

    /// All plain (non-template) rules at or above a confidence floor, for
    /// context injection. Unlike `get_rule_for_trigger`, this is a
    /// read-only scan and does not touch `times_used`.
    #[must_use]
    pub fn list_rules(&self, user_id: &str, min_conf: f32) -> Vec<ProceduralRule> {
        self.rules
            .lock()
            .values()
            .filter(|r| r.user_id == user_id && r.rule_type == RuleType::Rule && r.confidence >= min_conf)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn list_templates(&self, user_id: &str) -> Vec<ProceduralRule> {
        self.rules
            .lock()
            .values()
            .filter(|r| r.user_id == user_id && r.rule_type == RuleType::Template)
            .cloned()
            .collect()
    }

    // --------------------------------------------------------------- shared

    pub fn create_handoff(
        &self,
        session_id: &str,
        from_agent: &str,
        to_agent: &str,
        handoff_type: &str,
        payload: Value,
    ) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let handoff = SharedHandoff {
            id,
            session_id: session_id.to_string(),
            from_agent: from_agent.to_string(),
            to_agent: to_agent.to_string(),
            handoff_type: handoff_type.to_string(),
            payload,
            status: HandoffStatus::Pending,
            created_at: now,
            expires_at: now
                + ChronoDuration::from_std(self.config.ttls.shared_handoff)
                    .unwrap_or_else(|_| ChronoDuration::minutes(5)),
        };
        self.shared.lock().insert(id, handoff);
        id
    }

    /// Non-consuming lookup for context injection: whether a disambiguation
    /// is waiting for this session, without resolving it.
    #[must_use]
    pub fn peek_pending(&self, session_id: &str, to_agent: &str) -> Option<SharedHandoff> {
        let now = Utc::now();
        self.shared
            .lock()
            .values()
            .find(|h| h.session_id == session_id && h.to_agent == to_agent && h.status == HandoffStatus::Pending && h.expires_at >= now)
            .cloned()
    }

    /// Atomic compare-and-consume: at most one concurrent caller for the
    /// same `(session_id, to_agent)` observes `Some(payload)`.
    pub fn consume_pending(&self, session_id: &str, to_agent: &str) -> Option<Value> {
        let now = Utc::now();
        let mut guard = self.shared.lock();
        let target_id = guard
            .values()
            .find(|h| {
                h.session_id == session_id
                    && h.to_agent == to_agent
                    && h.status == HandoffStatus::Pending
                    && h.expires_at >= now
            })
            .map(|h| h.id)?;
        let handoff = guard.get_mut(&target_id)?;
        // Re-check status under the same lock acquisition: this is the
        // single atomic statement that decides the race winner.
        if handoff.status != HandoffStatus::Pending {
            return None;
        }
        handoff.status = HandoffStatus::Consumed;
        Some(handoff.payload.clone())
    }

    // ------------------------------------------------------- knowledge cache

    pub async fn cache_knowledge(
        &self,
        user_id: &str,
        query: &str,
        results: String,
        summary: Option<String>,
        source: &str,
        ttl_days: i64,
    ) -> Result<()> {
        let query_embedding = self.embedder.embed(query).await?;
        let now = Utc::now();
        let entry = KnowledgeCacheEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            query: query.to_string(),
            query_embedding,
            result_text: results,
            summary,
            source: source.to_string(),
            times_accessed: 0,
            fetched_at: now,
            expires_at: now + ChronoDuration::days(ttl_days),
        };
        self.knowledge_cache.lock().push(entry);
        Ok(())
    }

    /// Similarity search scoped to `user_id`, threshold inclusive, expired
    /// entries invisible.
    pub async fn search_knowledge(
        &self,
        user_id: &str,
        query: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<KnowledgeHit>> {
        let query_vec = self.embedder.embed(query).await?;
        let now = Utc::now();
        let mut guard = self.knowledge_cache.lock();
        let mut hits = Vec::new();
        for entry in guard.iter_mut() {
            if entry.user_id != user_id || entry.expires_at < now {
                continue;
            }
            let score = query_vec.cosine_similarity(&entry.query_embedding);
            if score >= threshold {
                entry.times_accessed += 1;
                hits.push(KnowledgeHit {
                    entry: entry.clone(),
                    score,
                });
            }
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit.max(1));
        Ok(hits)
    }

    // ------------------------------------------------------------ discovery

    pub async fn log_discovery(
        &self,
        user_id: &str,
        request: &str,
        solution: DiscoverySolution,
        success: bool,
        elapsed_ms: u64,
    ) -> Result<Uuid> {
        let request_embedding = self.embedder.embed(request).await?;
        let id = Uuid::new_v4();
        let record = DiscoveryRecord {
            id,
            user_id: user_id.to_string(),
            user_request: request.to_string(),
            request_embedding,
            solution,
            success,
            execution_time_ms: elapsed_ms,
            times_used: 0,
            promoted: false,
            user_scope: user_id.to_string(),
            created_at: Utc::now(),
        };
        self.discoveries.lock().push(record);
        Ok(id)
    }

    /// Similarity search against `successful` discoveries only; increments
    /// `times_used` atomically on the match the caller will reuse.
    pub async fn find_similar_discovery(
        &self,
        user_id: &str,
        request: &str,
        threshold: f32,
        require_success: bool,
    ) -> Result<Option<DiscoveryRecord>> {
        let query_vec = self.embedder.embed(request).await?;
        let mut guard = self.discoveries.lock();
        let mut best: Option<(f32, Uuid)> = None;
        for record in guard.iter() {
            if record.user_id != user_id {
                continue;
            }
            if require_success && !record.success {
                continue;
            }
            let score = query_vec.cosine_similarity(&record.request_embedding);
            if score >= threshold && best.as_ref().map_or(true, |(b, _)| score > *b) {
                best = Some((score, record.id));
            }
        }
        let Some((_, id)) = best else { return Ok(None) };
        let record = guard.iter_mut().find(|r| r.id == id).expect("id came from this vec");
        record.times_used += 1;
        Ok(Some(record.clone()))
    }

    #[must_use]
    pub fn popular_discoveries(&self, min_uses: u64, exclude_promoted: bool, limit: usize) -> Vec<DiscoveryRecord> {
        let mut out: Vec<DiscoveryRecord> = self
            .discoveries
            .lock()
            .iter()
            .filter(|d| d.times_used >= min_uses && !(exclude_promoted && d.promoted))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.times_used.cmp(&a.times_used));
        out.truncate(limit);
        out
    }

    /// Marks a discovery promoted. Promotion is a manual operator action
    /// taken after reviewing `analyze_tool_discoveries` output, not
    /// something this store decides on its own.
    pub fn mark_promoted(&self, discovery_id: Uuid) -> Result<()> {
        let mut guard = self.discoveries.lock();
        let record = guard
            .iter_mut()
            .find(|d| d.id == discovery_id)
            .ok_or_else(|| Error::NotFound(format!("discovery {discovery_id}")))?;
        record.promoted = true;
        Ok(())
    }

    // -------------------------------------------------------------- summary

    pub fn store_summary(&self, entity_type: EntityType, entity_id: &str, summary: String, activity_count: u64) {
        let entry = EpisodicSummary {
            entity_type,
            entity_id: entity_id.to_string(),
            generated_at: Utc::now(),
            summary,
            activity_count,
        };
        self.summaries
            .lock()
            .entry((entity_type, entity_id.to_string()))
            .or_default()
            .push(entry);
    }

    #[must_use]
    pub fn latest_summary(&self, entity_type: EntityType, entity_id: &str) -> Option<EpisodicSummary> {
        self.summaries
            .lock()
            .get(&(entity_type, entity_id.to_string()))
            .and_then(|v| v.iter().max_by_key(|s| s.generated_at).cloned())
    }

    /// Periodic maintenance hook: drops physically-expired working and
    /// shared entries. Knowledge cache entries may remain physically
    /// present until collected and are simply invisible to
    /// `search_knowledge` once expired.
    pub fn prune_expired(&self) {
        let now = Utc::now();
        let removed_working = {
            let mut guard = self.working.lock();
            let before = guard.len();
            guard.retain(|_, v| v.expires_at >= now);
            before - guard.len()
        };
        let removed_shared = {
            let mut guard = self.shared.lock();
            let before = guard.len();
            guard.retain(|_, v| v.expires_at >= now);
            before - guard.len()
        };
        if removed_working + removed_shared > 0 {
            debug!(removed_working, removed_shared, "pruned expired memory entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_embedder;
    use proptest::prelude::*;
    use std::sync::Barrier;
    use std::thread;

    fn store() -> MemoryStore {
        MemoryStore::new(fake_embedder(), Config::default())
    }

    proptest! {
        /// `upsert_preference` then `get_preference` returns the latest value;
        /// every subsequent `get_preference` increments `times_used` by
        /// exactly one, monotonically.
        #[test]
        fn preference_round_trips_and_times_used_is_monotonic(
            key in "[a-z]{1,12}",
            values in prop::collection::vec("[a-z ]{1,20}", 1..6),
            lookups in 0usize..8,
        ) {
            let store = store();
            for value in &values {
                store.upsert_preference("u1", &key, value.clone(), PreferenceSource::Explicit, 0.9);
            }
            let latest = values.last().unwrap();

            let mut last_times_used = 0u64;
            for i in 0..=lookups {
                let record = store.get_preference("u1", &key).expect("just upserted");
                prop_assert_eq!(&record.value, latest);
                prop_assert_eq!(record.times_used, u64::try_from(i).unwrap() + 1);
                last_times_used = record.times_used;
            }
            prop_assert_eq!(last_times_used as usize, lookups + 1);
        }

        /// Knowledge cache entries past their expiry are never returned by
        /// `search_knowledge`, regardless of how similar the query is.
        #[test]
        fn expired_knowledge_cache_entries_are_never_returned(ttl_days in -30i64..30i64) {
            let store = store();
            tokio_test_block_on(async {
                store
                    .cache_knowledge("u1", "AI agent developments", "some result".to_string(), None, "web", ttl_days)
                    .await
                    .unwrap();
                let hits = store.search_knowledge("u1", "AI agent developments", 0.0, 5).await.unwrap();
                if ttl_days <= 0 {
                    prop_assert!(hits.is_empty());
                } else {
                    prop_assert_eq!(hits.len(), 1);
                }
                Ok(())
            })?;
        }

        /// Reusing a `DiscoveryRecord` via similarity above threshold
        /// strictly increases `times_used` by exactly one per reuse.
        #[test]
        fn discovery_reuse_increments_times_used_by_one(reuses in 1u32..6) {
            let store = store();
            tokio_test_block_on(async {
                let solution = DiscoverySolution {
                    server: "web-research".to_string(),
                    tool: "search".to_string(),
                    arguments: serde_json::json!({"q": "AI news"}),
                };
                store.log_discovery("u1", "AI news", solution, true, 120).await.unwrap();

                let mut last = 0u64;
                for i in 0..reuses {
                    let record = store
                        .find_similar_discovery("u1", "AI news", 0.0, true)
                        .await
                        .unwrap()
                        .expect("seeded above");
                    prop_assert_eq!(record.times_used, u64::from(i) + 1);
                    last = record.times_used;
                }
                prop_assert_eq!(last, u64::from(reuses));
                Ok(())
            })?;
        }
    }

    /// Runs an async block to completion on a fresh current-thread runtime,
    /// for use inside `proptest!` bodies (which are synchronous).
    fn tokio_test_block_on<F, T>(fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(fut)
    }

    /// `consume_pending` on the same `(session, to_agent)` executed N times
    /// concurrently with exactly one pending handoff: exactly one call
    /// returns the payload, the rest return `none`, none panic.
    #[test]
    fn concurrent_consume_pending_exactly_one_winner() {
        for n in [2usize, 4, 8, 16] {
            let store = Arc::new(store());
            store.create_handoff("s1", "agentA", "agentB", "disambiguation", serde_json::json!({"choice": "task-1"}));

            let barrier = Arc::new(Barrier::new(n));
            let handles: Vec<_> = (0..n)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        store.consume_pending("s1", "agentB")
                    })
                })
                .collect();

            let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(Option::is_some).count();
            assert_eq!(winners, 1, "expected exactly one winner out of {n} concurrent callers");
        }
    }

    #[test]
    fn peek_pending_does_not_consume() {
        let store = store();
        store.create_handoff("s1", "agentA", "agentB", "disambiguation", serde_json::json!({"choice": "task-1"}));
        assert!(store.peek_pending("s1", "agentB").is_some());
        assert!(store.peek_pending("s1", "agentB").is_some());
        assert!(store.consume_pending("s1", "agentB").is_some());
        assert!(store.consume_pending("s1", "agentB").is_none());
    }

    #[tokio::test]
    async fn search_knowledge_threshold_is_inclusive() {
        let store = store();
        store
            .cache_knowledge("u1", "latest AI agent developments", "body".to_string(), Some("summary".to_string()), "web", 1)
            .await
            .unwrap();
        // The query embeds to the exact same vector as the cached entry, so
        // cosine similarity is 1.0; a threshold set to that exact value must
        // still count as a hit.
        let hits = store.search_knowledge("u1", "latest AI agent developments", 1.0, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn list_rules_does_not_touch_times_used() {
        let store = store();
        store.upsert_rule("u1", "I finished", "complete_task", HashMap::new(), 0.9);
        let before = store.list_rules("u1", 0.0);
        assert_eq!(before[0].times_used, 0);
        let _ = store.list_rules("u1", 0.0);
        let after = store.list_rules("u1", 0.0);
        assert_eq!(after[0].times_used, 0);
    }
}
