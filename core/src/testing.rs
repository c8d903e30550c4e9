//! In-memory test doubles for the opaque external services.
//!
//! Kept inline here rather than as a separate crate since this workspace's
//! test surface is small enough not to need one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::clients::{
    CacheControl, EmbeddingClient, LlmClient, LlmCompletion, LlmMessage, ToolSpec, WebSearchClient,
    WebSearchHit,
};
use crate::config::EMBEDDING_DIM;
use crate::error::Result;
use crate::types::Embedding;

/// Deterministic, content-hashed embedding: same text always embeds to the
/// same unit vector, and near-duplicate phrasing of the "same" request
/// stays close under cosine similarity for the fixtures that need it.
pub struct FakeEmbeddingClient;

#[async_trait]
impl EmbeddingClient for FakeEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(hash_embed(text))
    }
}

/// Hashes overlapping 3-grams of the lowercased, whitespace-normalized text
/// into buckets, then L2-normalizes. Texts sharing vocabulary land close
/// together; unrelated texts land roughly orthogonal.
#[must_use]
pub fn hash_embed(text: &str) -> Embedding {
    let normalized = text.to_lowercase();
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let mut v = vec![0f32; EMBEDDING_DIM];
    if words.is_empty() {
        v[0] = 1.0;
        return Embedding::new(v);
    }
    for w in &words {
        let mut hasher_state: u64 = 1469598103934665603;
        for b in w.bytes() {
            hasher_state ^= u64::from(b);
            hasher_state = hasher_state.wrapping_mul(1099511628211);
        }
        let bucket = (hasher_state as usize) % EMBEDDING_DIM;
        v[bucket] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    Embedding::new(v)
}

/// A scripted LLM: pops queued responses in order, or falls back to a
/// default "no tool calls, echo the last user message" completion.
pub struct FakeLlmClient {
    queue: Mutex<VecDeque<LlmCompletion>>,
    calls: AtomicU64,
}

impl FakeLlmClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Enqueue a canned response for the next `complete` call.
    pub fn push(&self, response: LlmCompletion) {
        self.queue.lock().push_back(response);
    }

    /// Number of `complete` calls made so far. Tier 1/2 of the router must
    /// never touch this — the invariant tests assert on it directly rather
    /// than inferring "no LLM call" from the absence of a scripted reply.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for FakeLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(
        &self,
        _system: &str,
        messages: &[LlmMessage],
        _tools: &[ToolSpec],
        _temperature: f32,
        _cache_control: CacheControl,
    ) -> Result<LlmCompletion> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(resp) = self.queue.lock().pop_front() {
            return Ok(resp);
        }
        let text = messages
            .last()
            .map(|m| format!("(no scripted response) echo: {}", m.content))
            .unwrap_or_default();
        Ok(LlmCompletion {
            text: Some(text),
            tool_calls: Vec::new(),
            usage: Default::default(),
            finish_reason: Some(crate::clients::FinishReason::Stop),
        })
    }
}

/// A scripted web-search provider.
pub struct FakeWebSearchClient {
    hits: Vec<WebSearchHit>,
}

impl FakeWebSearchClient {
    #[must_use]
    pub fn new(hits: Vec<WebSearchHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl WebSearchClient for FakeWebSearchClient {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<WebSearchHit>> {
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}

/// Convenience constructor bundling the three fakes behind `Arc`s.
#[must_use]
pub fn fake_embedder() -> Arc<dyn EmbeddingClient> {
    Arc::new(FakeEmbeddingClient)
}
