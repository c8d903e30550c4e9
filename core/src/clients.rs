//! Thin async adapters to opaque external services.
//!
//! These traits are the only contact point with the LLM provider, the
//! embedding model, and the web-search provider. The core never assumes a
//! concrete vendor; production wiring and test doubles both implement these
//! traits.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::EMBEDDING_DIM;
use crate::error::Result;
use crate::types::Embedding;

/// A single message in a rolling conversation passed to the LLM.
#[derive(Debug, Clone)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
    /// Present on assistant messages that invoked tools, and on the
    /// corresponding tool-result messages that follow them.
    pub tool_call: Option<ToolCallRequest>,
    pub tool_result: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool the LLM may choose to invoke, as exposed in the completion request.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One tool call the LLM asked to perform.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Why the completion stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
}

/// Token accounting, surfaced for observability only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Result of one `LLMClient::complete` call.
#[derive(Debug, Clone, Default)]
pub struct LlmCompletion {
    /// Present when the model produced a final answer instead of tool calls.
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Usage,
    pub finish_reason: Option<FinishReason>,
}

/// Marks whether the system-prompt prefix of a completion call should be
/// treated as cacheable by the transport. Transport-level only; never
/// changes the *result* of a call, only its cost/latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheControl {
    None,
    CacheSystemPrefix,
}

/// Adapter to the opaque LLM provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete one turn of conversation, optionally offering a tool
    /// catalogue. `temperature` of `0.0` requests deterministic output
    /// (used by the multi-step planner's JSON-emission call).
    async fn complete(
        &self,
        system: &str,
        messages: &[LlmMessage],
        tools: &[ToolSpec],
        temperature: f32,
        cache_control: CacheControl,
    ) -> Result<LlmCompletion>;
}

/// Adapter to the opaque embedding provider. Vectors returned must be
/// unit-normalized and exactly `EMBEDDING_DIM` wide.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// One web-search hit.
#[derive(Debug, Clone)]
pub struct WebSearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Adapter to the opaque web-search provider, used only by discovery-mode
/// tool servers, never by the built-in tool loop.
#[async_trait]
pub trait WebSearchClient: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<WebSearchHit>>;
}

/// A generic scored document returned by the document-store's retrieval
/// surface. The `doc` payload is an opaque JSON blob the caller
/// already knows the shape of (e.g. a task or project record).
#[derive(Debug, Clone)]
pub struct ScoredDoc {
    pub doc: Value,
    pub score: f32,
}

/// Filter predicate passed through to `vector_search`/`hybrid_search`
/// untouched; the document-store defines its own predicate language.
pub type FilterPredicates = Value;

/// The document-store's retrieval surface, consumed as an external service.
/// Vector/text/hybrid search all live behind one trait so the core can be
/// tested against an in-memory fake.
#[async_trait]
pub trait RetrievalService: Send + Sync {
    async fn vector_search(
        &self,
        collection: &str,
        path: &str,
        query_vec: &Embedding,
        k: usize,
        filter: &FilterPredicates,
    ) -> Result<Vec<ScoredDoc>>;

    async fn text_search(
        &self,
        collection: &str,
        query: &str,
        fields: &[&str],
        k: usize,
    ) -> Result<Vec<ScoredDoc>>;

    /// Reciprocal-rank-fusion of vector and text search, default weights
    /// 0.6/0.4 (config-overridable via `HybridSearchWeights`).
    async fn hybrid_search(
        &self,
        collection: &str,
        query: &str,
        query_vec: &Embedding,
        k: usize,
        vector_weight: f32,
        text_weight: f32,
    ) -> Result<Vec<ScoredDoc>>;
}

/// The domain CRUD surface for tasks/projects, consumed as an external
/// service. The core only needs enough of it to execute built-in
/// tools; it never owns entity storage itself.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find(&self, collection: &str, filter: &Value, limit: usize, sort: &Value) -> Result<Vec<Value>>;
    async fn insert(&self, collection: &str, doc: Value) -> Result<String>;
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()>;
}

const _: () = assert!(EMBEDDING_DIM == 1024);
