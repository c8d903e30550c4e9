//! In-memory test doubles for the entity store and retrieval service,
//! complementing `assistant_core::testing`'s LLM/embedding/web-search fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use assistant_core::clients::{EntityStore, FilterPredicates, RetrievalService, ScoredDoc};
use assistant_core::error::Result;
use assistant_core::types::Embedding;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

/// An in-memory `EntityStore` keyed by collection name, backing `tasks` and
/// `projects` documents as plain JSON objects with a generated `id`.
pub struct FakeEntityStore {
    collections: Mutex<HashMap<String, Vec<Value>>>,
    next_id: AtomicU64,
}

impl FakeEntityStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Seeds a document directly, bypassing `insert`, for test fixtures that
    /// need to preset state.
    pub fn seed(&self, collection: &str, mut doc: Value) -> String {
        let id = doc
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.alloc_id());
        doc["id"] = json!(id);
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        id
    }

    fn alloc_id(&self) -> String {
        format!("id-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Snapshot of every document in a collection, for test assertions.
    #[must_use]
    pub fn all(&self, collection: &str) -> Vec<Value> {
        self.collections.lock().get(collection).cloned().unwrap_or_default()
    }
}

impl Default for FakeEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(doc: &Value, filter: &Value) -> bool {
    let Value::Object(filter_map) = filter else {
        return true;
    };
    for (key, expected) in filter_map {
        match key.as_str() {
            "title_contains" | "name_contains" => {
                let field = if key == "title_contains" { "title" } else { "name" };
                let haystack = doc.get(field).and_then(Value::as_str).unwrap_or_default().to_lowercase();
                let needle = expected.as_str().unwrap_or_default().to_lowercase();
                if !haystack.contains(&needle) {
                    return false;
                }
            }
            _ => {
                if doc.get(key) != Some(expected) {
                    return false;
                }
            }
        }
    }
    true
}

#[async_trait]
impl EntityStore for FakeEntityStore {
    async fn find(&self, collection: &str, filter: &Value, limit: usize, _sort: &Value) -> Result<Vec<Value>> {
        let guard = self.collections.lock();
        let docs = guard.get(collection).cloned().unwrap_or_default();
        Ok(docs.into_iter().filter(|d| matches(d, filter)).take(limit.max(1)).collect())
    }

    async fn insert(&self, collection: &str, mut doc: Value) -> Result<String> {
        let id = self.alloc_id();
        doc["id"] = json!(id);
        self.collections
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<()> {
        let mut guard = self.collections.lock();
        if let Some(docs) = guard.get_mut(collection) {
            if let Some(doc) = docs.iter_mut().find(|d| d.get("id").and_then(Value::as_str) == Some(id)) {
                if let (Value::Object(doc_map), Value::Object(patch_map)) = (doc, patch) {
                    for (k, v) in patch_map {
                        doc_map.insert(k, v);
                    }
                }
            }
        }
        Ok(())
    }
}

/// A retrieval service that does naive substring scoring over whatever the
/// `FakeEntityStore` (or a directly-seeded doc list) holds.
pub struct FakeRetrievalService {
    docs: Mutex<Vec<Value>>,
}

impl FakeRetrievalService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(Vec::new()),
        }
    }

    pub fn seed(&self, doc: Value) {
        self.docs.lock().push(doc);
    }
}

impl Default for FakeRetrievalService {
    fn default() -> Self {
        Self::new()
    }
}

fn text_score(doc: &Value, fields: &[&str], query: &str) -> f32 {
    let query = query.to_lowercase();
    let mut score = 0.0;
    for field in fields {
        if let Some(text) = doc.get(*field).and_then(Value::as_str) {
            if text.to_lowercase().contains(&query) {
                score += 1.0;
            }
        }
    }
    score
}

#[async_trait]
impl RetrievalService for FakeRetrievalService {
    async fn vector_search(
        &self,
        _collection: &str,
        _path: &str,
        _query_vec: &Embedding,
        k: usize,
        _filter: &FilterPredicates,
    ) -> Result<Vec<ScoredDoc>> {
        let docs = self.docs.lock();
        Ok(docs
            .iter()
            .take(k)
            .map(|d| ScoredDoc { doc: d.clone(), score: 0.9 })
            .collect())
    }

    async fn text_search(&self, _collection: &str, query: &str, fields: &[&str], k: usize) -> Result<Vec<ScoredDoc>> {
        let docs = self.docs.lock();
        let mut scored: Vec<ScoredDoc> = docs
            .iter()
            .map(|d| ScoredDoc {
                doc: d.clone(),
                score: text_score(d, fields, query),
            })
            .filter(|s| s.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        scored.truncate(k);
        Ok(scored)
    }

    async fn hybrid_search(
        &self,
        collection: &str,
        query: &str,
        _query_vec: &Embedding,
        k: usize,
        _vector_weight: f32,
        _text_weight: f32,
    ) -> Result<Vec<ScoredDoc>> {
        self.text_search(collection, query, &["title", "notes"], k).await
    }
}
