//! Common value types shared by every memory store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::EMBEDDING_DIM;

/// A fixed-length, unit-normalized embedding vector.
///
/// The dimension is fixed system-wide (`EMBEDDING_DIM`); construction from a
/// mismatched length is a caller bug, not a runtime error path worth a
/// `Result`, so it panics like an indexing operation would.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Wrap a raw vector, asserting it has the system-wide dimension.
    #[must_use]
    pub fn new(values: Vec<f32>) -> Self {
        assert_eq!(values.len(), EMBEDDING_DIM, "embedding dimension mismatch");
        Self(values)
    }

    /// Cosine similarity between two unit-normalized embeddings, i.e. their
    /// dot product. Delegated to the store in production; kept local for
    /// tests and for the in-memory store used by the test doubles.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }
}

/// User-scoping identifier. Opaque beyond equality/hashing.
pub type UserId = String;
/// Session-scoping identifier.
pub type SessionId = String;

/// Generates a fresh random identifier for auto-id keyed records.
#[must_use]
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// Source of a semantic preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceSource {
    Explicit,
    Inferred,
}

/// Entity kind an `EpisodicSummary` is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    Project,
}

/// Status of a `SharedHandoff` mailbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,
    Consumed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_unit_vectors_is_one() {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[0] = 1.0;
        let a = Embedding::new(v.clone());
        let b = Embedding::new(v);
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        let mut v1 = vec![0.0f32; EMBEDDING_DIM];
        v1[0] = 1.0;
        let mut v2 = vec![0.0f32; EMBEDDING_DIM];
        v2[1] = 1.0;
        let a = Embedding::new(v1);
        let b = Embedding::new(v2);
        assert!(a.cosine_similarity(&b).abs() < 1e-6);
    }
}
