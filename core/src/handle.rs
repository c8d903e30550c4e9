//! `Core`: the explicit handle a process builds once at startup and threads
//! through every component, rather than reaching for hidden globals.

use std::sync::Arc;

use crate::clients::{EmbeddingClient, EntityStore, LlmClient, RetrievalService};
use crate::config::Config;
use crate::memory::MemoryStore;

/// Every shared dependency one running instance needs: the memory fabric
/// plus the opaque external-service adapters it and the router are built
/// against. Constructed once (in the CLI's `main`, or a test's setup code)
/// and cloned cheaply thereafter since everything inside is already an
/// `Arc`.
#[derive(Clone)]
pub struct Core {
    pub memory: Arc<MemoryStore>,
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub entities: Arc<dyn EntityStore>,
    pub retrieval: Arc<dyn RetrievalService>,
    pub config: Config,
}

impl Core {
    /// Builds a `Core`, constructing the `MemoryStore` from the given
    /// embedder and config so callers never need to build it separately.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingClient>,
        entities: Arc<dyn EntityStore>,
        retrieval: Arc<dyn RetrievalService>,
        config: Config,
    ) -> Self {
        let memory = Arc::new(MemoryStore::new(Arc::clone(&embedder), config.clone()));
        Self { memory, llm, embedder, entities, retrieval, config }
    }
}
