//! The memory fabric: seven typed stores behind one uniform API.

pub mod model;
pub mod store;

pub use model::*;
pub use store::{EpisodicFilter, KnowledgeHit, MemoryStore};
