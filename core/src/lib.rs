#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

//! # Assistant Core
//!
//! Data structures, the multi-tier memory fabric, and the opaque service
//! adapter traits for the conversational task assistant. This crate owns no
//! routing policy: it is the substrate `assistant-router` is built on.
//!
//! ## Module organization
//!
//! - [`types`]: identifiers, embeddings, small shared enums.
//! - [`error`]: the error taxonomy and its propagation rules.
//! - [`config`]: all config-overridable thresholds, TTLs, and deadlines.
//! - [`clients`]: traits for the LLM, embedding, web-search, retrieval, and
//!   entity-store services this system treats as opaque externals.
//! - [`memory`]: the seven memory stores behind [`memory::MemoryStore`].
//! - [`handle`]: [`handle::Core`], the explicit startup handle threaded
//!   through components in place of hidden globals.
//! - [`testing`]: in-memory test doubles for the client traits.

pub mod clients;
pub mod config;
pub mod error;
pub mod handle;
pub mod memory;
pub mod testing;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use handle::Core;
pub use memory::MemoryStore;
