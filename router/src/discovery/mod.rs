//! Tier 4 — `DiscoveryAgent` and the external tool server transport it
//! drives.

pub mod agent;
pub mod sessions;
pub mod transport;

pub use agent::{DiscoveryAgent, DiscoveryResponse, DiscoverySource};
pub use sessions::SessionManager;
pub use transport::{ExternalToolSpec, ExternalToolTransport, ServerEndpoint};
