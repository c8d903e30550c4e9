//! Reference-counted lifecycle over connected external tool servers: on
//! shutdown, all sessions are closed in reverse acquisition order.

use std::sync::Arc;

use assistant_core::error::Result;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use super::transport::{ExternalToolSpec, ExternalToolTransport, ServerEndpoint};

struct Session {
    name: String,
    transport: Arc<dyn ExternalToolTransport>,
}

/// Holds every connected external server session in acquisition order and
/// tears them down in reverse on shutdown.
pub struct SessionManager {
    sessions: Mutex<Vec<Session>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self { sessions: Mutex::new(Vec::new()) }
    }

    #[instrument(skip(self, endpoint, fallback_sse_url))]
    pub async fn connect(&self, name: &str, endpoint: &ServerEndpoint, fallback_sse_url: Option<&str>) -> Result<()> {
        let transport = super::transport::connect(endpoint, fallback_sse_url).await?;
        self.sessions.lock().push(Session {
            name: name.to_string(),
            transport: Arc::from(transport),
        });
        info!(server = name, "connected external tool server");
        Ok(())
    }

    /// Registers an already-constructed transport directly, bypassing the
    /// stdio/SSE connection dance. Used by callers that build their own
    /// `ExternalToolTransport` (in-process servers, test doubles).
    pub fn register(&self, name: &str, transport: Arc<dyn ExternalToolTransport>) {
        self.sessions.lock().push(Session {
            name: name.to_string(),
            transport,
        });
    }

    /// Every `(server_name, tool)` pair across connected servers, for the
    /// fresh-discovery LLM choice step.
    pub async fn list_all_tools(&self) -> Vec<(String, ExternalToolSpec)> {
        let sessions: Vec<(String, Arc<dyn ExternalToolTransport>)> = self
            .sessions
            .lock()
            .iter()
            .map(|s| (s.name.clone(), Arc::clone(&s.transport)))
            .collect();

        let mut all = Vec::new();
        for (name, transport) in sessions {
            match transport.list_tools().await {
                Ok(tools) => all.extend(tools.into_iter().map(|t| (name.clone(), t))),
                Err(err) => warn!(%err, server = name, "failed to list tools for connected server"),
            }
        }
        all
    }

    #[must_use]
    pub fn transport_for(&self, server_name: &str) -> Option<Arc<dyn ExternalToolTransport>> {
        self.sessions.lock().iter().find(|s| s.name == server_name).map(|s| Arc::clone(&s.transport))
    }

    /// Closes every session in reverse acquisition order.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<Session> = std::mem::take(&mut *self.sessions.lock());
        for session in sessions.into_iter().rev() {
            if let Err(err) = session.transport.shutdown().await {
                warn!(%err, server = session.name, "error shutting down external tool server");
            }
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
