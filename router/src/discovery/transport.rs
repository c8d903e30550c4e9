//! External MCP-style tool server transport: stdio preferred, SSE fallback,
//! newline-delimited JSON-RPC framing grounded in the same request/response
//! shape the in-process MCP server speaks, but as a client of someone
//! else's server.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use assistant_core::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{instrument, warn};

/// One tool an external server exposes, as returned by its `list_tools`
/// call.
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    message: String,
}

/// How to reach one external server.
#[derive(Debug, Clone)]
pub enum ServerEndpoint {
    Stdio { command: String, args: Vec<String> },
    Sse { url: String },
}

/// A client of one external tool server. `&self` methods hide the
/// transport's mutable I/O state behind an async-aware lock so sessions can
/// be held in `Arc`s and shared across concurrent discovery requests.
#[async_trait]
pub trait ExternalToolTransport: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn list_tools(&self) -> Result<Vec<ExternalToolSpec>>;
    async fn call_tool(&self, name: &str, arguments: Value, timeout: Duration) -> Result<Value>;
    async fn shutdown(&self) -> Result<()>;
}

/// Child-process transport: the preferred path.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    next_id: AtomicU64,
    io: Mutex<Option<StdioIo>>,
}

struct StdioIo {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StdioTransport {
    #[must_use]
    pub fn new(command: String, args: Vec<String>) -> Self {
        Self {
            command,
            args,
            next_id: AtomicU64::new(1),
            io: Mutex::new(None),
        }
    }

    async fn call(&self, method: &'static str, params: Value) -> Result<Value> {
        let mut guard = self.io.lock().await;
        let io = guard.as_mut().ok_or_else(|| Error::Transport("stdio transport not initialized".to_string()))?;

        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        io.stdin.write_all(line.as_bytes()).await.map_err(|e| Error::Transport(e.to_string()))?;
        io.stdin.flush().await.map_err(|e| Error::Transport(e.to_string()))?;

        let mut response_line = String::new();
        let bytes_read = io
            .stdout
            .read_line(&mut response_line)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        if bytes_read == 0 {
            return Err(Error::Transport("stdio server closed its stdout".to_string()));
        }

        let response: JsonRpcResponse = serde_json::from_str(response_line.trim())?;
        if let Some(err) = response.error {
            return Err(Error::Transport(err.message));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ExternalToolTransport for StdioTransport {
    #[instrument(skip(self))]
    async fn initialize(&self) -> Result<()> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Transport(format!("failed to spawn '{}': {e}", self.command)))?;

        let stdin = child.stdin.take().ok_or_else(|| Error::Transport("no stdin handle".to_string()))?;
        let stdout = child.stdout.take().ok_or_else(|| Error::Transport("no stdout handle".to_string()))?;

        *self.io.lock().await = Some(StdioIo {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        });

        self.call("initialize", Value::Null).await?;
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ExternalToolSpec>> {
        let result = self.call("tools/list", Value::Null).await?;
        let tools = result.get("tools").cloned().unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(tools)?)
    }

    async fn call_tool(&self, name: &str, arguments: Value, timeout: Duration) -> Result<Value> {
        tokio::time::timeout(timeout, self.call("tools/call", serde_json::json!({"name": name, "arguments": arguments})))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(mut io) = self.io.lock().await.take() {
            let _ = io.child.kill().await;
        }
        Ok(())
    }
}

/// Long-lived HTTP stream transport: the fallback path. The remote SSE
/// provider is known to hang; stdio's child process is the more reliable
/// default, so this is only reached on stdio initialization failure.
pub struct SseTransport {
    base_url: String,
    client: reqwest::Client,
}

impl SseTransport {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ExternalToolTransport for SseTransport {
    async fn initialize(&self) -> Result<()> {
        self.client
            .get(format!("{}/initialize", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ExternalToolSpec>> {
        let response = self
            .client
            .get(format!("{}/tools", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let body: Value = response.json().await.map_err(|e| Error::Transport(e.to_string()))?;
        let tools = body.get("tools").cloned().unwrap_or(Value::Array(Vec::new()));
        Ok(serde_json::from_value(tools)?)
    }

    async fn call_tool(&self, name: &str, arguments: Value, timeout: Duration) -> Result<Value> {
        let request = self
            .client
            .post(format!("{}/tools/call", self.base_url))
            .json(&serde_json::json!({"name": name, "arguments": arguments}))
            .send();
        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| Error::Timeout(timeout))?
            .map_err(|e| Error::Transport(e.to_string()))?;
        response.json().await.map_err(|e| Error::Transport(e.to_string()))
    }

    async fn shutdown(&self) -> Result<()> {
        // Stateless HTTP client; nothing to tear down beyond dropping it.
        Ok(())
    }
}

/// Builds the preferred transport for a server endpoint, falling back from
/// stdio to SSE on initialization failure.
#[instrument(skip(endpoint, fallback_sse_url))]
pub async fn connect(endpoint: &ServerEndpoint, fallback_sse_url: Option<&str>) -> Result<Box<dyn ExternalToolTransport>> {
    match endpoint {
        ServerEndpoint::Stdio { command, args } => {
            let stdio = StdioTransport::new(command.clone(), args.clone());
            match stdio.initialize().await {
                Ok(()) => Ok(Box::new(stdio)),
                Err(err) => {
                    warn!(%err, command, "stdio transport failed to initialize, falling back to SSE");
                    let url = fallback_sse_url.ok_or(err)?;
                    let sse = SseTransport::new(url.to_string());
                    sse.initialize().await?;
                    Ok(Box::new(sse))
                }
            }
        }
        ServerEndpoint::Sse { url } => {
            let sse = SseTransport::new(url.clone());
            sse.initialize().await?;
            Ok(Box::new(sse))
        }
    }
}
