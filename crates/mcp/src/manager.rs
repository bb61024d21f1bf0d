//! MCP manager — holds all MCP server connections and orchestrates tool
//! discovery and dispatch.

use std::collections::HashMap;

use serde_json::Value;

use chainreview_domain::config::{McpConfig, McpServerConfig};
use chainreview_domain::trace::TraceEvent;

use crate::protocol::{self, McpToolDef, ToolCallResult, ToolsListResult};
use crate::transport::{McpTransport, StdioTransport, TransportError};

/// An MCP server connection (one per configured server).
pub struct McpServer {
    pub id: String,
    pub tools: Vec<McpToolDef>,
    transport: Box<dyn McpTransport>,
}

impl McpServer {
    /// Spawn the process, perform the `initialize` / `notifications/initialized`
    /// / `tools/list` handshake, and discover its tools. A failed `tools/list`
    /// just leaves the server with no tools; it doesn't fail initialization.
    async fn initialize(config: &McpServerConfig) -> Result<Self, McpError> {
        let transport: Box<dyn McpTransport> = Box::new(StdioTransport::spawn(config).map_err(McpError::Transport)?);

        let init_params = protocol::initialize_params();
        let params_value = serde_json::to_value(&init_params)
            .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;

        let resp = transport.send_request("initialize", Some(params_value)).await.map_err(McpError::Transport)?;
        if resp.is_error() {
            let err = resp.error.unwrap();
            return Err(McpError::Protocol(format!("initialize failed: {err}")));
        }
        tracing::debug!(server_id = %config.id, "MCP initialize response received");

        transport.send_notification("notifications/initialized").await.map_err(McpError::Transport)?;
        tracing::debug!(server_id = %config.id, "sent notifications/initialized");

        let tools_resp = transport.send_request("tools/list", None).await.map_err(McpError::Transport)?;
        let tools = if tools_resp.is_error() {
            tracing::warn!(server_id = %config.id, "tools/list returned error, server will have no tools");
            Vec::new()
        } else {
            let result_value = tools_resp.result.unwrap_or(Value::Null);
            match serde_json::from_value::<ToolsListResult>(result_value) {
                Ok(r) => r.tools,
                Err(e) => {
                    tracing::warn!(server_id = %config.id, error = %e, "failed to parse tools/list result");
                    Vec::new()
                }
            }
        };

        tracing::info!(server_id = %config.id, tool_count = tools.len(), "MCP server initialized");

        Ok(Self { id: config.id.clone(), tools, transport })
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::ServerDown(self.id.clone()));
        }

        let params = serde_json::json!({ "name": tool_name, "arguments": arguments });
        let resp = self.transport.send_request("tools/call", Some(params)).await.map_err(McpError::Transport)?;
        if resp.is_error() {
            let err = resp.error.unwrap();
            return Err(McpError::Protocol(format!("tools/call failed: {err}")));
        }

        let result_value = resp.result.unwrap_or(Value::Null);
        serde_json::from_value::<ToolCallResult>(result_value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))
    }

    async fn shutdown(&self) {
        tracing::info!(server_id = %self.id, "shutting down MCP server");
        self.transport.shutdown().await;
    }
}

/// Holds every configured MCP server connection and dispatches tool calls
/// by server id.
pub struct McpManager {
    servers: HashMap<String, McpServer>,
}

impl McpManager {
    pub fn empty() -> Self {
        Self { servers: HashMap::new() }
    }

    /// Initialize every configured server. Servers that fail to start are
    /// logged and skipped rather than failing the whole run — an MCP server
    /// is an optional tool source, not a startup dependency.
    pub async fn from_config(config: &McpConfig) -> Self {
        let mut servers = HashMap::new();

        for server_config in &config.servers {
            tracing::info!(server_id = %server_config.id, command = %server_config.command, "initializing MCP server");

            match McpServer::initialize(server_config).await {
                Ok(server) => {
                    TraceEvent::McpServerSpawned {
                        server_id: server_config.id.clone(),
                        command: server_config.command.clone(),
                    }
                    .emit();
                    servers.insert(server_config.id.clone(), server);
                }
                Err(e) => {
                    tracing::warn!(server_id = %server_config.id, error = %e, "failed to initialize MCP server, skipping");
                    TraceEvent::McpServerUnavailable { server_id: server_config.id.clone(), reason: e.to_string() }
                        .emit();
                }
            }
        }

        if !servers.is_empty() {
            tracing::info!(count = servers.len(), "MCP manager ready");
        }

        Self { servers }
    }

    /// Tools across every alive server, as `(server_id, tool_def)` tuples.
    pub fn list_tools(&self) -> Vec<(&str, &McpToolDef)> {
        self.servers
            .values()
            .filter(|s| s.is_alive())
            .flat_map(|server| server.tools.iter().map(move |tool| (server.id.as_str(), tool)))
            .collect()
    }

    pub async fn call_tool(&self, server_id: &str, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let server = self.servers.get(server_id).ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;
        server.call_tool(tool_name, arguments).await
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    pub fn tool_count(&self) -> usize {
        self.servers.values().filter(|s| s.is_alive()).map(|s| s.tools.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub async fn shutdown(&self) {
        let futs: Vec<_> = self.servers.values().map(|s| s.shutdown()).collect();
        futures_util::future::join_all(futs).await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    #[error("MCP server is down: {0}")]
    ServerDown(String),
}

impl From<McpError> for chainreview_domain::error::Error {
    fn from(e: McpError) -> Self {
        chainreview_domain::error::Error::ToolFailure(e.to_string())
    }
}
