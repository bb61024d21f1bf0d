//! `chainreview-mcp` — MCP (Model Context Protocol) client.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with MCP servers.
//! - A stdio transport that spawns child processes through the tool
//!   sandbox's launcher allowlist and communicates over stdin/stdout.
//! - An `McpManager` that manages connections to multiple MCP servers and
//!   orchestrates tool discovery and dispatch.
//!
//! # Usage
//!
//! ```rust,ignore
//! use chainreview_mcp::McpManager;
//! use chainreview_domain::config::McpConfig;
//!
//! let config: McpConfig = /* from chainreview.toml */;
//! let manager = McpManager::from_config(&config).await;
//!
//! for (server_id, tool) in manager.list_tools() {
//!     println!("{}", chainreview_mcp::protocol::namespace_tool_name(server_id, &tool.name));
//! }
//!
//! let result = manager.call_tool("filesystem", "read_file", json!({"path": "a.rs"})).await?;
//! ```

pub mod manager;
pub mod protocol;
pub mod transport;

pub use chainreview_domain::config::{McpConfig, McpServerConfig};
pub use manager::{McpError, McpManager};
pub use protocol::{McpToolDef, is_namespaced, namespace_tool_name, split_namespaced_tool_name};
