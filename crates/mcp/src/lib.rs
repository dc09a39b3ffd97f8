//! Remote capability gateway.
//!
//! Launches tool servers as subprocesses, discovers their tools over MCP and
//! proxies calls to them through the guardrail layer.
//!
//! - `config`: server definitions file and launch-time placeholder resolution
//! - `client`: transport-agnostic client and connector traits
//! - `rmcp_client`: stdio child-process connector backed by `rmcp`
//! - `gateway`: `RemoteGateway`, the connected-server set and call routing

pub mod client;
pub mod config;
pub mod gateway;
pub mod rmcp_client;

pub use client::{ContentPart, RemoteTool, RemoteToolClient, ServerConnector, ToolCallReply};
pub use config::{load_server_definitions, resolve_env, ServerDefinition};
pub use gateway::{normalize_schema, RemoteGateway, ServerSummary};
pub use rmcp_client::StdioConnector;

use std::path::PathBuf;

use thiserror::Error;

/// Errors specific to remote tool servers
#[derive(Error, Debug)]
pub enum McpError {
    #[error("could not read server definitions `{path}`: {source}")]
    ReadConfig { path: PathBuf, source: std::io::Error },

    #[error("could not parse server definitions `{path}`: {source}")]
    ParseConfig { path: PathBuf, source: serde_json::Error },

    #[error("failed to launch server `{server}`: {message}")]
    Launch { server: String, message: String },

    #[error("server `{server}` request failed: {message}")]
    Request { server: String, message: String },
}

/// Result type for gateway operations
pub type McpResult<T> = Result<T, McpError>;
