//! Core types and error definitions for the Toolgate bridge.
//!
//! This crate provides the foundational types shared across all Toolgate
//! crates: error handling, tool records as they appear on the wire, and the
//! group directory used to scope what an endpoint may see.
//!
//! # Main types
//!
//! - [`ToolGateError`] — Unified error enum for all Toolgate subsystems.
//! - [`ToolGateResult`] — Convenience alias for `Result<T, ToolGateError>`.
//! - [`ToolEntry`] — A single tool as reported by the tool catalog.
//! - [`ToolListResult`] — A `tools/list` result, extra fields preserved.
//! - [`ToolGroup`] — A named subset of backend servers and their tools.

use serde::{Deserialize, Serialize};

// --- Error types ---

/// Top-level error type for the Toolgate bridge.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolGateError {
    /// An error in configuration parsing, validation, or persistence.
    #[error("Config error: {0}")]
    Config(String),

    /// An error on the WebSocket transport to a remote peer.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A malformed or unprocessable protocol frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An error raised by the tool catalog collaborator.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`ToolGateError`].
pub type ToolGateResult<T> = Result<T, ToolGateError>;

// --- Tool types ---

/// A single tool as reported by the tool catalog in a `tools/list` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEntry {
    /// Tool name, unique within its owning server.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON schema describing the tool's arguments.
    #[serde(default = "default_input_schema", rename = "inputSchema")]
    pub input_schema: serde_json::Value,
    /// Name of the backend server that owns this tool, when the catalog
    /// attributes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

fn default_input_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// The result of a `tools/list` request.
///
/// Fields other than `tools` are carried through untouched so that catalog
/// extensions (cursors, metadata) survive group filtering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolListResult {
    /// The tools visible to the requesting peer.
    #[serde(default)]
    pub tools: Vec<ToolEntry>,
    /// Any additional result fields, passed through verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// --- Group types ---

/// A named subset of backend servers used to scope what an endpoint may see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolGroup {
    /// Opaque group identifier referenced by endpoint records.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Member servers of this group.
    #[serde(default)]
    pub servers: Vec<GroupMember>,
}

/// One member server of a [`ToolGroup`].
///
/// The persisted form is either a bare server name (all of that server's
/// tools) or an object restricting the member to a tool scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupMember {
    /// A bare server name; every tool of that server is in scope.
    Name(String),
    /// A server with an explicit tool scope.
    Scoped {
        /// Server name.
        name: String,
        /// Which of the server's tools are in scope.
        tools: ToolScope,
    },
}

impl GroupMember {
    /// The member's server name, regardless of form.
    pub fn server_name(&self) -> &str {
        match self {
            GroupMember::Name(name) | GroupMember::Scoped { name, .. } => name,
        }
    }
}

/// The tool scope of a [`GroupMember::Scoped`] entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolScope {
    /// The literal keyword `"all"`; any other keyword matches nothing.
    Keyword(String),
    /// An explicit allow-list of tool names.
    Allowed(Vec<String>),
}
