use async_trait::async_trait;
use serde_json::Value;
use toolgate_core::{ToolGateResult, ToolListResult};

/// Per-request scope handed to the tool catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    /// Stable per-endpoint session id the catalog can key per-connection
    /// state on.
    pub session_id: String,
    /// Group constraint, if any. The smart-routing sentinel group is passed
    /// through here as well.
    pub group: Option<String>,
}

/// The tool catalog collaborator: executes the actual list/call operations
/// over the tools gathered from backend integrations.
///
/// Implementations must tolerate concurrent invocation from multiple
/// endpoints. Failures are surfaced to the remote peer as JSON-RPC errors,
/// never as dropped connections.
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// List the tools visible under the given scope.
    async fn list_tools(
        &self,
        params: Value,
        scope: RequestScope,
    ) -> ToolGateResult<ToolListResult>;

    /// Execute a tool call request and return the catalog's result verbatim.
    async fn call_tool(&self, request: Value, scope: RequestScope) -> ToolGateResult<Value>;
}
