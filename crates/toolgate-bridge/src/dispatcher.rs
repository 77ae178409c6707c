use crate::catalog::{RequestScope, ToolCatalog};
use crate::filter::filter_tools_by_group;
use crate::protocol::{self, RpcFrame};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use toolgate_config::{Endpoint, ServiceConfig};
use tracing::{debug, warn};

/// Bound on catalog operations; an elapsed call is reported to the peer as
/// an internal error, the connection stays open.
const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Parses inbound frames as JSON-RPC requests or notifications, routes them
/// to the right handler, and serializes responses and errors back for the
/// originating connection.
pub struct Dispatcher {
    catalog: Arc<dyn ToolCatalog>,
    config: Arc<RwLock<ServiceConfig>>,
}

impl Dispatcher {
    /// Create a dispatcher over the shared catalog and configuration.
    pub fn new(catalog: Arc<dyn ToolCatalog>, config: Arc<RwLock<ServiceConfig>>) -> Self {
        Self { catalog, config }
    }

    /// Handle one inbound frame. Returns the serialized response to write
    /// back on the same connection, or `None` when the frame warrants no
    /// reply (unknown methods, unparseable input).
    ///
    /// Handler failures become JSON-RPC error responses; nothing escapes
    /// past the dispatcher.
    pub async fn handle_frame(&self, endpoint: &Endpoint, raw: &str) -> Option<String> {
        let frame: RpcFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(endpoint = %endpoint.name, error = %e, "Dropping unparseable frame");
                return None;
            }
        };
        debug!(endpoint = %endpoint.name, method = %frame.method, "Frame received");

        match frame.method.as_str() {
            "initialize" => Some(protocol::response_frame(
                frame.id,
                protocol::initialize_result(),
            )),
            "ping" => Some(protocol::response_frame(frame.id, json!({}))),
            "tools/list" => Some(self.handle_list_tools(endpoint, frame).await),
            "tools/call" => Some(self.handle_call_tool(endpoint, frame).await),
            method => {
                // Possibly an asynchronous notification from the peer:
                // ignored, not rejected.
                warn!(endpoint = %endpoint.name, method = %method, "Unhandled method, dropping");
                None
            }
        }
    }

    async fn handle_list_tools(&self, endpoint: &Endpoint, frame: RpcFrame) -> String {
        let smart = self.smart_routing_enabled().await;
        let group = endpoint.group().map(str::to_string);
        let scope = RequestScope {
            session_id: protocol::session_id(&endpoint.id),
            group: if smart {
                Some(protocol::SMART_ROUTING_GROUP.to_string())
            } else {
                group.clone()
            },
        };

        let params = frame.params.unwrap_or_else(|| json!({}));
        match tokio::time::timeout(CATALOG_TIMEOUT, self.catalog.list_tools(params, scope)).await {
            Err(_) => {
                warn!(endpoint = %endpoint.name, "tools/list timed out");
                protocol::error_frame(
                    frame.id,
                    protocol::INTERNAL_ERROR_CODE,
                    "tool catalog timed out",
                )
            }
            Ok(Ok(result)) => {
                // The catalog may already scope by group; the bridge
                // re-filters independently unless smart routing took over.
                let result = match (&group, smart) {
                    (Some(group_id), false) => {
                        let config = self.config.read().await;
                        filter_tools_by_group(result, group_id, &config.groups)
                    }
                    _ => result,
                };
                match serde_json::to_value(&result) {
                    Ok(value) => protocol::response_frame(frame.id, value),
                    Err(e) => protocol::error_frame(
                        frame.id,
                        protocol::INTERNAL_ERROR_CODE,
                        &e.to_string(),
                    ),
                }
            }
            Ok(Err(e)) => {
                warn!(endpoint = %endpoint.name, error = %e, "tools/list failed");
                protocol::error_frame(frame.id, protocol::INTERNAL_ERROR_CODE, &e.to_string())
            }
        }
    }

    async fn handle_call_tool(&self, endpoint: &Endpoint, frame: RpcFrame) -> String {
        let tool_name = frame
            .params
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let smart = self.smart_routing_enabled().await
            && protocol::SMART_ROUTING_TOOLS.contains(&tool_name.as_str());
        let scope = RequestScope {
            session_id: protocol::session_id(&endpoint.id),
            group: if smart {
                Some(protocol::SMART_ROUTING_GROUP.to_string())
            } else {
                endpoint.group().map(str::to_string)
            },
        };
        debug!(endpoint = %endpoint.name, tool = %tool_name, "tools/call");

        let request = match serde_json::to_value(&frame) {
            Ok(value) => value,
            Err(e) => {
                return protocol::error_frame(
                    frame.id,
                    protocol::INTERNAL_ERROR_CODE,
                    &e.to_string(),
                )
            }
        };
        match tokio::time::timeout(CATALOG_TIMEOUT, self.catalog.call_tool(request, scope)).await {
            Ok(Ok(result)) => protocol::response_frame(frame.id, result),
            Ok(Err(e)) => {
                warn!(endpoint = %endpoint.name, tool = %tool_name, error = %e, "tools/call failed");
                protocol::error_frame(frame.id, protocol::INTERNAL_ERROR_CODE, &e.to_string())
            }
            Err(_) => {
                warn!(endpoint = %endpoint.name, tool = %tool_name, "tools/call timed out");
                protocol::error_frame(
                    frame.id,
                    protocol::INTERNAL_ERROR_CODE,
                    "tool catalog timed out",
                )
            }
        }
    }

    async fn smart_routing_enabled(&self) -> bool {
        self.config.read().await.smart_routing.enabled
    }
}
