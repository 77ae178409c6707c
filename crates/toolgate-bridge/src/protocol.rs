//! JSON-RPC 2.0 framing for the remote peer wire protocol.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Protocol version reported in the `initialize` response.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Bridge identity reported in the `initialize` response.
pub const BRIDGE_NAME: &str = "toolgate-bridge";

/// Generic internal-error code used when request handling fails.
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// Sentinel group that forces catalog-side semantic routing.
pub const SMART_ROUTING_GROUP: &str = "$smart";

/// Meta-tools that route through the smart sentinel on `tools/call`.
/// Ordinary tool calls always use the endpoint's own group.
pub const SMART_ROUTING_TOOLS: [&str; 2] = ["search_tools", "call_tool"];

/// Notification broadcast to open connections when the catalog changes.
pub const TOOLS_CHANGED_METHOD: &str = "notifications/tools/list_changed";

/// An inbound JSON-RPC frame: a request when `id` is present, a
/// notification otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcFrame {
    /// Protocol marker, `"2.0"` on conforming peers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    /// Request id, echoed back unchanged on responses and errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Serialize a success response, echoing `id` unchanged. Frames without an
/// id get a response without one.
pub fn response_frame(id: Option<Value>, result: Value) -> String {
    let mut frame = Map::new();
    frame.insert("jsonrpc".to_string(), json!("2.0"));
    if let Some(id) = id {
        frame.insert("id".to_string(), id);
    }
    frame.insert("result".to_string(), result);
    Value::Object(frame).to_string()
}

/// Serialize an error response.
pub fn error_frame(id: Option<Value>, code: i64, message: &str) -> String {
    let mut frame = Map::new();
    frame.insert("jsonrpc".to_string(), json!("2.0"));
    if let Some(id) = id {
        frame.insert("id".to_string(), id);
    }
    frame.insert("error".to_string(), json!({"code": code, "message": message}));
    Value::Object(frame).to_string()
}

/// Serialize a notification frame: no id, no params.
pub fn notification_frame(method: &str) -> String {
    json!({"jsonrpc": "2.0", "method": method}).to_string()
}

/// The static `initialize` result: bridge identity and capabilities. Does
/// not consult the tool catalog.
pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": BRIDGE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": {
            "tools": {},
        },
    })
}

/// Per-endpoint session id handed to the catalog so it can scope
/// per-connection state. Stable for the life of the endpoint record.
pub fn session_id(endpoint_id: &str) -> String {
    format!("bridge-{endpoint_id}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_and_notification() {
        let frame: RpcFrame =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#).unwrap();
        assert_eq!(frame.method, "ping");
        assert_eq!(frame.id, Some(json!(3)));
        assert!(frame.params.is_none());

        let frame: RpcFrame =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(frame.id.is_none());
    }

    #[test]
    fn test_response_frame_echoes_id() {
        let raw = response_frame(Some(json!(7)), json!({}));
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 7, "result": {}}));

        // String ids come back as strings.
        let raw = response_frame(Some(json!("req-1")), json!({"ok": true}));
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["id"], "req-1");
    }

    #[test]
    fn test_response_frame_without_id_omits_it() {
        let raw = response_frame(None, json!({}));
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_error_frame_shape() {
        let raw = error_frame(Some(json!(9)), INTERNAL_ERROR_CODE, "catalog unavailable");
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["id"], 9);
        assert_eq!(value["error"]["code"], INTERNAL_ERROR_CODE);
        assert_eq!(value["error"]["message"], "catalog unavailable");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_notification_frame_has_no_id() {
        let raw = notification_frame(TOOLS_CHANGED_METHOD);
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["method"], TOOLS_CHANGED_METHOD);
        assert!(value.get("id").is_none());
        assert!(value.get("params").is_none());
    }

    #[test]
    fn test_initialize_result_is_static() {
        let result = initialize_result();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], BRIDGE_NAME);
        assert!(result["capabilities"]["tools"].is_object());
        assert_eq!(result, initialize_result());
    }

    #[test]
    fn test_session_id_stable_per_endpoint() {
        assert_eq!(session_id("endpoint-1"), "bridge-endpoint-1");
        assert_eq!(session_id("endpoint-1"), session_id("endpoint-1"));
        assert_ne!(session_id("endpoint-1"), session_id("endpoint-2"));
    }
}
