use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toolgate_core::ToolGroup;
use uuid::Uuid;

/// Id of the endpoint synthesized when a legacy single-URL config is upgraded.
pub const MIGRATED_ENDPOINT_ID: &str = "migrated-default";

/// Placeholder written in place of token values when a URL is redacted.
pub const REDACTED_TOKEN: &str = "token=***";

/// Reconnect policy for a single endpoint. Delays are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// Number of consecutive failures after which reconnection is abandoned.
    /// Zero disables retry entirely.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay")]
    pub initial_delay: u64,
    /// Upper bound on the computed delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,
    /// Multiplier applied per prior failure.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    10
}
fn default_initial_delay() -> u64 {
    2000
}
fn default_max_delay() -> u64 {
    60_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Last observed connectivity of an endpoint.
///
/// Observational only: it reflects the most recent supervisor transition and
/// is eventually consistent with the live socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    /// No live connection.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The socket is open.
    Connected,
}

/// One configured outbound bridge connection to a remote peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Opaque unique identifier, immutable after creation.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display description.
    #[serde(default)]
    pub description: String,
    /// When false the endpoint must have no live connection.
    pub enabled: bool,
    /// Full connection URI, including any embedded credentials.
    pub web_socket_url: String,
    /// Optional logical routing group restricting the visible tool set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Reconnection policy.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    /// Last observed connectivity.
    #[serde(default)]
    pub status: EndpointStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Updated only on successful open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<DateTime<Utc>>,
}

impl Endpoint {
    /// Build a fresh endpoint record from administrative input.
    pub fn from_draft(draft: EndpointDraft) -> Self {
        Self {
            id: format!("endpoint-{}", Uuid::new_v4()),
            name: draft.name,
            description: draft.description,
            enabled: draft.enabled,
            web_socket_url: draft.web_socket_url,
            group_id: draft.group_id,
            reconnect: draft.reconnect,
            status: EndpointStatus::Disconnected,
            created_at: Utc::now(),
            last_connected: None,
        }
    }

    /// The endpoint's routing group, if it names a non-empty one.
    pub fn group(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
    }

    /// Merge a patch into this record, returning the merged copy.
    ///
    /// Pure: neither input is modified, and untouched fields carry over.
    pub fn apply(&self, patch: &EndpointPatch) -> Endpoint {
        Endpoint {
            id: self.id.clone(),
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            description: patch
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            enabled: patch.enabled.unwrap_or(self.enabled),
            web_socket_url: patch
                .web_socket_url
                .clone()
                .unwrap_or_else(|| self.web_socket_url.clone()),
            group_id: patch.group_id.clone().or_else(|| self.group_id.clone()),
            reconnect: patch.reconnect.clone().unwrap_or_else(|| self.reconnect.clone()),
            status: self.status,
            created_at: self.created_at,
            last_connected: self.last_connected,
        }
    }

    /// A copy of this record with credential material masked out of the URL.
    pub fn redacted(&self) -> Endpoint {
        Endpoint {
            web_socket_url: redact_url(&self.web_socket_url),
            ..self.clone()
        }
    }
}

/// Administrative input for creating an endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDraft {
    /// Display name.
    pub name: String,
    /// Display description.
    #[serde(default)]
    pub description: String,
    /// Whether to connect as soon as the record exists.
    #[serde(default)]
    pub enabled: bool,
    /// Full connection URI.
    pub web_socket_url: String,
    /// Optional routing group.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Reconnection policy.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

/// A partial update to an endpoint record.
///
/// Absent fields leave the stored value unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointPatch {
    /// New display name.
    pub name: Option<String>,
    /// New display description.
    pub description: Option<String>,
    /// New enabled flag.
    pub enabled: Option<bool>,
    /// New connection URI.
    pub web_socket_url: Option<String>,
    /// New routing group.
    pub group_id: Option<String>,
    /// New reconnection policy.
    pub reconnect: Option<ReconnectPolicy>,
}

impl EndpointPatch {
    /// Whether applying this patch requires the live connection to be
    /// bounced. Configuration changes only take effect through a reconnect.
    pub fn touches_connection(&self) -> bool {
        self.web_socket_url.is_some() || self.enabled.is_some()
    }
}

/// The persisted service configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    /// Global switch; when false every connection is torn down regardless of
    /// per-endpoint flags.
    pub enabled: bool,
    /// All configured endpoints.
    pub endpoints: Vec<Endpoint>,
    /// Group directory resolved against by the group filter.
    pub groups: Vec<ToolGroup>,
    /// Persisted passthrough; no balancing behavior lives in the bridge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancing: Option<LoadBalancing>,
    /// Smart routing settings consumed by the dispatcher.
    pub smart_routing: SmartRoutingConfig,
}

impl ServiceConfig {
    /// Whether the bridge should hold connections at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.endpoints.is_empty()
    }

    /// Find an endpoint by id.
    pub fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }
}

/// Load balancing settings, persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancing {
    /// Whether balancing is requested.
    pub enabled: bool,
    /// Strategy name.
    pub strategy: String,
}

impl Default for LoadBalancing {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: "round-robin".to_string(),
        }
    }
}

/// Smart routing settings: when enabled, the dispatcher routes through the
/// catalog's semantic sentinel group instead of per-endpoint groups.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SmartRoutingConfig {
    /// Whether smart routing is globally enabled.
    #[serde(default)]
    pub enabled: bool,
}

/// Raw persisted document, including legacy single-URL fields.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StoredConfig {
    enabled: bool,
    endpoints: Vec<Endpoint>,
    groups: Vec<ToolGroup>,
    load_balancing: Option<LoadBalancing>,
    smart_routing: SmartRoutingConfig,
    web_socket_url: Option<String>,
    reconnect: Option<ReconnectPolicy>,
}

impl StoredConfig {
    /// Upgrade to the endpoint-list form. The second return value is true
    /// when a legacy single-URL document was migrated and should be
    /// re-persisted.
    pub(crate) fn into_service_config(self) -> (ServiceConfig, bool) {
        let legacy_url = self
            .web_socket_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());

        if legacy_url.is_none() || !self.endpoints.is_empty() {
            return (
                ServiceConfig {
                    enabled: self.enabled,
                    endpoints: self.endpoints,
                    groups: self.groups,
                    load_balancing: self.load_balancing,
                    smart_routing: self.smart_routing,
                },
                false,
            );
        }

        let endpoint = Endpoint {
            id: MIGRATED_ENDPOINT_ID.to_string(),
            name: "Default endpoint".to_string(),
            description: "Migrated from the single-URL configuration".to_string(),
            enabled: true,
            // Verbatim, including whitespace the peer's URL may carry.
            web_socket_url: self.web_socket_url.unwrap_or_default(),
            group_id: None,
            reconnect: self.reconnect.unwrap_or_default(),
            status: EndpointStatus::Disconnected,
            created_at: Utc::now(),
            last_connected: None,
        };

        (
            ServiceConfig {
                enabled: self.enabled,
                endpoints: vec![endpoint],
                groups: self.groups,
                load_balancing: Some(self.load_balancing.unwrap_or_default()),
                smart_routing: self.smart_routing,
            },
            true,
        )
    }
}

/// Mask every `token=` query value in a connection URL.
pub fn redact_url(url: &str) -> String {
    const NEEDLE: &str = "token=";
    let mut out = String::with_capacity(url.len());
    let mut rest = url;
    while let Some(pos) = rest.find(NEEDLE) {
        out.push_str(&rest[..pos]);
        out.push_str(REDACTED_TOKEN);
        let tail = &rest[pos + NEEDLE.len()..];
        rest = tail.find('&').map_or("", |i| &tail[i..]);
    }
    out.push_str(rest);
    out
}
