use crate::catalog::ToolCatalog;
use crate::protocol::{notification_frame, TOOLS_CHANGED_METHOD};
use crate::supervisor::{self, ConnectionHandle, SupervisorContext};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use toolgate_config::{
    ConfigStore, Endpoint, EndpointDraft, EndpointPatch, EndpointStatus, ServiceConfig,
    REDACTED_TOKEN,
};
use toolgate_core::{ToolGateError, ToolGateResult};
use tracing::{info, warn};

/// Point-in-time connectivity report for one endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    /// The endpoint record, connection URL redacted.
    pub endpoint: Endpoint,
    /// Whether the socket is currently open.
    pub connected: bool,
    /// Number of live connections across all endpoints.
    pub connection_count: usize,
    /// Last successful open, if any.
    pub last_connected: Option<DateTime<Utc>>,
}

/// Public surface of the endpoint bridge: endpoint CRUD, connection
/// lifecycle, status queries, and tools-changed broadcast.
///
/// Owns the endpoint registry and the set of active connection supervisors.
/// Mutations are serialized per endpoint id through the registry lock;
/// per-endpoint failures never propagate past this boundary.
pub struct BridgeManager {
    store: Arc<dyn ConfigStore>,
    catalog: Arc<dyn ToolCatalog>,
    config: Arc<RwLock<ServiceConfig>>,
    connections: Arc<RwLock<HashMap<String, ConnectionHandle>>>,
    next_generation: AtomicU64,
}

impl BridgeManager {
    /// Load configuration through the store (migrating legacy documents)
    /// and build an idle manager. No connections are opened until
    /// [`initialize_endpoints`](Self::initialize_endpoints) runs.
    pub async fn new(
        store: Arc<dyn ConfigStore>,
        catalog: Arc<dyn ToolCatalog>,
    ) -> ToolGateResult<Self> {
        let config = store.load().await?;
        Ok(Self {
            store,
            catalog,
            config: Arc::new(RwLock::new(config)),
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        })
    }

    /// Whether the bridge should hold connections: the global flag is set
    /// and at least one endpoint exists.
    pub async fn is_enabled(&self) -> bool {
        self.config.read().await.is_enabled()
    }

    /// Start a supervisor for every enabled endpoint. One endpoint failing
    /// to start must not keep the others from starting.
    pub async fn initialize_endpoints(&self) {
        if !self.is_enabled().await {
            info!("Bridge service disabled, not connecting endpoints");
            return;
        }

        let endpoints: Vec<Endpoint> = {
            let config = self.config.read().await;
            config.endpoints.iter().filter(|e| e.enabled).cloned().collect()
        };
        info!(count = endpoints.len(), "Initializing bridge endpoints");

        for endpoint in endpoints {
            if endpoint.web_socket_url.trim().is_empty() {
                warn!(endpoint = %endpoint.name, "Endpoint has no URL, skipping");
                continue;
            }
            self.start_connection(&endpoint).await;
        }
    }

    /// All endpoint records, connection URLs redacted.
    pub async fn endpoints(&self) -> Vec<Endpoint> {
        self.config
            .read()
            .await
            .endpoints
            .iter()
            .map(Endpoint::redacted)
            .collect()
    }

    /// Create an endpoint record. When both the new endpoint and the
    /// service are enabled, its connection starts immediately.
    pub async fn create_endpoint(&self, draft: EndpointDraft) -> ToolGateResult<Endpoint> {
        if draft.web_socket_url.trim().is_empty() {
            return Err(ToolGateError::Config(
                "webSocketUrl is required".to_string(),
            ));
        }

        let endpoint = Endpoint::from_draft(draft);
        let snapshot = {
            let mut config = self.config.write().await;
            config.endpoints.push(endpoint.clone());
            config.clone()
        };
        self.store.save(&snapshot).await?;
        info!(endpoint = %endpoint.name, id = %endpoint.id, "Endpoint created");

        if endpoint.enabled && snapshot.enabled {
            self.start_connection(&endpoint).await;
        }
        Ok(endpoint)
    }

    /// Merge a patch into an endpoint record. Returns `None` for an unknown
    /// id. When the patch touches the URL or the enabled flag, the live
    /// connection is torn down and, if the merged record is enabled,
    /// restarted fresh; configuration is never hot-patched into a live
    /// socket.
    pub async fn update_endpoint(
        &self,
        id: &str,
        mut patch: EndpointPatch,
    ) -> ToolGateResult<Option<Endpoint>> {
        // A redacted URL round-tripped from a status read means "unchanged".
        if patch
            .web_socket_url
            .as_deref()
            .is_some_and(|u| u.contains(REDACTED_TOKEN))
        {
            patch.web_socket_url = None;
        }
        let bounce = patch.touches_connection();

        let (updated, service_enabled, snapshot) = {
            let mut config = self.config.write().await;
            let service_enabled = config.enabled;
            let Some(endpoint) = config.endpoints.iter_mut().find(|e| e.id == id) else {
                return Ok(None);
            };
            let merged = endpoint.apply(&patch);
            if merged.enabled && merged.web_socket_url.trim().is_empty() {
                return Err(ToolGateError::Config(
                    "cannot enable an endpoint without a webSocketUrl".to_string(),
                ));
            }
            *endpoint = merged.clone();
            (merged, service_enabled, config.clone())
        };
        self.store.save(&snapshot).await?;

        if bounce {
            self.stop_connection(id).await;
            if updated.enabled && service_enabled {
                self.start_connection(&updated).await;
            }
        }
        Ok(Some(updated))
    }

    /// Tear down any live connection and remove the record. Returns false
    /// for an unknown id.
    pub async fn delete_endpoint(&self, id: &str) -> ToolGateResult<bool> {
        if self.config.read().await.endpoint(id).is_none() {
            return Ok(false);
        }

        self.stop_connection(id).await;
        let snapshot = {
            let mut config = self.config.write().await;
            config.endpoints.retain(|e| e.id != id);
            config.clone()
        };
        self.store.save(&snapshot).await?;
        info!(endpoint = %id, "Endpoint deleted");
        Ok(true)
    }

    /// Unconditional stop+start cycle, regardless of failure history. The
    /// fresh supervisor starts with a zeroed attempt counter; this is the
    /// external trigger that resets backoff state.
    pub async fn reconnect_endpoint(&self, id: &str) -> ToolGateResult<bool> {
        let (endpoint, service_enabled) = {
            let config = self.config.read().await;
            match config.endpoint(id) {
                Some(endpoint) => (endpoint.clone(), config.enabled),
                None => return Ok(false),
            }
        };

        self.stop_connection(id).await;
        if endpoint.enabled && service_enabled {
            self.start_connection(&endpoint).await;
        }
        Ok(true)
    }

    /// Re-read configuration from the store. When the global enabled flag
    /// changed, every connection is torn down and, if now enabled, the
    /// endpoints are reinitialized. Per-endpoint changes are expected to
    /// arrive through [`update_endpoint`](Self::update_endpoint) instead.
    pub async fn reload_config(&self) -> ToolGateResult<()> {
        let fresh = self.store.load().await?;
        let (was_enabled, now_enabled) = {
            let mut config = self.config.write().await;
            let was = config.enabled;
            let now = fresh.enabled;
            *config = fresh;
            (was, now)
        };

        if was_enabled != now_enabled {
            info!(enabled = now_enabled, "Bridge service flag changed, reinitializing");
            self.disconnect_all().await;
            if now_enabled {
                self.initialize_endpoints().await;
            }
        }
        Ok(())
    }

    /// Set the global service flag. Disabling tears down every connection
    /// even if individual endpoints remain enabled.
    pub async fn set_enabled(&self, enabled: bool) -> ToolGateResult<()> {
        let snapshot = {
            let mut config = self.config.write().await;
            config.enabled = enabled;
            config.clone()
        };
        self.store.save(&snapshot).await?;

        if enabled {
            self.initialize_endpoints().await;
        } else {
            self.disconnect_all().await;
        }
        Ok(())
    }

    /// Connectivity report for one endpoint, or `None` for an unknown id.
    /// Pure read; no side effects.
    pub async fn endpoint_status(&self, id: &str) -> Option<BridgeStatus> {
        let endpoint = self.config.read().await.endpoint(id)?.clone();
        let connections = self.connections.read().await;
        Some(BridgeStatus {
            connected: connections.get(id).is_some_and(ConnectionHandle::is_open),
            connection_count: connections.len(),
            last_connected: endpoint.last_connected,
            endpoint: endpoint.redacted(),
        })
    }

    /// Connectivity reports for every endpoint.
    pub async fn all_statuses(&self) -> Vec<BridgeStatus> {
        let endpoints: Vec<Endpoint> = self.config.read().await.endpoints.clone();
        let connections = self.connections.read().await;
        endpoints
            .into_iter()
            .map(|endpoint| BridgeStatus {
                connected: connections
                    .get(&endpoint.id)
                    .is_some_and(ConnectionHandle::is_open),
                connection_count: connections.len(),
                last_connected: endpoint.last_connected,
                endpoint: endpoint.redacted(),
            })
            .collect()
    }

    /// Tear down every live connection.
    pub async fn disconnect_all(&self) {
        let ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        for id in ids {
            self.stop_connection(&id).await;
        }
    }

    /// Broadcast a `tools/list_changed` notification to every endpoint
    /// whose connection is currently open. Endpoints with no live
    /// connection miss the notification; nothing is queued or replayed.
    pub async fn notify_tools_changed(&self) {
        let frame = notification_frame(TOOLS_CHANGED_METHOD);
        let connections = self.connections.read().await;
        let mut notified = 0usize;
        for handle in connections.values() {
            if handle.is_open() && handle.outbound.send(frame.clone()).is_ok() {
                notified += 1;
            }
        }
        info!(notified, "Broadcast tools/list_changed");
    }

    async fn start_connection(&self, endpoint: &Endpoint) {
        // Exactly zero or one live supervisor per endpoint id.
        self.stop_connection(&endpoint.id).await;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let handle = supervisor::spawn(self.context(), endpoint.clone(), generation);
        self.connections
            .write()
            .await
            .insert(endpoint.id.clone(), handle);
    }

    /// Idempotent: stopping an already-stopped endpoint is a no-op.
    async fn stop_connection(&self, id: &str) {
        let handle = self.connections.write().await.remove(id);
        if let Some(handle) = handle {
            // Aborting the task also cancels any pending backoff timer.
            handle.shutdown();
            supervisor::persist_status(&self.context(), id, EndpointStatus::Disconnected, false)
                .await;
            info!(endpoint = %id, "Endpoint disconnected");
        }
    }

    fn context(&self) -> SupervisorContext {
        SupervisorContext {
            store: self.store.clone(),
            catalog: self.catalog.clone(),
            config: self.config.clone(),
            connections: self.connections.clone(),
        }
    }
}
