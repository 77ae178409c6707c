//! Per-endpoint connection supervisor.
//!
//! Each started endpoint gets one task that owns its socket: connect with a
//! bounded timeout, serve frames in arrival order, and on failure walk the
//! reconnect policy until it is exhausted or the endpoint stops existing.

use crate::catalog::ToolCatalog;
use crate::dispatcher::Dispatcher;
use crate::policy::{retries_exhausted, retry_delay};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use toolgate_config::{redact_url, ConfigStore, Endpoint, EndpointStatus, ServiceConfig};
use tracing::{debug, info, warn};

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection lifecycle state, driven by discrete events so the transition
/// logic is testable without a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnState {
    Idle,
    Connecting,
    Connected,
}

/// Discrete events observed by the supervisor. Socket errors and abrupt
/// closes take the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnEvent {
    Dial,
    Opened,
    ErrorOccurred,
    Closed,
}

/// Apply an event to a state. The second value is true when the supervisor
/// should take the reconnect path.
pub(crate) fn transition(state: ConnState, event: ConnEvent) -> (ConnState, bool) {
    match (state, event) {
        (ConnState::Idle, ConnEvent::Dial) => (ConnState::Connecting, false),
        (ConnState::Connecting, ConnEvent::Opened) => (ConnState::Connected, false),
        (
            ConnState::Connecting | ConnState::Connected,
            ConnEvent::ErrorOccurred | ConnEvent::Closed,
        ) => (ConnState::Idle, true),
        (state, _) => (state, false),
    }
}

/// Shared pieces the supervisor task needs from the manager.
#[derive(Clone)]
pub(crate) struct SupervisorContext {
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) catalog: Arc<dyn ToolCatalog>,
    pub(crate) config: Arc<RwLock<ServiceConfig>>,
    pub(crate) connections: Arc<RwLock<HashMap<String, ConnectionHandle>>>,
}

/// Runtime handle for one endpoint's connection. Owned by the manager's
/// connection map; destroyed on stop.
pub(crate) struct ConnectionHandle {
    /// Generation captured at spawn time; a stale task whose generation no
    /// longer matches the map entry must not act on the endpoint.
    pub(crate) generation: u64,
    pub(crate) outbound: mpsc::UnboundedSender<String>,
    pub(crate) open: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Abort the task. This also cancels any pending backoff timer.
    pub(crate) fn shutdown(&self) {
        self.task.abort();
    }
}

/// Spawn the supervisor task for an endpoint snapshot.
pub(crate) fn spawn(
    ctx: SupervisorContext,
    endpoint: Endpoint,
    generation: u64,
) -> ConnectionHandle {
    let (outbound, rx) = mpsc::unbounded_channel();
    let open = Arc::new(AtomicBool::new(false));
    let task = tokio::spawn(run(ctx, endpoint, generation, open.clone(), rx));
    ConnectionHandle {
        generation,
        outbound,
        open,
        task,
    }
}

async fn run(
    ctx: SupervisorContext,
    endpoint: Endpoint,
    generation: u64,
    open: Arc<AtomicBool>,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    let dispatcher = Dispatcher::new(ctx.catalog.clone(), ctx.config.clone());
    let mut attempts: u32 = 0;
    let mut state = ConnState::Idle;

    loop {
        // Anything queued while offline is stale; notifications are not
        // replayed to reconnecting peers.
        while rx.try_recv().is_ok() {}

        state = transition(state, ConnEvent::Dial).0;
        persist_status(&ctx, &endpoint.id, EndpointStatus::Connecting, false).await;
        info!(
            endpoint = %endpoint.name,
            url = %redact_url(&endpoint.web_socket_url),
            "Connecting to endpoint"
        );

        let opened = match tokio::time::timeout(
            CONNECT_TIMEOUT,
            connect_async(endpoint.web_socket_url.as_str()),
        )
        .await
        {
            Ok(Ok((stream, _))) => Some(stream),
            Ok(Err(e)) => {
                warn!(endpoint = %endpoint.name, error = %e, "Endpoint connect failed");
                None
            }
            Err(_) => {
                warn!(
                    endpoint = %endpoint.name,
                    timeout_secs = CONNECT_TIMEOUT.as_secs(),
                    "Endpoint connect timed out"
                );
                None
            }
        };

        let retry = match opened {
            Some(stream) => {
                state = transition(state, ConnEvent::Opened).0;
                attempts = 0;
                open.store(true, Ordering::SeqCst);
                persist_status(&ctx, &endpoint.id, EndpointStatus::Connected, true).await;
                info!(endpoint = %endpoint.name, "Endpoint connected");

                let event = read_loop(stream, &dispatcher, &endpoint, &mut rx).await;
                open.store(false, Ordering::SeqCst);
                let (next, retry) = transition(state, event);
                state = next;
                persist_status(&ctx, &endpoint.id, EndpointStatus::Disconnected, false).await;
                retry
            }
            None => {
                let (next, retry) = transition(state, ConnEvent::ErrorOccurred);
                state = next;
                persist_status(&ctx, &endpoint.id, EndpointStatus::Disconnected, false).await;
                retry
            }
        };

        if !retry {
            break;
        }
        if retries_exhausted(&endpoint.reconnect, attempts) {
            info!(
                endpoint = %endpoint.name,
                attempts,
                "Reconnect attempts exhausted, giving up"
            );
            break;
        }

        let delay = retry_delay(&endpoint.reconnect, attempts);
        attempts += 1;
        debug!(
            endpoint = %endpoint.name,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
        tokio::time::sleep(delay).await;

        // Re-validate at fire time: a stale timer must never resurrect a
        // connection for configuration that no longer applies.
        if !generation_current(&ctx, &endpoint.id, generation).await {
            return;
        }
        if !config_wants(&ctx, &endpoint.id).await {
            debug!(
                endpoint = %endpoint.name,
                "Endpoint disabled or removed, abandoning reconnect"
            );
            break;
        }
    }

    remove_self(&ctx, &endpoint.id, generation).await;
}

/// Serve one open socket until it errors or closes. Inbound frames are
/// handled one at a time in arrival order.
async fn read_loop(
    stream: WsStream,
    dispatcher: &Dispatcher,
    endpoint: &Endpoint,
    rx: &mut mpsc::UnboundedReceiver<String>,
) -> ConnEvent {
    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            inbound = read.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = dispatcher.handle_frame(endpoint, &text).await {
                        if let Err(e) = write.send(Message::Text(reply)).await {
                            warn!(endpoint = %endpoint.name, error = %e, "Endpoint write failed");
                            return ConnEvent::ErrorOccurred;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    info!(endpoint = %endpoint.name, "Endpoint closed by remote");
                    return ConnEvent::Closed;
                }
                Some(Ok(_)) => {} // Ignore ping/pong/binary
                Some(Err(e)) => {
                    warn!(endpoint = %endpoint.name, error = %e, "Endpoint read error");
                    return ConnEvent::ErrorOccurred;
                }
                None => return ConnEvent::Closed,
            },
            outbound = rx.recv() => match outbound {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text)).await {
                        warn!(endpoint = %endpoint.name, error = %e, "Endpoint write failed");
                        return ConnEvent::ErrorOccurred;
                    }
                }
                None => return ConnEvent::Closed,
            },
        }
    }
}

/// Record a status transition in the registry and persist it through the
/// store. Store failures are logged, not fatal: connectivity beats
/// bookkeeping.
pub(crate) async fn persist_status(
    ctx: &SupervisorContext,
    endpoint_id: &str,
    status: EndpointStatus,
    record_connected: bool,
) {
    let snapshot = {
        let mut config = ctx.config.write().await;
        let Some(endpoint) = config.endpoints.iter_mut().find(|e| e.id == endpoint_id) else {
            return;
        };
        endpoint.status = status;
        if record_connected {
            endpoint.last_connected = Some(Utc::now());
        }
        config.clone()
    };

    if let Err(e) = ctx.store.save(&snapshot).await {
        warn!(endpoint = %endpoint_id, error = %e, "Failed to persist endpoint status");
    }
}

async fn generation_current(ctx: &SupervisorContext, endpoint_id: &str, generation: u64) -> bool {
    matches!(
        ctx.connections.read().await.get(endpoint_id),
        Some(handle) if handle.generation == generation
    )
}

async fn config_wants(ctx: &SupervisorContext, endpoint_id: &str) -> bool {
    let config = ctx.config.read().await;
    config.enabled
        && config
            .endpoints
            .iter()
            .any(|e| e.id == endpoint_id && e.enabled)
}

async fn remove_self(ctx: &SupervisorContext, endpoint_id: &str, generation: u64) {
    let mut connections = ctx.connections.write().await;
    if matches!(
        connections.get(endpoint_id),
        Some(handle) if handle.generation == generation
    ) {
        connections.remove(endpoint_id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let (state, retry) = transition(ConnState::Idle, ConnEvent::Dial);
        assert_eq!(state, ConnState::Connecting);
        assert!(!retry);

        let (state, retry) = transition(state, ConnEvent::Opened);
        assert_eq!(state, ConnState::Connected);
        assert!(!retry);
    }

    #[test]
    fn test_failure_during_connect_retries() {
        for event in [ConnEvent::ErrorOccurred, ConnEvent::Closed] {
            let (state, retry) = transition(ConnState::Connecting, event);
            assert_eq!(state, ConnState::Idle);
            assert!(retry);
        }
    }

    #[test]
    fn test_failure_while_connected_retries() {
        for event in [ConnEvent::ErrorOccurred, ConnEvent::Closed] {
            let (state, retry) = transition(ConnState::Connected, event);
            assert_eq!(state, ConnState::Idle);
            assert!(retry);
        }
    }

    #[test]
    fn test_irrelevant_events_are_noops() {
        let (state, retry) = transition(ConnState::Idle, ConnEvent::Closed);
        assert_eq!(state, ConnState::Idle);
        assert!(!retry);

        let (state, retry) = transition(ConnState::Connected, ConnEvent::Opened);
        assert_eq!(state, ConnState::Connected);
        assert!(!retry);

        let (state, retry) = transition(ConnState::Connected, ConnEvent::Dial);
        assert_eq!(state, ConnState::Connected);
        assert!(!retry);
    }
}
