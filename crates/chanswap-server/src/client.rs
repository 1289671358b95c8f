use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use chanswap_core::ConnectionId;
use chanswap_telemetry::metrics::{
    WS_BROADCAST_DROPS_TOTAL, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(90);
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// A connected WebSocket client.
///
/// The registry holds the only long-lived handle. Dropping it closes `tx`,
/// which ends the socket's writer task.
pub struct Client {
    pub id: ConnectionId,
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    last_seen: AtomicU64,
}

impl Client {
    fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            connected: AtomicBool::new(true),
            last_seen: AtomicU64::new(now_secs()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Note inbound traffic (pong or request) for liveness.
    pub fn record_activity(&self) {
        self.last_seen.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_seen.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected WebSocket clients.
pub struct ClientRegistry {
    clients: DashMap<ConnectionId, Arc<Client>>,
    max_send_queue: usize,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            client_timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    /// `tokio::time::interval` panics on a zero period, so the heartbeat is
    /// floored at one second.
    pub fn with_timeouts(mut self, heartbeat_interval: Duration, client_timeout: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        self.client_timeout = client_timeout;
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Register a new client and return its id plus the receiving end of its
    /// outbound queue.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.clients
            .insert(id.clone(), Arc::new(Client::new(id.clone(), tx)));
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        (id, rx)
    }

    /// Remove a client. Returns `true` only for the call that actually
    /// removed it, so callers can run teardown exactly once.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        match self.clients.remove(id) {
            Some((_, client)) => {
                client.connected.store(false, Ordering::Relaxed);
                counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.clients.contains_key(id)
    }

    pub fn record_activity(&self, id: &ConnectionId) {
        if let Some(client) = self.clients.get(id) {
            client.record_activity();
        }
    }

    /// Queue a message for one client. A full queue drops the message.
    pub fn send_to(&self, id: &ConnectionId, message: String) -> bool {
        // Clone out of the map so no shard lock is held while sending.
        let Some(client) = self.clients.get(id).map(|c| Arc::clone(c.value())) else {
            return false;
        };
        try_deliver(&client, message)
    }

    /// Queue a message for every connected client. Returns how many accepted it.
    pub fn broadcast_all(&self, message: &str) -> usize {
        let clients: Vec<Arc<Client>> = self
            .clients
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        clients
            .iter()
            .filter(|client| client.is_connected())
            .filter(|client| try_deliver(client, message.to_string()))
            .count()
    }

    /// Number of connected clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Remove clients that have been silent past the timeout and return their ids.
    pub fn cleanup_dead_clients(&self) -> Vec<ConnectionId> {
        let dead: Vec<ConnectionId> = self
            .clients
            .iter()
            .filter(|entry| !entry.value().is_alive(self.client_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        dead.into_iter()
            .filter(|id| {
                let removed = self.unregister(id);
                if removed {
                    tracing::info!(connection_id = %id, "cleaned up dead client");
                }
                removed
            })
            .collect()
    }
}

fn try_deliver(client: &Client, message: String) -> bool {
    match client.tx.try_send(message) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
            tracing::warn!(
                connection_id = %client.id,
                msg_len = msg.len(),
                "send queue full, dropping message"
            );
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Pump a WebSocket until either side ends: outbound queue and heartbeat
/// pings on one task, inbound frames forwarded to `on_message` on the other.
///
/// Does not unregister the client; the caller owns teardown.
pub async fn handle_ws_connection(
    socket: WebSocket,
    connection_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<ClientRegistry>,
    on_message: mpsc::Sender<(ConnectionId, String)>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let heartbeat = registry.heartbeat_interval();

    let writer_cid = connection_id.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        ping_interval.tick().await; // first tick is immediate

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(connection_id = %writer_cid, "sent ping");
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let reader_cid = connection_id.clone();
    let reader_registry = Arc::clone(&registry);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    reader_registry.record_activity(&reader_cid);
                    if on_message
                        .send((reader_cid.clone(), text.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                WsMessage::Pong(_) => reader_registry.record_activity(&reader_cid),
                WsMessage::Close(_) => break,
                // axum answers pings itself
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }
    tracing::debug!(connection_id = %connection_id, "socket tasks finished");
}

/// Periodically sweep dead clients, calling `on_removed` once for each.
pub fn start_cleanup_task<F>(
    registry: Arc<ClientRegistry>,
    interval: Duration,
    on_removed: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(&ConnectionId) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_clients();
            for id in &removed {
                on_removed(id);
            }
            if !removed.is_empty() {
                tracing::info!(removed = removed.len(), "dead client cleanup");
            }
        }
    })
}
