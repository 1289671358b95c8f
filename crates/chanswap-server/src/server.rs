use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chanswap_core::ConnectionId;
use chanswap_engine::Coordinator;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::client::{self, ClientRegistry};
use crate::event_bridge;
use crate::handlers::{self, HandlerState};
use crate::rpc::{RpcRequest, RpcResponse};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
    pub cleanup_interval: Duration,
    /// Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_send_queue: 256,
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
            cleanup_interval: Duration::from_secs(60),
            allowed_origins: Vec::new(),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub client_registry: Arc<ClientRegistry>,
    pub message_tx: mpsc::Sender<(ConnectionId, String)>,
    pub prometheus: Option<PrometheusHandle>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Bind, spawn the background tasks, and start serving. Returns a handle
/// that keeps everything alive until [`ServerHandle::shutdown`].
pub async fn start(
    config: ServerConfig,
    coordinator: Arc<Coordinator>,
    prometheus: Option<PrometheusHandle>,
) -> Result<ServerHandle, std::io::Error> {
    let client_registry = Arc::new(
        ClientRegistry::new(config.max_send_queue)
            .with_timeouts(config.heartbeat_interval, config.client_timeout),
    );

    let bridge_handle =
        event_bridge::create_bridge(Arc::clone(&client_registry), coordinator.subscribe());

    let cleanup_coordinator = Arc::clone(&coordinator);
    let cleanup_handle = client::start_cleanup_task(
        Arc::clone(&client_registry),
        config.cleanup_interval,
        move |id| {
            let _ = cleanup_coordinator.disconnect(id);
        },
    );

    let (msg_tx, msg_rx) = mpsc::channel::<(ConnectionId, String)>(1024);
    let handler_state = Arc::new(HandlerState::new(
        Arc::clone(&coordinator),
        Arc::clone(&client_registry),
    ));

    let app_state = AppState {
        handler_state: Arc::clone(&handler_state),
        client_registry: Arc::clone(&client_registry),
        message_tx: msg_tx,
        prometheus,
    };

    let rpc_handle = tokio::spawn(process_rpc_messages(
        msg_rx,
        Arc::clone(&handler_state),
        Arc::clone(&client_registry),
    ));

    let router = build_router(app_state, &config.allowed_origins);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "chanswap server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        local_addr,
        shutdown_tx: Some(shutdown_tx),
        server: server_handle,
        background: vec![bridge_handle, rpc_handle, cleanup_handle],
    })
}

/// Handle returned by [`start`]; keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    pub local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
    background: Vec<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    /// Stop accepting connections, wait for the listener to close, then stop
    /// the background tasks.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        for task in &self.background {
            task.abort();
        }
        let _ = (&mut self.server).await;
        tracing::info!("chanswap server stopped");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Lifecycle of one socket: register, announce, pump, then tear down once.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let registry = Arc::clone(&state.client_registry);
    let coordinator = Arc::clone(&state.handler_state.coordinator);

    let (connection_id, rx) = registry.register();
    if let Err(e) = coordinator.connect(&connection_id) {
        tracing::error!(connection_id = %connection_id, error = %e, "failed to announce connection");
        registry.unregister(&connection_id);
        return;
    }
    tracing::info!(connection_id = %connection_id, "websocket client connected");

    client::handle_ws_connection(
        socket,
        connection_id.clone(),
        rx,
        Arc::clone(&registry),
        state.message_tx,
    )
    .await;

    // The cleanup task may have removed this client already.
    if registry.unregister(&connection_id) {
        let _ = coordinator.disconnect(&connection_id);
    }
    tracing::info!(connection_id = %connection_id, "websocket client disconnected");
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(handlers::health_body(&state.handler_state))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

/// Process incoming RPC messages from WebSocket clients, one at a time.
async fn process_rpc_messages(
    mut rx: mpsc::Receiver<(ConnectionId, String)>,
    state: Arc<HandlerState>,
    registry: Arc<ClientRegistry>,
) {
    while let Some((connection_id, raw_message)) = rx.recv().await {
        let response = match serde_json::from_str::<RpcRequest>(&raw_message) {
            Ok(request) => {
                let params = request.params.unwrap_or_else(|| serde_json::json!({}));
                tracing::debug!(connection_id = %connection_id, method = %request.method, "rpc");
                handlers::dispatch(&state, &connection_id, &request.method, &params, request.id)
            }
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "unparseable request");
                RpcResponse::parse_error()
            }
        };

        match serde_json::to_string(&response) {
            Ok(json) => {
                registry.send_to(&connection_id, json);
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize response"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanswap_core::{Item, ItemId};
    use chanswap_engine::CoordinatorOptions;

    fn coordinator() -> Arc<Coordinator> {
        Arc::new(Coordinator::new(
            vec![Item {
                id: ItemId(1),
                name: "News".into(),
                description: None,
            }],
            CoordinatorOptions::default(),
        ))
    }

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let handle = start(local_config(), coordinator(), None).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["items"], 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let handle = start(local_config(), coordinator(), None).await.unwrap();
        let url = format!("http://127.0.0.1:{}/metrics", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 404);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn rpc_loop_answers_parse_errors() {
        let coordinator = coordinator();
        let registry = Arc::new(ClientRegistry::new(8));
        let state = Arc::new(HandlerState::new(
            Arc::clone(&coordinator),
            Arc::clone(&registry),
        ));
        let (id, mut client_rx) = registry.register();
        coordinator.connect(&id).unwrap();

        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(process_rpc_messages(rx, state, registry));

        tx.send((id.clone(), "not json".into())).await.unwrap();
        tx.send((id.clone(), r#"{"id":2,"method":"stats.get"}"#.into()))
            .await
            .unwrap();
        drop(tx);
        task.await.unwrap();

        let first: serde_json::Value = serde_json::from_str(&client_rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["error"]["code"], "PARSE_ERROR");
        let second: serde_json::Value = serde_json::from_str(&client_rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["id"], 2);
        assert_eq!(second["result"]["votes"], 0);
    }

    #[test]
    fn build_router_with_origin_list() {
        let registry = Arc::new(ClientRegistry::new(32));
        let (msg_tx, _) = mpsc::channel(32);
        let state = AppState {
            handler_state: Arc::new(HandlerState::new(coordinator(), Arc::clone(&registry))),
            client_registry: registry,
            message_tx: msg_tx,
            prometheus: None,
        };
        let _router = build_router(
            state,
            &["http://localhost:3000".to_string(), "bad\norigin".to_string()],
        );
    }
}
