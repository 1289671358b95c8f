//! RPC method handlers.

use std::sync::Arc;

use chanswap_core::{ConnectionId, CoordinatorError, ItemId, NewItem};
use chanswap_engine::Coordinator;
use serde_json::json;

use crate::client::ClientRegistry;
use crate::rpc::{self, RpcResponse};

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub coordinator: Arc<Coordinator>,
    pub clients: Arc<ClientRegistry>,
}

impl HandlerState {
    pub fn new(coordinator: Arc<Coordinator>, clients: Arc<ClientRegistry>) -> Self {
        Self {
            coordinator,
            clients,
        }
    }
}

/// Dispatch an RPC method on behalf of `connection_id`.
///
/// Each method also answers to its legacy camelCase name.
pub fn dispatch(
    state: &HandlerState,
    connection_id: &ConnectionId,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    match method {
        "vote" | "Vote" => vote(state, connection_id, id),
        "stats.get" | "getCurrentStats" => stats_get(state, id),

        "items.add" | "addItem" => items_add(state, params, id),
        "items.remove" | "removeItem" => items_remove(state, params, id),
        "items.list" | "getAllItems" => items_list(state, id),
        "items.current" | "getCurrentItem" => items_current(state, id),

        "system.ping" | "health" => health(state, id),

        _ => {
            tracing::debug!(method, "unknown method");
            RpcResponse::method_not_found(id, method)
        }
    }
}

fn failure(id: Option<serde_json::Value>, err: CoordinatorError) -> RpcResponse {
    if err.is_internal() {
        tracing::error!(error = %err, kind = err.error_kind(), "coordinator invariant violated");
    }
    RpcResponse::from_coordinator_error(id, &err)
}

fn vote(
    state: &HandlerState,
    connection_id: &ConnectionId,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    match state.coordinator.vote(connection_id) {
        Ok(outcome) => RpcResponse::success(
            id,
            json!({
                "votes": outcome.stats.votes,
                "visitors": outcome.stats.visitors,
                "switched": outcome.triggered,
                "item": outcome.active,
            }),
        ),
        Err(e) => failure(id, e),
    }
}

fn stats_get(state: &HandlerState, id: Option<serde_json::Value>) -> RpcResponse {
    RpcResponse::success(id, json!(state.coordinator.stats()))
}

fn items_add(
    state: &HandlerState,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let name = match rpc::require_str(params, "name") {
        Ok(n) => n,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let mut new = NewItem::new(name);
    if let Some(description) = rpc::optional_str(params, "description") {
        new = new.with_description(description);
    }

    match state.coordinator.add_item(new) {
        Ok(item) => RpcResponse::success(id, json!(item)),
        Err(e) => failure(id, e),
    }
}

fn items_remove(
    state: &HandlerState,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let item_id = match rpc::require_u32(params, "id") {
        Ok(n) => ItemId(n),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };

    match state.coordinator.remove_item(item_id) {
        Ok(item) => RpcResponse::success(id, json!(item)),
        Err(e) => failure(id, e),
    }
}

fn items_list(state: &HandlerState, id: Option<serde_json::Value>) -> RpcResponse {
    RpcResponse::success(id, json!({ "items": state.coordinator.items() }))
}

fn items_current(state: &HandlerState, id: Option<serde_json::Value>) -> RpcResponse {
    RpcResponse::success(id, json!({ "item": state.coordinator.current_item() }))
}

/// Body shared by `system.ping` and `GET /health`.
pub fn health_body(state: &HandlerState) -> serde_json::Value {
    json!({
        "status": "healthy",
        "connections": state.clients.count(),
        "items": state.coordinator.items().len(),
    })
}

fn health(state: &HandlerState, id: Option<serde_json::Value>) -> RpcResponse {
    RpcResponse::success(id, health_body(state))
}
