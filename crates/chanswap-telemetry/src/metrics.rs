//! Prometheus recorder and metric name constants.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::TelemetryError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint.
pub fn install_recorder() -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::Recorder(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Votes accepted (counter).
pub const VOTES_CAST_TOTAL: &str = "votes_cast_total";
/// Votes refused (counter, labels: reason).
pub const VOTES_REJECTED_TOTAL: &str = "votes_rejected_total";
/// Quorum-triggered or cascade selections of a new active item (counter, labels: cause).
pub const CHANNEL_SWITCHES_TOTAL: &str = "channel_switches_total";
/// Sessions currently present (gauge).
pub const SESSIONS_PRESENT: &str = "sessions_present";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Messages dropped because a client queue was full (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Failed catalog saves (counter).
pub const PERSIST_FAILURES_TOTAL: &str = "persist_failures_total";
