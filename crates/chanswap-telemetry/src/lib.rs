mod logging;
pub mod metrics;

pub use logging::{filter_directive, init_logging, TelemetryConfig};

/// Errors raised while installing telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("tracing subscriber already installed: {0}")]
    SubscriberInstalled(String),
    #[error("metrics recorder: {0}")]
    Recorder(String),
}

/// Guard returned by [`init_telemetry`]. Holds the Prometheus handle, if any.
pub struct TelemetryGuard {
    prometheus: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl TelemetryGuard {
    pub fn prometheus(&self) -> Option<&metrics_exporter_prometheus::PrometheusHandle> {
        self.prometheus.as_ref()
    }
}

/// Initialize logging and, if enabled, the global metrics recorder. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    init_logging(config)?;

    let prometheus = if config.metrics_enabled {
        match metrics::install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "failed to install metrics recorder");
                None
            }
        }
    } else {
        None
    };

    Ok(TelemetryGuard { prometheus })
}
