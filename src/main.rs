use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chanswap_engine::{Coordinator, CoordinatorOptions};
use chanswap_settings::{Settings, StoreBackend};
use chanswap_store::{CatalogStore, Database, JsonFileStore, SqliteItemStore};
use chanswap_telemetry::TelemetryConfig;
use clap::Parser;
use tokio::sync::watch;

/// Live channel-switch voting server.
#[derive(Debug, Parser)]
#[command(name = "chanswap", version, about)]
struct Cli {
    /// Settings file (defaults to ~/.chanswap/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    host: Option<String>,
    /// Catalog file or database path.
    #[arg(long)]
    store: Option<String>,
    /// Catalog backend: json or sqlite.
    #[arg(long)]
    backend: Option<StoreBackend>,
    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(path) = &self.store {
            settings.store.path = path.clone();
        }
        if let Some(backend) = self.backend {
            settings.store.backend = backend;
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn CatalogStore>> {
    let path = PathBuf::from(&settings.store.path);
    let store: Arc<dyn CatalogStore> = match settings.store.backend {
        StoreBackend::Json => Arc::new(JsonFileStore::new(path)),
        StoreBackend::Sqlite => {
            let db = Database::open(&path)
                .with_context(|| format!("failed to open database {}", path.display()))?;
            Arc::new(SqliteItemStore::new(db))
        }
    };
    Ok(store)
}

fn server_config(settings: &Settings) -> chanswap_server::ServerConfig {
    let server = &settings.server;
    chanswap_server::ServerConfig {
        host: server.host.clone(),
        port: server.port,
        max_send_queue: server.max_send_queue,
        heartbeat_interval: Duration::from_secs(server.heartbeat_interval_secs.max(1)),
        client_timeout: Duration::from_secs(server.client_timeout_secs),
        cleanup_interval: Duration::from_secs(server.cleanup_interval_secs.max(1)),
        allowed_origins: server.allowed_origins.clone(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => chanswap_settings::load_settings_from_path(path),
        None => chanswap_settings::load_settings(),
    }
    .context("failed to load settings")?;
    cli.apply(&mut settings);

    let log_level = settings.logging.level.parse().unwrap_or(tracing::Level::INFO);
    let telemetry = chanswap_telemetry::init_telemetry(&TelemetryConfig {
        log_level,
        json: settings.logging.json,
        ..Default::default()
    })?;

    tracing::info!(
        backend = ?settings.store.backend,
        path = %settings.store.path,
        "starting chanswap"
    );

    let store = open_store(&settings)?;
    let load_store = Arc::clone(&store);
    let items = tokio::task::spawn_blocking(move || chanswap_store::load_catalog(load_store.as_ref()))
        .await
        .context("catalog load task failed")?;
    tracing::info!(count = items.len(), "catalog loaded");

    let (persist_tx, persist_rx) = watch::channel(items.clone());
    let writer = chanswap_store::spawn_writer(store, persist_rx);

    let coordinator = Arc::new(
        Coordinator::new(
            items,
            CoordinatorOptions {
                event_buffer: settings.server.event_buffer_size,
            },
        )
        .with_persistence(persist_tx),
    );

    let handle = chanswap_server::start(
        server_config(&settings),
        Arc::clone(&coordinator),
        telemetry.prometheus().cloned(),
    )
    .await
    .context("failed to start server")?;

    tracing::info!(port = handle.port, "chanswap ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;

    // Socket tasks may still hold the coordinator; closing the sender is what
    // lets the writer flush the newest snapshot and exit.
    coordinator.close_persistence();
    if tokio::time::timeout(Duration::from_secs(5), writer).await.is_err() {
        tracing::warn!("catalog writer did not finish in time");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_settings() {
        let cli = Cli::parse_from([
            "chanswap",
            "--port",
            "6000",
            "--host",
            "127.0.0.1",
            "--store",
            "shows.db",
            "--backend",
            "sqlite",
            "--json-logs",
        ]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);

        assert_eq!(settings.server.port, 6000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.store.path, "shows.db");
        assert_eq!(settings.store.backend, StoreBackend::Sqlite);
        assert!(settings.logging.json);
    }

    #[test]
    fn absent_flags_keep_settings() {
        let cli = Cli::parse_from(["chanswap"]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 5000);
        assert_eq!(settings.store.backend, StoreBackend::Json);
    }

    #[test]
    fn server_config_mirrors_settings() {
        let mut settings = Settings::default();
        settings.server.heartbeat_interval_secs = 5;
        settings.server.allowed_origins = vec!["http://tv.local".into()];
        let config = server_config(&settings);
        assert_eq!(config.port, 5000);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(config.allowed_origins, vec!["http://tv.local".to_string()]);
    }

    #[test]
    fn zero_intervals_are_floored() {
        let mut settings = Settings::default();
        settings.server.heartbeat_interval_secs = 0;
        settings.server.cleanup_interval_secs = 0;
        let config = server_config(&settings);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.cleanup_interval, Duration::from_secs(1));
    }
}
