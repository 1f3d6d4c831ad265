use anyhow::{Context, Result};
use blog_analytics::{start_api_server, AppState};
use blog_pipeline::telemetry::{init_metrics, init_tracing, shutdown_signal};
use blog_pipeline::{Config, DocumentStore, MongoStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting blog analytics service"
    );

    init_metrics(config.service.metrics_port)
        .context("Failed to install Prometheus metrics exporter")?;

    let store: Arc<dyn DocumentStore> = Arc::new(
        MongoStore::connect(&config.mongo)
            .await
            .context("Failed to connect to MongoDB")?,
    );

    let state = AppState {
        store: store.clone(),
        views: config.mongo.views_namespace(),
        service_name: config.service.name.clone(),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let result = start_api_server(state, &config.api, shutdown).await;

    store.close().await;
    info!("Analytics service stopped");

    result
}
