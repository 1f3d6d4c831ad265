use anyhow::{Context, Result};
use blog_db_worker::{PostWorker, WorkerSettings};
use blog_pipeline::telemetry::{init_metrics, init_tracing, shutdown_signal};
use blog_pipeline::{BlockingQueue, Config, DocumentStore, MongoStore, RedisQueue};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service);

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting blog DB worker"
    );

    init_metrics(config.service.metrics_port)
        .context("Failed to install Prometheus metrics exporter")?;

    // Connect to backends; either being unreachable aborts startup
    let store: Arc<dyn DocumentStore> = Arc::new(
        MongoStore::connect(&config.mongo)
            .await
            .context("Failed to connect to MongoDB")?,
    );

    let queue: Arc<dyn BlockingQueue> = Arc::new(
        RedisQueue::connect(&config.redis)
            .await
            .context("Failed to connect to Redis")?,
    );

    let settings = WorkerSettings::new(
        config.redis.queue.clone(),
        config.mongo.posts_namespace(),
        &config.worker,
    );
    let worker = PostWorker::new(queue.clone(), store.clone(), settings);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let result = worker.run(shutdown).await;

    queue.close().await;
    store.close().await;

    if let Err(e) = result {
        error!(error = %e, "DB worker stopped on fatal error");
        return Err(e).context("Ingestion loop failed");
    }

    info!("DB worker stopped");

    Ok(())
}
