use anyhow::{Context, Result};
use s3_bucket_exporter::{
    start_metrics_server, BucketCollector, CollectionScheduler, Config, DiscoveryResolver,
    MetricsPublisher, ResolverMode, S3Connector, StaticListResolver, StorageConnector,
    TargetResolver,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Only a busy exposition port is fatal; an invalid setting keeps its default
    let (config, problems) = Config::load();

    init_tracing(&config.service.log_level);

    for problem in &problems {
        warn!(error = %problem, "Invalid configuration, using default");
    }

    info!(
        service = %config.service.name,
        mode = ?config.mode,
        "Starting S3 bucket exporter"
    );

    let publisher = MetricsPublisher::install().context("Failed to install metrics recorder")?;

    start_metrics_server(publisher.handle(), config.service.metrics_port)
        .await
        .context("Failed to start metrics server")?;

    info!(port = config.service.metrics_port, "S3 exporter started");

    let connector: Arc<dyn StorageConnector> = Arc::new(S3Connector::new());

    let resolver: Arc<dyn TargetResolver> = match config.mode {
        ResolverMode::Static => {
            info!(path = %config.buckets_file, "Using static bucket list");
            Arc::new(StaticListResolver::new(&config.buckets_file))
        }
        ResolverMode::Discovery => {
            info!("Discovering buckets with shared credentials");
            Arc::new(DiscoveryResolver::from_env(connector.clone()))
        }
    };

    let scheduler = Arc::new(CollectionScheduler::new(
        resolver,
        BucketCollector::new(connector, config.target_timeout()),
        publisher,
        config.collection_interval(),
    ));

    let collection_handle = tokio::spawn(scheduler.run());

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down S3 exporter");

    collection_handle.abort();

    info!("S3 exporter stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
