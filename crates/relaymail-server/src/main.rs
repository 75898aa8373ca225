//! Relaymail - transactional email pipeline entry point

use anyhow::Result;
use relaymail_api::AppState;
use relaymail_common::config::{Config, LoggingConfig};
use relaymail_core::{
    BatchAccountant, BatchPipeline, DeliveryStatusReconciler, DispatchWorker, Dispatcher,
    EmailProvider, HttpProvider, LinkTracker, WebhookNotifier,
};
use relaymail_storage::repository::{
    BatchRepository, EmailRepository, JobRepository, SuppressionRepository, TemplateRepository,
    WebhookLogRepository, WebhookSubscriptionRepository,
};
use relaymail_storage::DatabasePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Worker poll interval
const WORKER_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Relaymail...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;

    // Run migrations
    db_pool.migrate().await?;

    let pool = db_pool.pool().clone();
    let emails = EmailRepository::new(pool.clone());
    let batches = BatchRepository::new(pool.clone());
    let suppressions = SuppressionRepository::new(pool.clone());
    let templates = TemplateRepository::new(pool.clone());
    let jobs = JobRepository::new(pool.clone());
    let subscriptions = WebhookSubscriptionRepository::new(pool.clone());
    let delivery_logs = WebhookLogRepository::new(pool);

    // Webhook notifier and delivery-status reconciler shared by the API
    // handlers and the dispatch paths
    let notifier = WebhookNotifier::new(
        subscriptions,
        delivery_logs,
        config.webhooks.timeout_secs,
    );
    let reconciler = Arc::new(DeliveryStatusReconciler::new(
        emails.clone(),
        batches.clone(),
        suppressions.clone(),
        notifier.clone(),
    ));

    let provider: Arc<dyn EmailProvider> = Arc::new(HttpProvider::new(&config.provider));
    let dispatcher = Dispatcher::new(
        provider,
        reconciler.clone(),
        jobs.clone(),
        config.sending.clone(),
        &config.webhooks,
        config.provider.from_address.clone(),
        config.server.public_url.clone(),
    );

    let pipeline = BatchPipeline::new(
        emails.clone(),
        templates,
        suppressions,
        BatchAccountant::new(batches),
        LinkTracker::new(&config.tracking),
        dispatcher.clone(),
        config.sending.daily_limit,
        config.sending.max_batch_size,
        config.sending.synchronous,
    );

    // Start the background dispatch worker unless deliveries run inline
    let worker_handle = if config.sending.synchronous {
        info!("Synchronous dispatch enabled, queue worker not started");
        None
    } else {
        let worker = DispatchWorker::new(
            dispatcher,
            reconciler.clone(),
            jobs,
            emails,
            WORKER_POLL_INTERVAL,
        );
        Some(tokio::spawn(worker.run()))
    };

    // Start API server
    let bind = format!("{}:{}", config.server.bind_address, config.server.port);
    let state = Arc::new(AppState {
        db_pool,
        config,
        pipeline,
        reconciler,
        notifier,
    });

    let app = relaymail_api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("API server listening on {}", bind);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    info!("Relaymail started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    api_handle.abort();
    if let Some(handle) = worker_handle {
        handle.abort();
    }

    info!("Relaymail shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},relaymail=debug", config.level)));

    if config.format == "json" {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true).with_level(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_level(true))
            .with(filter)
            .init();
    }
}
