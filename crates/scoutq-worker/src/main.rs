use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use scoutq_worker::{HttpProcessor, PlatformScheduler, SchedulerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = scoutq_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(env = %config.env, "worker: starting");

    let store = scoutq_store::open_store(&config)?;
    let processor_url = config
        .processor_url
        .as_deref()
        .context("SCOUTQ_PROCESSOR_URL must be set to run the worker")?;
    let processor = HttpProcessor::new(
        processor_url,
        Duration::from_secs(config.processor_timeout_secs),
    )?;

    let mut scheduler = PlatformScheduler::new(
        store,
        Arc::new(processor),
        SchedulerConfig::from_app_config(&config),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    let stats = scheduler.run_forever(cancel).await;
    tracing::info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        "worker: shut down cleanly"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, finishing in-flight task");
}
