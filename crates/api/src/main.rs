use std::sync::Arc;

use anyhow::Context;

use batchflow_api::app::{build_app, build_services};
use batchflow_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    batchflow_observability::init();

    let config = AppConfig::from_env();
    let services = Arc::new(build_services(&config)?);

    // Nothing else is running yet, so pending jobs can be re-dispatched safely.
    services
        .supervisor
        .recover()
        .await
        .context("failed to recover pending jobs")?;
    let _sweeper = services
        .supervisor
        .spawn_stall_sweeper(config.supervisor.stall_timeout);

    let app = build_app(services, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
