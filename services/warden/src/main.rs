//! Warden access-control service entry point.
//!
//! # Purpose
//! Loads configuration, initializes observability, builds the application
//! state and serves the HTTP API and the metrics endpoint until shutdown.
use std::future::Future;
use warden::app::{build_router, build_state};
use warden::config::WardenConfig;
use warden::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WardenConfig::from_env_or_yaml()?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: WardenConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("warden", &config.log);
    let state = build_state(&config).await?;
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state);
    let addr = config.bind_addr;
    tracing::info!(%addr, api_route = %config.access_control.api_route, "warden listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    Ok(())
}
