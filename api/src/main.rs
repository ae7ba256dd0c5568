use anyhow::Context;
use ragraph_api::{make_router, shutdown_signal, AppState, Dispatcher};
use ragraph_core::config::AppConfig;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    ragraph_core::init_tracing(&config.log);

    let dispatcher = Dispatcher::from_config(&config).context("failed to build services")?;
    let state = AppState::new(dispatcher);
    let shutdown = state.shutdown.clone();
    let router = make_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    info!("server stopped");
    Ok(())
}
