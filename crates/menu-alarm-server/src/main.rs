mod routes;
mod config;
mod extract;
mod notify;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

    let config = config::read().await?;

    let state = routes::AppState::new(&config);
    let app = routes::make_router(state.clone());

    let addr = (config.server.address, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!("starting server on http://{addr}");
    for path in [
        "/api/cron/start",
        "/api/cron/stop",
        "/api/menu/weekly-menu",
        "/api/menu/send-menu-to-slack",
        "/api/menu/send-markdown-menu-to-slack",
        "/server-kill?key=",
    ] {
        tracing::info!("endpoint: {}", config.server.endpoint(path));
    }

    let kill = state.clone();
    axum::serve::serve(listener, app).with_graceful_shutdown(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("received ctrl-c"),
            _ = kill.kill_requested() => tracing::info!("received kill request"),
        }
    }).await?;

    state.shutdown().await;
    tracing::info!("server stopped");

    Ok(())
}
