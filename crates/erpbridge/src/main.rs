use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use erpbridge::config::AppConfig;
use erpbridge::relay::Relay;
use erpbridge::server::create_router;
use erpbridge::types::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("erpbridge=info".parse()?))
        .init();

    let config = AppConfig::from_env()?;
    info!(
        port = config.port,
        upstream = %config.relay.upstream,
        mount = %config.relay.mount,
        cross_site_cookies = config.relay.cross_site_cookies,
        "Starting ERP relay"
    );

    let relay = Relay::new(config.relay.clone())?;
    let state = Arc::new(AppState::new(relay, config.weights.clone()));
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
