use anyhow::Context;
use courier_relay::config::Config;
use courier_relay::{create_router, AppState};
use courier_shared::logger::{init_logger, sanitize_for_log};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env().context("failed to load configuration")?;
    init_logger(config.log_format);

    tracing::info!(
        port = config.port,
        webhook_secret = %config.webhook_secret.as_deref().map(sanitize_for_log).unwrap_or_else(|| "none".to_string()),
        sim_total_secs = config.sim_total.as_secs(),
        sim_tick_ms = config.sim_tick.as_millis() as u64,
        subscriber_buffer = config.subscriber_buffer,
        "Configuration loaded"
    );

    let state = AppState::new(config.clone());
    let app = create_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Starting courier relay on {}", addr);

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_state.shutdown();
        })
        .await?;

    tracing::info!("Courier relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
