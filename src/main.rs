use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use spaces_chat_service::config::Settings;
use spaces_chat_service::server::{create_app, AppState};
use spaces_chat_service::shutdown::GracefulShutdown;
use spaces_chat_service::store::create_chat_store;
use spaces_chat_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    let store = create_chat_store(&settings.database).await?;
    let (state, channels) = AppState::new(settings.clone(), store);
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let workers = state.spawn_workers(channels, &shutdown_tx);

    let shutdown = GracefulShutdown::new(
        state.connection_manager.clone(),
        state.delivery_queue.clone(),
        shutdown_tx.clone(),
    );

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown_signal().await;
            shutdown.execute(reason).await;
        })
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    futures::future::join_all(workers).await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() -> &'static str {
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            "interrupted"
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
            "terminated"
        }
    }
}
