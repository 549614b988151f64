//! Listener setup and graceful shutdown.

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::{router, AppState};

/// Resolve when the process is asked to stop (Ctrl-C, or SIGTERM on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown requested");
}

/// Bind the configured address and serve until shutdown.
///
/// All links and histories live in memory and are dropped when this returns.
///
/// # Errors
///
/// Returns an error if the address is invalid, cannot be bound, or the server
/// fails while running.
pub async fn serve(config: Config) -> Result<()> {
    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
        addr: addr.to_string(),
        source,
    })?;

    info!("Listening on {addr}");
    info!("Viewer URL: {}", config.urls.viewer_url);
    match &config.urls.backend_url {
        Some(backend) => info!("Backend URL: {backend}"),
        None => info!("Backend URL: derived from each request"),
    }

    axum::serve(listener, router(AppState::new(config)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
