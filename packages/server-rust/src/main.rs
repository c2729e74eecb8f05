//! Reference server exposing the `/books` chains.

use clap::Parser;
use handle_chain_server::app::{build_app, AppState};
use handle_chain_server::network::{NetworkConfig, ServerArgs};
use handle_chain_server::telemetry::{init_tracing, install_metrics};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NetworkConfig::from(ServerArgs::parse());
    init_tracing(config.log_format);

    let mut state = AppState::new(&config);
    if config.metrics_enabled {
        state = state.with_metrics(install_metrics()?);
    }
    if config.api_tokens.is_empty() {
        warn!("no API tokens configured; write endpoints will answer 403");
    }

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(addr = %listener.local_addr()?, "listening");

    let shutdown = state.shutdown.clone();
    let app = build_app(state, &config);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, cancelling `token` so in-flight request
/// contexts observe the shutdown.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("shutdown signal received");
    token.cancel();
}
