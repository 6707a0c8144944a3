//! mu control plane HTTP server entry point, following
//! `openibank-api-server`'s CLI parsing -> logging init -> state wiring
//! -> graceful-shutdown `axum::serve` shape.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mu_server::config::Args;
use mu_server::routes;
use mu_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::load();
    init_logging(&args.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting mu control plane server");

    let now_ms = mu_types::now_ms();
    let app_state = AppState::bootstrap(args, now_ms)?;

    let writer_lock = app_state.acquire_writer_lock(now_ms)?;

    let server_info = mu_store::ServerInfo::new(app_state.args.port, now_ms, app_state.reload.active_generation().generation_id);
    server_info.write(&app_state.paths.server_json)?;

    let state = Arc::new(app_state);

    let outbox_worker = state.build_outbox_worker();
    let outbox_poll_ms = state.args.outbox_poll_ms;
    let outbox_handle = tokio::spawn(async move {
        outbox_worker.run_forever(Duration::from_millis(outbox_poll_ms), mu_types::now_ms).await;
    });

    let confirmation_state = state.clone();
    let confirmation_sweep_ms = state.args.confirmation_sweep_ms;
    let confirmation_handle = tokio::spawn(async move {
        confirmation_sweeper(confirmation_state, Duration::from_millis(confirmation_sweep_ms)).await;
    });

    let app = routes::routes().with_state(state.clone());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], state.args.port));
    tracing::info!(port = state.args.port, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Duration::from_secs(5)))
        .await?;

    outbox_handle.abort();
    confirmation_handle.abort();

    mu_store::ServerInfo::remove(&state.paths.server_json)?;
    drop(writer_lock);

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Periodically expires overdue `awaiting_confirmation` commands
/// (spec.md §4.5 step 5, SUPPLEMENTED FEATURES §11).
async fn confirmation_sweeper(state: Arc<AppState>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let now_ms = mu_types::now_ms();
        let active = state.commands.list_active();
        for command in mu_pipeline::confirmation::overdue_confirmations(&active, now_ms) {
            if let Err(e) = state.pipeline.expire(&command.command_id, now_ms) {
                tracing::error!(command_id = %command.command_id, error = %e, "failed to expire overdue confirmation");
            } else {
                tracing::info!(command_id = %command.command_id, "confirmation expired");
            }
        }
    }
}

fn init_logging(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

async fn shutdown_signal(timeout: Duration) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, initiating graceful shutdown"),
    }

    tracing::info!(timeout_secs = timeout.as_secs(), "waiting for in-flight requests to complete");
    tokio::time::sleep(timeout).await;
}
