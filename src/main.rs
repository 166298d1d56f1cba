//! Submission Bot - notification and caching core
//!
//! Starts the process context (caches, push queue, notifier, background
//! tasks) and serves the operations API until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use submission_bot::notify::TelegramBotApi;
use submission_bot::store::MemoryStore;
use submission_bot::{create_router, AppContext, AppState, Config};

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Start the application context and its background tasks
/// 4. Serve the operations API on the configured port
/// 5. On shutdown signal, stop tasks, drain the push queue and flush caches
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "submission_bot=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting submission bot core");

    let config = Config::from_env();
    info!(
        admins = config.admin_ids.len(),
        port = config.server_port,
        cache_dir = %config.cache_dir.display(),
        persistence = config.cache_persistence,
        cleanup_interval = config.cleanup_interval,
        "Configuration loaded"
    );
    if config.bot_token.is_empty() {
        warn!("BOT_TOKEN is not set, Telegram notifications will fail");
    }

    let transport = Arc::new(
        TelegramBotApi::new(config.bot_token.clone()).with_base_url(&config.telegram_api_url),
    );
    let store = Arc::new(MemoryStore::new());
    let port = config.server_port;
    let ctx = Arc::new(AppContext::start(config, store, transport));

    let app = create_router(AppState::new(ctx.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    ctx.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
