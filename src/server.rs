//! Tracing setup and server startup for Beadline.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use beadline_api::{AppState, create_router};
use beadline_config::{Config, LoggingConfig};
use beadline_daemon::Daemon;

/// Initialize tracing with console and optional daily-rolling file output.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the process.
pub(crate) fn init_tracing(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console = if config.json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).with_ansi(true).boxed()
    };

    let (file, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("beadline")
                .filename_suffix("log")
                .max_log_files(30)
                .build(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file)
        .init();

    Ok(guard)
}

/// Run the daemon and API server until shutdown is requested.
pub(crate) async fn run_server(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;

    info!("Starting Beadline v{}", env!("CARGO_PKG_VERSION"));
    let daemon = Arc::new(Daemon::new(config)?);
    daemon.shutdown().listen_for_os_signals()?;
    daemon.start()?;

    let app = create_router(Arc::new(AppState::new(daemon.clone())));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("API server listening on http://{}", addr);

    let token = daemon.shutdown().token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    let report = daemon.stop().await;
    if !report.abandoned.is_empty() {
        warn!(abandoned = ?report.abandoned, "Some background loops were abandoned");
    }
    info!("Beadline stopped");
    Ok(())
}
