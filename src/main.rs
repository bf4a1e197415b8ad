use clap::Parser;
use std::sync::Arc;
use tracing::info;

use cache_bench::config::{BenchConfig, CliArgs};
use cache_bench::server;
use cache_bench::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_bench=info,tower_http=info".into()),
        )
        .init();

    let args = CliArgs::parse();
    info!("Starting cache-bench v{}", env!("CARGO_PKG_VERSION"));
    info!("Data dir: {:?}", args.data_dir);
    info!("Object cache enabled: {}", !args.no_cache);

    let config = BenchConfig::from_args(args);
    let port = config.port;
    std::fs::create_dir_all(&config.data_dir)?;

    let state = Arc::new(AppState::new(config)?);
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("Listening on port {}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down");
}
