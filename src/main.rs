//! Speech Gateway entry point.

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use speech_gateway::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = match speech_gateway::app_state(&config, speech_gateway::collaborators(&config)) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(temp_dir = %config.temp_dir().display(), "cannot prepare temp directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    match state.purge_stale_temp_files() {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "Removed stale temp files"),
        Err(e) => tracing::warn!("Failed to purge stale temp files: {e}"),
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        region = %config.azure_region,
        route_limit_per_minute = config.route_limit_per_minute,
        daily_limit = config.daily_limit,
        allow_list = config.allow_list.len(),
        "Speech Gateway starting",
    );

    let host = match config.host.parse() {
        Ok(host) => host,
        Err(e) => {
            tracing::error!(host = %config.host, "invalid host: {e}");
            return ExitCode::FAILURE;
        }
    };
    let addr = SocketAddr::new(host, config.port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, "failed to bind: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Spawn quota counter sweep task
    let sweep_state = state.clone();
    let interval = config.sweep_interval();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let removed = sweep_state.sweep_quotas();
            if removed > 0 {
                tracing::debug!(removed, "Swept stale quota counters");
            }
        }
    });

    let app = speech_gateway::router(state);

    tracing::info!(%addr, "Speech Gateway ready");

    if let Err(e) = speech_gateway::serve(listener, app, shutdown_signal()).await {
        tracing::error!("server error: {e}");
        return ExitCode::FAILURE;
    }

    tracing::info!("Speech Gateway shut down");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install signal handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
