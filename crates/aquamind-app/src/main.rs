//! AquaMind server binary - composition root.
//!
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Install tracing
//! 3. Build the role catalog, responder and session manager
//! 4. Reap idle sessions in the background
//! 5. Serve the axum API until Ctrl-C

mod cli;

use std::time::Duration;

use clap::Parser;

use aquamind_api::routes;
use aquamind_api::state::AppState;
use aquamind_core::config::AquaMindConfig;
use aquamind_core::error::AquaError;

use crate::cli::CliArgs;

const REAP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_file = args.resolve_config_path();
    let loaded = AquaMindConfig::load(&config_file);

    let log_level = args.resolve_log_level(
        loaded
            .as_ref()
            .map(|c| c.general.log_level.as_str())
            .unwrap_or("info"),
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting AquaMind v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match loaded {
        Ok(config) => {
            tracing::info!(path = %config_file.display(), "Configuration loaded");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %config_file.display(),
                error = %e,
                "Failed to load config, using defaults"
            );
            AquaMindConfig::default()
        }
    };
    config.general.port = args.resolve_port(config.general.port);

    let state = AppState::new(config.clone()).map_err(AquaError::from)?;
    tracing::info!(
        roles = state.sessions.registry().len(),
        latency_ms = config.responder.latency_ms,
        "Session manager ready"
    );

    // Idle session reaper.
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAP_INTERVAL);
        loop {
            interval.tick().await;
            let reaped = sessions.reap_expired();
            if !reaped.is_empty() {
                tracing::debug!(count = reaped.len(), "Idle sessions reaped");
            }
        }
    });

    let port = config.general.port;
    let result = routes::start_server(state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down");
    })
    .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "API server stopped");
        tracing::error!("Try: AQUAMIND_PORT={} cargo run -p aquamind-app", port.saturating_add(2));
        return Err(e.into());
    }

    Ok(())
}
