pub mod api; // HTTP surface: parse, extract, download
pub mod cache; // Bounded keyed cache for documents and reports
pub mod config;
pub mod models;
pub mod pipeline; // Segmentation, model gateway, orchestration, merge
pub mod report; // PDF report assembly

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::api::{start_api_server, AppState, ServerError};
use crate::config::{AppConfig, ConfigError};
use crate::pipeline::gateway::bedrock::BedrockClient;
use crate::pipeline::segmentation::PdfExtractSource;
use crate::report::{prepare_report_dir, PdfReportAssembler};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Initialize tracing. `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter(log_level))),
        )
        .try_init();
}

/// Load config, wire the pipeline and serve until Ctrl-C.
pub async fn run() -> Result<(), RunError> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.log_level);

    tracing::info!(
        version = config::APP_VERSION,
        model_id = %config.model_id,
        region = %config.region,
        batch_size = config.batch_size,
        max_passes = config.max_passes,
        "soc2-extract starting"
    );

    let report_dir = prepare_report_dir(&config.report_dir);
    let client = BedrockClient::from_config(&config).await;
    let state = AppState::new(
        &config,
        Arc::new(PdfExtractSource),
        Arc::new(client),
        Arc::new(PdfReportAssembler::new(report_dir)),
    );

    let sweeper = spawn_cache_sweeper(state.clone(), sweep_interval(config.cache_ttl));
    let mut server = start_api_server(state, &config.bind_addr).await?;
    tracing::info!(addr = %server.addr, "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for shutdown signal: {e}");
    }
    server.shutdown();
    server.stopped().await;
    sweeper.abort();
    Ok(())
}

/// Sweep at least as often as entries expire, capped at
/// `CACHE_SWEEP_INTERVAL`.
fn sweep_interval(ttl: Duration) -> Duration {
    ttl.min(config::CACHE_SWEEP_INTERVAL).max(Duration::from_secs(1))
}

/// Periodically drop expired documents and reports, so report files do
/// not outlive their entries while the server is idle.
fn spawn_cache_sweeper(state: AppState, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            state.purge_expired();
        }
    })
}
