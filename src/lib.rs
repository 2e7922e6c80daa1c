pub mod commands;
pub mod config;
pub mod error;
pub mod fleet;
pub mod logging;
pub mod state;

use commands::{
    app_info::app_info,
    fleet_stream::{start_fuel_simulator, start_live_feed},
    trucks::{fetch_trucks, fleet_summary},
};
use config::RuntimeConfig;
use error::AppError;
use fleet::source::{HttpTruckSource, MockTruckSource, TruckSource};
use state::AppState;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::MissedTickBehavior;

const SUMMARY_LOG_INTERVAL: Duration = Duration::from_secs(30);

pub fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}

fn build_source(config: &RuntimeConfig) -> Result<Arc<dyn TruckSource>, AppError> {
    if config.mock_api {
        return Ok(Arc::new(MockTruckSource::seeded()));
    }
    Ok(Arc::new(HttpTruckSource::new(config.api_url.clone())?))
}

async fn log_summaries(state: &AppState) {
    let mut ticker = tokio::time::interval(SUMMARY_LOG_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match fleet_summary(state).await {
            Ok(summary) => tracing::info!(
                total = summary.total,
                active = summary.active,
                idle = summary.idle,
                maintenance = summary.maintenance,
                offline = summary.offline,
                avg_load_pct = summary.avg_load_pct,
                low_fuel = summary.low_fuel,
                "fleet summary"
            ),
            Err(error) => tracing::warn!(%error, "failed to build fleet summary"),
        }
    }
}

/// Loads the fleet, attaches the live feed and runs until Ctrl-C.
pub async fn run() -> Result<(), AppError> {
    logging::init_logging();

    let config = RuntimeConfig::from_env()?;
    let info = app_info();
    tracing::info!(
        version = %info.version,
        api_url = %config.api_url,
        feed_url = %config.feed.url,
        mock_api = config.mock_api,
        mock_fuel = config.mock_fuel,
        "starting {}",
        info.product_name
    );

    let source = build_source(&config)?;
    let state = AppState::new(source, config.fleet, config.feed.clone());

    if let Err(error) = fetch_trucks(&state, None).await {
        tracing::warn!(%error, "initial truck fetch failed; continuing with an empty fleet");
    }

    start_live_feed(&state, None).await?;
    if config.mock_fuel {
        start_fuel_simulator(&state, None).await?;
    }

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(error) => tracing::warn!(%error, "failed to listen for ctrl-c; shutting down"),
        },
        _ = log_summaries(&state) => {}
    }

    state.shutdown().await;
    tracing::info!("fleet telemetry stopped");
    Ok(())
}
