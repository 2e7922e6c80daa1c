use crate::error::AppError;
use crate::fleet::simulator::FuelSimulator;
use crate::fleet::socket::TelemetrySocket;
use crate::fleet::types::{
    ConnectionStatusSnapshot, FuelSimulatorSession, LiveFeedSession, StartFuelSimulatorArgs,
    StartLiveFeedArgs, StopResult,
};
use crate::fleet::TelemetrySink;
use crate::state::{AppState, FuelSimulatorHandle};
use serde::Serialize;
use std::sync::Arc;

fn with_feed_defaults(args: Option<StartLiveFeedArgs>, state: &AppState) -> StartLiveFeedArgs {
    let args = args.unwrap_or_default();
    let defaults = &state.feed_defaults;
    StartLiveFeedArgs {
        url: args.url.or_else(|| Some(defaults.url.clone())),
        reconnect_interval_ms: args
            .reconnect_interval_ms
            .or(Some(defaults.reconnect_interval_ms)),
        max_reconnect_attempts: args
            .max_reconnect_attempts
            .or(Some(defaults.max_reconnect_attempts)),
    }
}

pub async fn start_live_feed(
    state: &AppState,
    args: Option<StartLiveFeedArgs>,
) -> Result<LiveFeedSession, AppError> {
    let config = with_feed_defaults(args, state).normalize()?;

    let existing_feed = {
        let mut feed_slot = state.live_feed.lock().await;
        feed_slot.take()
    };
    if let Some(mut socket) = existing_feed {
        socket.disconnect().await;
    }

    let sink: Arc<dyn TelemetrySink> = state.coordinator.clone();
    let socket = TelemetrySocket::connect(config.clone(), sink);
    tracing::info!(url = %config.url, "live feed started");

    {
        let mut feed_slot = state.live_feed.lock().await;
        *feed_slot = Some(socket);
    }

    Ok(LiveFeedSession::from_config(&config))
}

pub async fn stop_live_feed(state: &AppState) -> Result<StopResult, AppError> {
    let existing_feed = {
        let mut feed_slot = state.live_feed.lock().await;
        feed_slot.take()
    };

    let stopped = if let Some(mut socket) = existing_feed {
        socket.disconnect().await;
        true
    } else {
        false
    };

    Ok(StopResult { stopped })
}

pub async fn live_feed_status(state: &AppState) -> Result<ConnectionStatusSnapshot, AppError> {
    let feed_slot = state.live_feed.lock().await;
    let snapshot = match feed_slot.as_ref() {
        Some(socket) => socket.status(),
        None => ConnectionStatusSnapshot::disconnected(
            state.feed_defaults.url.clone(),
            Some("feed idle".to_string()),
        ),
    };
    Ok(snapshot)
}

/// Returns false when there is no connected feed to carry the message.
pub async fn send_feed_message<T: Serialize>(
    state: &AppState,
    message: &T,
) -> Result<bool, AppError> {
    let feed_slot = state.live_feed.lock().await;
    Ok(feed_slot
        .as_ref()
        .is_some_and(|socket| socket.send(message)))
}

pub async fn start_fuel_simulator(
    state: &AppState,
    args: Option<StartFuelSimulatorArgs>,
) -> Result<FuelSimulatorSession, AppError> {
    let config = args.unwrap_or_default().normalize()?;

    let existing = {
        let mut simulator_slot = state.fuel_simulator.lock().await;
        simulator_slot.take()
    };
    if let Some(mut handle) = existing {
        handle.simulator.stop().await;
    }

    let trucks = state.coordinator.trucks();
    let sink: Arc<dyn TelemetrySink> = state.coordinator.clone();
    let simulator = FuelSimulator::start(&trucks, config, sink);
    let session = FuelSimulatorSession {
        running: true,
        tracked_trucks: simulator.tracked_trucks(),
        interval_ms: config.interval_ms,
        step_pct: config.step_pct,
        refill_threshold: config.refill_threshold,
    };

    {
        let mut simulator_slot = state.fuel_simulator.lock().await;
        *simulator_slot = Some(FuelSimulatorHandle { simulator, config });
    }

    Ok(session)
}

pub async fn stop_fuel_simulator(state: &AppState) -> Result<StopResult, AppError> {
    let existing = {
        let mut simulator_slot = state.fuel_simulator.lock().await;
        simulator_slot.take()
    };

    let stopped = if let Some(mut handle) = existing {
        handle.simulator.stop().await;
        true
    } else {
        false
    };

    Ok(StopResult { stopped })
}

pub async fn fuel_simulator_status(state: &AppState) -> Result<FuelSimulatorSession, AppError> {
    let simulator_slot = state.fuel_simulator.lock().await;
    let session = match simulator_slot.as_ref() {
        Some(handle) => FuelSimulatorSession {
            running: handle.simulator.is_running(),
            tracked_trucks: handle.simulator.tracked_trucks(),
            interval_ms: handle.config.interval_ms,
            step_pct: handle.config.step_pct,
            refill_threshold: handle.config.refill_threshold,
        },
        None => FuelSimulatorSession {
            running: false,
            tracked_trucks: 0,
            interval_ms: 0,
            step_pct: 0.0,
            refill_threshold: 0.0,
        },
    };
    Ok(session)
}
