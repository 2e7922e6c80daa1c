use crate::fleet::coordinator::{FleetConfig, FleetCoordinator};
use crate::fleet::simulator::FuelSimulator;
use crate::fleet::socket::TelemetrySocket;
use crate::fleet::source::TruckSource;
use crate::fleet::types::{FuelSimulatorConfig, SocketClientConfig};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

pub struct FuelSimulatorHandle {
    pub simulator: FuelSimulator,
    pub config: FuelSimulatorConfig,
}

pub struct AppState {
    pub started_at: Instant,
    pub coordinator: Arc<FleetCoordinator>,
    pub source: Arc<dyn TruckSource>,
    pub feed_defaults: SocketClientConfig,
    pub live_feed: Mutex<Option<TelemetrySocket>>,
    pub fuel_simulator: Mutex<Option<FuelSimulatorHandle>>,
}

impl AppState {
    pub fn new(
        source: Arc<dyn TruckSource>,
        fleet_config: FleetConfig,
        feed_defaults: SocketClientConfig,
    ) -> Self {
        Self {
            started_at: Instant::now(),
            coordinator: Arc::new(FleetCoordinator::new(fleet_config)),
            source,
            feed_defaults,
            live_feed: Mutex::new(None),
            fuel_simulator: Mutex::new(None),
        }
    }

    /// Disconnects the feed and stops the simulator, waiting for both tasks.
    pub async fn shutdown(&self) {
        let feed = self.live_feed.lock().await.take();
        if let Some(mut socket) = feed {
            socket.disconnect().await;
        }

        let simulator = self.fuel_simulator.lock().await.take();
        if let Some(mut handle) = simulator {
            handle.simulator.stop().await;
        }
    }
}
