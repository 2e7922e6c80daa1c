use crate::fleet::types::{
    EventTimestamp, FuelSimulatorConfig, TelemetryEvent, TruckRecord,
    DEFAULT_SIMULATED_FUEL_LEVEL, MAX_FUEL_LEVEL, MIN_FUEL_LEVEL,
};
use crate::fleet::TelemetrySink;
use crate::now_unix_ms;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuelDirection {
    Draining,
    Refilling,
}

/// Drain/refill oscillator for one truck.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuelOscillator {
    level: f64,
    direction: FuelDirection,
}

impl FuelOscillator {
    pub fn new(initial_level: Option<f64>) -> Self {
        let level = initial_level
            .filter(|level| level.is_finite())
            .unwrap_or(DEFAULT_SIMULATED_FUEL_LEVEL)
            .clamp(MIN_FUEL_LEVEL, MAX_FUEL_LEVEL);
        Self {
            level,
            direction: FuelDirection::Draining,
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn direction(&self) -> FuelDirection {
        self.direction
    }

    pub fn step(&mut self, config: &FuelSimulatorConfig) -> f64 {
        let next = match self.direction {
            FuelDirection::Draining => {
                let next = self.level - config.step_pct;
                if next <= config.refill_threshold {
                    self.direction = FuelDirection::Refilling;
                    config.refill_threshold
                } else {
                    next
                }
            }
            FuelDirection::Refilling => {
                let next = self.level + config.step_pct;
                if next >= MAX_FUEL_LEVEL {
                    self.direction = FuelDirection::Draining;
                    MAX_FUEL_LEVEL
                } else {
                    next
                }
            }
        };

        self.level = next.clamp(MIN_FUEL_LEVEL, MAX_FUEL_LEVEL);
        self.level
    }
}

fn fuel_event(truck_id: &str, timestamp: i64, fuel_level: f64) -> TelemetryEvent {
    TelemetryEvent::FuelUpdate {
        truck_id: truck_id.to_string(),
        timestamp: Some(EventTimestamp::Millis(timestamp as f64)),
        fuel_level,
    }
}

/// Owned handle of a running synthetic fuel feed.
pub struct FuelSimulator {
    cancellation_token: CancellationToken,
    join_handle: Option<JoinHandle<()>>,
    tracked_trucks: usize,
}

impl FuelSimulator {
    /// Emits one sample per truck right away, then one per tick.
    pub fn start(
        trucks: &[TruckRecord],
        config: FuelSimulatorConfig,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        let mut oscillators: Vec<(String, FuelOscillator)> = trucks
            .iter()
            .map(|truck| (truck.id.clone(), FuelOscillator::new(truck.fuel_level)))
            .collect();

        let started_at = now_unix_ms();
        for (truck_id, oscillator) in &oscillators {
            sink.on_event(fuel_event(truck_id, started_at, oscillator.level()));
        }

        let cancellation_token = CancellationToken::new();
        let task_token = cancellation_token.clone();
        let tracked_trucks = oscillators.len();
        tracing::info!(
            tracked_trucks,
            interval_ms = config.interval_ms,
            step_pct = config.step_pct,
            "fuel simulator started"
        );

        let join_handle = tokio::spawn(async move {
            let period = Duration::from_millis(config.interval_ms.max(1));
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let timestamp = now_unix_ms();
                        for (truck_id, oscillator) in oscillators.iter_mut() {
                            if task_token.is_cancelled() {
                                return;
                            }
                            let level = oscillator.step(&config);
                            sink.on_event(fuel_event(truck_id, timestamp, level));
                        }
                    }
                }
            }
        });

        Self {
            cancellation_token,
            join_handle: Some(join_handle),
            tracked_trucks,
        }
    }

    pub fn tracked_trucks(&self) -> usize {
        self.tracked_trucks
    }

    pub fn is_running(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops ticking; safe to call repeatedly.
    pub async fn stop(&mut self) {
        self.cancellation_token.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
            tracing::info!(tracked_trucks = self.tracked_trucks, "fuel simulator stopped");
        }
    }
}

impl Drop for FuelSimulator {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::fleet::types::{sample_truck, TruckStatus};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl TelemetrySink for RecordingSink {
        fn on_event(&self, event: TelemetryEvent) {
            self.events.lock().push(event);
        }

        fn on_error(&self, _error: &AppError) {}
    }

    fn levels_for(events: &[TelemetryEvent], id: &str) -> Vec<f64> {
        events
            .iter()
            .filter_map(|event| match event {
                TelemetryEvent::FuelUpdate {
                    truck_id,
                    fuel_level,
                    ..
                } if truck_id == id => Some(*fuel_level),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn defaults_missing_reading_to_full_tank() {
        assert_eq!(FuelOscillator::new(None).level(), 100.0);
        assert_eq!(FuelOscillator::new(Some(f64::NAN)).level(), 100.0);
        assert_eq!(FuelOscillator::new(Some(130.0)).level(), 100.0);
        assert_eq!(FuelOscillator::new(Some(42.0)).level(), 42.0);
    }

    #[test]
    fn flips_to_refilling_at_threshold() {
        let config = FuelSimulatorConfig::default();
        let mut oscillator = FuelOscillator::new(Some(12.0));

        assert_eq!(oscillator.step(&config), 10.0);
        assert_eq!(oscillator.direction(), FuelDirection::Refilling);
        assert_eq!(oscillator.step(&config), 11.5);
    }

    #[test]
    fn flips_to_draining_at_full_tank() {
        let config = FuelSimulatorConfig::default();
        let mut oscillator = FuelOscillator::new(Some(12.0));
        oscillator.step(&config);
        while oscillator.direction() == FuelDirection::Refilling {
            oscillator.step(&config);
        }

        assert_eq!(oscillator.level(), 100.0);
        assert_eq!(oscillator.step(&config), 98.5);
    }

    #[test]
    fn long_run_stays_bounded_with_small_steps() {
        let configs = [
            FuelSimulatorConfig::default(),
            FuelSimulatorConfig {
                interval_ms: 1,
                step_pct: 7.3,
                refill_threshold: 0.0,
            },
            FuelSimulatorConfig {
                interval_ms: 1,
                step_pct: 33.0,
                refill_threshold: 55.5,
            },
        ];

        for config in configs {
            let mut oscillator = FuelOscillator::new(Some(80.0));
            let mut previous = oscillator.level();
            let mut previous_direction = oscillator.direction();
            for _ in 0..10_000 {
                let level = oscillator.step(&config);
                assert!((0.0..=100.0).contains(&level));
                assert!((level - previous).abs() <= config.step_pct + 1e-9);
                if oscillator.direction() != previous_direction {
                    match oscillator.direction() {
                        FuelDirection::Refilling => assert_eq!(level, config.refill_threshold),
                        FuelDirection::Draining => assert_eq!(level, 100.0),
                    }
                }
                previous = level;
                previous_direction = oscillator.direction();
            }
        }
    }

    #[tokio::test]
    async fn emits_initial_and_tick_samples_until_stopped() {
        let sink = Arc::new(RecordingSink::default());
        let trucks = vec![
            sample_truck("1", "Budi Santoso", TruckStatus::Active),
            sample_truck("2", "Ahmad Hidayat", TruckStatus::Idle),
        ];
        let config = FuelSimulatorConfig {
            interval_ms: 5,
            ..FuelSimulatorConfig::default()
        };

        let mut simulator = FuelSimulator::start(&trucks, config, sink.clone());
        assert_eq!(simulator.tracked_trucks(), 2);
        assert_eq!(levels_for(&sink.events.lock(), "1"), vec![50.0]);

        tokio::time::sleep(Duration::from_millis(60)).await;
        simulator.stop().await;
        assert!(!simulator.is_running());

        let after_stop = sink.events.lock().len();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sink.events.lock().len(), after_stop);

        let levels = levels_for(&sink.events.lock(), "1");
        assert!(levels.len() > 1);
        assert_eq!(levels[1], 48.5);

        simulator.stop().await;
    }

    #[tokio::test]
    async fn zero_interval_still_ticks() {
        let sink = Arc::new(RecordingSink::default());
        let trucks = vec![sample_truck("1", "Budi Santoso", TruckStatus::Active)];
        let config = FuelSimulatorConfig {
            interval_ms: 0,
            ..FuelSimulatorConfig::default()
        };

        let mut simulator = FuelSimulator::start(&trucks, config, sink.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(simulator.is_running());
        simulator.stop().await;

        let levels = levels_for(&sink.events.lock(), "1");
        assert!(levels.len() > 1);
        assert_eq!(levels[1], 48.5);
    }
}
