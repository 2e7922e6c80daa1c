use crate::error::AppError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FEED_URL: &str = "ws://localhost:8080";
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const MIN_RECONNECT_INTERVAL_MS: u64 = 1;
pub const MAX_RECONNECT_INTERVAL_MS: u64 = 600_000;

pub const DEFAULT_SIMULATOR_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_SIMULATOR_STEP_PCT: f64 = 1.5;
pub const DEFAULT_REFILL_THRESHOLD: f64 = 10.0;
pub const DEFAULT_SIMULATED_FUEL_LEVEL: f64 = 100.0;
pub const MIN_FUEL_LEVEL: f64 = 0.0;
pub const MAX_FUEL_LEVEL: f64 = 100.0;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_SORT: &str = "driver:asc";
pub const LOW_FUEL_THRESHOLD: f64 = 30.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TruckStatus {
    Active,
    Idle,
    Maintenance,
    Offline,
}

impl TruckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Idle => "idle",
            Self::Maintenance => "maintenance",
            Self::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TruckLocation {
    pub lat: f64,
    pub lng: f64,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TruckRecord {
    pub id: String,
    pub driver: String,
    pub plate_number: String,
    pub capacity: f64,
    pub status: TruckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub location: TruckLocation,
    pub last_seen: String,
    pub current_load: f64,
    #[serde(default)]
    pub fuel_level: Option<f64>,
}

impl TruckRecord {
    /// Fuel reading usable as a sample, if the record carries a finite one.
    pub fn fuel_reading(&self) -> Option<f64> {
        self.fuel_level.filter(|level| level.is_finite())
    }

    pub fn apply_patch(&mut self, patch: &TruckPatch) {
        if let Some(driver) = &patch.driver {
            self.driver = driver.clone();
        }
        if let Some(plate_number) = &patch.plate_number {
            self.plate_number = plate_number.clone();
        }
        if let Some(capacity) = patch.capacity {
            self.capacity = capacity;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(photo_url) = &patch.photo_url {
            self.photo_url = Some(photo_url.clone());
        }
        if let Some(location) = &patch.location {
            self.location = location.clone();
        }
        if let Some(last_seen) = &patch.last_seen {
            self.last_seen = last_seen.clone();
        }
        if let Some(current_load) = patch.current_load {
            self.current_load = current_load;
        }
        if let Some(fuel_level) = patch.fuel_level {
            self.fuel_level = Some(fuel_level);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TruckDraft {
    pub driver: String,
    pub plate_number: String,
    pub capacity: f64,
    pub status: TruckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub location: TruckLocation,
    pub last_seen: String,
    pub current_load: f64,
    #[serde(default)]
    pub fuel_level: Option<f64>,
}

impl TruckDraft {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.driver.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "driver must not be empty".to_string(),
            ));
        }
        if self.plate_number.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "plateNumber must not be empty".to_string(),
            ));
        }
        if !self.capacity.is_finite() || self.capacity <= 0.0 {
            return Err(AppError::InvalidArgument(
                "capacity must be a finite positive number".to_string(),
            ));
        }
        if let Some(level) = self.fuel_level {
            if !(MIN_FUEL_LEVEL..=MAX_FUEL_LEVEL).contains(&level) {
                return Err(AppError::InvalidArgument(format!(
                    "fuelLevel must be between {MIN_FUEL_LEVEL} and {MAX_FUEL_LEVEL}"
                )));
            }
        }
        Ok(())
    }

    pub fn into_record(self, id: String) -> TruckRecord {
        TruckRecord {
            id,
            driver: self.driver,
            plate_number: self.plate_number,
            capacity: self.capacity,
            status: self.status,
            photo_url: self.photo_url,
            location: self.location,
            last_seen: self.last_seen,
            current_load: self.current_load,
            fuel_level: self.fuel_level,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TruckPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TruckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<TruckLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_load: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_level: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FuelSample {
    pub timestamp: i64,
    pub fuel_level: f64,
}

/// Timestamp as it arrives on the feed: epoch milliseconds or a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum EventTimestamp {
    Millis(f64),
    Text(String),
}

impl EventTimestamp {
    pub fn to_unix_ms(&self) -> Option<i64> {
        match self {
            Self::Millis(value) if value.is_finite() => Some(*value as i64),
            Self::Millis(_) => None,
            Self::Text(text) => parse_timestamp_ms(text),
        }
    }
}

/// Parses an RFC 3339 / ISO 8601 string, falling back to a numeric string.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.timestamp_millis());
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc().timestamp_millis());
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(|value| value as i64)
}

pub const TRUCK_UPDATE_EVENT: &str = "truck_update";
pub const FUEL_UPDATE_EVENT: &str = "fuel_update";

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    TruckUpdate {
        truck: TruckRecord,
    },
    FuelUpdate {
        truck_id: String,
        timestamp: Option<EventTimestamp>,
        fuel_level: f64,
    },
    Unrecognized {
        kind: String,
    },
}

impl TelemetryEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::TruckUpdate { .. } => TRUCK_UPDATE_EVENT,
            Self::FuelUpdate { .. } => FUEL_UPDATE_EVENT,
            Self::Unrecognized { kind } => kind,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEnvelopeWire {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub truck: Option<TruckRecord>,
    #[serde(default)]
    pub truck_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<EventTimestamp>,
    #[serde(default)]
    pub fuel_level: Option<f64>,
}

impl TryFrom<TelemetryEnvelopeWire> for TelemetryEvent {
    type Error = AppError;

    fn try_from(value: TelemetryEnvelopeWire) -> Result<Self, Self::Error> {
        match value.kind.as_str() {
            TRUCK_UPDATE_EVENT => {
                let truck = value.truck.ok_or_else(|| {
                    AppError::MalformedPayload("truck_update without truck".to_string())
                })?;
                Ok(Self::TruckUpdate { truck })
            }
            FUEL_UPDATE_EVENT => {
                let truck_id = value
                    .truck_id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        AppError::MalformedPayload("fuel_update without truckId".to_string())
                    })?;
                let fuel_level = value
                    .fuel_level
                    .filter(|level| level.is_finite())
                    .ok_or_else(|| {
                        AppError::MalformedPayload(
                            "fuel_update without a numeric fuelLevel".to_string(),
                        )
                    })?;
                Ok(Self::FuelUpdate {
                    truck_id,
                    timestamp: value.timestamp,
                    fuel_level,
                })
            }
            _ => Ok(Self::Unrecognized { kind: value.kind }),
        }
    }
}

pub fn parse_telemetry_payload(payload: &mut [u8]) -> Result<TelemetryEvent, AppError> {
    let wire: TelemetryEnvelopeWire = simd_json::serde::from_slice(payload)
        .map_err(|error| AppError::MalformedPayload(error.to_string()))?;
    wire.try_into()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FetchTrucksArgs {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort: Option<String>,
    pub search: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub page: u32,
    pub page_size: u32,
    pub sort: String,
    pub search: String,
    pub status: String,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            sort: DEFAULT_SORT.to_string(),
            search: String::new(),
            status: String::new(),
        }
    }
}

impl FetchTrucksArgs {
    pub fn normalize(self) -> Result<QueryParams, AppError> {
        let page = self.page.unwrap_or(DEFAULT_PAGE);
        if page == 0 {
            return Err(AppError::InvalidArgument(
                "page must be at least 1".to_string(),
            ));
        }

        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(AppError::InvalidArgument(
                "pageSize must be at least 1".to_string(),
            ));
        }

        let sort = self
            .sort
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_SORT.to_string());

        Ok(QueryParams {
            page,
            page_size,
            sort,
            search: self.search.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
        })
    }
}

impl From<&QueryParams> for FetchTrucksArgs {
    fn from(params: &QueryParams) -> Self {
        Self {
            page: Some(params.page),
            page_size: Some(params.page_size),
            sort: Some(params.sort.clone()),
            search: Some(params.search.clone()),
            status: Some(params.status.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TruckPage {
    pub data: Vec<TruckRecord>,
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
}

/// Delivery counts for one calendar day (`YYYY-MM-DD`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStat {
    pub date: String,
    pub deliveries: u32,
    pub on_time: u32,
    pub delayed: u32,
}

/// Filter state kept between fetches; `None` fields leave the current value.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TruckFiltersPatch {
    pub search: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TruckFilters {
    pub search: String,
    pub status: String,
    pub sort: String,
}

impl Default for TruckFilters {
    fn default() -> Self {
        Self {
            search: String::new(),
            status: String::new(),
            sort: DEFAULT_SORT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    PermanentlyFailed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::PermanentlyFailed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatusSnapshot {
    pub state: ConnectionState,
    pub url: String,
    pub reconnect_attempts: u32,
    pub reason: Option<String>,
}

impl ConnectionStatusSnapshot {
    pub fn disconnected(url: String, reason: Option<String>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            url,
            reconnect_attempts: 0,
            reason,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartLiveFeedArgs {
    pub url: Option<String>,
    pub reconnect_interval_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SocketClientConfig {
    pub url: String,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl StartLiveFeedArgs {
    pub fn normalize(self) -> Result<SocketClientConfig, AppError> {
        let url = self
            .url
            .unwrap_or_else(|| DEFAULT_FEED_URL.to_string())
            .trim()
            .to_string();

        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(AppError::InvalidArgument(
                "url must use the ws:// or wss:// scheme".to_string(),
            ));
        }

        let reconnect_interval_ms = self
            .reconnect_interval_ms
            .unwrap_or(DEFAULT_RECONNECT_INTERVAL_MS);
        if !(MIN_RECONNECT_INTERVAL_MS..=MAX_RECONNECT_INTERVAL_MS)
            .contains(&reconnect_interval_ms)
        {
            return Err(AppError::InvalidArgument(format!(
                "reconnectIntervalMs must be between {MIN_RECONNECT_INTERVAL_MS} and {MAX_RECONNECT_INTERVAL_MS}"
            )));
        }

        Ok(SocketClientConfig {
            url,
            reconnect_interval_ms,
            max_reconnect_attempts: self
                .max_reconnect_attempts
                .unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveFeedSession {
    pub running: bool,
    pub url: String,
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl LiveFeedSession {
    pub fn from_config(config: &SocketClientConfig) -> Self {
        Self {
            running: true,
            url: config.url.clone(),
            reconnect_interval_ms: config.reconnect_interval_ms,
            max_reconnect_attempts: config.max_reconnect_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartFuelSimulatorArgs {
    pub interval_ms: Option<u64>,
    pub step_pct: Option<f64>,
    pub refill_threshold: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuelSimulatorConfig {
    pub interval_ms: u64,
    pub step_pct: f64,
    pub refill_threshold: f64,
}

impl Default for FuelSimulatorConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_SIMULATOR_INTERVAL_MS,
            step_pct: DEFAULT_SIMULATOR_STEP_PCT,
            refill_threshold: DEFAULT_REFILL_THRESHOLD,
        }
    }
}

impl StartFuelSimulatorArgs {
    pub fn normalize(self) -> Result<FuelSimulatorConfig, AppError> {
        let interval_ms = self.interval_ms.unwrap_or(DEFAULT_SIMULATOR_INTERVAL_MS);
        if interval_ms == 0 {
            return Err(AppError::InvalidArgument(
                "intervalMs must be at least 1".to_string(),
            ));
        }

        let step_pct = self.step_pct.unwrap_or(DEFAULT_SIMULATOR_STEP_PCT);
        if !step_pct.is_finite() || step_pct <= 0.0 || step_pct > MAX_FUEL_LEVEL {
            return Err(AppError::InvalidArgument(
                "stepPct must be a finite number in (0, 100]".to_string(),
            ));
        }

        let refill_threshold = self.refill_threshold.unwrap_or(DEFAULT_REFILL_THRESHOLD);
        if !(MIN_FUEL_LEVEL..MAX_FUEL_LEVEL).contains(&refill_threshold) {
            return Err(AppError::InvalidArgument(format!(
                "refillThreshold must be in [{MIN_FUEL_LEVEL}, {MAX_FUEL_LEVEL})"
            )));
        }

        Ok(FuelSimulatorConfig {
            interval_ms,
            step_pct,
            refill_threshold,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelSimulatorSession {
    pub running: bool,
    pub tracked_trucks: usize,
    pub interval_ms: u64,
    pub step_pct: f64,
    pub refill_threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResult {
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FleetSummary {
    pub total: usize,
    pub active: usize,
    pub idle: usize,
    pub maintenance: usize,
    pub offline: usize,
    pub avg_load_pct: f64,
    pub low_fuel: usize,
}

impl FleetSummary {
    pub fn from_trucks(trucks: &[TruckRecord]) -> Self {
        let count = |status: TruckStatus| trucks.iter().filter(|t| t.status == status).count();
        let total_load: f64 = trucks.iter().map(|t| t.current_load).sum();
        let total_capacity: f64 = trucks.iter().map(|t| t.capacity).sum();
        let avg_load_pct = if total_capacity > 0.0 {
            total_load / total_capacity * 100.0
        } else {
            0.0
        };

        Self {
            total: trucks.len(),
            active: count(TruckStatus::Active),
            idle: count(TruckStatus::Idle),
            maintenance: count(TruckStatus::Maintenance),
            offline: count(TruckStatus::Offline),
            avg_load_pct,
            low_fuel: trucks
                .iter()
                .filter(|t| t.fuel_reading().is_some_and(|l| l < LOW_FUEL_THRESHOLD))
                .count(),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_truck(id: &str, driver: &str, status: TruckStatus) -> TruckRecord {
    TruckRecord {
        id: id.to_string(),
        driver: driver.to_string(),
        plate_number: format!("B {id} XYZ"),
        capacity: 5_000.0,
        status,
        photo_url: None,
        location: TruckLocation {
            lat: -6.2,
            lng: 106.8,
            address: "Jakarta Pusat, DKI Jakarta".to_string(),
        },
        last_seen: "2025-10-14T08:00:00.000Z".to_string(),
        current_load: 2_500.0,
        fuel_level: Some(50.0),
    }
}
