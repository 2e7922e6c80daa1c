use crate::error::AppError;
use crate::fleet::history::{FuelHistory, DEFAULT_MAX_SAMPLES};
use crate::fleet::query::query_trucks;
use crate::fleet::source::TruckSource;
use crate::fleet::types::{
    parse_timestamp_ms, EventTimestamp, FetchTrucksArgs, FleetSummary, FuelSample, QueryParams,
    TelemetryEvent, TruckFilters, TruckFiltersPatch, TruckPage, TruckPatch, TruckRecord,
};
use crate::fleet::TelemetrySink;
use crate::now_unix_ms;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FleetConfig {
    pub max_samples: usize,
    pub cache_ttl: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_MAX_SAMPLES,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FleetChange {
    TrucksLoaded { total: usize },
    FetchFailed { message: String },
    TruckAdded { id: String },
    TruckUpdated { id: String },
    TruckRemoved { id: String },
    FuelSampled { truck_id: String },
    FuelHistoryCleared { truck_id: Option<String> },
    FiltersChanged,
    PageChanged { page: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventApplyOutcome {
    TruckReplaced { fuel_sampled: bool },
    UnknownTruck,
    FuelSampled,
    Ignored,
}

struct CacheEntry {
    page: Arc<TruckPage>,
    fetched_at: Instant,
}

struct FleetState {
    trucks: Vec<TruckRecord>,
    total: usize,
    page: u32,
    page_size: u32,
    filters: TruckFilters,
    cache: Option<CacheEntry>,
    last_error: Option<String>,
    loading: bool,
    fuel_history: FuelHistory,
}

/// Read-only view of the coordinator's list state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetSnapshot {
    pub trucks: Vec<TruckRecord>,
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
    pub filters: TruckFilters,
    pub loading: bool,
    pub error: Option<String>,
}

fn resolve_timestamp(timestamp: Option<&EventTimestamp>) -> i64 {
    timestamp
        .and_then(EventTimestamp::to_unix_ms)
        .unwrap_or_else(now_unix_ms)
}

/// Single owner of the truck list, fuel history and fetch cache.
pub struct FleetCoordinator {
    state: Mutex<FleetState>,
    changes: broadcast::Sender<FleetChange>,
    cache_ttl: Duration,
}

impl Default for FleetCoordinator {
    fn default() -> Self {
        Self::new(FleetConfig::default())
    }
}

impl FleetCoordinator {
    pub fn new(config: FleetConfig) -> Self {
        let defaults = QueryParams::default();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(FleetState {
                trucks: Vec::new(),
                total: 0,
                page: defaults.page,
                page_size: defaults.page_size,
                filters: TruckFilters::default(),
                cache: None,
                last_error: None,
                loading: false,
                fuel_history: FuelHistory::new(config.max_samples),
            }),
            changes,
            cache_ttl: config.cache_ttl,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: FleetChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }

    pub fn apply_event(&self, event: TelemetryEvent) -> EventApplyOutcome {
        tracing::trace!(kind = event.kind(), "applying telemetry event");
        let (outcome, change) = {
            let mut state = self.state.lock();
            match event {
                TelemetryEvent::TruckUpdate { truck } => {
                    let Some(index) = state.trucks.iter().position(|t| t.id == truck.id) else {
                        tracing::debug!(truck_id = %truck.id, "truck_update for unknown truck dropped");
                        return EventApplyOutcome::UnknownTruck;
                    };

                    let fuel_sampled = match truck.fuel_reading() {
                        Some(level) => {
                            let timestamp =
                                parse_timestamp_ms(&truck.last_seen).unwrap_or_else(now_unix_ms);
                            state.fuel_history.append(&truck.id, timestamp, level);
                            true
                        }
                        None => false,
                    };
                    let id = truck.id.clone();
                    state.trucks[index] = truck;
                    (
                        EventApplyOutcome::TruckReplaced { fuel_sampled },
                        FleetChange::TruckUpdated { id },
                    )
                }
                TelemetryEvent::FuelUpdate {
                    truck_id,
                    timestamp,
                    fuel_level,
                } => {
                    let timestamp = resolve_timestamp(timestamp.as_ref());
                    state.fuel_history.append(&truck_id, timestamp, fuel_level);
                    (
                        EventApplyOutcome::FuelSampled,
                        FleetChange::FuelSampled { truck_id },
                    )
                }
                TelemetryEvent::Unrecognized { kind } => {
                    tracing::trace!(%kind, "unrecognized telemetry event ignored");
                    return EventApplyOutcome::Ignored;
                }
            }
        };

        self.notify(change);
        outcome
    }

    /// Prepends a record created elsewhere.
    pub fn add_record(&self, record: TruckRecord) {
        let id = record.id.clone();
        {
            let mut state = self.state.lock();
            state.trucks.insert(0, record);
            state.total += 1;
        }
        self.notify(FleetChange::TruckAdded { id });
    }

    /// Replaces the record with the same id; returns false when it is not loaded.
    pub fn update_record(&self, record: TruckRecord) -> bool {
        let id = record.id.clone();
        let replaced = {
            let mut state = self.state.lock();
            match state.trucks.iter_mut().find(|t| t.id == record.id) {
                Some(slot) => {
                    *slot = record;
                    true
                }
                None => false,
            }
        };
        if replaced {
            self.notify(FleetChange::TruckUpdated { id });
        }
        replaced
    }

    pub fn patch_record(&self, id: &str, patch: &TruckPatch) -> Option<TruckRecord> {
        let patched = {
            let mut state = self.state.lock();
            state.trucks.iter_mut().find(|t| t.id == id).map(|truck| {
                truck.apply_patch(patch);
                truck.clone()
            })
        };
        if patched.is_some() {
            self.notify(FleetChange::TruckUpdated { id: id.to_string() });
        }
        patched
    }

    pub fn remove_record(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let before = state.trucks.len();
            state.trucks.retain(|t| t.id != id);
            let removed = state.trucks.len() != before;
            if removed {
                state.total = state.total.saturating_sub(1);
            }
            removed
        };
        if removed {
            self.notify(FleetChange::TruckRemoved { id: id.to_string() });
        }
        removed
    }

    /// Without args a fresh cached page is returned as is; any explicit args refetch.
    pub async fn fetch_trucks(
        &self,
        source: &dyn TruckSource,
        args: Option<FetchTrucksArgs>,
    ) -> Result<Arc<TruckPage>, AppError> {
        let params = match args {
            Some(args) => args.normalize()?,
            None => {
                let state = self.state.lock();
                if let Some(cache) = &state.cache {
                    if cache.fetched_at.elapsed() < self.cache_ttl {
                        tracing::debug!(total = cache.page.total, "serving trucks from cache");
                        return Ok(Arc::clone(&cache.page));
                    }
                }
                QueryParams::default()
            }
        };

        {
            let mut state = self.state.lock();
            state.loading = true;
            state.last_error = None;
        }

        match source.fetch(&params).await {
            Ok(page) => {
                let page = Arc::new(page);
                let total = page.total;
                {
                    let mut state = self.state.lock();
                    state.trucks = page.data.clone();
                    state.total = page.total;
                    state.page = page.page;
                    state.page_size = page.page_size;
                    state.cache = Some(CacheEntry {
                        page: Arc::clone(&page),
                        fetched_at: Instant::now(),
                    });
                    state.loading = false;
                }
                tracing::info!(total, page = params.page, sort = %params.sort, "trucks fetched");
                self.notify(FleetChange::TrucksLoaded { total });
                Ok(page)
            }
            Err(error) => {
                let message = error.to_string();
                {
                    let mut state = self.state.lock();
                    state.loading = false;
                    state.last_error = Some(message.clone());
                }
                tracing::warn!(%error, "failed to fetch trucks");
                self.notify(FleetChange::FetchFailed { message });
                Err(error)
            }
        }
    }

    /// Runs a query over the loaded records without touching the source.
    pub fn query(&self, args: FetchTrucksArgs) -> Result<TruckPage, AppError> {
        let params = args.normalize()?;
        let state = self.state.lock();
        Ok(query_trucks(&state.trucks, &params))
    }

    pub fn set_filters(&self, patch: TruckFiltersPatch) -> TruckFilters {
        let filters = {
            let mut state = self.state.lock();
            if let Some(search) = patch.search {
                state.filters.search = search;
            }
            if let Some(status) = patch.status {
                state.filters.status = status;
            }
            if let Some(sort) = patch.sort {
                state.filters.sort = sort;
            }
            state.filters.clone()
        };
        self.notify(FleetChange::FiltersChanged);
        filters
    }

    pub fn set_page(&self, page: u32) -> Result<(), AppError> {
        if page == 0 {
            return Err(AppError::InvalidArgument(
                "page must be at least 1".to_string(),
            ));
        }
        self.state.lock().page = page;
        self.notify(FleetChange::PageChanged { page });
        Ok(())
    }

    /// Filters and page as explicit fetch args.
    pub fn current_args(&self) -> FetchTrucksArgs {
        let state = self.state.lock();
        FetchTrucksArgs::from(&QueryParams {
            page: state.page,
            page_size: state.page_size,
            sort: state.filters.sort.clone(),
            search: state.filters.search.clone(),
            status: state.filters.status.clone(),
        })
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    pub fn clear_error(&self) {
        self.state.lock().last_error = None;
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        let state = self.state.lock();
        FleetSnapshot {
            trucks: state.trucks.clone(),
            total: state.total,
            page: state.page,
            page_size: state.page_size,
            filters: state.filters.clone(),
            loading: state.loading,
            error: state.last_error.clone(),
        }
    }

    pub fn summary(&self) -> FleetSummary {
        FleetSummary::from_trucks(&self.state.lock().trucks)
    }

    pub fn trucks(&self) -> Vec<TruckRecord> {
        self.state.lock().trucks.clone()
    }

    pub fn truck(&self, id: &str) -> Option<TruckRecord> {
        self.state.lock().trucks.iter().find(|t| t.id == id).cloned()
    }

    pub fn fuel_history(&self, truck_id: &str) -> Vec<FuelSample> {
        self.state.lock().fuel_history.samples(truck_id)
    }

    pub fn clear_fuel_history(&self, truck_id: Option<&str>) {
        self.state.lock().fuel_history.clear(truck_id);
        self.notify(FleetChange::FuelHistoryCleared {
            truck_id: truck_id.map(str::to_string),
        });
    }
}

impl TelemetrySink for FleetCoordinator {
    fn on_event(&self, event: TelemetryEvent) {
        self.apply_event(event);
    }

    fn on_error(&self, error: &AppError) {
        tracing::debug!(%error, "telemetry fault ignored by coordinator");
    }
}
