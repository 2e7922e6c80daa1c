use crate::error::AppError;
use crate::fleet::types::{
    DeliveryStat, FetchTrucksArgs, FleetSummary, FuelSample, TruckDraft, TruckLocation, TruckPage,
    TruckPatch, TruckRecord,
};
use crate::state::AppState;
use chrono::{SecondsFormat, Utc};
use std::sync::Arc;

fn require_id(id: &str) -> Result<&str, AppError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidArgument(
            "truck id must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// `None` serves a fresh cached page; explicit args always hit the source.
pub async fn fetch_trucks(
    state: &AppState,
    args: Option<FetchTrucksArgs>,
) -> Result<Arc<TruckPage>, AppError> {
    state
        .coordinator
        .fetch_trucks(state.source.as_ref(), args)
        .await
}

/// Refetches with the current filters and page.
pub async fn refresh_trucks(state: &AppState) -> Result<Arc<TruckPage>, AppError> {
    let args = state.coordinator.current_args();
    fetch_trucks(state, Some(args)).await
}

pub async fn fetch_truck(state: &AppState, id: &str) -> Result<TruckRecord, AppError> {
    let id = require_id(id)?;
    state.source.fetch_by_id(id).await
}

pub async fn create_truck(state: &AppState, draft: TruckDraft) -> Result<TruckRecord, AppError> {
    let created = state.source.create(draft).await?;
    state.coordinator.add_record(created.clone());
    tracing::info!(truck_id = %created.id, "truck created");
    Ok(created)
}

pub async fn update_truck(
    state: &AppState,
    id: &str,
    patch: TruckPatch,
) -> Result<TruckRecord, AppError> {
    let id = require_id(id)?;
    let updated = state.source.update(id, &patch).await?;
    state.coordinator.update_record(updated.clone());
    Ok(updated)
}

/// Moves a truck and stamps `lastSeen` with the current time.
pub async fn update_truck_location(
    state: &AppState,
    id: &str,
    location: TruckLocation,
) -> Result<TruckRecord, AppError> {
    let patch = TruckPatch {
        location: Some(location),
        last_seen: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        ..TruckPatch::default()
    };
    update_truck(state, id, patch).await
}

pub async fn delete_truck(state: &AppState, id: &str) -> Result<(), AppError> {
    let id = require_id(id)?;
    state.source.delete(id).await?;
    state.coordinator.remove_record(id);
    tracing::info!(truck_id = %id, "truck deleted");
    Ok(())
}

pub async fn fuel_history(state: &AppState, truck_id: &str) -> Result<Vec<FuelSample>, AppError> {
    Ok(state.coordinator.fuel_history(truck_id))
}

pub async fn clear_fuel_history(state: &AppState, truck_id: Option<&str>) -> Result<(), AppError> {
    state.coordinator.clear_fuel_history(truck_id);
    Ok(())
}

pub async fn fleet_summary(state: &AppState) -> Result<FleetSummary, AppError> {
    Ok(state.coordinator.summary())
}

/// Daily delivery counts straight from the source; not cached.
pub async fn delivery_stats(state: &AppState) -> Result<Vec<DeliveryStat>, AppError> {
    state.source.fetch_delivery_stats().await
}
