pub mod coordinator;
pub mod history;
pub mod query;
pub mod seed;
pub mod simulator;
pub mod socket;
pub mod source;
pub mod types;

use crate::error::AppError;
use types::TelemetryEvent;

/// Receiver for everything the live feed and the fuel simulator produce.
pub trait TelemetrySink: Send + Sync + 'static {
    fn on_event(&self, event: TelemetryEvent);

    fn on_error(&self, error: &AppError);
}
