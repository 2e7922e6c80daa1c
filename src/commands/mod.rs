pub mod app_info;
pub mod fleet_stream;
pub mod health;
pub mod trucks;
