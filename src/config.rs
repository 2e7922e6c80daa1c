use crate::error::AppError;
use crate::fleet::coordinator::{FleetConfig, DEFAULT_CACHE_TTL};
use crate::fleet::history::DEFAULT_MAX_SAMPLES;
use crate::fleet::source::DEFAULT_API_BASE_URL;
use crate::fleet::types::{SocketClientConfig, StartLiveFeedArgs, DEFAULT_FEED_URL};
use std::str::FromStr;
use std::time::Duration;

pub const API_URL_VAR: &str = "FLEET_API_URL";
pub const WS_URL_VAR: &str = "FLEET_WS_URL";
pub const MOCK_API_VAR: &str = "FLEET_MOCK_API";
pub const MOCK_FUEL_VAR: &str = "FLEET_MOCK_FUEL";
pub const RECONNECT_INTERVAL_VAR: &str = "FLEET_RECONNECT_INTERVAL_MS";
pub const MAX_RECONNECT_ATTEMPTS_VAR: &str = "FLEET_MAX_RECONNECT_ATTEMPTS";
pub const FUEL_HISTORY_SAMPLES_VAR: &str = "FLEET_FUEL_HISTORY_SAMPLES";
pub const CACHE_TTL_VAR: &str = "FLEET_CACHE_TTL_SECS";

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub api_url: String,
    pub mock_api: bool,
    pub mock_fuel: bool,
    pub feed: SocketClientConfig,
    pub fleet: FleetConfig,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_flag(name: &str, value: Option<String>, default: bool) -> Result<bool, AppError> {
    let Some(value) = non_empty(value) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::InvalidArgument(format!(
            "{name} must be a boolean, got {value:?}"
        ))),
    }
}

fn parse_number<T: FromStr>(name: &str, value: Option<String>) -> Result<Option<T>, AppError> {
    non_empty(value)
        .map(|value| {
            value.parse::<T>().map_err(|_| {
                AppError::InvalidArgument(format!("{name} must be a number, got {value:?}"))
            })
        })
        .transpose()
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let api_url =
            non_empty(lookup(API_URL_VAR)).unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let feed = StartLiveFeedArgs {
            url: Some(
                non_empty(lookup(WS_URL_VAR)).unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            ),
            reconnect_interval_ms: parse_number(
                RECONNECT_INTERVAL_VAR,
                lookup(RECONNECT_INTERVAL_VAR),
            )?,
            max_reconnect_attempts: parse_number(
                MAX_RECONNECT_ATTEMPTS_VAR,
                lookup(MAX_RECONNECT_ATTEMPTS_VAR),
            )?,
        }
        .normalize()?;

        let max_samples = parse_number::<usize>(
            FUEL_HISTORY_SAMPLES_VAR,
            lookup(FUEL_HISTORY_SAMPLES_VAR),
        )?
        .unwrap_or(DEFAULT_MAX_SAMPLES);
        if max_samples == 0 {
            return Err(AppError::InvalidArgument(format!(
                "{FUEL_HISTORY_SAMPLES_VAR} must be at least 1"
            )));
        }

        let cache_ttl = parse_number::<u64>(CACHE_TTL_VAR, lookup(CACHE_TTL_VAR))?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL);

        Ok(Self {
            api_url,
            mock_api: parse_flag(MOCK_API_VAR, lookup(MOCK_API_VAR), true)?,
            mock_fuel: parse_flag(MOCK_FUEL_VAR, lookup(MOCK_FUEL_VAR), false)?,
            feed,
            fleet: FleetConfig {
                max_samples,
                cache_ttl,
            },
        })
    }
}
