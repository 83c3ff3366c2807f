use std::collections::BTreeMap;
use std::env;

use super::types::{ConfigError, Environment};
use crate::services::pending_queue::DrainPolicy;

const DEFAULT_CORS_ORIGINS: &[&str] =
    &["http://localhost:5000", "http://localhost:3000", "http://localhost:8080"];

pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_positive_i32(field: &'static str, value: String) -> Result<i32, ConfigError> {
    match value.parse::<i32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidValue { field, value }),
    }
}

pub(super) fn parse_cors_origins(value: Option<String>) -> Result<Vec<String>, ConfigError> {
    let Some(raw) = value else {
        return Ok(default_cors_origins());
    };

    if raw.trim().is_empty() {
        return Ok(default_cors_origins());
    }

    if raw.trim_start().starts_with('[') {
        let parsed: Vec<String> =
            serde_json::from_str(&raw).map_err(|_| ConfigError::InvalidCors(raw.clone()))?;
        if parsed.is_empty() {
            return Ok(default_cors_origins());
        }
        return Ok(parsed);
    }

    let items: Vec<String> = raw
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        return Ok(default_cors_origins());
    }

    Ok(items)
}

/// `FINAL_TASKS` is a JSON object mapping a group-title prefix to the task ids
/// offered to that group during a final test, e.g. `{"IKBO": [0, 3, 5]}`.
pub(super) fn parse_final_tasks(
    value: Option<String>,
) -> Result<BTreeMap<String, Vec<i32>>, ConfigError> {
    let Some(raw) = value else {
        return Ok(BTreeMap::new());
    };

    serde_json::from_str::<BTreeMap<String, Vec<i32>>>(&raw)
        .map_err(|_| ConfigError::InvalidValue { field: "FINAL_TASKS", value: raw })
}

pub(super) fn parse_drain_policy(value: Option<String>) -> Result<DrainPolicy, ConfigError> {
    match value.as_deref().map(|item| item.to_ascii_lowercase()) {
        None => Ok(DrainPolicy::Full),
        Some(ref val) if val == "full" => Ok(DrainPolicy::Full),
        Some(ref val) if val == "unique" => Ok(DrainPolicy::UniquePerKey),
        Some(val) => Err(ConfigError::InvalidValue { field: "DISPATCHER_DRAIN_POLICY", value: val }),
    }
}

pub(super) fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|item| item.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

fn default_cors_origins() -> Vec<String> {
    DEFAULT_CORS_ORIGINS.iter().map(|item| item.to_string()).collect()
}
