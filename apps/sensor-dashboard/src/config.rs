use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chart::ViewSettings;
use crate::services::aggregator::JoinPolicy;

const DEFAULT_SETUP_CONFIG_PATH: &str = "/etc/sensor-dashboard/config.json";

pub(crate) fn setup_config_path() -> PathBuf {
    env_optional_path("DASHBOARD_SETUP_CONFIG_PATH")
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETUP_CONFIG_PATH))
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    measurement: Option<String>,
    #[serde(default)]
    mqtt_host: Option<String>,
    #[serde(default)]
    mqtt_port: Option<u16>,
    #[serde(default)]
    mqtt_username: Option<String>,
    #[serde(default)]
    mqtt_password: Option<String>,
    #[serde(default)]
    join_policy: Option<String>,
    #[serde(default)]
    refresh_interval_seconds: Option<u64>,
    #[serde(default)]
    resize_debounce_ms: Option<u64>,
}

fn load_setup_config_overrides(path: &Path) -> Option<SetupConfigOverrides> {
    if !path.exists() {
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read setup config; using env defaults"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse setup config; using env defaults"
            );
            None
        }
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Setup-file values fill in what the environment left unset. Credentials
/// present in the file (even empty) replace the env values.
fn apply_setup_overrides(config: &mut DashboardConfig, overrides: &SetupConfigOverrides, env: &EnvPresence) {
    if config.database_url.is_none() {
        config.database_url = trimmed(overrides.database_url.as_deref());
    }
    if !env.measurement {
        if let Some(measurement) = trimmed(overrides.measurement.as_deref()) {
            config.measurement = measurement;
        }
    }
    if !env.mqtt_host {
        if let Some(host) = trimmed(overrides.mqtt_host.as_deref()) {
            config.mqtt_host = host;
        }
    }
    if !env.mqtt_port {
        if let Some(port) = overrides.mqtt_port.filter(|v| *v != 0) {
            config.mqtt_port = port;
        }
    }
    if let Some(username) = overrides.mqtt_username.as_deref() {
        config.mqtt_username = trimmed(Some(username));
    }
    if let Some(password) = overrides.mqtt_password.as_deref() {
        config.mqtt_password = trimmed(Some(password));
    }
    if !env.join_policy {
        if let Some(raw) = overrides.join_policy.as_deref() {
            match raw.parse::<JoinPolicy>() {
                Ok(policy) => config.join_policy = policy,
                Err(err) => tracing::warn!("ignoring setup config join_policy: {err}"),
            }
        }
    }
    if !env.refresh_interval {
        if let Some(secs) = overrides.refresh_interval_seconds.filter(|v| *v != 0) {
            config.view.refresh_interval = Duration::from_secs(secs);
        }
    }
    if !env.resize_debounce {
        if let Some(ms) = overrides.resize_debounce_ms {
            config.view.resize_debounce = Duration::from_millis(ms);
        }
    }
}

/// Which settings were given explicitly through the environment.
#[derive(Debug, Clone, Copy, Default)]
struct EnvPresence {
    measurement: bool,
    mqtt_host: bool,
    mqtt_port: bool,
    join_policy: bool,
    refresh_interval: bool,
    resize_debounce: bool,
}

impl EnvPresence {
    fn detect() -> Self {
        Self {
            measurement: env_optional_string("DASHBOARD_MEASUREMENT").is_some(),
            mqtt_host: env_optional_string("DASHBOARD_MQTT_HOST").is_some(),
            mqtt_port: env_optional_string("DASHBOARD_MQTT_PORT").is_some(),
            join_policy: env_optional_string("DASHBOARD_JOIN_POLICY").is_some(),
            refresh_interval: env_optional_string("DASHBOARD_REFRESH_INTERVAL_SECONDS").is_some(),
            resize_debounce: env_optional_string("DASHBOARD_RESIZE_DEBOUNCE_MS").is_some(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// `None` runs against an unreachable in-memory store.
    pub database_url: Option<String>,
    pub measurement: String,
    pub query_timeout: Duration,
    pub join_policy: JoinPolicy,
    pub production: bool,
    pub demo_mode: bool,
    pub mqtt_client_id: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub static_root: Option<PathBuf>,
    pub view: ViewSettings,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            measurement: "environment".to_string(),
            query_timeout: Duration::from_millis(8_000),
            join_policy: JoinPolicy::default(),
            production: false,
            demo_mode: false,
            mqtt_client_id: "sensor-dashboard".to_string(),
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_username: None,
            mqtt_password: None,
            static_root: None,
            view: ViewSettings::default(),
        }
    }
}

impl DashboardConfig {
    pub fn from_env(cli_static_root: Option<PathBuf>) -> Result<Self> {
        let defaults = Self::default();

        let join_policy = match env_optional_string("DASHBOARD_JOIN_POLICY") {
            Some(raw) => raw
                .parse::<JoinPolicy>()
                .map_err(anyhow::Error::msg)
                .context("DASHBOARD_JOIN_POLICY")?,
            None => defaults.join_policy,
        };
        let query_timeout_ms = env_u64("DASHBOARD_QUERY_TIMEOUT_MS", 8_000).max(1);
        let refresh_interval_seconds = env_u64("DASHBOARD_REFRESH_INTERVAL_SECONDS", 30).max(1);
        let resize_debounce_ms = env_u64("DASHBOARD_RESIZE_DEBOUNCE_MS", 100);
        let static_root = cli_static_root.or_else(|| env_optional_path("DASHBOARD_STATIC_ROOT"));

        let mut config = Self {
            database_url: env_optional_string("DASHBOARD_DATABASE_URL"),
            measurement: env_string("DASHBOARD_MEASUREMENT", &defaults.measurement),
            query_timeout: Duration::from_millis(query_timeout_ms),
            join_policy,
            production: env_string("DASHBOARD_ENV", "development").eq_ignore_ascii_case("production"),
            demo_mode: env_bool("DASHBOARD_DEMO_MODE", false),
            mqtt_client_id: env_string("DASHBOARD_MQTT_CLIENT_ID", &defaults.mqtt_client_id),
            mqtt_host: env_string("DASHBOARD_MQTT_HOST", &defaults.mqtt_host),
            mqtt_port: env_u16("DASHBOARD_MQTT_PORT", defaults.mqtt_port),
            mqtt_username: env_optional_string("DASHBOARD_MQTT_USERNAME"),
            mqtt_password: env_optional_string("DASHBOARD_MQTT_PASSWORD"),
            static_root,
            view: ViewSettings {
                refresh_interval: Duration::from_secs(refresh_interval_seconds),
                resize_debounce: Duration::from_millis(resize_debounce_ms),
            },
        };

        if let Some(overrides) = load_setup_config_overrides(&setup_config_path()) {
            apply_setup_overrides(&mut config, &overrides, &EnvPresence::detect());
        }

        Ok(config)
    }

    /// Internal error text is only returned to clients outside production.
    pub fn expose_error_details(&self) -> bool {
        !self.production
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|value| value.trim().to_lowercase())
    {
        Some(value) if value == "1" || value == "true" || value == "yes" => true,
        Some(value) if value == "0" || value == "false" || value == "no" => false,
        _ => default,
    }
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_optional_path(key: &str) -> Option<PathBuf> {
    env_optional_string(key).map(PathBuf::from)
}
