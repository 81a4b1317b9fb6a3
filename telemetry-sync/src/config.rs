use serde::Deserialize;
use std::{fs, time::Duration};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxConfig {
    /// e.g. `http://localhost:8086`
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl InfluxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
    /// When set, every request must carry `Authorization: Bearer <token>`.
    pub auth_bearer_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_unit_tags")]
    pub unit_tag_candidates: Vec<String>,
    #[serde(default = "default_device_tags")]
    pub device_tag_candidates: Vec<String>,
    #[serde(default = "default_value_field")]
    pub value_field: String,
    #[serde(default = "default_meter_concurrency")]
    pub meter_concurrency: usize,
    #[serde(default = "default_true")]
    pub resync_readings_on_reload: bool,
    pub operation_timeout_secs: Option<u64>,
}

impl SyncConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            unit_tag_candidates: default_unit_tags(),
            device_tag_candidates: default_device_tags(),
            value_field: default_value_field(),
            meter_concurrency: default_meter_concurrency(),
            resync_readings_on_reload: true,
            operation_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub postgres: PostgresConfig,
    pub influx: InfluxConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        use std::env;

        let path = env::var("TELEMETRY_SYNC_CONFIG").unwrap_or_else(|_| "telemetry-sync.toml".to_string());
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_unit_tags() -> Vec<String> {
    vec!["unit".to_string(), "jednotka".to_string()]
}

fn default_device_tags() -> Vec<String> {
    ["sn", "serial", "device_id", "t2deveui"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_value_field() -> String {
    "value".to_string()
}

fn default_meter_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}
