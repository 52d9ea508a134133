use meter_client::{api::BackendRoutes, domain::AsOf};
use serde::Deserialize;
use std::fs;

use crate::render_tier::TierThresholds;

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(flatten)]
    pub routes: BackendRoutes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistrictsConfig {
    /// Local path or http(s) URL of the boundary GeoJSON.
    pub source: String,
    #[serde(default = "default_id_property")]
    pub id_property: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_record_limit")]
    pub record_limit: u32,
    /// Upper bound for a single viewport fetch. Unset means wait forever.
    #[serde(default)]
    pub fetch_timeout_ms: Option<u64>,
    #[serde(default = "default_focus_zoom")]
    pub focus_zoom: u8,
    #[serde(default = "default_heat_min_zoom")]
    pub heat_min_zoom: u8,
    #[serde(default = "default_marker_min_zoom")]
    pub marker_min_zoom: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            record_limit: default_record_limit(),
            fetch_timeout_ms: None,
            focus_zoom: default_focus_zoom(),
            heat_min_zoom: default_heat_min_zoom(),
            marker_min_zoom: default_marker_min_zoom(),
        }
    }
}

impl EngineConfig {
    pub fn thresholds(&self) -> anyhow::Result<TierThresholds> {
        TierThresholds::new(self.heat_min_zoom, self.marker_min_zoom)
            .map_err(|e| anyhow::anyhow!("invalid engine zoom thresholds: {e}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

/// Replay driver settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// NDJSON session file; stdin when unset.
    #[serde(default)]
    pub path: Option<String>,
    /// Starting point in time; the current UTC minute when unset.
    #[serde(default)]
    pub as_of: Option<AsOf>,
    #[serde(default)]
    pub district_id: Option<String>,
    /// How long to keep the engine running after the last event.
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: None,
            as_of: None,
            district_id: None,
            linger_ms: default_linger_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub districts: Option<DistrictsConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_id_property() -> String {
    "name".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_record_limit() -> u32 {
    10_000
}

fn default_focus_zoom() -> u8 {
    18
}

fn default_linger_ms() -> u64 {
    2_000
}

fn default_heat_min_zoom() -> u8 {
    10
}

fn default_marker_min_zoom() -> u8 {
    14
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("MAP_SYNC_CONFIG").unwrap_or_else(|_| "map-sync.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.engine.thresholds()?;
        Ok(cfg)
    }
}
