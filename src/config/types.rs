use crate::core::vpn::GeoProvider;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level relay configuration, loaded from `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub vpn: VpnConfig,
    pub playlist: PlaylistConfig,
    pub stream: StreamConfig,
    pub health: HealthConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Egress proxy and geolocation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VpnConfig {
    /// HTTP proxy exposed by the VPN container
    pub proxy_host: String,
    pub proxy_port: u16,
    /// VPN provider label reported in status snapshots
    pub provider: String,
    /// Country code or region name the egress is expected to resolve to
    pub expected_region: Option<String>,
    pub status_ttl_secs: u64,
    pub lookup_timeout_ms: u64,
    pub check_interval_secs: u64,
    /// Geolocation services, tried in order
    pub geo_providers: Vec<GeoProvider>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaylistConfig {
    pub url: String,
    pub refresh_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    /// Retry a failed VPN fetch over the direct connection (exposes the real IP)
    pub allow_direct_fallback: bool,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub connect_timeout_ms: u64,
    /// Abort a relay when the origin stalls below 1 byte/s for this long
    pub low_speed_timeout_secs: u64,
    pub probe_timeout_ms: u64,
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    pub run_interval_secs: u64,
    pub batch_size: usize,
    pub probe_delay_ms: u64,
    pub freshness_window_hours: u64,
    pub retention_days: u64,
    pub startup_delay_secs: u64,
    /// Drop all stored health records when the process starts
    pub discard_history_on_start: bool,
    /// Records returned by per-channel history queries
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for the health log and debug log (defaults to the user data dir)
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub debug: bool,
}

impl VpnConfig {
    pub fn proxy_uri(&self) -> String {
        format!("http://{}:{}", self.proxy_host, self.proxy_port)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

impl PlaylistConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl StreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn low_speed_timeout(&self) -> Duration {
        Duration::from_secs(self.low_speed_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl HealthConfig {
    pub fn run_interval(&self) -> Duration {
        Duration::from_secs(self.run_interval_secs)
    }

    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.freshness_window_hours as i64)
    }

    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days as i64)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

impl StorageConfig {
    pub fn resolve_data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("iptv-relay"),
        }
    }

    pub fn health_log_path(&self) -> PathBuf {
        self.resolve_data_dir().join("health-log.jsonl")
    }

    pub fn debug_log_path(&self) -> PathBuf {
        self.resolve_data_dir().join("iptv-relay-debug.log")
    }
}
