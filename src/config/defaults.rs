use super::types::*;
use crate::core::vpn::GeoProvider;

impl Default for Config {
    fn default() -> Self {
        Config {
            vpn: VpnConfig::default(),
            playlist: PlaylistConfig::default(),
            stream: StreamConfig::default(),
            health: HealthConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            proxy_host: "127.0.0.1".to_string(),
            proxy_port: 8888,
            provider: "gluetun".to_string(),
            expected_region: None,
            status_ttl_secs: 300,
            lookup_timeout_ms: 5000,
            check_interval_secs: 300,
            geo_providers: vec![GeoProvider::IpApi, GeoProvider::IpapiCo, GeoProvider::IpWhoIs],
        }
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            url: "https://iptv-org.github.io/iptv/index.m3u".to_string(),
            refresh_interval_secs: 6 * 60 * 60,
            fetch_timeout_secs: 60,
            allow_direct_fallback: true,
            user_agent: format!("iptv-relay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            low_speed_timeout_secs: 20,
            probe_timeout_ms: 5000,
            chunk_size: 64 * 1024,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            run_interval_secs: 30 * 60,
            batch_size: 50,
            probe_delay_ms: 2000,
            freshness_window_hours: 24,
            retention_days: 7,
            startup_delay_secs: 120,
            discard_history_on_start: false,
            history_limit: 20,
        }
    }
}
