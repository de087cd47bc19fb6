use crate::common::create_temp_dir;
use iptv_relay::config::{Config, ConfigError};
use iptv_relay::core::vpn::GeoProvider;
use std::time::Duration;

#[test]
fn test_defaults_are_valid() {
    let config = Config::default();

    assert!(config.check().is_ok());
    assert_eq!(config.vpn.proxy_uri(), "http://127.0.0.1:8888");
    assert_eq!(config.vpn.geo_providers.len(), 3);
    assert!(config.playlist.allow_direct_fallback);
    assert!(!config.health.discard_history_on_start);
    assert_eq!(config.health.batch_size, 50);
    assert_eq!(config.health.probe_delay(), Duration::from_millis(2000));
    assert_eq!(config.health.freshness_window(), chrono::Duration::hours(24));
    assert_eq!(config.health.retention_window(), chrono::Duration::days(7));
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = Config::from_toml(
        r#"
[vpn]
proxy_host = "gluetun"
proxy_port = 8000
expected_region = "US"
geo_providers = ["ipwho-is", "ip-api"]

[health]
batch_size = 10
"#,
    )
    .unwrap();

    assert_eq!(config.vpn.proxy_uri(), "http://gluetun:8000");
    assert_eq!(config.vpn.expected_region.as_deref(), Some("US"));
    assert_eq!(
        config.vpn.geo_providers,
        vec![GeoProvider::IpWhoIs, GeoProvider::IpApi]
    );
    assert_eq!(config.health.batch_size, 10);
    assert_eq!(config.health.retention_days, 7);
    assert_eq!(config.playlist, Config::default().playlist);
}

#[test]
fn test_unknown_provider_is_rejected() {
    let result = Config::from_toml("[vpn]\ngeo_providers = [\"whatismyip\"]\n");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

fn assert_rejected(name: &str, mutate: impl Fn(&mut Config)) {
    let mut config = Config::default();
    mutate(&mut config);
    assert!(
        matches!(config.check(), Err(ConfigError::Invalid(_))),
        "{} should be rejected",
        name
    );
}

#[test]
fn test_check_rejects_bad_values() {
    assert_rejected("zero batch", |c| c.health.batch_size = 0);
    assert_rejected("ftp playlist", |c| c.playlist.url = "ftp://example.com/list.m3u".to_string());
    assert_rejected("unparseable playlist", |c| c.playlist.url = "not a url".to_string());
    assert_rejected("empty proxy host", |c| c.vpn.proxy_host = " ".to_string());
    assert_rejected("zero proxy port", |c| c.vpn.proxy_port = 0);
    assert_rejected("no providers", |c| c.vpn.geo_providers.clear());
    assert_rejected("zero run interval", |c| c.health.run_interval_secs = 0);
    assert_rejected("zero refresh interval", |c| c.playlist.refresh_interval_secs = 0);
    assert_rejected("zero vpn check interval", |c| c.vpn.check_interval_secs = 0);
    assert_rejected("retention shorter than freshness", |c| {
        c.health.freshness_window_hours = 24 * 30
    });
    assert_rejected("zero chunk", |c| c.stream.chunk_size = 0);
}

#[test]
fn test_init_then_load_round_trip() {
    let dir = create_temp_dir();
    let path = dir.path().join("nested").join("config.toml");

    let written = Config::init(Some(path.as_path())).unwrap();
    assert_eq!(written, path);
    assert!(path.exists());

    let loaded = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(loaded, Config::default());
}

#[test]
fn test_init_does_not_overwrite() {
    let dir = create_temp_dir();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[health]\nbatch_size = 7\n").unwrap();

    Config::init(Some(path.as_path())).unwrap();

    assert_eq!(Config::load(Some(path.as_path())).unwrap().health.batch_size, 7);
}

#[test]
fn test_load_missing_file_yields_defaults() {
    let dir = create_temp_dir();
    let config = Config::load(Some(dir.path().join("missing.toml").as_path())).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_storage_paths_follow_data_dir() {
    let dir = create_temp_dir();
    let mut config = Config::default();
    config.storage.data_dir = Some(dir.path().to_path_buf());

    assert_eq!(config.storage.health_log_path(), dir.path().join("health-log.jsonl"));
    assert_eq!(
        config.storage.debug_log_path(),
        dir.path().join("iptv-relay-debug.log")
    );
}
