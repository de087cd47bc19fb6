use crate::common::create_temp_dir;
use iptv_relay::config::Config;
use iptv_relay::core::RelayServices;

fn offline_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = Some(dir.to_path_buf());
    config.vpn.proxy_port = 9;
    config.playlist.allow_direct_fallback = false;
    config
}

#[tokio::test]
async fn test_start_is_idempotent_and_stop_cancels_every_loop() {
    let dir = create_temp_dir();
    let mut services = RelayServices::build(&offline_config(dir.path())).await.unwrap();
    assert!(!services.is_started());

    services.start();
    services.start();
    assert!(services.is_started());

    // Playlist refresh, health run and VPN check loops
    assert_eq!(services.stop().await, 3);
    assert!(!services.is_started());
    assert_eq!(services.stop().await, 0);
}

#[tokio::test]
async fn test_restart_after_stop() {
    let dir = create_temp_dir();
    let mut services = RelayServices::build(&offline_config(dir.path())).await.unwrap();

    services.start();
    services.stop().await;
    services.start();

    assert!(services.is_started());
    assert_eq!(services.stop().await, 3);
}
