use crate::common::{base_time, ManualClock, MockHttpClient, MockReply};
use chrono::Duration;
use iptv_relay::config::VpnConfig;
use iptv_relay::core::debug_logger::DebugLogger;
use iptv_relay::core::http::TransportError;
use iptv_relay::core::vpn::{GeoProvider, VpnMonitor};
use std::sync::Arc;

const IP_API_OK: &str = r#"{"status":"success","country":"United States","countryCode":"US","regionName":"California","city":"Los Angeles","isp":"M247 Ltd","query":"203.0.113.7"}"#;
const IPAPI_CO_OK: &str = r#"{"ip":"198.51.100.4","city":"Amsterdam","region":"North Holland","country_code":"NL","country_name":"Netherlands","org":"Datacamp"}"#;
const IPWHO_OK: &str = r#"{"ip":"192.0.2.9","success":true,"city":"Frankfurt","region":"Hesse","country_code":"DE","country":"Germany","connection":{"isp":"Hetzner"}}"#;

fn vpn_config(expected_region: Option<&str>) -> VpnConfig {
    VpnConfig {
        provider: "gluetun".to_string(),
        expected_region: expected_region.map(str::to_string),
        status_ttl_secs: 300,
        ..VpnConfig::default()
    }
}

fn monitor(client: Arc<MockHttpClient>, config: VpnConfig, clock: &ManualClock) -> VpnMonitor {
    VpnMonitor::new(client, config, Arc::new(DebugLogger::disabled())).with_clock(Box::new(clock.clone()))
}

fn all_failing() -> MockHttpClient {
    MockHttpClient::new()
        .with_reply(GeoProvider::IpApi.url(), MockReply::Fail(TransportError::Timeout))
        .with_reply(GeoProvider::IpapiCo.url(), MockReply::status(429, "Too Many Requests"))
        .with_reply(GeoProvider::IpWhoIs.url(), MockReply::failed("connection refused"))
}

#[tokio::test]
async fn test_all_lookups_failing_without_cache() {
    let clock = ManualClock::new(base_time());
    let client = Arc::new(all_failing());
    let monitor = monitor(client.clone(), vpn_config(None), &clock);

    let status = monitor.status().await;

    assert!(!status.connected);
    assert!(!status.stale);
    assert!(status.ip.is_none());
    assert!(status.lookup_source.is_none());
    assert_eq!(status.provider, "gluetun");
    assert_eq!(status.timestamp, base_time());
    assert_eq!(client.total_calls(), 3);
    assert!(monitor.cached().await.is_none());
}

#[tokio::test]
async fn test_first_provider_success() {
    let clock = ManualClock::new(base_time());
    let client = Arc::new(MockHttpClient::new().with_reply(GeoProvider::IpApi.url(), MockReply::ok(IP_API_OK)));
    let monitor = monitor(client.clone(), vpn_config(None), &clock);

    let status = monitor.status().await;

    assert!(status.connected);
    assert_eq!(status.ip.as_deref(), Some("203.0.113.7"));
    assert_eq!(status.location.as_deref(), Some("Los Angeles"));
    assert_eq!(status.region.as_deref(), Some("California"));
    assert_eq!(status.country.as_deref(), Some("US"));
    assert_eq!(status.isp.as_deref(), Some("M247 Ltd"));
    assert_eq!(status.lookup_source, Some(GeoProvider::IpApi));
    assert!(status.in_expected_region.is_none());
    assert_eq!(client.total_calls(), 1);
}

#[tokio::test]
async fn test_falls_through_to_later_providers() {
    let clock = ManualClock::new(base_time());
    let client = Arc::new(
        MockHttpClient::new()
            .with_reply(GeoProvider::IpApi.url(), MockReply::ok(r#"{"status":"fail","message":"quota"}"#))
            .with_reply(GeoProvider::IpapiCo.url(), MockReply::ok("<html>captcha</html>"))
            .with_reply(GeoProvider::IpWhoIs.url(), MockReply::ok(IPWHO_OK)),
    );
    let monitor = monitor(client.clone(), vpn_config(None), &clock);

    let status = monitor.status().await;

    assert!(status.connected);
    assert_eq!(status.lookup_source, Some(GeoProvider::IpWhoIs));
    assert_eq!(status.isp.as_deref(), Some("Hetzner"));
    assert_eq!(client.total_calls(), 3);
}

#[tokio::test]
async fn test_provider_order_follows_config() {
    let clock = ManualClock::new(base_time());
    let client = Arc::new(
        MockHttpClient::new()
            .with_reply(GeoProvider::IpApi.url(), MockReply::ok(IP_API_OK))
            .with_reply(GeoProvider::IpapiCo.url(), MockReply::ok(IPAPI_CO_OK)),
    );
    let config = VpnConfig {
        geo_providers: vec![GeoProvider::IpapiCo, GeoProvider::IpApi],
        ..vpn_config(None)
    };
    let monitor = monitor(client.clone(), config, &clock);

    let status = monitor.status().await;

    assert_eq!(status.lookup_source, Some(GeoProvider::IpapiCo));
    assert_eq!(client.calls_to(GeoProvider::IpApi.url()), 0);
}

#[tokio::test]
async fn test_status_is_cached_within_ttl() {
    let clock = ManualClock::new(base_time());
    let client = Arc::new(MockHttpClient::new().with_reply(GeoProvider::IpApi.url(), MockReply::ok(IP_API_OK)));
    let monitor = monitor(client.clone(), vpn_config(None), &clock);

    let first = monitor.status().await;
    clock.advance(Duration::seconds(299));
    let second = monitor.status().await;

    assert_eq!(first, second);
    assert_eq!(client.total_calls(), 1);

    clock.advance(Duration::seconds(2));
    let third = monitor.status().await;
    assert_eq!(client.total_calls(), 2);
    assert_eq!(third.timestamp, base_time() + Duration::seconds(301));
}

#[tokio::test]
async fn test_refresh_bypasses_cache() {
    let clock = ManualClock::new(base_time());
    let client = Arc::new(MockHttpClient::new().with_reply(GeoProvider::IpApi.url(), MockReply::ok(IP_API_OK)));
    let monitor = monitor(client.clone(), vpn_config(None), &clock);

    monitor.status().await;
    monitor.refresh().await;

    assert_eq!(client.total_calls(), 2);
}

#[tokio::test]
async fn test_stale_cache_served_when_lookups_fail() {
    let clock = ManualClock::new(base_time());
    let client = Arc::new(MockHttpClient::new().with_reply(GeoProvider::IpApi.url(), MockReply::ok(IP_API_OK)));
    let monitor = monitor(client.clone(), vpn_config(None), &clock);
    monitor.status().await;

    clock.advance(Duration::minutes(10));
    client.set_reply(GeoProvider::IpApi.url(), MockReply::Fail(TransportError::Timeout));
    let status = monitor.status().await;

    assert!(status.stale);
    assert!(status.connected);
    assert_eq!(status.ip.as_deref(), Some("203.0.113.7"));
    // Age of the data stays visible
    assert_eq!(status.timestamp, base_time());

    // The cache itself still holds the fresh result, not the stale copy
    assert!(!monitor.cached().await.unwrap().stale);
}

#[tokio::test]
async fn test_expected_region_matching() {
    let clock = ManualClock::new(base_time());
    let client = Arc::new(MockHttpClient::new().with_reply(GeoProvider::IpApi.url(), MockReply::ok(IP_API_OK)));

    for (expected, matches) in [("us", true), ("California", true), ("United States", true), ("GB", false)] {
        let monitor = monitor(client.clone(), vpn_config(Some(expected)), &clock);
        let status = monitor.refresh().await;

        assert_eq!(status.expected_region.as_deref(), Some(expected));
        assert_eq!(status.in_expected_region, Some(matches), "expected {}", expected);
    }
}

#[tokio::test]
async fn test_concurrent_status_calls_share_one_lookup() {
    let clock = ManualClock::new(base_time());
    let client = Arc::new(MockHttpClient::new().with_reply(GeoProvider::IpApi.url(), MockReply::ok(IP_API_OK)));
    let monitor = Arc::new(monitor(client.clone(), vpn_config(None), &clock));

    let (a, b, c) = tokio::join!(monitor.status(), monitor.status(), monitor.status());

    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(client.total_calls(), 1);
}

#[test]
fn test_status_serializes_provider_names() {
    let status_json = serde_json::json!({
        "connected": true,
        "ip": "203.0.113.7",
        "location": null,
        "region": null,
        "country": "US",
        "provider": "gluetun",
        "isp": null,
        "expected_region": null,
        "in_expected_region": null,
        "lookup_source": "ipwho-is",
        "timestamp": "2024-03-01T12:00:00Z"
    });

    let status: iptv_relay::core::vpn::VpnStatus = serde_json::from_value(status_json).unwrap();
    assert_eq!(status.lookup_source, Some(GeoProvider::IpWhoIs));
    assert!(!status.stale);
}
