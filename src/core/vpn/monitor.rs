//! Egress identity and location checks

use super::providers::{GeoLookup, GeoProvider};
use crate::config::VpnConfig;
use crate::core::debug_logger::DebugLogger;
use crate::core::http::HttpClientTrait;
use crate::core::types::{ClockTrait, SystemClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpnStatus {
    pub connected: bool,
    pub ip: Option<String>,
    /// City
    pub location: Option<String>,
    pub region: Option<String>,
    /// ISO country code
    pub country: Option<String>,
    /// Configured VPN provider label
    pub provider: String,
    pub isp: Option<String>,
    pub expected_region: Option<String>,
    /// `None` when no expected region is configured
    pub in_expected_region: Option<bool>,
    pub lookup_source: Option<GeoProvider>,
    /// Time of the lookup that produced this data
    pub timestamp: DateTime<Utc>,
    /// Served from cache because every lookup just failed
    #[serde(default)]
    pub stale: bool,
}

impl VpnStatus {
    fn disconnected(config: &VpnConfig, now: DateTime<Utc>) -> Self {
        Self {
            connected: false,
            ip: None,
            location: None,
            region: None,
            country: None,
            provider: config.provider.clone(),
            isp: None,
            expected_region: config.expected_region.clone(),
            in_expected_region: None,
            lookup_source: None,
            timestamp: now,
            stale: false,
        }
    }

    fn from_lookup(config: &VpnConfig, provider: GeoProvider, geo: GeoLookup, now: DateTime<Utc>) -> Self {
        let in_expected_region = config
            .expected_region
            .as_deref()
            .map(|expected| region_matches(expected, &geo));

        Self {
            connected: true,
            ip: Some(geo.ip),
            location: geo.city,
            region: geo.region,
            country: geo.country_code,
            provider: config.provider.clone(),
            isp: geo.isp,
            expected_region: config.expected_region.clone(),
            in_expected_region,
            lookup_source: Some(provider),
            timestamp: now,
            stale: false,
        }
    }
}

/// Expected region may be a country code, country name or region name
fn region_matches(expected: &str, geo: &GeoLookup) -> bool {
    let expected = expected.trim();
    [&geo.country_code, &geo.country, &geo.region]
        .iter()
        .filter_map(|field| field.as_deref())
        .any(|value| value.eq_ignore_ascii_case(expected))
}

pub struct VpnMonitor {
    client: Arc<dyn HttpClientTrait>,
    config: VpnConfig,
    cache: Mutex<Option<VpnStatus>>,
    clock: Box<dyn ClockTrait>,
    logger: Arc<DebugLogger>,
}

impl VpnMonitor {
    /// `client` must be the VPN-routed client: the point is to see the egress address
    pub fn new(client: Arc<dyn HttpClientTrait>, config: VpnConfig, logger: Arc<DebugLogger>) -> Self {
        Self {
            client,
            config,
            cache: Mutex::new(None),
            clock: Box::new(SystemClock),
            logger,
        }
    }

    /// Configure VpnMonitor with custom clock (for testing)
    pub fn with_clock(mut self, clock: Box<dyn ClockTrait>) -> Self {
        self.clock = clock;
        self
    }

    /// Cached status within the TTL, otherwise a fresh lookup. Never fails.
    pub async fn status(&self) -> VpnStatus {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            let ttl = chrono::Duration::from_std(self.config.status_ttl())
                .unwrap_or_else(|_| chrono::Duration::zero());
            if self.clock.now() - cached.timestamp < ttl {
                return cached.clone();
            }
        }

        self.lookup_locked(&mut cache).await
    }

    /// Bypass the cache
    pub async fn refresh(&self) -> VpnStatus {
        let mut cache = self.cache.lock().await;
        self.lookup_locked(&mut cache).await
    }

    pub async fn cached(&self) -> Option<VpnStatus> {
        self.cache.lock().await.clone()
    }

    /// Try each provider in order; on total failure fall back to stale cache
    async fn lookup_locked(&self, cache: &mut Option<VpnStatus>) -> VpnStatus {
        for &provider in &self.config.geo_providers {
            let Some(geo) = self.lookup(provider).await else {
                continue;
            };

            let status = VpnStatus::from_lookup(&self.config, provider, geo, self.clock.now());
            if status.in_expected_region == Some(false) {
                self.logger.error(
                    "VpnMonitor",
                    "unexpected_region",
                    &format!(
                        "Egress resolved to {:?}/{:?}, expected {:?}",
                        status.country, status.region, status.expected_region
                    ),
                );
            }
            *cache = Some(status.clone());
            return status;
        }

        match cache.as_ref() {
            Some(previous) => VpnStatus {
                stale: true,
                ..previous.clone()
            },
            None => VpnStatus::disconnected(&self.config, self.clock.now()),
        }
    }

    async fn lookup(&self, provider: GeoProvider) -> Option<GeoLookup> {
        let response = match self.client.get(provider.url(), self.config.lookup_timeout()).await {
            Ok(response) => response,
            Err(e) => {
                self.logger.vpn_lookup(provider.name(), false, &e.to_string());
                return None;
            }
        };

        if response.status != 200 {
            self.logger
                .vpn_lookup(provider.name(), false, &format!("HTTP {}", response.status));
            return None;
        }

        match provider.parse(&response.body) {
            Some(geo) => {
                self.logger.vpn_lookup(provider.name(), true, &geo.ip);
                Some(geo)
            }
            None => {
                self.logger
                    .vpn_lookup(provider.name(), false, "unrecognized response body");
                None
            }
        }
    }

    /// Refresh on every `check_interval`, starting now
    pub fn spawn_check_loop(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.check_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }
}
