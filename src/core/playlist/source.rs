//! Playlist fetching and snapshot ownership

use super::index::{Catalog, ChannelIndex};
use super::parser;
use crate::config::PlaylistConfig;
use crate::core::debug_logger::DebugLogger;
use crate::core::http::{Egress, HttpClientTrait};
use crate::core::types::{ClockTrait, InFlightGuard, SystemClock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// The catalogue currently served to readers, replaced as a whole
#[derive(Debug, Clone, Default)]
pub struct PlaylistSnapshot {
    pub index: ChannelIndex,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Error from the most recent failed refresh, cleared on success
    pub last_error: Option<String>,
    /// Whether the catalogue in `index` came through the VPN
    pub fetched_via_vpn: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Updated { channels: usize, fetched_via_vpn: bool },
    /// Fetch or parse failed; the previous snapshot is still served
    Failed { error: String },
    /// Another refresh was in flight; this call did nothing
    AlreadyRefreshing,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistStatus {
    pub source_url: String,
    pub channel_count: usize,
    pub category_count: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub fetched_via_vpn: Option<bool>,
    pub refreshing: bool,
}

/// Anything that can hand out the current channel catalogue
pub trait ChannelSource: Send + Sync {
    fn current_index(&self) -> ChannelIndex;
}

impl ChannelSource for ChannelIndex {
    fn current_index(&self) -> ChannelIndex {
        self.clone()
    }
}

/// Owner of the playlist snapshot; the only component that replaces it
pub struct PlaylistSource {
    config: PlaylistConfig,
    egress: Egress,
    snapshot: RwLock<Arc<PlaylistSnapshot>>,
    refreshing: AtomicBool,
    logger: Arc<DebugLogger>,
    clock: Box<dyn ClockTrait>,
}

impl PlaylistSource {
    pub fn new(config: PlaylistConfig, egress: Egress, logger: Arc<DebugLogger>) -> Self {
        Self {
            config,
            egress,
            snapshot: RwLock::new(Arc::new(PlaylistSnapshot::default())),
            refreshing: AtomicBool::new(false),
            logger,
            clock: Box::new(SystemClock),
        }
    }

    /// Configure PlaylistSource with custom clock (for testing)
    pub fn with_clock(mut self, clock: Box<dyn ClockTrait>) -> Self {
        self.clock = clock;
        self
    }

    pub fn snapshot(&self) -> Arc<PlaylistSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn index(&self) -> ChannelIndex {
        self.snapshot().index.clone()
    }

    pub fn status(&self) -> PlaylistStatus {
        let snapshot = self.snapshot();
        PlaylistStatus {
            source_url: self.config.url.clone(),
            channel_count: snapshot.index.len(),
            category_count: snapshot.index.categories().len(),
            fetched_at: snapshot.fetched_at,
            last_error: snapshot.last_error.clone(),
            fetched_via_vpn: snapshot.fetched_via_vpn,
            refreshing: self.refreshing.load(Ordering::Acquire),
        }
    }

    /// Fetch, parse and swap in a new catalogue
    ///
    /// Concurrent calls do not queue: while one refresh runs, others
    /// return [`RefreshOutcome::AlreadyRefreshing`].
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.refreshing) else {
            self.logger
                .debug("PlaylistSource", "refresh_skipped", "Refresh already in progress");
            return RefreshOutcome::AlreadyRefreshing;
        };

        let start = Instant::now();
        let result = self.fetch_text().await.and_then(|(text, via_vpn)| {
            let parsed = parser::parse_playlist(&text);
            if parsed.channels.is_empty() {
                Err("Playlist contained no usable channels".to_string())
            } else {
                Ok((parsed, via_vpn))
            }
        });
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok((parsed, via_vpn)) => {
                let channels = parsed.channels.len();
                let snapshot = PlaylistSnapshot {
                    index: ChannelIndex::new(Arc::new(Catalog::new(parsed))),
                    fetched_at: Some(self.clock.now()),
                    last_error: None,
                    fetched_via_vpn: Some(via_vpn),
                };
                self.replace_snapshot(snapshot);

                self.logger
                    .playlist_refresh("updated", channels, Some(via_vpn), duration_ms, None);
                RefreshOutcome::Updated {
                    channels,
                    fetched_via_vpn: via_vpn,
                }
            }
            Err(error) => {
                let previous = self.snapshot();
                let snapshot = PlaylistSnapshot {
                    last_error: Some(error.clone()),
                    ..(*previous).clone()
                };
                self.replace_snapshot(snapshot);

                self.logger.playlist_refresh(
                    "failed",
                    previous.index.len(),
                    None,
                    duration_ms,
                    Some(&error),
                );
                RefreshOutcome::Failed { error }
            }
        }
    }

    /// Refresh immediately, then on every `refresh_interval`
    pub fn spawn_refresh_loop(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.refresh_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.refresh().await;
            }
        })
    }

    fn replace_snapshot(&self, snapshot: PlaylistSnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// VPN first; direct only when both configured and permitted
    async fn fetch_text(&self) -> Result<(String, bool), String> {
        let timeout = self.config.fetch_timeout();

        let vpn_error = match fetch_via(self.egress.vpn.as_ref(), &self.config.url, timeout).await {
            Ok(text) => return Ok((text, true)),
            Err(e) => e,
        };

        let direct = match (&self.egress.direct, self.config.allow_direct_fallback) {
            (Some(direct), true) => direct,
            _ => return Err(format!("VPN fetch failed: {}", vpn_error)),
        };

        self.logger.error(
            "PlaylistSource",
            "direct_fallback",
            &format!("VPN fetch failed ({}), retrying over direct connection", vpn_error),
        );

        fetch_via(direct.as_ref(), &self.config.url, timeout)
            .await
            .map(|text| (text, false))
            .map_err(|direct_error| {
                format!(
                    "VPN fetch failed: {}; direct fetch failed: {}",
                    vpn_error, direct_error
                )
            })
    }
}

impl ChannelSource for PlaylistSource {
    fn current_index(&self) -> ChannelIndex {
        self.index()
    }
}

async fn fetch_via(client: &dyn HttpClientTrait, url: &str, timeout: Duration) -> Result<String, String> {
    let response = client.get(url, timeout).await.map_err(|e| e.to_string())?;
    if !(200..300).contains(&response.status) {
        return Err(format!("HTTP {}", response.status));
    }
    Ok(String::from_utf8_lossy(&response.body).into_owned())
}
