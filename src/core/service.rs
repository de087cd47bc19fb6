//! Wiring for the long-running relay: one logger, one pair of egress
//! clients, and the four components sharing them.

use crate::config::Config;
use crate::core::debug_logger::DebugLogger;
use crate::core::health::{HealthLog, HealthScheduler, StoreError};
use crate::core::http::{Egress, HttpClientTrait, IsahcHttpClient, TransportError};
use crate::core::playlist::{ChannelSource, PlaylistSource};
use crate::core::stream::{StreamProber, StreamProxy};
use crate::core::vpn::VpnMonitor;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] TransportError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct RelayServices {
    pub logger: Arc<DebugLogger>,
    pub playlist: Arc<PlaylistSource>,
    pub proxy: Arc<StreamProxy>,
    pub health: Arc<HealthScheduler>,
    pub vpn: Arc<VpnMonitor>,
    tasks: Vec<JoinHandle<()>>,
}

impl RelayServices {
    pub async fn build(config: &Config) -> Result<Self, ServiceError> {
        let logger = Arc::new(DebugLogger::from_settings(
            config.logging.debug,
            config.storage.debug_log_path(),
        ));

        let user_agent = config.playlist.user_agent.as_str();
        let vpn_client: Arc<dyn HttpClientTrait> =
            Arc::new(IsahcHttpClient::via_proxy(&config.vpn.proxy_uri(), user_agent)?);
        let direct_client: Option<Arc<dyn HttpClientTrait>> = if config.playlist.allow_direct_fallback {
            Some(Arc::new(IsahcHttpClient::direct(user_agent)?))
        } else {
            None
        };

        let health_log = HealthLog::open(config.storage.health_log_path()).await?;

        let playlist = Arc::new(PlaylistSource::new(
            config.playlist.clone(),
            Egress::new(vpn_client.clone(), direct_client),
            logger.clone(),
        ));
        let vpn = Arc::new(VpnMonitor::new(
            vpn_client.clone(),
            config.vpn.clone(),
            logger.clone(),
        ));
        let proxy = Arc::new(
            StreamProxy::new(vpn_client, config.stream.clone(), logger.clone())
                .with_vpn_monitor(vpn.clone()),
        );
        let health = Arc::new(HealthScheduler::new(
            config.health.clone(),
            playlist.clone() as Arc<dyn ChannelSource>,
            proxy.clone() as Arc<dyn StreamProber>,
            health_log,
            logger.clone(),
        ));

        logger.info(
            "RelayServices",
            "built",
            &format!(
                "proxy={} direct_fallback={} health_records={}",
                config.vpn.proxy_uri(),
                config.playlist.allow_direct_fallback,
                health.record_count().await
            ),
        );

        Ok(Self {
            logger,
            playlist,
            proxy,
            health,
            vpn,
            tasks: Vec::new(),
        })
    }

    /// Start the periodic loops; calling twice is a no-op
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }

        self.tasks.push(self.playlist.clone().spawn_refresh_loop());
        self.tasks.push(self.health.clone().spawn_run_loop());
        self.tasks.push(self.vpn.clone().spawn_check_loop());
        self.logger
            .info("RelayServices", "started", "Background loops running");
    }

    pub fn is_started(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Abort every loop and wait for it to go away; returns how many were cancelled
    ///
    /// An in-progress run is dropped at its next await.
    pub async fn stop(&mut self) -> usize {
        if self.tasks.is_empty() {
            return 0;
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.drain(..).collect();
        for task in &tasks {
            task.abort();
        }

        let mut cancelled = 0;
        for task in tasks {
            match task.await {
                Err(e) if e.is_cancelled() => cancelled += 1,
                Err(e) => self.logger.error("RelayServices", "loop_panicked", &e.to_string()),
                Ok(()) => {}
            }
        }

        self.logger.info(
            "RelayServices",
            "stopped",
            &format!("{} background loops stopped", cancelled),
        );
        cancelled
    }
}

impl Drop for RelayServices {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
