/*!
Rolling, rate-limit-aware channel health scheduler.

Thousands of channels sit behind one egress whose origins throttle
aggressively, so each run probes only a bounded slice of the catalogue:

1. Channels with no record, or whose latest record is older than the
   freshness window, are due. Never-probed channels go first (playlist
   order), then stale ones oldest-first.
2. With nothing due, the globally oldest-checked channels are taken instead,
   so steady state still cycles through the whole catalogue.
3. At most `batch_size` channels are probed, one at a time, with a fixed
   pause between probes. The remainder waits for a later run.
4. Every result is appended to the health log as soon as it arrives.
5. After the batch, records older than the retention window are pruned,
   keeping each channel's latest record.

Only one run is ever active; a trigger that lands mid-run is dropped.
*/

use super::store::HealthLog;
use crate::config::HealthConfig;
use crate::core::debug_logger::DebugLogger;
use crate::core::playlist::ChannelSource;
use crate::core::stream::StreamProber;
use crate::core::types::{Channel, ClockTrait, HealthRecord, HealthStatus, InFlightGuard, SystemClock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub probed: usize,
    pub online: usize,
    pub offline: usize,
    pub error: usize,
    /// Due channels left for later runs
    pub backlog: usize,
    pub pruned: usize,
    /// Whether nothing was due and the oldest-checked set was used
    pub round_robin: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// A run was already active; nothing was started
    AlreadyRunning,
}

/// Catalogue-wide health, computed from each channel's latest record only
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthReport {
    pub total_channels: usize,
    pub checked: usize,
    pub unchecked: usize,
    pub online: usize,
    pub offline: usize,
    pub error: usize,
    pub online_ratio: f64,
    pub avg_latency_ms: Option<u64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelHealth {
    pub channel_id: String,
    pub current: Option<HealthRecord>,
    /// Newest first
    pub history: Vec<HealthRecord>,
}

/// Channels chosen for one run
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSelection {
    pub channels: Vec<Channel>,
    pub backlog: usize,
    pub round_robin: bool,
}

/// Pick the channels to probe next
pub fn select_batch(
    channels: &[Channel],
    log: &HealthLog,
    now: DateTime<Utc>,
    freshness_window: chrono::Duration,
    batch_size: usize,
) -> BatchSelection {
    let fresh_after = now - freshness_window;

    let mut never_checked: Vec<&Channel> = Vec::new();
    let mut stale: Vec<(&Channel, DateTime<Utc>)> = Vec::new();
    for channel in channels {
        match log.latest(&channel.id) {
            None => never_checked.push(channel),
            Some(record) if record.checked_at < fresh_after => stale.push((channel, record.checked_at)),
            Some(_) => {}
        }
    }
    stale.sort_by_key(|(_, checked_at)| *checked_at);

    let due: Vec<&Channel> = never_checked
        .into_iter()
        .chain(stale.into_iter().map(|(channel, _)| channel))
        .collect();

    if !due.is_empty() {
        let backlog = due.len().saturating_sub(batch_size);
        return BatchSelection {
            channels: due.into_iter().take(batch_size).cloned().collect(),
            backlog,
            round_robin: false,
        };
    }

    let mut oldest: Vec<(&Channel, Option<DateTime<Utc>>)> = channels
        .iter()
        .map(|channel| (channel, log.latest(&channel.id).map(|r| r.checked_at)))
        .collect();
    oldest.sort_by_key(|(_, checked_at)| *checked_at);

    BatchSelection {
        channels: oldest
            .into_iter()
            .take(batch_size)
            .map(|(channel, _)| channel.clone())
            .collect(),
        backlog: 0,
        round_robin: true,
    }
}

pub struct HealthScheduler {
    config: HealthConfig,
    channels: Arc<dyn ChannelSource>,
    prober: Arc<dyn StreamProber>,
    log: RwLock<HealthLog>,
    running: AtomicBool,
    clock: Box<dyn ClockTrait>,
    logger: Arc<DebugLogger>,
}

impl HealthScheduler {
    pub fn new(
        config: HealthConfig,
        channels: Arc<dyn ChannelSource>,
        prober: Arc<dyn StreamProber>,
        log: HealthLog,
        logger: Arc<DebugLogger>,
    ) -> Self {
        Self {
            config,
            channels,
            prober,
            log: RwLock::new(log),
            running: AtomicBool::new(false),
            clock: Box::new(SystemClock),
            logger,
        }
    }

    /// Configure HealthScheduler with custom clock (for testing)
    pub fn with_clock(mut self, clock: Box<dyn ClockTrait>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Records currently held, across all channels
    pub async fn record_count(&self) -> usize {
        self.log.read().await.len()
    }

    /// Probe the next batch; returns immediately if a run is already active
    ///
    /// Probe failures become failed records; nothing here propagates an error.
    pub async fn run_health_check(&self) -> RunOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.running) else {
            self.logger
                .debug("HealthScheduler", "run_skipped", "Health run already in progress");
            return RunOutcome::AlreadyRunning;
        };

        let run_id = format!("run_{}", &uuid::Uuid::new_v4().to_string()[..8]);
        let started_at = self.clock.now();
        let index = self.channels.current_index();

        let selection = {
            let log = self.log.read().await;
            select_batch(
                index.channels(),
                &log,
                started_at,
                self.config.freshness_window(),
                self.config.batch_size,
            )
        };

        let mut summary = RunSummary {
            run_id: run_id.clone(),
            probed: 0,
            online: 0,
            offline: 0,
            error: 0,
            backlog: selection.backlog,
            pruned: 0,
            round_robin: selection.round_robin,
            started_at,
            finished_at: started_at,
        };

        let delay = self.config.probe_delay();
        for (i, channel) in selection.channels.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let record = self
                .prober
                .probe(&channel.url)
                .await
                .into_record(&channel.id, self.clock.now());

            summary.probed += 1;
            match record.status {
                HealthStatus::Online => summary.online += 1,
                HealthStatus::Offline => summary.offline += 1,
                HealthStatus::Error => summary.error += 1,
            }
            self.logger.health_probe(&record, &run_id);

            if let Err(e) = self.log.write().await.append(record).await {
                self.logger
                    .error("HealthScheduler", "persist_failed", &e.to_string());
            }
        }

        summary.pruned = self.prune().await;
        summary.finished_at = self.clock.now();

        self.logger.health_run_summary(
            &run_id,
            summary.probed,
            summary.online,
            summary.backlog,
            summary.pruned,
        );
        RunOutcome::Completed(summary)
    }

    /// Drop expired records, never a channel's latest one
    async fn prune(&self) -> usize {
        let cutoff = self.clock.now() - self.config.retention_window();
        match self.log.write().await.prune(cutoff).await {
            Ok(removed) => removed,
            Err(e) => {
                self.logger
                    .error("HealthScheduler", "prune_failed", &e.to_string());
                0
            }
        }
    }

    /// Aggregate over the current catalogue; O(channels)
    pub async fn get_health_report(&self) -> HealthReport {
        let index = self.channels.current_index();
        let log = self.log.read().await;

        let mut report = HealthReport {
            total_channels: index.len(),
            running: self.is_running(),
            ..HealthReport::default()
        };

        let mut latency_sum: u64 = 0;
        let mut latency_samples: u64 = 0;
        for channel in index.channels() {
            let Some(record) = log.latest(&channel.id) else {
                continue;
            };

            report.checked += 1;
            match record.status {
                HealthStatus::Online => report.online += 1,
                HealthStatus::Offline => report.offline += 1,
                HealthStatus::Error => report.error += 1,
            }
            if let Some(latency) = record.latency_ms {
                latency_sum += latency;
                latency_samples += 1;
            }
            if report.last_checked_at.map_or(true, |last| record.checked_at > last) {
                report.last_checked_at = Some(record.checked_at);
            }
        }

        report.unchecked = report.total_channels - report.checked;
        if report.checked > 0 {
            report.online_ratio = report.online as f64 / report.checked as f64;
        }
        if latency_samples > 0 {
            report.avg_latency_ms = Some(latency_sum / latency_samples);
        }
        report
    }

    pub async fn get_channel_health(&self, channel_id: &str) -> ChannelHealth {
        let log = self.log.read().await;
        ChannelHealth {
            channel_id: channel_id.to_string(),
            current: log.latest(channel_id).cloned(),
            history: log.history(channel_id, self.config.history_limit),
        }
    }

    /// Forget all stored health; used at startup when configured to
    pub async fn discard_history(&self) {
        match self.log.write().await.clear().await {
            Ok(()) => self
                .logger
                .info("HealthScheduler", "history_discarded", "Stored health history discarded"),
            Err(e) => self
                .logger
                .error("HealthScheduler", "discard_failed", &e.to_string()),
        }
    }

    /// Optional discard, startup delay, then one run per `run_interval`
    ///
    /// Ticks missed while a run is still going are skipped, not queued.
    pub fn spawn_run_loop(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.config.discard_history_on_start {
                self.discard_history().await;
            }
            let startup_delay = self.config.startup_delay();
            if !startup_delay.is_zero() {
                tokio::time::sleep(startup_delay).await;
            }

            let mut ticker = tokio::time::interval(self.config.run_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.run_health_check().await;
            }
        })
    }
}
