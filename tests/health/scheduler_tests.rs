use crate::common::{base_time, numbered_channels, ManualClock, MockProber};
use chrono::Duration;
use iptv_relay::config::HealthConfig;
use iptv_relay::core::debug_logger::DebugLogger;
use iptv_relay::core::health::{select_batch, HealthLog, HealthScheduler, RunOutcome, RunSummary};
use iptv_relay::core::playlist::{ChannelIndex, ChannelSource};
use iptv_relay::core::stream::StreamProber;
use iptv_relay::core::types::{Channel, HealthRecord, HealthStatus, ProbeResult};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Notify;
use tokio::time::Instant;

fn health_config(batch_size: usize) -> HealthConfig {
    HealthConfig {
        batch_size,
        probe_delay_ms: 0,
        ..HealthConfig::default()
    }
}

fn record(channel_id: &str, status: HealthStatus, at: chrono::DateTime<chrono::Utc>) -> HealthRecord {
    HealthRecord {
        channel_id: channel_id.to_string(),
        status,
        latency_ms: if status == HealthStatus::Online { Some(80) } else { None },
        error_message: None,
        checked_at: at,
    }
}

struct Fixture {
    scheduler: HealthScheduler,
    prober: Arc<MockProber>,
    clock: ManualClock,
    channels: Vec<Channel>,
}

fn fixture(channel_count: usize, batch_size: usize, log: HealthLog) -> Fixture {
    fixture_with(health_config(batch_size), channel_count, log)
}

fn fixture_with(config: HealthConfig, channel_count: usize, log: HealthLog) -> Fixture {
    let channels = numbered_channels(channel_count);
    let index = ChannelIndex::from_channels(channels.clone());
    let prober = Arc::new(MockProber::new());
    let clock = ManualClock::new(base_time());

    let scheduler = HealthScheduler::new(
        config,
        Arc::new(index) as Arc<dyn ChannelSource>,
        prober.clone() as Arc<dyn StreamProber>,
        log,
        Arc::new(DebugLogger::disabled()),
    )
    .with_clock(Box::new(clock.clone()));

    Fixture {
        scheduler,
        prober,
        clock,
        channels,
    }
}

async fn run(scheduler: &HealthScheduler) -> RunSummary {
    match scheduler.run_health_check().await {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::AlreadyRunning => panic!("run unexpectedly skipped"),
    }
}

fn urls(channels: &[Channel], positions: &[usize]) -> Vec<String> {
    positions.iter().map(|&i| channels[i].url.clone()).collect()
}

#[tokio::test]
async fn test_batch_size_bounds_each_run() {
    let fx = fixture(5, 2, HealthLog::in_memory());

    let first = run(&fx.scheduler).await;
    assert_eq!(first.probed, 2);
    assert_eq!(first.backlog, 3);
    assert!(!first.round_robin);
    assert_eq!(fx.prober.take_probed(), urls(&fx.channels, &[0, 1]));

    fx.clock.advance(Duration::minutes(30));
    let second = run(&fx.scheduler).await;
    assert_eq!(second.backlog, 1);
    assert_eq!(fx.prober.take_probed(), urls(&fx.channels, &[2, 3]));

    fx.clock.advance(Duration::minutes(30));
    let third = run(&fx.scheduler).await;
    assert_eq!(third.probed, 1);
    assert_eq!(third.backlog, 0);
    assert_eq!(fx.prober.take_probed(), urls(&fx.channels, &[4]));
}

#[tokio::test]
async fn test_round_robin_when_nothing_is_due() {
    let fx = fixture(4, 2, HealthLog::in_memory());
    run(&fx.scheduler).await;
    fx.clock.advance(Duration::minutes(10));
    run(&fx.scheduler).await;
    fx.prober.take_probed();

    // Everything is fresh now; the oldest-checked pair goes next
    fx.clock.advance(Duration::minutes(10));
    let summary = run(&fx.scheduler).await;

    assert!(summary.round_robin);
    assert_eq!(summary.probed, 2);
    assert_eq!(fx.prober.take_probed(), urls(&fx.channels, &[0, 1]));
}

#[tokio::test]
async fn test_stale_channels_are_due_oldest_first() {
    let mut log = HealthLog::in_memory();
    let channels = numbered_channels(3);
    let now = base_time();
    log.append(record(&channels[0].id, HealthStatus::Online, now - Duration::hours(30)))
        .await
        .unwrap();
    log.append(record(&channels[1].id, HealthStatus::Online, now - Duration::hours(50)))
        .await
        .unwrap();
    log.append(record(&channels[2].id, HealthStatus::Online, now - Duration::hours(1)))
        .await
        .unwrap();

    let selection = select_batch(&channels, &log, now, Duration::hours(24), 10);

    let picked: Vec<&str> = selection.channels.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(picked, vec![channels[1].id.as_str(), channels[0].id.as_str()]);
    assert!(!selection.round_robin);
}

#[tokio::test]
async fn test_never_checked_before_stale() {
    let mut log = HealthLog::in_memory();
    let channels = numbered_channels(3);
    let now = base_time();
    log.append(record(&channels[0].id, HealthStatus::Offline, now - Duration::days(3)))
        .await
        .unwrap();

    let selection = select_batch(&channels, &log, now, Duration::hours(24), 2);

    let picked: Vec<&str> = selection.channels.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(picked, vec![channels[1].id.as_str(), channels[2].id.as_str()]);
    assert_eq!(selection.backlog, 1);
}

#[tokio::test]
async fn test_each_probe_is_recorded() {
    let fx = fixture(3, 10, HealthLog::in_memory());
    fx.prober.set_status(&fx.channels[1].url, HealthStatus::Offline);
    fx.prober.set_status(&fx.channels[2].url, HealthStatus::Error);

    let summary = run(&fx.scheduler).await;

    assert_eq!((summary.online, summary.offline, summary.error), (1, 1, 1));
    assert_eq!(fx.scheduler.record_count().await, 3);

    let health = fx.scheduler.get_channel_health(&fx.channels[2].id).await;
    let current = health.current.unwrap();
    assert_eq!(current.status, HealthStatus::Error);
    assert_eq!(current.checked_at, base_time());
}

#[tokio::test]
async fn test_report_uses_latest_record_only() {
    let fx = fixture(4, 10, HealthLog::in_memory());
    fx.prober.set_status(&fx.channels[0].url, HealthStatus::Offline);
    run(&fx.scheduler).await;

    // Channel 0 recovers; its earlier offline record must not be counted
    fx.clock.advance(Duration::hours(25));
    fx.prober.set_status(&fx.channels[0].url, HealthStatus::Online);
    fx.prober.set_status(&fx.channels[3].url, HealthStatus::Error);
    run(&fx.scheduler).await;

    let report = fx.scheduler.get_health_report().await;
    assert_eq!(report.total_channels, 4);
    assert_eq!(report.checked, 4);
    assert_eq!(report.unchecked, 0);
    assert_eq!(report.online, 3);
    assert_eq!(report.offline, 0);
    assert_eq!(report.error, 1);
    assert!((report.online_ratio - 0.75).abs() < f64::EPSILON);
    assert_eq!(report.avg_latency_ms, Some(100));
    assert_eq!(report.last_checked_at, Some(base_time() + Duration::hours(25)));
    assert!(!report.running);

    let history = fx.scheduler.get_channel_health(&fx.channels[0].id).await.history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, HealthStatus::Online);
    assert_eq!(history[1].status, HealthStatus::Offline);
}

#[tokio::test]
async fn test_report_counts_unchecked_channels() {
    let fx = fixture(5, 2, HealthLog::in_memory());
    run(&fx.scheduler).await;

    let report = fx.scheduler.get_health_report().await;
    assert_eq!(report.checked, 2);
    assert_eq!(report.unchecked, 3);
    assert!((report.online_ratio - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_empty_catalogue_run() {
    let fx = fixture(0, 5, HealthLog::in_memory());
    let summary = run(&fx.scheduler).await;

    assert_eq!(summary.probed, 0);
    let report = fx.scheduler.get_health_report().await;
    assert_eq!(report.total_channels, 0);
    assert_eq!(report.online_ratio, 0.0);
    assert!(report.avg_latency_ms.is_none());
}

#[tokio::test]
async fn test_run_prunes_expired_history() {
    let now = base_time();
    let mut log = HealthLog::in_memory();
    // A channel that has since left the playlist keeps its last record
    log.append(record("retired-channel", HealthStatus::Online, now - Duration::days(30)))
        .await
        .unwrap();
    log.append(record("retired-channel", HealthStatus::Offline, now - Duration::days(20)))
        .await
        .unwrap();

    let fx = fixture(1, 5, log);
    let summary = run(&fx.scheduler).await;

    assert_eq!(summary.pruned, 1);
    let retired = fx.scheduler.get_channel_health("retired-channel").await;
    assert_eq!(retired.history.len(), 1);
    assert_eq!(retired.current.unwrap().status, HealthStatus::Offline);
}

#[tokio::test]
async fn test_discard_history() {
    let fx = fixture(2, 5, HealthLog::in_memory());
    run(&fx.scheduler).await;
    assert_eq!(fx.scheduler.record_count().await, 2);

    fx.scheduler.discard_history().await;

    assert_eq!(fx.scheduler.record_count().await, 0);
    assert_eq!(fx.scheduler.get_health_report().await.checked, 0);
}

/// Prober that parks inside the first probe until released
struct BlockingProber {
    entered: Notify,
    release: Notify,
}

#[async_trait::async_trait]
impl StreamProber for BlockingProber {
    async fn probe(&self, _url: &str) -> ProbeResult {
        self.entered.notify_one();
        self.release.notified().await;
        ProbeResult {
            status: HealthStatus::Online,
            latency_ms: Some(5),
            http_status: Some(200),
            error_message: None,
        }
    }
}

#[tokio::test]
async fn test_concurrent_trigger_returns_already_running() {
    let prober = Arc::new(BlockingProber {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let scheduler = Arc::new(HealthScheduler::new(
        health_config(1),
        Arc::new(ChannelIndex::from_channels(numbered_channels(3))) as Arc<dyn ChannelSource>,
        prober.clone() as Arc<dyn StreamProber>,
        HealthLog::in_memory(),
        Arc::new(DebugLogger::disabled()),
    ));

    let first = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.run_health_check().await }
    });
    prober.entered.notified().await;

    assert!(scheduler.is_running());
    assert_eq!(scheduler.run_health_check().await, RunOutcome::AlreadyRunning);
    assert!(scheduler.get_health_report().await.running);

    prober.release.notify_one();
    let outcome = first.await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(RunSummary { probed: 1, .. })));
    assert!(!scheduler.is_running());
    assert_eq!(scheduler.record_count().await, 1);
}

fn offsets(start: Instant, instants: &[Instant]) -> Vec<StdDuration> {
    instants.iter().map(|at| at.duration_since(start)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_probes_are_spaced_by_delay() {
    let config = HealthConfig {
        batch_size: 3,
        probe_delay_ms: 2000,
        ..HealthConfig::default()
    };
    let fx = fixture_with(config, 5, HealthLog::in_memory());
    let start = Instant::now();

    let summary = run(&fx.scheduler).await;

    assert_eq!(summary.probed, 3);
    // First probe goes out immediately; no pause after the last one
    assert_eq!(
        offsets(start, &fx.prober.probe_instants()),
        vec![
            StdDuration::ZERO,
            StdDuration::from_secs(2),
            StdDuration::from_secs(4)
        ]
    );
    assert_eq!(start.elapsed(), StdDuration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_discards_history_then_waits_startup_delay() {
    let mut log = HealthLog::in_memory();
    log.append(record("retired-channel", HealthStatus::Online, base_time()))
        .await
        .unwrap();
    let config = HealthConfig {
        batch_size: 2,
        probe_delay_ms: 0,
        startup_delay_secs: 120,
        run_interval_secs: 3600,
        discard_history_on_start: true,
        ..HealthConfig::default()
    };
    let fx = fixture_with(config, 4, log);
    let scheduler = Arc::new(fx.scheduler);
    assert_eq!(scheduler.record_count().await, 1);

    let handle = scheduler.clone().spawn_run_loop();

    tokio::time::sleep(StdDuration::from_secs(119)).await;
    assert_eq!(scheduler.record_count().await, 0);
    assert!(fx.prober.probed().is_empty());

    tokio::time::sleep(StdDuration::from_secs(2)).await;
    assert_eq!(fx.prober.probed(), urls(&fx.channels, &[0, 1]));
    assert_eq!(scheduler.record_count().await, 2);

    tokio::time::sleep(StdDuration::from_secs(3600)).await;
    assert_eq!(fx.prober.probed(), urls(&fx.channels, &[0, 1, 2, 3]));

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_keeps_history_by_default() {
    let mut log = HealthLog::in_memory();
    log.append(record("retired-channel", HealthStatus::Online, base_time()))
        .await
        .unwrap();
    let config = HealthConfig {
        startup_delay_secs: 120,
        ..health_config(2)
    };
    let scheduler = Arc::new(fixture_with(config, 2, log).scheduler);

    let handle = scheduler.clone().spawn_run_loop();
    tokio::time::sleep(StdDuration::from_secs(60)).await;

    assert_eq!(scheduler.record_count().await, 1);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_skips_ticks_missed_during_a_long_run() {
    let config = HealthConfig {
        batch_size: 1,
        probe_delay_ms: 0,
        startup_delay_secs: 0,
        run_interval_secs: 10,
        ..HealthConfig::default()
    };
    let fx = fixture_with(config, 4, HealthLog::in_memory());
    // The first run overruns two and a half intervals
    fx.prober.set_latency(&fx.channels[0].url, StdDuration::from_secs(25));
    let scheduler = Arc::new(fx.scheduler);
    let start = Instant::now();

    let handle = scheduler.clone().spawn_run_loop();
    tokio::time::sleep(StdDuration::from_secs(45)).await;
    handle.abort();

    // One late tick at 25 s, then back on the 10 s grid; no burst of catch-up runs
    assert_eq!(
        offsets(start, &fx.prober.probe_instants()),
        vec![
            StdDuration::ZERO,
            StdDuration::from_secs(25),
            StdDuration::from_secs(30),
            StdDuration::from_secs(40)
        ]
    );
}
