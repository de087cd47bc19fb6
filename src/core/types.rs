// Core data model shared by the playlist, stream, health and VPN components
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One live-video source from the playlist
///
/// `id` is derived from `url` alone, so metadata churn across refreshes
/// (renames, new logos, recategorisation) keeps downstream history attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    /// Resolved display name: tvg-name, then trailing title, then "Unknown Channel"
    pub name: String,
    /// Raw text after the directive's comma, if any
    pub title: Option<String>,
    pub logo: Option<String>,
    pub category: String,
    pub url: String,
    pub tvg_id: Option<String>,
}

/// Outcome of a single reachability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Origin answered 2xx/3xx
    Online,
    /// Network failure (timeout, refused, DNS)
    Offline,
    /// Origin answered 4xx/5xx
    Error,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Online => write!(f, "online"),
            HealthStatus::Offline => write!(f, "offline"),
            HealthStatus::Error => write!(f, "error"),
        }
    }
}

/// Append-only health log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub channel_id: String,
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Result of `check_stream_health`, before it is bound to a channel
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
}

impl ProbeResult {
    pub fn into_record(self, channel_id: &str, checked_at: DateTime<Utc>) -> HealthRecord {
        HealthRecord {
            channel_id: channel_id.to_string(),
            status: self.status,
            latency_ms: self.latency_ms,
            error_message: self.error_message,
            checked_at,
        }
    }
}

/// Clock abstraction for dependency injection and testing
pub trait ClockTrait: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock implementation using system time
#[derive(Default)]
pub struct SystemClock;

impl ClockTrait for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Parse boolean environment flags: true/1/yes/on (case insensitive)
pub fn parse_env_flag(env_var: &str) -> bool {
    std::env::var(env_var)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(false)
}

/// Single-flight flag: at most one holder at a time, released on drop
///
/// A second caller gets `None` instead of waiting, so overlapping timer
/// ticks and manual triggers collapse into the run already in progress.
pub struct InFlightGuard<'a> {
    flag: &'a std::sync::atomic::AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    pub fn try_acquire(flag: &'a std::sync::atomic::AtomicBool) -> Option<Self> {
        use std::sync::atomic::Ordering;
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, std::sync::atomic::Ordering::Release);
    }
}
