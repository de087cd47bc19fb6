//! Live byte-stream relay and lightweight reachability probes

use super::classify::{classify_status, StreamError};
use crate::config::StreamConfig;
use crate::core::debug_logger::DebugLogger;
use crate::core::http::{HttpClientTrait, StreamTimeouts, TransportError};
use crate::core::playlist::ChannelIndex;
use crate::core::types::{HealthStatus, ProbeResult};
use crate::core::vpn::{VpnMonitor, VpnStatus};
use futures::io::AsyncReadExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Response head sent to the client before the first body byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub content_type: String,
    pub content_length: Option<u64>,
    /// Extra headers; always includes the no-cache set for live content
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// `status` is the upstream's 2xx, so a 206 partial response stays a 206
    fn live(status: u16, content_type: Option<String>, content_length: Option<u64>) -> Self {
        let headers = [
            ("Cache-Control", "no-cache, no-store, must-revalidate"),
            ("Pragma", "no-cache"),
            ("Expires", "0"),
            ("Access-Control-Allow-Origin", "*"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            status,
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            content_length,
            headers,
        }
    }
}

/// Where relayed bytes go (an HTTP response body, a pipe, a test buffer)
#[async_trait::async_trait]
pub trait StreamDestination: Send {
    async fn send_head(&mut self, head: &ResponseHead) -> std::io::Result<()>;
    async fn send_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()>;
    async fn finish(&mut self) -> std::io::Result<()>;
}

/// Destination over any tokio writer; the head is not written
pub struct WriterDestination<W> {
    writer: W,
}

impl<W> WriterDestination<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait::async_trait]
impl<W> StreamDestination for WriterDestination<W>
where
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    async fn send_head(&mut self, _head: &ResponseHead) -> std::io::Result<()> {
        Ok(())
    }

    async fn send_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(chunk).await
    }

    async fn finish(&mut self) -> std::io::Result<()> {
        self.writer.flush().await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySummary {
    pub bytes: u64,
    pub duration: Duration,
}

/// Reachability probing, as consumed by the health scheduler
#[async_trait::async_trait]
pub trait StreamProber: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeResult;
}

pub struct StreamProxy {
    client: Arc<dyn HttpClientTrait>,
    config: StreamConfig,
    logger: Arc<DebugLogger>,
    vpn: Option<Arc<VpnMonitor>>,
}

/// "City, CC" for a connected egress, falling back to the bare IP
fn egress_label(status: &VpnStatus) -> Option<String> {
    if !status.connected {
        return None;
    }
    let place: Vec<&str> = [&status.location, &status.country]
        .iter()
        .filter_map(|part| part.as_deref())
        .collect();
    if place.is_empty() {
        status.ip.clone()
    } else {
        Some(place.join(", "))
    }
}

impl StreamProxy {
    /// `client` must be the VPN-routed client; relays never fall back to direct
    pub fn new(client: Arc<dyn HttpClientTrait>, config: StreamConfig, logger: Arc<DebugLogger>) -> Self {
        Self {
            client,
            config,
            logger,
            vpn: None,
        }
    }

    /// Tag FORBIDDEN failures with the last known egress location
    pub fn with_vpn_monitor(mut self, vpn: Arc<VpnMonitor>) -> Self {
        self.vpn = Some(vpn);
        self
    }

    /// Uses the cached status only; a relay never waits on a geolocation lookup
    async fn current_egress(&self) -> Option<String> {
        let status = self.vpn.as_ref()?.cached().await?;
        egress_label(&status)
    }

    /// Resolve a channel id and relay its stream
    pub async fn proxy_channel<D>(
        &self,
        index: &ChannelIndex,
        channel_id: &str,
        destination: &mut D,
    ) -> Result<RelaySummary, StreamError>
    where
        D: StreamDestination + ?Sized,
    {
        let channel = index
            .get(channel_id)
            .ok_or_else(|| StreamError::UnknownChannel(channel_id.to_string()))?;
        self.proxy_stream(&channel.url, destination).await
    }

    /// Pipe the origin's bytes to `destination` as they arrive
    ///
    /// Failures before the head is sent come back classified. After that the
    /// only thing left to do is stop writing, so the error just reports how far
    /// the relay got. No retries happen here; that is the client's call.
    pub async fn proxy_stream<D>(&self, url: &str, destination: &mut D) -> Result<RelaySummary, StreamError>
    where
        D: StreamDestination + ?Sized,
    {
        let start = Instant::now();
        let timeouts = StreamTimeouts {
            connect: self.config.connect_timeout(),
            low_speed: self.config.low_speed_timeout(),
        };

        let mut upstream = match self.client.open_stream(url, timeouts).await {
            Ok(upstream) => upstream,
            Err(e) => {
                let err = StreamError::from(e);
                self.logger.stream_relay("open_failed", url, 0, Some(&err.to_string()));
                return Err(err);
            }
        };

        if !(200..300).contains(&upstream.status) {
            let class = classify_status(upstream.status);
            let err = match StreamError::from_status(upstream.status, upstream.retry_after_secs) {
                StreamError::Forbidden { .. } => StreamError::Forbidden {
                    egress: self.current_egress().await,
                },
                other => other,
            };
            self.logger
                .stream_relay("upstream_rejected", url, 0, Some(class.as_str()));
            return Err(err);
        }

        let head = ResponseHead::live(
            upstream.status,
            upstream.content_type.take(),
            upstream.content_length,
        );
        if destination.send_head(&head).await.is_err() {
            return Err(StreamError::ClientDisconnected { bytes: 0 });
        }
        self.logger.stream_relay("started", url, 0, Some(&head.content_type));

        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        let mut bytes: u64 = 0;
        loop {
            let read = match upstream.body.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.logger
                        .stream_relay("interrupted", url, bytes, Some(&e.to_string()));
                    return Err(StreamError::Interrupted {
                        bytes,
                        reason: e.to_string(),
                    });
                }
            };

            if destination.send_chunk(&buf[..read]).await.is_err() {
                self.logger.stream_relay("client_gone", url, bytes, None);
                return Err(StreamError::ClientDisconnected { bytes });
            }
            bytes += read as u64;
        }

        if destination.finish().await.is_err() {
            return Err(StreamError::ClientDisconnected { bytes });
        }

        self.logger.stream_relay("completed", url, bytes, None);
        Ok(RelaySummary {
            bytes,
            duration: start.elapsed(),
        })
    }

    /// HEAD-style existence probe through the VPN with a short timeout
    ///
    /// 2xx-3xx → online (with latency), 4xx/5xx → error, no response → offline.
    pub async fn check_stream_health(&self, url: &str) -> ProbeResult {
        match self.client.head(url, self.config.probe_timeout()).await {
            Ok((status, latency)) if (200..400).contains(&status) => ProbeResult {
                status: HealthStatus::Online,
                latency_ms: Some(latency.as_millis() as u64),
                http_status: Some(status),
                error_message: None,
            },
            Ok((status, _)) => ProbeResult {
                status: HealthStatus::Error,
                latency_ms: None,
                http_status: Some(status),
                error_message: Some(format!("HTTP {}", status)),
            },
            Err(TransportError::Timeout) => ProbeResult {
                status: HealthStatus::Offline,
                latency_ms: None,
                http_status: None,
                error_message: Some("Probe timed out".to_string()),
            },
            Err(TransportError::Failed(reason)) => ProbeResult {
                status: HealthStatus::Offline,
                latency_ms: None,
                http_status: None,
                error_message: Some(self.logger.redact_sensitive_data(&reason)),
            },
        }
    }
}

#[async_trait::async_trait]
impl StreamProber for StreamProxy {
    async fn probe(&self, url: &str) -> ProbeResult {
        self.check_stream_health(url).await
    }
}
