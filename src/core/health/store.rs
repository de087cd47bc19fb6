//! Append-only health log with a per-channel index
//!
//! Records live in one arena (`records`) in append order. Two indexes map a
//! channel id to its record positions and to its most recent record, so
//! "current health" and "who is due" never walk the full history.
//!
//! Persistence is JSON Lines: one record appended per probe, so a crash
//! mid-run keeps everything already written. Pruning rewrites the file
//! atomically (temp file + rename).

use crate::core::types::HealthRecord;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Health log I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Health log serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
pub struct HealthLog {
    path: Option<PathBuf>,
    records: Vec<HealthRecord>,
    by_channel: HashMap<String, Vec<usize>>,
    latest: HashMap<String, usize>,
}

impl HealthLog {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the log at `path`; a missing file starts empty, malformed lines are skipped
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut log = Self {
            path: Some(path.clone()),
            ..Self::default()
        };

        if !path.exists() {
            return Ok(log);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;

        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            if let Ok(record) = serde_json::from_str::<HealthRecord>(line) {
                log.push_indexed(record);
            }
        }

        Ok(log)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of channels with at least one record
    pub fn channel_count(&self) -> usize {
        self.latest.len()
    }

    pub fn latest(&self, channel_id: &str) -> Option<&HealthRecord> {
        self.latest
            .get(channel_id)
            .and_then(|&pos| self.records.get(pos))
    }

    pub fn latest_records(&self) -> impl Iterator<Item = &HealthRecord> {
        self.latest.values().filter_map(|&pos| self.records.get(pos))
    }

    /// Records for one channel, newest first
    pub fn history(&self, channel_id: &str, limit: usize) -> Vec<HealthRecord> {
        let mut history: Vec<HealthRecord> = self
            .by_channel
            .get(channel_id)
            .map(|positions| {
                positions
                    .iter()
                    .filter_map(|&pos| self.records.get(pos))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        history.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        history.truncate(limit);
        history
    }

    /// Append one record and persist it before returning
    ///
    /// The in-memory log is updated even when the file write fails.
    pub async fn append(&mut self, record: HealthRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(&record)?;
        self.push_indexed(record);

        let Some(path) = &self.path else {
            return Ok(());
        };

        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(io_err)?;
        file.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        Ok(())
    }

    /// Drop records older than `cutoff`, except each channel's latest record
    ///
    /// Returns the number of records removed.
    pub async fn prune(&mut self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let latest = &self.latest;
        let before = self.records.len();

        let kept: Vec<HealthRecord> = std::mem::take(&mut self.records)
            .into_iter()
            .enumerate()
            .filter(|(pos, record)| {
                record.checked_at >= cutoff || latest.get(&record.channel_id) == Some(pos)
            })
            .map(|(_, record)| record)
            .collect();

        let removed = before - kept.len();
        self.rebuild(kept);

        if removed > 0 {
            self.rewrite().await?;
        }
        Ok(removed)
    }

    /// Forget every record, on disk too
    pub async fn clear(&mut self) -> Result<(), StoreError> {
        self.rebuild(Vec::new());
        self.rewrite().await
    }

    fn rebuild(&mut self, records: Vec<HealthRecord>) {
        self.by_channel.clear();
        self.latest.clear();
        self.records = Vec::with_capacity(records.len());
        for record in records {
            self.push_indexed(record);
        }
    }

    fn push_indexed(&mut self, record: HealthRecord) {
        let pos = self.records.len();

        self.by_channel
            .entry(record.channel_id.clone())
            .or_default()
            .push(pos);

        let is_newer = match self.latest.get(&record.channel_id) {
            Some(&current) => self
                .records
                .get(current)
                .map(|existing| record.checked_at >= existing.checked_at)
                .unwrap_or(true),
            None => true,
        };
        if is_newer {
            self.latest.insert(record.channel_id.clone(), pos);
        }

        self.records.push(record);
    }

    async fn rewrite(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let mut content = String::new();
        for record in &self.records {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }

        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, content).await.map_err(io_err)?;
        tokio::fs::rename(&temp_path, path).await.map_err(io_err)?;
        Ok(())
    }
}
