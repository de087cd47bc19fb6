//! Extended M3U playlist parsing
//!
//! Turns raw playlist text into normalized [`Channel`] records. Malformed
//! entries are dropped without error: the upstream list is not under our
//! control and one bad line must not cost the rest of the catalogue.

use crate::core::types::Channel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

pub const UNKNOWN_CHANNEL: &str = "Unknown Channel";
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Hex characters kept from the SHA-256 of the origin URL
const CHANNEL_ID_LEN: usize = 16;

/// Parsed playlist with the header's guide URL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPlaylist {
    pub channels: Vec<Channel>,
    /// From `x-tvg-url` / `url-tvg` on the `#EXTM3U` line
    pub epg_url: Option<String>,
}

/// Category name with the number of channels in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

fn attr_regex() -> &'static Regex {
    static ATTR: OnceLock<Regex> = OnceLock::new();
    ATTR.get_or_init(|| {
        Regex::new(r#"([A-Za-z0-9_-]+)=(?:"([^"]*)"|([^\s",]+))"#).expect("static attribute regex")
    })
}

/// Deterministic channel id: truncated SHA-256 of the origin URL only
pub fn channel_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut id = String::with_capacity(CHANNEL_ID_LEN);
    for byte in digest.iter() {
        if id.len() >= CHANNEL_ID_LEN {
            break;
        }
        id.push_str(&format!("{:02x}", byte));
    }
    id.truncate(CHANNEL_ID_LEN);
    id
}

/// Parse playlist text into channels, in playlist order
pub fn parse(text: &str) -> Vec<Channel> {
    parse_playlist(text).channels
}

/// Parse playlist text, keeping header metadata
pub fn parse_playlist(text: &str) -> ParsedPlaylist {
    let mut playlist = ParsedPlaylist::default();
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut pending: Option<PendingEntry> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix("#EXTM3U") {
            let attrs = extract_attrs(header);
            playlist.epg_url = attrs
                .get("x-tvg-url")
                .or_else(|| attrs.get("url-tvg"))
                .filter(|v| !v.is_empty())
                .cloned();
            continue;
        }

        if let Some(info) = line.strip_prefix("#EXTINF:") {
            // A directive without a URL line is dropped when the next one starts
            pending = Some(PendingEntry::from_info(info));
            continue;
        }

        if line.starts_with('#') {
            // #EXTGRP, #EXTVLCOPT and friends
            continue;
        }

        let Some(entry) = pending.take() else {
            continue;
        };

        if !is_stream_url(line) || !seen_urls.insert(line.to_string()) {
            continue;
        }

        playlist.channels.push(entry.into_channel(line));
    }

    playlist
}

fn is_stream_url(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

struct PendingEntry {
    attrs: HashMap<String, String>,
    title: Option<String>,
}

impl PendingEntry {
    fn from_info(info: &str) -> Self {
        let (attr_part, title) = split_title(info);
        let title = title.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);

        Self {
            attrs: extract_attrs(attr_part),
            title,
        }
    }

    fn attr(&self, key: &str) -> Option<String> {
        self.attrs
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn into_channel(self, url: &str) -> Channel {
        let name = self
            .attr("tvg-name")
            .or_else(|| self.title.clone())
            .unwrap_or_else(|| UNKNOWN_CHANNEL.to_string());
        let category = self
            .attr("group-title")
            .unwrap_or_else(|| UNCATEGORIZED.to_string());

        Channel {
            id: channel_id(url),
            name,
            logo: self.attr("tvg-logo"),
            tvg_id: self.attr("tvg-id"),
            category,
            title: self.title,
            url: url.to_string(),
        }
    }
}

/// Split `#EXTINF` payload at the first comma outside quotes
fn split_title(info: &str) -> (&str, Option<&str>) {
    let mut in_quotes = false;
    for (idx, c) in info.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return (&info[..idx], Some(&info[idx + 1..])),
            _ => {}
        }
    }
    (info, None)
}

fn extract_attrs(text: &str) -> HashMap<String, String> {
    attr_regex()
        .captures_iter(text)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
            Some((key, value))
        })
        .collect()
}

/// Categories with channel counts, largest first (ties by name)
pub fn get_categories(channels: &[Channel]) -> Vec<CategoryCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for channel in channels {
        *counts.entry(channel.category.as_str()).or_insert(0) += 1;
    }

    let mut categories: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(name, count)| CategoryCount {
            name: name.to_string(),
            count,
        })
        .collect();
    categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    categories
}

/// Case-insensitive substring match over name, title and category
pub fn search_channels<'a>(channels: &'a [Channel], query: &str) -> Vec<&'a Channel> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return channels.iter().collect();
    }

    channels
        .iter()
        .filter(|channel| {
            channel.name.to_lowercase().contains(&needle)
                || channel
                    .title
                    .as_deref()
                    .map(|t| t.to_lowercase().contains(&needle))
                    .unwrap_or(false)
                || channel.category.to_lowercase().contains(&needle)
        })
        .collect()
}

pub fn filter_by_category<'a>(channels: &'a [Channel], category: &str) -> Vec<&'a Channel> {
    channels
        .iter()
        .filter(|channel| channel.category.eq_ignore_ascii_case(category))
        .collect()
}

/// Slice a listing into a 1-based page; `page` and `limit` are clamped to >= 1
pub fn paginate<T: Clone>(items: &[T], page: usize, limit: usize) -> Page<T> {
    let page = page.max(1);
    let limit = limit.max(1);
    let total = items.len();
    let total_pages = total.div_ceil(limit);

    let start = (page - 1).saturating_mul(limit).min(total);
    let end = start.saturating_add(limit).min(total);

    Page {
        data: items[start..end].to_vec(),
        page,
        limit,
        total,
        total_pages,
        has_next: page < total_pages,
        has_prev: page > 1,
    }
}
