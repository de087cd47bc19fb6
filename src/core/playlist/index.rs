//! Read-only views over one playlist snapshot

use super::parser::{self, CategoryCount, Page, ParsedPlaylist};
use crate::core::types::Channel;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable channel arena with an id → position index
#[derive(Debug, Default)]
pub struct Catalog {
    channels: Vec<Channel>,
    positions: HashMap<String, usize>,
    categories: Vec<CategoryCount>,
    epg_url: Option<String>,
}

impl Catalog {
    pub fn new(parsed: ParsedPlaylist) -> Self {
        let positions = parsed
            .channels
            .iter()
            .enumerate()
            .map(|(pos, channel)| (channel.id.clone(), pos))
            .collect();
        let categories = parser::get_categories(&parsed.channels);

        Self {
            channels: parsed.channels,
            positions,
            categories,
            epg_url: parsed.epg_url,
        }
    }
}

/// Cheap, cloneable handle onto the catalogue of a single snapshot
///
/// A refresh builds a new `Catalog`; handles taken before it keep
/// reading the old one until dropped.
#[derive(Debug, Clone, Default)]
pub struct ChannelIndex {
    catalog: Arc<Catalog>,
}

impl ChannelIndex {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn from_channels(channels: Vec<Channel>) -> Self {
        Self::new(Arc::new(Catalog::new(ParsedPlaylist {
            channels,
            epg_url: None,
        })))
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn channels(&self) -> &[Channel] {
        &self.catalog.channels
    }

    pub fn len(&self) -> usize {
        self.catalog.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.channels.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.catalog.positions.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Channel> {
        self.catalog
            .positions
            .get(id)
            .and_then(|&pos| self.catalog.channels.get(pos))
    }

    /// Resolve several ids, skipping ones that left the playlist
    pub fn get_many<S: AsRef<str>>(&self, ids: &[S]) -> Vec<Channel> {
        ids.iter()
            .filter_map(|id| self.get(id.as_ref()).cloned())
            .collect()
    }

    pub fn categories(&self) -> &[CategoryCount] {
        &self.catalog.categories
    }

    pub fn epg_url(&self) -> Option<&str> {
        self.catalog.epg_url.as_deref()
    }

    pub fn list(&self, page: usize, limit: usize) -> Page<Channel> {
        parser::paginate(&self.catalog.channels, page, limit)
    }

    pub fn by_category(&self, category: &str, page: usize, limit: usize) -> Page<Channel> {
        let matches: Vec<Channel> = parser::filter_by_category(&self.catalog.channels, category)
            .into_iter()
            .cloned()
            .collect();
        parser::paginate(&matches, page, limit)
    }

    pub fn search(&self, query: &str, page: usize, limit: usize) -> Page<Channel> {
        let matches: Vec<Channel> = parser::search_channels(&self.catalog.channels, query)
            .into_iter()
            .cloned()
            .collect();
        parser::paginate(&matches, page, limit)
    }
}
