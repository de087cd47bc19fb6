//! Playlist ingestion: parsing, snapshot ownership and read-only channel views

pub mod index;
pub mod parser;
pub mod source;

pub use index::{Catalog, ChannelIndex};
pub use parser::{
    channel_id, filter_by_category, get_categories, paginate, parse, parse_playlist, search_channels,
    CategoryCount, Page, ParsedPlaylist, UNCATEGORIZED, UNKNOWN_CHANNEL,
};
pub use source::{ChannelSource, PlaylistSnapshot, PlaylistSource, PlaylistStatus, RefreshOutcome};
