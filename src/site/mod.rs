//! Site records and indexer configuration
//!
//! A site is persisted as a flat record with its page layouts stored as JSON
//! text. The adapter turns that record into a [`SiteConfiguration`], merging
//! bundled indexer definitions over it when one exists for the domain.

mod adapter;
mod category;
mod config;
mod definitions;

pub use adapter::IndexerCatalog;
pub use category::SiteCategoryHelper;
pub use config::{
    BatchConfig, CategoryConfig, LinkTraversalConfig, ListSpec, ParserKind, SearchPath,
    SiteConfiguration, TorrentListConfig,
};
pub use definitions::IndexerDefinitions;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Media type a torrent or search targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    Tv,
    Anime,
    Game,
    Music,
    Jav,
    Comic,
    Unknown,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
            MediaType::Anime => "anime",
            MediaType::Game => "game",
            MediaType::Music => "music",
            MediaType::Jav => "jav",
            MediaType::Comic => "comic",
            MediaType::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for MediaType {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "movie" | "movies" => Ok(MediaType::Movie),
            "tv" | "series" => Ok(MediaType::Tv),
            "anime" => Ok(MediaType::Anime),
            "game" | "games" => Ok(MediaType::Game),
            "music" => Ok(MediaType::Music),
            "jav" => Ok(MediaType::Jav),
            "comic" | "comics" => Ok(MediaType::Comic),
            "unknown" => Ok(MediaType::Unknown),
            _ => Err(ConfigError::UnknownMediaType(s.to_string())),
        }
    }
}

/// Error type for site configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown media type: {0}")]
    UnknownMediaType(String),

    #[error("Invalid site configuration: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid category map: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A site as persisted
///
/// The `*_config` columns hold the page layout JSON for browse and search.
/// Nothing in this crate writes these records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub id: i64,
    pub name: String,
    pub domain: String,
    pub url: String,
    pub pri: i64,
    pub rss: Option<String>,
    pub cookie: Option<String>,
    pub ua: Option<String>,
    pub apikey: Option<String>,
    pub token: Option<String>,
    pub proxy: bool,
    pub filter: Option<String>,
    pub render: bool,
    pub public: bool,
    pub note: Option<String>,
    pub limit_interval: Option<i64>,
    pub limit_count: Option<i64>,
    pub limit_seconds: Option<i64>,
    pub timeout: Option<i64>,
    pub is_active: bool,
    pub lst_mod_date: Option<String>,
    pub downloader: Option<i64>,
    pub types: Vec<String>,
    pub browse: Option<String>,
    pub browse_method: Option<String>,
    pub browse_config: Value,
    pub search: Option<String>,
    pub search_method: Option<String>,
    pub search_config: Value,
}
