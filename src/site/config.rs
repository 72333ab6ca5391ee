//! Indexer configuration value objects
//!
//! Decoded once per indexer lookup and read-only afterwards. Decoding is
//! lenient: a malformed fragment degrades to "not configured" with a log
//! line instead of failing the whole site.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::indexer::{CssSelector, FieldSelectorSet, HttpMethod, SelectorSpec};

/// Accepts `1`, `"1"` and `null`
pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Accepts `true`, `1`, `"true"`, `"1"`; anything else is false
pub(crate) fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    })
}

/// Accepts numbers and numeric strings; anything else is absent
pub(crate) fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Like [`lenient_i64`] for unsigned values
pub(crate) fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(lenient_i64(deserializer)?.and_then(|n| u64::try_from(n).ok()))
}

/// Invalid selectors are logged and treated as absent
fn lenient_selector<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<CssSelector>, D::Error> {
    let source: Option<String> = Option::deserialize(deserializer)?;
    Ok(match source {
        Some(s) if !s.trim().is_empty() => match CssSelector::parse(&s) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!("Dropping list selector: {}", e);
                None
            }
        },
        _ => None,
    })
}

/// A fragment that may be stored inline or as a JSON string
fn embedded<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: for<'a> Deserialize<'a>,
{
    let value = match Value::deserialize(deserializer)? {
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => match serde_json::from_str(&s) {
            Ok(v) => v,
            Err(e) => {
                warn!("Dropping malformed configuration fragment: {}", e);
                return Ok(None);
            }
        },
        Value::Null => return Ok(None),
        other => other,
    };
    match serde_json::from_value(value) {
        Ok(v) => Ok(Some(v)),
        Err(e) => {
            warn!("Dropping invalid configuration fragment: {}", e);
            Ok(None)
        }
    }
}

/// Which spider drives the site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParserKind {
    /// Follows feed/search/list links down to the torrent pages
    #[serde(rename = "dSpider")]
    LinkFollowing,
    /// Parses list pages, optionally drilling into detail pages
    #[default]
    #[serde(other)]
    Standard,
}

/// Selector for the repeated node of a page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListSpec {
    #[serde(default, deserialize_with = "lenient_selector", skip_serializing_if = "Option::is_none")]
    pub selector: Option<CssSelector>,
}

/// How torrents are laid out on a browse or search page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorrentListConfig {
    /// Torrents live on per-item detail pages
    #[serde(deserialize_with = "lenient_bool")]
    pub torrent_in_detail: bool,

    /// List rows, used with `torrent_in_detail`
    #[serde(deserialize_with = "embedded", skip_serializing_if = "Option::is_none")]
    pub list: Option<ListSpec>,

    pub list_fields: FieldSelectorSet,

    /// Torrent rows
    #[serde(deserialize_with = "embedded", skip_serializing_if = "Option::is_none")]
    pub torrent: Option<ListSpec>,

    pub torrent_fields: FieldSelectorSet,
}

/// Link-following layout for `dSpider` sites
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkTraversalConfig {
    /// Link containers on the browse page
    #[serde(deserialize_with = "embedded", skip_serializing_if = "Option::is_none")]
    pub feed_links: Option<SelectorSpec>,

    /// Link containers on the search page
    #[serde(deserialize_with = "embedded", skip_serializing_if = "Option::is_none")]
    pub search_links: Option<SelectorSpec>,

    /// Link containers on intermediate list pages
    #[serde(deserialize_with = "embedded", skip_serializing_if = "Option::is_none")]
    pub list_links: Option<SelectorSpec>,

    /// Torrent rows on the final page
    #[serde(deserialize_with = "embedded", skip_serializing_if = "Option::is_none")]
    pub list: Option<ListSpec>,

    pub fields: FieldSelectorSet,
}

/// One candidate search path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPath {
    pub path: String,
    /// `all`, `movie` or `tv`
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
}

impl SearchPath {
    pub fn http_method(&self) -> HttpMethod {
        HttpMethod::from_config(self.method.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub paths: Vec<SearchPath>,
    /// Extra query parameters; `search` holds the POST body template
    pub params: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_replace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowseConfig {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Added to the requested page number
    #[serde(deserialize_with = "lenient_i64", skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// Category codes by media type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    /// Single parameter collecting every code; `cat<id>=1` flags otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    pub movie: Vec<CategoryEntry>,
    pub tv: Vec<CategoryEntry>,
}

/// Merged description of how to search, browse and parse one site
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfiguration {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    pub name: String,
    pub domain: String,
    /// Base URL, always ending with `/`
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub public: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub proxy: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub render: bool,
    pub parser: ParserKind,

    #[serde(deserialize_with = "embedded", skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchConfig>,
    #[serde(deserialize_with = "embedded", skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchConfig>,
    #[serde(deserialize_with = "embedded", skip_serializing_if = "Option::is_none")]
    pub browse: Option<BrowseConfig>,
    #[serde(deserialize_with = "embedded", skip_serializing_if = "Option::is_none")]
    pub category: Option<CategoryConfig>,

    /// Layout of browse pages
    #[serde(alias = "browser_torrents")]
    pub browse_torrents: TorrentListConfig,
    /// Layout of search result pages
    pub search_torrents: TorrentListConfig,
    /// Layout for link-following sites
    #[serde(deserialize_with = "embedded", skip_serializing_if = "Option::is_none")]
    pub torrents: Option<LinkTraversalConfig>,

    pub types: Vec<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub pri: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rss: Option<String>,
    #[serde(skip_serializing)]
    pub cookie: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,
    #[serde(skip_serializing)]
    pub apikey: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    #[serde(deserialize_with = "lenient_u64")]
    pub timeout: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub result_num: Option<u64>,
}

impl SiteConfiguration {
    /// Layout for the given mode
    pub fn torrent_list(&self, searching: bool) -> &TorrentListConfig {
        if searching {
            &self.search_torrents
        } else {
            &self.browse_torrents
        }
    }

    /// Batch settings, site level first, then the search section's
    pub fn batch_config(&self) -> Option<&BatchConfig> {
        self.batch
            .as_ref()
            .or_else(|| self.search.as_ref().and_then(|s| s.batch.as_ref()))
    }

    pub fn priority(&self) -> i64 {
        self.pri.unwrap_or(0)
    }
}
