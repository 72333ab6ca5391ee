//! Site record → indexer configuration

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::definitions::IndexerDefinitions;
use super::{ConfigError, SiteConfiguration, SiteRecord};

/// Result cap for sites configured from the database
const RECORD_RESULT_NUM: u64 = 1000;

fn with_trailing_slash(url: &str) -> String {
    if url.is_empty() || url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

fn relative_path(path: Option<&str>) -> String {
    path.unwrap_or_default().trim_start_matches('/').to_string()
}

/// A stored layout blob: inline JSON, JSON text, or nothing
fn layout_blob(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        Value::String(s) if s.trim().is_empty() => Map::new(),
        Value::String(s) => match serde_json::from_str::<Map<String, Value>>(s) {
            Ok(map) => map,
            Err(e) => {
                warn!("Malformed layout blob treated as empty: {}", e);
                Map::new()
            }
        },
        _ => Map::new(),
    }
}

/// Loosely-typed configuration derived from a site record
fn record_value(site: &SiteRecord) -> Value {
    let url = with_trailing_slash(&site.url);
    let browse_config = layout_blob(&site.browse_config);
    let search_config = layout_blob(&site.search_config);

    let search = site.search_method.as_deref().filter(|m| !m.is_empty()).map(|method| {
        let params = if method.eq_ignore_ascii_case("HTTP_POST") {
            json!({ "search": search_config.get("body").cloned().unwrap_or(Value::Null) })
        } else {
            json!({})
        };
        json!({
            "paths": [{
                "path": relative_path(site.search.as_deref()),
                "method": method,
                "start": 1,
            }],
            "params": params,
        })
    });
    let browse = (site.browse_method.as_deref() == Some("HTTP_GET")).then(|| {
        json!({
            "path": relative_path(site.browse.as_deref()),
            "method": site.browse_method,
            "start": browse_config.get("start").cloned().unwrap_or(Value::Null),
        })
    });
    let rss = site
        .rss
        .as_deref()
        .filter(|r| !r.is_empty())
        .map(|r| format!("{}{}", url, relative_path(Some(r))));

    json!({
        "id": site.id,
        "name": site.name,
        "domain": site.domain,
        "url": url,
        "encoding": "UTF-8",
        "public": site.public,
        "proxy": site.proxy,
        "render": site.render,
        "search": search,
        "batch": {"delimiter": " ", "space_replace": "_"},
        "browse": browse,
        "browse_torrents": Value::Object(browse_config),
        "search_torrents": Value::Object(search_config),
        "types": site.types,
        "pri": site.pri,
        "rss": rss,
        "cookie": site.cookie,
        "ua": site.ua,
        "apikey": site.apikey,
        "token": site.token,
        "timeout": site.timeout,
        "result_num": RECORD_RESULT_NUM,
    })
}

/// Older definitions spell the browse layout key this way
const BROWSE_LAYOUT_ALIAS: &str = "browser_torrents";

/// Top-level keys of `definition` replace those of `local`
fn merge_over(local: Value, definition: &Value) -> Value {
    match (local, definition) {
        (Value::Object(mut base), Value::Object(over)) => {
            for (key, value) in over {
                // both spellings in one object would be a duplicate field
                let key = if key == BROWSE_LAYOUT_ALIAS { "browse_torrents" } else { key.as_str() };
                base.insert(key.to_string(), value.clone());
            }
            Value::Object(base)
        }
        (_, over) => over.clone(),
    }
}

fn decode(value: Value) -> Result<SiteConfiguration, ConfigError> {
    let mut config: SiteConfiguration = serde_json::from_value(value)?;
    if config.url.is_empty() && config.domain.starts_with("http") {
        config.url = config.domain.clone();
    }
    config.url = with_trailing_slash(&config.url);
    Ok(config)
}

/// Convert a persisted site record into its indexer configuration
///
/// Pure; layout blobs that fail to parse contribute nothing.
pub fn to_indexer_config(site: &SiteRecord) -> Result<SiteConfiguration, ConfigError> {
    decode(record_value(site))
}

/// Resolves indexer configurations, preferring bundled definitions
#[derive(Debug, Clone, Default)]
pub struct IndexerCatalog {
    definitions: IndexerDefinitions,
}

impl IndexerCatalog {
    pub fn new(definitions: IndexerDefinitions) -> Self {
        Self { definitions }
    }

    /// Configuration for `domain`, built from `record` and any bundled definition
    pub fn indexer(&self, domain: &str, record: Option<&SiteRecord>) -> Option<SiteConfiguration> {
        let definition = self.definitions.get(domain);
        let decoded = match (record, definition) {
            (Some(site), None) => to_indexer_config(site),
            (Some(site), Some(definition)) => decode(merge_over(record_value(site), definition)),
            (None, Some(definition)) => decode(definition.clone()),
            (None, None) => return None,
        };
        match decoded {
            Ok(config) => {
                debug!("{} indexer resolved with parser {:?}", domain, config.parser);
                Some(config)
            }
            Err(e) => {
                warn!("Indexer for {} could not be decoded: {}", domain, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SiteRecord {
        SiteRecord {
            id: 3,
            name: "Example".to_string(),
            domain: "example.org".to_string(),
            url: "https://example.org".to_string(),
            pri: 2,
            rss: Some("/rss.php".to_string()),
            cookie: Some("uid=1".to_string()),
            is_active: true,
            browse: Some("/torrents.php?page={page}".to_string()),
            browse_method: Some("HTTP_GET".to_string()),
            browse_config: json!({
                "start": 0,
                "torrent": "{\"selector\": \"table.torrents > tr\"}",
                "torrent_fields": {
                    "title": "{\"selector\": \"a.title\"}",
                    "size": "",
                    "seeders": "{oops"
                }
            }),
            search: Some("/torrents.php?search={keyword}".to_string()),
            search_method: Some("HTTP_GET".to_string()),
            search_config: Value::String("not json".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_normalization() {
        let config = to_indexer_config(&record()).unwrap();
        assert_eq!(config.id, "3");
        assert_eq!(config.url, "https://example.org/");
        assert_eq!(config.rss.as_deref(), Some("https://example.org/rss.php"));
        assert_eq!(config.browse.as_ref().unwrap().path, "torrents.php?page={page}");
        assert_eq!(config.search.as_ref().unwrap().paths[0].path, "torrents.php?search={keyword}");
        assert_eq!(config.result_num, Some(1000));
        assert_eq!(config.encoding.as_deref(), Some("UTF-8"));
        let batch = config.batch_config().unwrap();
        assert_eq!(batch.space_replace.as_deref(), Some("_"));
    }

    #[test]
    fn test_layout_blobs_parsed_independently() {
        let config = to_indexer_config(&record()).unwrap();
        let browse = &config.browse_torrents;
        assert!(browse.torrent.is_some());
        assert!(browse.torrent_fields.title.is_some());
        assert!(browse.torrent_fields.size.is_none());
        assert!(browse.torrent_fields.seeders.is_none());
        // malformed search layout degrades to an empty one
        assert!(config.search_torrents.torrent.is_none());
        assert!(config.search_torrents.torrent_fields.is_empty());
    }

    #[test]
    fn test_post_search_keeps_body_template() {
        let mut site = record();
        site.search_method = Some("HTTP_POST".to_string());
        site.search_config = json!({"body": "keyword={keyword}&cat=0"});
        let config = to_indexer_config(&site).unwrap();
        let search = config.search.unwrap();
        assert_eq!(search.params["search"], "keyword={keyword}&cat=0");
    }

    #[test]
    fn test_definition_takes_precedence() {
        let mut definitions = IndexerDefinitions::default();
        definitions
            .add_json(r#"{"domain": "https://example.org/", "name": "Curated", "render": true}"#)
            .unwrap();
        let catalog = IndexerCatalog::new(definitions);

        let config = catalog.indexer("example.org", Some(&record())).unwrap();
        assert_eq!(config.name, "Curated");
        assert!(config.render);
        // unset keys survive from the record
        assert_eq!(config.cookie.as_deref(), Some("uid=1"));
        assert_eq!(config.priority(), 2);

        let bare = catalog.indexer("example.org", None).unwrap();
        assert_eq!(bare.url, "https://example.org/");
        assert!(catalog.indexer("missing.org", None).is_none());
    }

    #[test]
    fn test_definition_with_legacy_browse_key() {
        let mut definitions = IndexerDefinitions::default();
        definitions
            .add_json(
                r#"{
                    "domain": "https://example.org/",
                    "name": "Curated",
                    "browser_torrents": {
                        "torrent": {"selector": "div.row"},
                        "torrent_fields": {"title": {"selector": "a.name"}}
                    }
                }"#,
            )
            .unwrap();
        let catalog = IndexerCatalog::new(definitions);

        let config = catalog.indexer("example.org", Some(&record())).unwrap();
        assert_eq!(config.name, "Curated");
        let list = config.browse_torrents.torrent.as_ref().unwrap();
        assert_eq!(list.selector.as_ref().unwrap().as_str(), "div.row");
        assert!(config.browse_torrents.torrent_fields.title.is_some());
        // the record's browse path survives
        assert!(config.browse.is_some());
    }
}
