//! Single-field page extraction and detail-marker resolution

use std::collections::HashMap;

use scraper::Html;
use serde_json::Value;
use tracing::{debug, warn};

use super::fetcher::{PageFetcher, PageRequest};
use super::fields::absolute_link;
use super::record::TorrentRecord;
use super::selector::SelectorSpec;

const MARKER_PREFIX: &str = "@:【";
const MARKER_SEPARATOR: &str = "】【";
const MARKER_SUFFIX: &str = "】";

/// A field value deferred to a detail page: `@:【{spec}】【{link}】`
#[derive(Debug, Clone, PartialEq)]
pub struct DetailMarker {
    pub spec: SelectorSpec,
    pub link: String,
}

impl DetailMarker {
    /// Parse a marker; `None` for ordinary values and undecodable specs
    pub fn parse(value: &str) -> Option<Self> {
        let body = value.strip_prefix(MARKER_PREFIX)?.strip_suffix(MARKER_SUFFIX)?;
        let (args, link) = body.split_once(MARKER_SEPARATOR)?;
        let spec = match serde_json::from_str::<Value>(args) {
            Ok(Value::String(selector)) => SelectorSpec::new(&selector).ok()?,
            Ok(value) => match serde_json::from_value(value) {
                Ok(spec) => spec,
                Err(e) => {
                    warn!("Detail marker spec rejected: {}", e);
                    return None;
                }
            },
            Err(e) => {
                warn!("Detail marker is not valid JSON: {}", e);
                return None;
            }
        };
        Some(Self {
            spec,
            link: link.to_string(),
        })
    }
}

/// Extract one value from `html` with `spec`
pub fn extract_from(html: &str, spec: &SelectorSpec) -> Option<String> {
    if html.is_empty() {
        return None;
    }
    let document = Html::parse_document(html);
    spec.extract(document.root_element())
}

/// Fetches one page and extracts one value from it
pub struct PageSpider<'a> {
    fetcher: &'a dyn PageFetcher,
}

impl<'a> PageSpider<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher) -> Self {
        Self { fetcher }
    }

    /// Value of `spec` on the page, `None` when the page or the value is missing
    pub async fn parse(&self, request: &PageRequest, spec: &SelectorSpec) -> Option<String> {
        let html = self.fetcher.fetch(request).await;
        if html.is_empty() {
            warn!("Page {} returned nothing", request.url);
            return None;
        }
        extract_from(&html, spec)
    }
}

/// Replace every detail marker in `records` with the value it points to
///
/// Each linked page is fetched once. Markers that cannot be resolved leave
/// their field unset.
pub(crate) async fn resolve_detail_markers(
    records: &mut [TorrentRecord],
    fetcher: &dyn PageFetcher,
    base_url: &str,
    template: &PageRequest,
) {
    let mut pages: HashMap<String, String> = HashMap::new();
    for record in records.iter_mut() {
        for (name, field) in record.text_fields_mut() {
            let Some(marker) = field.as_deref().and_then(DetailMarker::parse) else {
                continue;
            };
            let url = absolute_link(base_url, &marker.link);
            if !pages.contains_key(&url) {
                let mut request = template.clone();
                request.url = url.clone();
                let html = fetcher.fetch(&request).await;
                pages.insert(url.clone(), html);
            }
            let value = pages.get(&url).and_then(|html| extract_from(html, &marker.spec));
            debug!("Detail marker {} resolved from {}: {:?}", name, url, value);
            *field = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::testing::ScriptedFetcher;

    #[test]
    fn test_marker_parse() {
        let marker = DetailMarker::parse(r#"@:【{"selector": "span.imdb"}】【details.php?id=1】"#).unwrap();
        assert_eq!(marker.link, "details.php?id=1");
        assert_eq!(marker.spec.selector.unwrap().as_str(), "span.imdb");

        let bare = DetailMarker::parse(r#"@:【"td.size"】【/d/2】"#).unwrap();
        assert_eq!(bare.spec.selector.unwrap().as_str(), "td.size");

        assert!(DetailMarker::parse("plain value").is_none());
        assert!(DetailMarker::parse("@:【{broken】【x】").is_none());
    }

    #[test]
    fn test_extract_from_document() {
        let spec: SelectorSpec = serde_json::from_str(r#"{"selector": "a.dl", "attribute": "href"}"#).unwrap();
        let html = r#"<html><body><a class="dl" href="/download/1">get</a></body></html>"#;
        assert_eq!(extract_from(html, &spec).as_deref(), Some("/download/1"));
        assert_eq!(extract_from("", &spec), None);
    }

    #[tokio::test]
    async fn test_page_spider() {
        let fetcher = ScriptedFetcher::new().with_page(
            "https://example.org/d/1",
            r#"<html><body><div class="info">Size<br>4.2 GB</div></body></html>"#,
        );
        let spider = PageSpider::new(&fetcher);
        let spec: SelectorSpec = serde_json::from_str(r#"{"selector": "div.info", "contents": 1}"#).unwrap();
        let request = PageRequest::get("https://example.org/d/1");
        assert_eq!(spider.parse(&request, &spec).await, Some("Size\n4.2 GB".to_string()));

        let spec: SelectorSpec = serde_json::from_str(r#"{"selector": "div.info", "contents": 0}"#).unwrap();
        assert_eq!(spider.parse(&request, &spec).await, Some("Size".to_string()));

        let missing = PageRequest::get("https://example.org/missing");
        assert_eq!(spider.parse(&missing, &spec).await, None);
    }

    #[tokio::test]
    async fn test_markers_resolved_once_per_page() {
        let fetcher = ScriptedFetcher::new().with_page(
            "https://example.org/details.php?id=1",
            r#"<html><body><span class="imdb">tt0111161</span><span class="free">2030-01-01</span></body></html>"#,
        );
        let mut records = vec![TorrentRecord {
            title: Some("x".to_string()),
            imdbid: Some(r#"@:【{"selector": "span.imdb"}】【details.php?id=1】"#.to_string()),
            freedate: Some(r#"@:【{"selector": "span.free"}】【/details.php?id=1】"#.to_string()),
            description: Some(r#"@:【{"selector": "span.none"}】【details.php?id=1】"#.to_string()),
            ..Default::default()
        }];
        let template = PageRequest::get("");
        resolve_detail_markers(&mut records, &fetcher, "https://example.org/", &template).await;

        assert_eq!(records[0].title.as_deref(), Some("x"));
        assert_eq!(records[0].imdbid.as_deref(), Some("tt0111161"));
        assert_eq!(records[0].freedate.as_deref(), Some("2030-01-01"));
        assert!(records[0].description.is_none());
        assert_eq!(fetcher.calls(), 1);
    }
}
