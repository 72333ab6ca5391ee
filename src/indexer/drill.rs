//! Link-following spider for multi-level sites (feed → list → detail)

use std::collections::HashSet;
use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use scraper::Html;
use tracing::{debug, info, warn};

use super::fields::absolute_link;
use super::filter::apply_filters;
use super::page::resolve_detail_markers;
use super::query::{SearchKeyword, SearchRequestBuilder};
use super::record::TorrentRecord;
use super::selector::{CssSelector, SelectorSpec};
use super::spider::{parse_rows, SpiderContext};
use crate::site::{LinkTraversalConfig, MediaType, SiteConfiguration};

/// Link levels below the entry page
const MAX_DEPTH: usize = 4;

/// Scrapes sites whose torrents sit one or more links below the listing
///
/// The entry page is walked with `feed_links` (browse) or `search_links`
/// (search). Every linked page is parsed with `list` and `fields` when the
/// site declares a list selector and it matches, or followed again through
/// `list_links`. Each link is fetched at most once per scrape.
pub struct LinkSpider<'a> {
    site: &'a SiteConfiguration,
    ctx: SpiderContext<'a>,
    keyword: Option<SearchKeyword>,
    page: u32,
    mtype: Option<MediaType>,
    records: Vec<TorrentRecord>,
    visited: HashSet<String>,
    is_error: bool,
}

impl<'a> LinkSpider<'a> {
    pub fn new(site: &'a SiteConfiguration, ctx: SpiderContext<'a>) -> Self {
        Self {
            site,
            ctx,
            keyword: None,
            page: 0,
            mtype: None,
            records: Vec::new(),
            visited: HashSet::new(),
            is_error: false,
        }
    }

    pub fn keyword(mut self, keyword: Option<SearchKeyword>) -> Self {
        self.keyword = keyword;
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn media_type(mut self, mtype: Option<MediaType>) -> Self {
        self.mtype = mtype;
        self
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    fn traversal(&self) -> Option<&'a LinkTraversalConfig> {
        self.site.torrents.as_ref()
    }

    /// Fetch the entry page and follow its links down to the torrents
    pub async fn get_torrents(&mut self) -> Vec<TorrentRecord> {
        self.records.clear();
        self.visited.clear();
        self.is_error = false;
        if self.site.search.is_none() || self.site.url.is_empty() {
            return Vec::new();
        }
        let Some(traversal) = self.traversal() else {
            warn!("{} has no link traversal config", self.site.name);
            return Vec::new();
        };
        let links = if self.keyword.is_some() {
            traversal.search_links.as_ref()
        } else {
            traversal.feed_links.as_ref()
        };
        let Some(links) = links else {
            warn!("{} has no entry links for this mode", self.site.name);
            return Vec::new();
        };

        let search = SearchRequestBuilder::new(self.site)
            .keyword(self.keyword.as_ref())
            .page(self.page)
            .media_type(self.mtype)
            .build();
        info!("{} fetching {}", self.site.name, search.url);
        let request = self
            .ctx
            .page_request(self.site, &search.url)
            .with_form(search.method, search.form);
        let html = self.ctx.fetcher.fetch(&request).await;
        if html.is_empty() {
            warn!("{} returned no page for {}", self.site.name, search.url);
            return Vec::new();
        }

        self.follow_links(html, links, 0).await;
        let mut records = std::mem::take(&mut self.records);
        let template = self.ctx.page_request(self.site, "");
        resolve_detail_markers(&mut records, self.ctx.fetcher, &self.site.url, &template).await;
        info!("{} returned {} torrents", self.site.name, records.len());
        records
    }

    /// Absolute links found in each container `links` matches
    fn links(&self, html: &str, links: &SelectorSpec) -> Vec<String> {
        let Ok(anchor) = CssSelector::parse("a") else {
            return Vec::new();
        };
        let link_spec = SelectorSpec {
            selector: Some(anchor),
            attribute: Some("href".to_string()),
            ..links.clone()
        };
        let filter_ctx = self.ctx.filter_ctx();
        let document = Html::parse_document(html);
        links
            .select(document.root_element())
            .into_iter()
            .filter_map(|container| link_spec.extract(container))
            .filter_map(|link| match apply_filters(&link, &link_spec.filters, &filter_ctx) {
                Ok(link) => Some(link),
                Err(e) => {
                    warn!("{} link filter failed: {}", self.site.name, e);
                    None
                }
            })
            .filter(|link| !link.is_empty())
            .map(|link| absolute_link(&self.site.url, &link))
            .collect()
    }

    async fn pause(&self) {
        let (min, max) = self.ctx.link_delay_ms;
        if max == 0 {
            return;
        }
        let millis = rand::rng().random_range(min.min(max)..=max);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    fn follow_links<'s>(&'s mut self, html: String, links: &'a SelectorSpec, depth: usize) -> BoxFuture<'s, ()> {
        Box::pin(async move {
            if depth > MAX_DEPTH {
                warn!("{} link depth limit reached", self.site.name);
                return;
            }
            let limit = self.ctx.result_limit(self.site);
            for link in self.links(&html, links) {
                if self.records.len() >= limit {
                    break;
                }
                if !self.visited.insert(link.clone()) {
                    continue;
                }
                debug!("{} following {}", self.site.name, link);
                let request = self.ctx.page_request(self.site, &link);
                let page = self.ctx.fetcher.fetch(&request).await;
                self.parse_page(page, &link, depth).await;
                self.pause().await;
            }
        })
    }

    /// Torrents of one linked page, or its links one level further down
    async fn parse_page(&mut self, html: String, link: &str, depth: usize) {
        if html.is_empty() {
            warn!("{} linked page {} returned nothing", self.site.name, link);
            self.is_error = true;
            return;
        }
        let Some(traversal) = self.traversal() else {
            return;
        };
        if let Some(list) = traversal.list.as_ref().and_then(|l| l.selector.as_ref()) {
            let limit = self.ctx.result_limit(self.site);
            let resolver = self.ctx.resolver(self.site).with_page_url(Some(link));
            let remaining = limit.saturating_sub(self.records.len());
            let rows = parse_rows(&html, list, &traversal.fields, &resolver, remaining);
            if !rows.is_empty() {
                self.records.extend(rows);
                return;
            }
        }
        match traversal.list_links.as_ref() {
            Some(list_links) => self.follow_links(html, list_links, depth + 1).await,
            None if traversal.list.is_none() => {
                warn!("{} has neither list nor list_links", self.site.name);
                self.is_error = true;
            }
            None => debug!("{} no torrents on {}", self.site.name, link),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::testing::ScriptedFetcher;
    use serde_json::json;

    fn site() -> SiteConfiguration {
        serde_json::from_value(json!({
            "name": "Links",
            "parser": "dSpider",
            "domain": "https://links.org/",
            "url": "https://links.org/",
            "search": {"paths": [{"path": "search?q={keyword}"}]},
            "browse": {"path": "latest"},
            "result_num": 10,
            "torrents": {
                "feed_links": {"selector": "div.feed"},
                "search_links": {"selector": "div.hit"},
                "list_links": {"selector": "li.release"},
                "fields": {
                    "title": {"selector": "h1"},
                    "download": {"selector": "a.dl", "attribute": "href"}
                }
            }
        }))
        .unwrap()
    }

    const FEED: &str = r#"<html><body>
        <div class="feed"><a href="/show/1">One</a></div>
        <div class="feed"><a href="show/2">Two</a></div>
    </body></html>"#;

    const SHOW: &str = r#"<html><body><ul>
        <li class="release"><a href="/r/1">r1</a></li>
    </ul></body></html>"#;

    const RELEASE: &str = r#"<html><body><div class="torrent"><h1>Release</h1><a class="dl" href="/get/1">dl</a></div></body></html>"#;

    #[test]
    fn test_links_are_absolute() {
        let site = site();
        let fetcher = ScriptedFetcher::new();
        let spider = LinkSpider::new(&site, SpiderContext::new(&fetcher));
        let links = spider.links(FEED, site.torrents.as_ref().unwrap().feed_links.as_ref().unwrap());
        assert_eq!(links, vec!["https://links.org/show/1", "https://links.org/show/2"]);
    }

    #[tokio::test]
    async fn test_follows_list_links_to_torrents() {
        let mut site = site();
        site.torrents.as_mut().unwrap().list = Some(crate::site::ListSpec {
            selector: Some(CssSelector::parse("div.torrent").unwrap()),
        });
        // with a list selector, linked pages are parsed directly
        let fetcher = ScriptedFetcher::new()
            .with_page("https://links.org/latest", FEED)
            .with_page("https://links.org/show/1", RELEASE);
        let mut spider = LinkSpider::new(&site, SpiderContext::new(&fetcher));
        let records = spider.get_torrents().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title.as_deref(), Some("Release"));
        assert_eq!(records[0].page_url.as_deref(), Some("https://links.org/show/1"));
        assert_eq!(records[0].enclosure.as_deref(), Some("https://links.org/get/1"));
        // the second feed link returned nothing
        assert!(spider.is_error());
    }

    #[tokio::test]
    async fn test_recurses_through_list_links() {
        let mut site = site();
        let torrents = site.torrents.as_mut().unwrap();
        torrents.search_links = Some(SelectorSpec::new("div.feed").unwrap());
        torrents.list = Some(crate::site::ListSpec {
            selector: Some(CssSelector::parse("div.torrent").unwrap()),
        });
        let fetcher = ScriptedFetcher::new()
            .with_page("https://links.org/search?q=Release", FEED)
            .with_page("https://links.org/show/1", SHOW)
            .with_page("https://links.org/show/2", SHOW)
            .with_page("https://links.org/r/1", RELEASE);
        let mut spider = LinkSpider::new(&site, SpiderContext::new(&fetcher)).keyword(Some("Release".into()));
        let records = spider.get_torrents().await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].page_url.as_deref(), Some("https://links.org/r/1"));
        // the shared release page is fetched once
        assert_eq!(
            fetcher.requested_urls(),
            vec![
                "https://links.org/search?q=Release",
                "https://links.org/show/1",
                "https://links.org/r/1",
                "https://links.org/show/2",
            ]
        );
        assert!(!spider.is_error());
    }

    #[tokio::test]
    async fn test_search_links_matching_nothing() {
        let site = site();
        let fetcher = ScriptedFetcher::new().with_page("https://links.org/search?q=Release", FEED);
        let mut spider = LinkSpider::new(&site, SpiderContext::new(&fetcher)).keyword(Some("Release".into()));
        assert!(spider.get_torrents().await.is_empty());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_search_requires_search_section() {
        let mut site = site();
        site.search = None;
        let fetcher = ScriptedFetcher::new();
        let mut spider = LinkSpider::new(&site, SpiderContext::new(&fetcher));
        assert!(spider.get_torrents().await.is_empty());
        assert_eq!(fetcher.calls(), 0);
    }
}
