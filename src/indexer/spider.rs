//! List-page spider: fetch, select rows, resolve fields, optionally drill into details

use std::time::Duration;

use scraper::Html;
use tracing::{debug, info, warn};

use super::fetcher::{PageFetcher, PageRequest};
use super::fields::{FieldResolver, FieldSelectorSet};
use super::filter::FilterContext;
use super::page::resolve_detail_markers;
use super::query::{SearchKeyword, SearchRequestBuilder};
use super::record::TorrentRecord;
use super::selector::CssSelector;
use crate::site::{MediaType, SiteCategoryHelper, SiteConfiguration, TorrentListConfig};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Settings shared by every spider of one process
#[derive(Clone, Copy)]
pub struct SpiderContext<'a> {
    pub fetcher: &'a dyn PageFetcher,
    /// Used when the site sets no `ua`
    pub user_agent: &'a str,
    /// Public base URL of this service, for `crawl_page` markers
    pub app_domain: &'a str,
    /// Used when the site sets no `timeout`
    pub timeout: Duration,
    /// Used when the site sets no `result_num`
    pub result_num: usize,
    /// Random pause between followed links, in milliseconds
    pub link_delay_ms: (u64, u64),
    pub category_helper: Option<&'a SiteCategoryHelper>,
}

impl<'a> SpiderContext<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher) -> Self {
        Self {
            fetcher,
            user_agent: DEFAULT_USER_AGENT,
            app_domain: FilterContext::default().app_domain,
            timeout: Duration::from_secs(15),
            result_num: 100,
            link_delay_ms: (0, 0),
            category_helper: None,
        }
    }

    pub(crate) fn filter_ctx(&self) -> FilterContext<'a> {
        FilterContext {
            app_domain: self.app_domain,
        }
    }

    pub(crate) fn result_limit(&self, site: &SiteConfiguration) -> usize {
        site.result_num
            .filter(|n| *n > 0)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(self.result_num)
    }

    /// Request for `url` carrying the site's fetch settings
    pub(crate) fn page_request(&self, site: &SiteConfiguration, url: &str) -> PageRequest {
        PageRequest {
            render: site.render,
            user_agent: site
                .ua
                .clone()
                .filter(|ua| !ua.is_empty())
                .unwrap_or_else(|| self.user_agent.to_string()),
            cookie: site.cookie.clone().filter(|c| !c.is_empty()),
            proxy: site.proxy,
            timeout: site
                .timeout
                .filter(|t| *t > 0)
                .map(Duration::from_secs)
                .unwrap_or(self.timeout),
            referer: Some(site.url.clone()).filter(|u| !u.is_empty()),
            encoding: site.encoding.clone(),
            ..PageRequest::get(url)
        }
    }

    pub(crate) fn resolver(&self, site: &'a SiteConfiguration) -> FieldResolver<'a> {
        FieldResolver::new(site, self.filter_ctx()).with_category_helper(self.category_helper)
    }
}

/// Resolve every row `selector` matches in `html`, at most `limit` of them
pub(crate) fn parse_rows(
    html: &str,
    selector: &CssSelector,
    fields: &FieldSelectorSet,
    resolver: &FieldResolver<'_>,
    limit: usize,
) -> Vec<TorrentRecord> {
    let document = Html::parse_document(html);
    selector
        .select_within(document.root_element())
        .into_iter()
        .take(limit)
        .map(|row| resolver.resolve(fields, row))
        .collect()
}

/// Scrapes one site's search or browse listing
///
/// Searching uses the site's `search_torrents` layout, browsing its
/// `browse_torrents`. A layout with `torrent_in_detail` resolves list rows
/// first and parses the detail page of every row whose title belongs to the
/// search.
pub struct SiteSpider<'a> {
    site: &'a SiteConfiguration,
    ctx: SpiderContext<'a>,
    keyword: Option<SearchKeyword>,
    page: u32,
    mtype: Option<MediaType>,
    category: Option<String>,
    is_error: bool,
}

impl<'a> SiteSpider<'a> {
    pub fn new(site: &'a SiteConfiguration, ctx: SpiderContext<'a>) -> Self {
        Self {
            site,
            ctx,
            keyword: None,
            page: 0,
            mtype: None,
            category: None,
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

    pub fn category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    /// Whether the last scrape hit a page it could not parse
    ///
    /// Unset when the site simply returned nothing.
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    fn layout(&self) -> &'a TorrentListConfig {
        self.site.torrent_list(self.keyword.is_some())
    }

    /// Fetch the listing and parse it into records
    pub async fn get_torrents(&mut self) -> Vec<TorrentRecord> {
        self.is_error = false;
        if self.site.url.is_empty() {
            warn!("{} has no url", self.site.name);
            return Vec::new();
        }
        let builder = SearchRequestBuilder::new(self.site)
            .keyword(self.keyword.as_ref())
            .page(self.page)
            .media_type(self.mtype)
            .category(self.category.as_deref());
        if !builder.has_path() {
            debug!("{} has no path for this request", self.site.name);
            return Vec::new();
        }
        let search = builder.build();
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

        let mut records = if self.layout().torrent_in_detail {
            self.drill_details(&html).await
        } else {
            self.parse(&html)
        };
        let template = self.ctx.page_request(self.site, "");
        resolve_detail_markers(&mut records, self.ctx.fetcher, &self.site.url, &template).await;
        info!("{} returned {} torrents", self.site.name, records.len());
        records
    }

    /// Parse torrent rows out of `html` with the current layout
    pub fn parse(&mut self, html: &str) -> Vec<TorrentRecord> {
        self.is_error = false;
        if html.is_empty() {
            self.is_error = true;
            return Vec::new();
        }
        let layout = self.layout();
        let Some(selector) = layout.torrent.as_ref().and_then(|t| t.selector.as_ref()) else {
            warn!("{} layout has no torrent selector", self.site.name);
            self.is_error = true;
            return Vec::new();
        };
        let resolver = self.ctx.resolver(self.site);
        let limit = self.ctx.result_limit(self.site);
        parse_rows(html, selector, &layout.torrent_fields, &resolver, limit)
    }

    /// List rows first, then the detail page of each admitted row
    async fn drill_details(&mut self, html: &str) -> Vec<TorrentRecord> {
        let layout = self.layout();
        let (Some(list), Some(torrent)) = (
            layout.list.as_ref().and_then(|l| l.selector.as_ref()),
            layout.torrent.as_ref().and_then(|t| t.selector.as_ref()),
        ) else {
            warn!("{} detail layout needs list and torrent selectors", self.site.name);
            self.is_error = true;
            return Vec::new();
        };
        let limit = self.ctx.result_limit(self.site);
        let candidates = {
            let resolver = self.ctx.resolver(self.site);
            parse_rows(html, list, &layout.list_fields, &resolver, usize::MAX)
        };

        let mut records = Vec::new();
        for candidate in candidates {
            if records.len() >= limit {
                break;
            }
            let Some(title) = candidate.title.as_deref() else {
                continue;
            };
            if !self.keyword.as_ref().is_some_and(|k| k.admits_title(title)) {
                debug!("{} skipping {}", self.site.name, title);
                continue;
            }
            let Some(page_url) = candidate.page_url.as_deref() else {
                continue;
            };
            let request = self.ctx.page_request(self.site, page_url);
            let detail = self.ctx.fetcher.fetch(&request).await;
            if detail.is_empty() {
                warn!("{} detail page {} returned nothing", self.site.name, page_url);
                continue;
            }
            let resolver = self.ctx.resolver(self.site).with_page_url(Some(page_url));
            let rows = parse_rows(&detail, torrent, &layout.torrent_fields, &resolver, limit - records.len());
            for mut row in rows {
                row.fill_missing_from(&candidate);
                records.push(row);
            }
        }
        records
    }
}
