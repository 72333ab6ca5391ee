//! Search service across configured sites
//!
//! Each site scrape is an independent, best-effort unit: a site that fails
//! contributes an empty list and never affects the others.

use anyhow::Result;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::IndexerSettings;
use crate::db::SiteRepository;
use crate::indexer::{
    LinkSpider, PageFetcher, PageSpider, SearchKeyword, SelectorSpec, SiteSpider, SpiderContext, TorrentRecord,
};
use crate::site::{IndexerCatalog, MediaType, ParserKind, SiteCategoryHelper, SiteConfiguration};
use crate::utils::url_domain;

/// Torrents scraped from one site
#[derive(Debug, Clone, Serialize)]
pub struct SiteTorrents {
    pub site: String,
    pub name: String,
    pub priority: i64,
    /// The site answered with a page that could not be parsed
    pub is_error: bool,
    pub torrents: Vec<TorrentRecord>,
}

impl SiteTorrents {
    fn new(site: &SiteConfiguration, torrents: Vec<TorrentRecord>, is_error: bool) -> Self {
        Self {
            site: site.domain.clone(),
            name: site.name.clone(),
            priority: site.priority(),
            is_error,
            torrents,
        }
    }
}

/// One scrape request against one site
struct Scrape {
    keyword: Option<SearchKeyword>,
    mtype: Option<MediaType>,
    category: Option<String>,
    page: u32,
}

/// Service resolving indexers and running spiders over them
pub struct SearchService {
    sites: SiteRepository,
    catalog: IndexerCatalog,
    fetcher: Arc<dyn PageFetcher>,
    category_helper: SiteCategoryHelper,
    settings: IndexerSettings,
}

impl SearchService {
    pub fn new(
        sites: SiteRepository,
        catalog: IndexerCatalog,
        fetcher: Arc<dyn PageFetcher>,
        category_helper: SiteCategoryHelper,
        settings: IndexerSettings,
    ) -> Self {
        Self {
            sites,
            catalog,
            fetcher,
            category_helper,
            settings,
        }
    }

    fn context(&self) -> SpiderContext<'_> {
        SpiderContext {
            fetcher: self.fetcher.as_ref(),
            user_agent: &self.settings.user_agent,
            app_domain: &self.settings.app_domain,
            timeout: self.settings.timeout(),
            result_num: self.settings.result_num,
            link_delay_ms: self.settings.link_delay(),
            category_helper: Some(&self.category_helper),
        }
    }

    /// Indexer configuration for the site at `domain`
    pub fn get_indexer(&self, domain: &str) -> Result<Option<SiteConfiguration>> {
        let record = self.sites.get_by_domain(domain)?;
        Ok(self.catalog.indexer(domain, record.as_ref()))
    }

    /// Indexers of every active site, in priority order
    pub fn list_indexers(&self) -> Result<Vec<SiteConfiguration>> {
        let indexers = self
            .sites
            .list_active()?
            .iter()
            .filter_map(|record| self.catalog.indexer(&record.domain, Some(record)))
            .collect();
        Ok(indexers)
    }

    async fn scrape(&self, site: &SiteConfiguration, scrape: Scrape) -> SiteTorrents {
        let ctx = self.context();
        let (torrents, is_error) = match site.parser {
            ParserKind::LinkFollowing => {
                let mut spider = LinkSpider::new(site, ctx)
                    .keyword(scrape.keyword)
                    .page(scrape.page)
                    .media_type(scrape.mtype);
                let torrents = spider.get_torrents().await;
                (torrents, spider.is_error())
            }
            ParserKind::Standard => {
                let mut spider = SiteSpider::new(site, ctx)
                    .keyword(scrape.keyword)
                    .page(scrape.page)
                    .media_type(scrape.mtype)
                    .category(scrape.category);
                let torrents = spider.get_torrents().await;
                (torrents, spider.is_error())
            }
        };
        if is_error {
            warn!("{} page could not be parsed", site.name);
        }
        SiteTorrents::new(site, torrents, is_error)
    }

    /// Search one site
    ///
    /// Several keywords go out as one batch when the site supports it;
    /// otherwise they are tried in order until one finds something.
    pub async fn search_torrents(
        &self,
        site: &SiteConfiguration,
        keywords: &[String],
        mtype: Option<MediaType>,
        page: u32,
    ) -> SiteTorrents {
        let keywords: Vec<String> = keywords.iter().filter(|k| !k.trim().is_empty()).cloned().collect();
        if keywords.is_empty() {
            return SiteTorrents::new(site, Vec::new(), false);
        }
        info!("Searching {} for {:?}", site.name, keywords);

        if keywords.len() > 1 && site.batch_config().is_some() {
            let scrape = Scrape {
                keyword: Some(SearchKeyword::Batch(keywords)),
                mtype,
                category: None,
                page,
            };
            return self.scrape(site, scrape).await;
        }

        let mut last = SiteTorrents::new(site, Vec::new(), false);
        for keyword in keywords {
            let scrape = Scrape {
                keyword: Some(SearchKeyword::Single(keyword)),
                mtype,
                category: None,
                page,
            };
            last = self.scrape(site, scrape).await;
            if !last.torrents.is_empty() {
                break;
            }
        }
        last
    }

    /// Latest torrents of one site, optionally narrowed by keyword or category
    pub async fn refresh_torrents(
        &self,
        site: &SiteConfiguration,
        keyword: Option<String>,
        category: Option<String>,
        page: u32,
    ) -> SiteTorrents {
        let scrape = Scrape {
            keyword: keyword.filter(|k| !k.is_empty()).map(SearchKeyword::Single),
            mtype: None,
            category,
            page,
        };
        self.scrape(site, scrape).await
    }

    /// Search every active site concurrently, merged by site priority
    pub async fn search_all(
        &self,
        keywords: &[String],
        mtype: Option<MediaType>,
        page: u32,
    ) -> Result<Vec<SiteTorrents>> {
        let indexers = self.list_indexers()?;
        info!("Searching {} sites", indexers.len());
        let mut results = join_all(
            indexers
                .iter()
                .map(|site| self.search_torrents(site, keywords, mtype, page)),
        )
        .await;
        results.sort_by_key(|r| r.priority);
        Ok(results)
    }

    /// Extract one value from `url` using the fetch settings of its site
    ///
    /// `None` when no indexer knows the site.
    pub async fn crawl_page(&self, url: &str, spec: &SelectorSpec) -> Result<Option<String>> {
        let domain = url_domain(url);
        let Some(site) = self.get_indexer(&domain)? else {
            debug!("No indexer for {}", domain);
            return Ok(None);
        };
        let ctx = self.context();
        let request = ctx.page_request(&site, url);
        let value = PageSpider::new(self.fetcher.as_ref()).parse(&request, spec).await;
        Ok(Some(value.unwrap_or_default()))
    }
}
