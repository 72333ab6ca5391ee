//! Site indexer engine
//!
//! Declarative, configuration-driven scraping of torrent list pages. A site
//! configuration names the selectors and filters for every field; the engine
//! fetches pages, walks the matched nodes and normalizes each into a
//! [`TorrentRecord`].

mod browser;
mod drill;
mod fetcher;
mod fields;
mod filter;
mod page;
mod query;
mod record;
mod selector;
mod spider;

pub use browser::BrowserRenderer;
pub use drill::LinkSpider;
pub use fetcher::{HttpFetcher, HttpMethod, PageFetcher, PageRequest, SiteFetcher};
pub use fields::FieldSelectorSet;
pub use page::PageSpider;
pub use query::SearchKeyword;
pub use record::TorrentRecord;
pub use selector::{CssSelector, SelectorSpec};
pub use spider::{SiteSpider, SpiderContext};

/// Error type for indexer operations
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("Invalid selector `{0}`")]
    InvalidSelector(String),

    #[error("Invalid filter {name}: {reason}")]
    InvalidFilter { name: String, reason: String },

    #[error("Filter {name} failed: {reason}")]
    FilterFailed { name: String, reason: String },

    #[error("Date parse failed for `{value}` with format `{format}`")]
    DateParse { value: String, format: String },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, IndexerError>;

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted fetcher shared by the engine tests

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{PageFetcher, PageRequest};

    /// Serves canned HTML per URL and records every request
    #[derive(Default)]
    pub struct ScriptedFetcher {
        pages: HashMap<String, String>,
        calls: AtomicUsize,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requested_urls(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.url.clone())
                .collect()
        }

        pub fn requests(&self) -> Vec<PageRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, request: &PageRequest) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            self.pages.get(&request.url).cloned().unwrap_or_default()
        }
    }
}
