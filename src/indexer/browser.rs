//! Headless browser rendering for sites that need JavaScript

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetUserAgentOverrideParams};
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::fetcher::{HttpMethod, PageRequest};

/// Renders pages in a short-lived Chromium instance
///
/// A browser is launched per page so the proxy can differ between sites.
#[derive(Debug, Clone)]
pub struct BrowserRenderer {
    chrome_path: Option<PathBuf>,
    headless: bool,
    proxy: Option<String>,
}

impl BrowserRenderer {
    pub fn new(chrome_path: Option<PathBuf>, headless: bool, proxy: Option<String>) -> Self {
        Self {
            chrome_path,
            headless,
            proxy,
        }
    }

    /// Rendered HTML of `request.url`, or an empty string on failure or timeout
    pub async fn fetch(&self, request: &PageRequest) -> String {
        info!("Rendering {}", request.url);
        match self.render(request).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Render of {} failed: {:#}", request.url, e);
                String::new()
            }
        }
    }

    fn config(&self, use_proxy: bool) -> anyhow::Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-sandbox")
            .arg("--disable-gpu");
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        if !self.headless {
            builder = builder.with_head();
        }
        if let (true, Some(proxy)) = (use_proxy, &self.proxy) {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))
    }

    async fn render(&self, request: &PageRequest) -> anyhow::Result<String> {
        let (mut browser, mut handler) = Browser::launch(self.config(request.proxy)?)
            .await
            .context("Failed to launch browser")?;
        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        // the browser is closed on every path, timeouts included
        let result = within(request.timeout, load_page(&browser, request)).await;

        let _ = browser.close().await;
        let _ = handle.await;
        result
    }
}

/// Run `task`, failing once `limit` has passed
async fn within<T>(
    limit: Duration,
    task: impl std::future::Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    tokio::time::timeout(limit, task)
        .await
        .unwrap_or_else(|_| Err(anyhow!("timed out after {:?}", limit)))
}

async fn load_page(browser: &Browser, request: &PageRequest) -> anyhow::Result<String> {
    if request.method == HttpMethod::Post {
        debug!("Rendering {} as GET, form body ignored", request.url);
    }
    let page = browser.new_page("about:blank").await?;
    if !request.user_agent.is_empty() {
        page.execute(SetUserAgentOverrideParams::new(request.user_agent.clone()))
            .await?;
    }
    let cookies = cookie_params(request);
    if !cookies.is_empty() {
        page.set_cookies(cookies).await?;
    }

    page.goto(request.url.as_str()).await?;
    page.wait_for_navigation().await?;
    let html = page.content().await?;
    let _ = page.close().await;
    Ok(html)
}

/// Split a `name=value; name=value` cookie header into CDP cookies
fn cookie_params(request: &PageRequest) -> Vec<CookieParam> {
    let Some(cookie) = request.cookie.as_deref() else {
        return Vec::new();
    };
    cookie
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .filter_map(|(name, value)| {
            CookieParam::builder()
                .name(name.trim())
                .value(value.trim())
                .url(request.url.clone())
                .build()
                .map_err(|e| warn!("Skipping cookie {}: {}", name, e))
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_params_split_header() {
        let mut request = PageRequest::get("https://example.com/torrents.php");
        request.cookie = Some("uid=1; pass=abc ; broken".to_string());
        let cookies = cookie_params(&request);
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name, "uid");
        assert_eq!(cookies[1].value, "abc");
    }

    #[test]
    fn test_no_cookie_header() {
        assert!(cookie_params(&PageRequest::get("https://example.com/")).is_empty());
    }

    #[tokio::test]
    async fn test_slow_page_becomes_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        };
        let err = within(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));

        let quick = within(Duration::from_secs(1), async { Ok(1) }).await.unwrap();
        assert_eq!(quick, 1);
    }
}
