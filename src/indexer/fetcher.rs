//! Page fetching: direct HTTP requests or a headless browser render

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use encoding_rs::Encoding;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, COOKIE, REFERER, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::browser::BrowserRenderer;

/// Request method of a site path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

impl HttpMethod {
    /// Site records spell methods as `HTTP_GET`, `post`, `GET` and so on
    pub fn from_config(method: Option<&str>) -> Self {
        match method {
            Some(m) if m.to_ascii_lowercase().contains("post") => HttpMethod::Post,
            _ => HttpMethod::Get,
        }
    }
}

/// Everything needed to fetch one page
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: String,
    pub method: HttpMethod,
    /// Form body for POST requests
    pub form: Vec<(String, String)>,
    /// Fetch through the headless browser
    pub render: bool,
    pub user_agent: String,
    pub cookie: Option<String>,
    /// Route through the configured proxy
    pub proxy: bool,
    pub timeout: Duration,
    pub referer: Option<String>,
    /// Forced charset label
    pub encoding: Option<String>,
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            form: Vec::new(),
            render: false,
            user_agent: String::new(),
            cookie: None,
            proxy: false,
            timeout: Duration::from_secs(15),
            referer: None,
            encoding: None,
        }
    }

    pub fn with_form(mut self, method: HttpMethod, form: Vec<(String, String)>) -> Self {
        self.method = method;
        self.form = form;
        self
    }
}

/// Source of page text
///
/// Implementations never fail: any error is logged and yields an empty page,
/// which the spiders treat as nothing to parse.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> String;
}

/// Direct HTTP fetcher backed by reqwest
pub struct HttpFetcher {
    direct: Client,
    proxied: Option<Client>,
}

impl HttpFetcher {
    pub fn new(proxy: Option<&str>) -> anyhow::Result<Self> {
        let direct = Client::builder().gzip(true).build()?;
        let proxied = match proxy.filter(|p| !p.is_empty()) {
            Some(url) => Some(Client::builder().gzip(true).proxy(reqwest::Proxy::all(url)?).build()?),
            None => None,
        };
        Ok(Self { direct, proxied })
    }

    fn client(&self, proxy: bool) -> &Client {
        match (&self.proxied, proxy) {
            (Some(client), true) => client,
            _ => &self.direct,
        }
    }

    async fn send(&self, request: &PageRequest) -> reqwest::Result<(Vec<u8>, Option<String>)> {
        let client = self.client(request.proxy);
        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url).form(&request.form),
        };
        builder = builder.timeout(request.timeout);
        if !request.user_agent.is_empty() {
            builder = builder.header(USER_AGENT, &request.user_agent);
        }
        if let Some(cookie) = request.cookie.as_deref().filter(|c| !c.is_empty()) {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(referer) = &request.referer {
            builder = builder.header(REFERER, referer);
        }

        let response = builder.send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        Ok((body.to_vec(), content_type))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &PageRequest) -> String {
        info!("Requesting {}", request.url);
        match self.send(request).await {
            Ok((body, content_type)) => {
                decode_body(&body, request.encoding.as_deref(), content_type.as_deref())
            }
            Err(e) => {
                warn!("Request to {} failed: {}", request.url, e);
                String::new()
            }
        }
    }
}

/// Decode a response body
///
/// A forced label wins, then the charset declared by the response header or a
/// `<meta>` tag. Only an undeclared body has its charset guessed.
pub fn decode_body(body: &[u8], forced: Option<&str>, content_type: Option<&str>) -> String {
    if body.is_empty() {
        return String::new();
    }
    let declared = forced
        .map(str::to_string)
        .or_else(|| content_type.and_then(charset_label))
        .or_else(|| charset_label(&String::from_utf8_lossy(&body[..body.len().min(2048)])))
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()));
    let encoding = match declared {
        Some(encoding) => encoding,
        None => {
            let mut detector = chardetng::EncodingDetector::new();
            detector.feed(body, true);
            let guessed = detector.guess(None, true);
            debug!("No declared charset, guessed {}", guessed.name());
            guessed
        }
    };
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

/// `charset=...` from a content type or a `<meta>` tag
fn charset_label(text: &str) -> Option<String> {
    static CHARSET: OnceLock<Regex> = OnceLock::new();
    let charset = CHARSET.get_or_init(|| Regex::new(r#"(?i)charset\s*=\s*["']?([\w-]+)"#).expect("valid charset pattern"));
    charset.captures(text).map(|c| c[1].to_string())
}

/// Dispatches between the browser render path and direct HTTP
pub struct SiteFetcher {
    http: HttpFetcher,
    browser: Option<Arc<BrowserRenderer>>,
}

impl SiteFetcher {
    pub fn new(http: HttpFetcher, browser: Option<Arc<BrowserRenderer>>) -> Self {
        Self { http, browser }
    }
}

#[async_trait]
impl PageFetcher for SiteFetcher {
    async fn fetch(&self, request: &PageRequest) -> String {
        match (&self.browser, request.render) {
            (Some(browser), true) => browser.fetch(request).await,
            (None, true) => {
                debug!("Browser disabled, fetching {} directly", request.url);
                self.http.fetch(request).await
            }
            _ => self.http.fetch(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_config() {
        assert_eq!(HttpMethod::from_config(Some("HTTP_POST")), HttpMethod::Post);
        assert_eq!(HttpMethod::from_config(Some("post")), HttpMethod::Post);
        assert_eq!(HttpMethod::from_config(Some("HTTP_GET")), HttpMethod::Get);
        assert_eq!(HttpMethod::from_config(None), HttpMethod::Get);
    }

    #[test]
    fn test_decode_forced_encoding() {
        let (bytes, _, _) = encoding_rs::GBK.encode("种子列表");
        assert_eq!(decode_body(&bytes, Some("gbk"), None), "种子列表");
    }

    #[test]
    fn test_decode_detects_utf8() {
        let html = "<html><body>Show.S01E01 中文字幕</body></html>";
        assert_eq!(decode_body(html.as_bytes(), None, None), html);
        assert_eq!(decode_body(b"", None, None), "");
    }

    #[test]
    fn test_declared_charset_beats_guess() {
        let body = b"<p>caf\xe9</p>";
        assert_eq!(decode_body(body, None, Some("text/html; charset=windows-1251")), "<p>caf\u{439}</p>");
        let meta = b"<meta charset=\"windows-1251\"><p>caf\xe9</p>";
        assert!(decode_body(meta, None, None).ends_with("caf\u{439}</p>"));
        assert_eq!(decode_body(body, Some("windows-1252"), Some("charset=windows-1251")), "<p>caf\u{e9}</p>");
    }

    #[test]
    fn test_charset_label() {
        assert_eq!(charset_label("text/html; charset=GB2312").as_deref(), Some("GB2312"));
        assert_eq!(charset_label(r#"<meta charset="utf-8">"#).as_deref(), Some("utf-8"));
        assert_eq!(charset_label("text/html"), None);
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_empty_page() {
        let fetcher = HttpFetcher::new(None).unwrap();
        let mut request = PageRequest::get("http://127.0.0.1:9/torrents.php");
        request.timeout = Duration::from_secs(2);
        assert_eq!(fetcher.fetch(&request).await, "");
    }
}
