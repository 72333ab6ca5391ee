//! Configuration management module

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub indexer: IndexerSettings,

    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(skip)]
    config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSettings {
    /// Sent to sites that configure no user agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Proxy URL for sites flagged to use one
    #[serde(default)]
    pub proxy: Option<String>,

    /// Public base URL of this service, embedded in `crawl_page` links
    #[serde(default = "default_app_domain")]
    pub app_domain: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Result cap for sites that set none
    #[serde(default = "default_result_num")]
    pub result_num: usize,

    /// Directory of bundled JSON indexer definitions
    #[serde(default)]
    pub definitions_dir: Option<PathBuf>,

    /// TOML map of site netloc to category codes
    #[serde(default)]
    pub category_file: Option<PathBuf>,

    /// Random pause between followed links, `[min, max]` in milliseconds
    #[serde(default = "default_link_delay")]
    pub link_delay_ms: [u64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub headless: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/trawl.db")
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_app_domain() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_result_num() -> usize {
    100
}

fn default_link_delay() -> [u64; 2] {
    [1000, 10000]
}

fn default_true() -> bool {
    true
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            proxy: None,
            app_domain: default_app_domain(),
            timeout_secs: default_timeout_secs(),
            result_num: default_result_num(),
            definitions_dir: None,
            category_file: None,
            link_delay_ms: default_link_delay(),
        }
    }
}

impl IndexerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn link_delay(&self) -> (u64, u64) {
        let [min, max] = self.link_delay_ms;
        (min.min(max), max)
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            chrome_path: None,
            headless: true,
        }
    }
}

impl Settings {
    /// Load settings from environment and config file
    pub fn load() -> Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut config_paths = vec![
            PathBuf::from("config.toml"),
            PathBuf::from("./data/config.toml"),
        ];
        if let Some(path) = dirs_config_path() {
            config_paths.push(path);
        }

        let mut settings = Settings::default();

        for path in config_paths.iter() {
            if path.exists() {
                settings = Self::load_from_file(path)?;
                settings.config_file = Some(path.clone());
                break;
            }
        }

        settings.apply_env_overrides(|key| std::env::var(key).ok());

        if let Some(parent) = settings.database.path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create data directory")?;
        }

        Ok(settings)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(settings)
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("TRAWL_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("TRAWL_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(path) = var("TRAWL_DATA_DIR") {
            self.database.path = PathBuf::from(path).join("trawl.db");
        }
        if let Some(path) = var("TRAWL_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(proxy) = var("TRAWL_PROXY") {
            self.indexer.proxy = Some(proxy).filter(|p| !p.is_empty());
        }
        if let Some(ua) = var("TRAWL_USER_AGENT") {
            self.indexer.user_agent = ua;
        }
        if let Some(domain) = var("TRAWL_APP_DOMAIN") {
            self.indexer.app_domain = domain;
        }
        if let Some(dir) = var("TRAWL_DEFINITIONS_DIR") {
            self.indexer.definitions_dir = Some(PathBuf::from(dir));
        }
    }

    /// Get the path to the config file (if loaded from file)
    pub fn config_path(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }
}

/// Get platform-specific config directory
fn dirs_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
            .map(|p| p.join("trawl/config.toml"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/trawl/config.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("trawl/config.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
[server]
port = 8080

[indexer]
proxy = "socks5://127.0.0.1:1080"
link_delay_ms = [0, 0]
"#,
        )
        .unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.indexer.proxy.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(settings.indexer.link_delay(), (0, 0));
        assert_eq!(settings.indexer.result_num, 100);
        assert_eq!(settings.indexer.timeout(), Duration::from_secs(15));
        assert!(settings.browser.enabled);
        assert!(settings.browser.headless);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TRAWL_PORT", "9000"),
            ("TRAWL_DATA_DIR", "/srv/trawl"),
            ("TRAWL_PROXY", ""),
            ("TRAWL_APP_DOMAIN", "https://trawl.example.org"),
        ]
        .into_iter()
        .collect();
        let mut settings = Settings::default();
        settings.indexer.proxy = Some("http://old".to_string());
        settings.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.database.path, PathBuf::from("/srv/trawl/trawl.db"));
        assert!(settings.indexer.proxy.is_none());
        assert_eq!(settings.indexer.app_domain, "https://trawl.example.org");
    }
}
