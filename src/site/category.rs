//! Per-domain category map used as a fallback classifier

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use super::{ConfigError, MediaType};
use crate::utils::url_netloc;

/// Category names or codes for one site, by media type
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct SiteCategories {
    movie: Vec<String>,
    tv: Vec<String>,
    anime: Vec<String>,
    game: Vec<String>,
    music: Vec<String>,
    jav: Vec<String>,
    comic: Vec<String>,
}

impl SiteCategories {
    fn classify(&self, category: &str) -> MediaType {
        let tables = [
            (&self.movie, MediaType::Movie),
            (&self.tv, MediaType::Tv),
            (&self.anime, MediaType::Anime),
            (&self.game, MediaType::Game),
            (&self.music, MediaType::Music),
            (&self.jav, MediaType::Jav),
            (&self.comic, MediaType::Comic),
        ];
        tables
            .into_iter()
            .find(|(table, _)| table.iter().any(|c| c == category))
            .map(|(_, mtype)| mtype)
            .unwrap_or(MediaType::Unknown)
    }
}

/// Site netloc → category tables, loaded from a TOML file
///
/// ```toml
/// ["pt.example.org"]
/// movie = ["401", "Movies"]
/// tv = ["402"]
/// ```
#[derive(Debug, Clone, Default)]
pub struct SiteCategoryHelper {
    sites: HashMap<String, SiteCategories>,
}

impl SiteCategoryHelper {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let sites: HashMap<String, SiteCategories> = toml::from_str(content)?;
        Ok(Self { sites })
    }

    /// Load the map, or an empty one when the file is missing or broken
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Site category map {} not loaded: {}", path.display(), e);
                return Self::default();
            }
        };
        match Self::from_toml(&content) {
            Ok(helper) => {
                info!("Loaded site category map for {} sites", helper.sites.len());
                helper
            }
            Err(e) => {
                warn!("Site category map {} is malformed: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Media type of `category` on the site at `domain`
    pub fn get_media_type(&self, domain: &str, category: &str) -> MediaType {
        if category.is_empty() {
            return MediaType::Unknown;
        }
        let (_, netloc) = url_netloc(domain);
        self.sites
            .get(&netloc)
            .map(|site| site.classify(category))
            .unwrap_or(MediaType::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: &str = r#"
["pt.example.org"]
movie = ["401"]
tv = ["402"]
anime = ["405"]

["other.org"]
music = ["Music"]
"#;

    #[test]
    fn test_classify_by_netloc() {
        let helper = SiteCategoryHelper::from_toml(MAP).unwrap();
        assert_eq!(helper.get_media_type("https://pt.example.org/", "401"), MediaType::Movie);
        assert_eq!(helper.get_media_type("pt.example.org", "405"), MediaType::Anime);
        assert_eq!(helper.get_media_type("http://other.org", "Music"), MediaType::Music);
        assert_eq!(helper.get_media_type("https://pt.example.org/", "999"), MediaType::Unknown);
        assert_eq!(helper.get_media_type("https://unknown.org/", "401"), MediaType::Unknown);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let helper = SiteCategoryHelper::load(Path::new("/nonexistent/categories.toml"));
        assert_eq!(helper.get_media_type("pt.example.org", "401"), MediaType::Unknown);
    }
}
