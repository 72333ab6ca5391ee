//! Bundled indexer definitions
//!
//! A definitions directory holds JSON files, each with one definition object
//! or an array of them. Definitions are keyed by the netloc of their
//! `domain` (or `url`) and take precedence over database-derived config.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::ConfigError;
use crate::utils::url_domain;

#[derive(Debug, Clone, Default)]
pub struct IndexerDefinitions {
    by_domain: HashMap<String, Value>,
}

impl IndexerDefinitions {
    /// Load every `*.json` file under `dir`; unreadable files are skipped
    pub fn load_dir(dir: &Path) -> Self {
        let mut definitions = Self::default();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Indexer definitions directory {} not readable: {}", dir.display(), e);
                return definitions;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Err(e) = definitions.load_file(&path) {
                warn!("Skipping indexer definition {}: {}", path.display(), e);
            }
        }
        info!("Loaded {} indexer definitions", definitions.len());
        definitions
    }

    fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.add_json(&content)
    }

    /// Add definitions from JSON text
    pub fn add_json(&mut self, content: &str) -> Result<(), ConfigError> {
        match serde_json::from_str::<Value>(content)? {
            Value::Array(items) => items.into_iter().for_each(|item| self.insert(item)),
            item => self.insert(item),
        }
        Ok(())
    }

    fn insert(&mut self, definition: Value) {
        let domain = ["domain", "url"]
            .iter()
            .filter_map(|key| definition.get(*key).and_then(Value::as_str))
            .map(url_domain)
            .find(|d| !d.is_empty());
        match domain {
            Some(domain) => {
                debug!("Indexer definition for {}", domain);
                self.by_domain.insert(domain, definition);
            }
            None => warn!("Indexer definition without domain skipped"),
        }
    }

    /// Definition for the site at `domain` (a URL or bare host)
    pub fn get(&self, domain: &str) -> Option<&Value> {
        self.by_domain.get(&url_domain(domain))
    }

    pub fn len(&self) -> usize {
        self.by_domain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_domain.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_by_netloc() {
        let mut definitions = IndexerDefinitions::default();
        definitions
            .add_json(r#"[{"name": "A", "domain": "https://a.example.org/"}, {"name": "B", "url": "http://b.org:8080"}]"#)
            .unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions.get("a.example.org").unwrap()["name"], "A");
        assert_eq!(definitions.get("https://a.example.org/torrents.php").unwrap()["name"], "A");
        assert_eq!(definitions.get("b.org:8080").unwrap()["name"], "B");
        assert!(definitions.get("c.org").is_none());
    }

    #[test]
    fn test_malformed_json_rejected() {
        let mut definitions = IndexerDefinitions::default();
        assert!(definitions.add_json("{broken").is_err());
        assert!(definitions.is_empty());
    }
}
