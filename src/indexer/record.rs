//! Torrent record produced per matched node

use serde::{Deserialize, Serialize};

use crate::site::MediaType;

/// One torrent scraped from a site page
///
/// Only the fields the site configuration declares are ever set; unset
/// fields are left out of the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TorrentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Detail page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,

    /// Download link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosure: Option<String>,

    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Leechers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seeders: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grabs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdbid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_elapsed: Option<String>,

    /// End of the free period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freedate: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloadvolumefactor: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploadvolumefactor: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_and_run: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<MediaType>,
}

macro_rules! fill {
    ($target:ident, $source:ident, $($field:ident),+) => {
        $(
            if $target.$field.is_none() {
                $target.$field = $source.$field.clone();
            }
        )+
    };
}

impl TorrentRecord {
    /// Copy every field `other` has and `self` lacks
    pub fn fill_missing_from(&mut self, other: &TorrentRecord) {
        fill!(
            self, other, id, title, description, page_url, enclosure, size, peers, seeders, grabs,
            imdbid, pubdate, date_elapsed, freedate, downloadvolumefactor, uploadvolumefactor,
            labels, hit_and_run, category
        );
    }

    /// Free-text fields, which may carry detail markers
    pub fn text_fields_mut(&mut self) -> [(&'static str, &mut Option<String>); 9] {
        [
            ("id", &mut self.id),
            ("title", &mut self.title),
            ("description", &mut self.description),
            ("page_url", &mut self.page_url),
            ("enclosure", &mut self.enclosure),
            ("imdbid", &mut self.imdbid),
            ("pubdate", &mut self.pubdate),
            ("date_elapsed", &mut self.date_elapsed),
            ("freedate", &mut self.freedate),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fields_are_not_serialized() {
        let record = TorrentRecord {
            title: Some("Show.S01E01".to_string()),
            size: Some(1024),
            ..Default::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["title"], "Show.S01E01");
        assert_eq!(object["size"], 1024);
    }

    #[test]
    fn test_fill_missing_keeps_own_values() {
        let mut detail = TorrentRecord {
            title: Some("detail".to_string()),
            ..Default::default()
        };
        let list = TorrentRecord {
            title: Some("list".to_string()),
            page_url: Some("https://example.com/d/1".to_string()),
            ..Default::default()
        };
        detail.fill_missing_from(&list);
        assert_eq!(detail.title.as_deref(), Some("detail"));
        assert_eq!(detail.page_url.as_deref(), Some("https://example.com/d/1"));
    }
}
