//! Read access to persisted sites

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row};
use serde_json::Value;

use super::Database;
use crate::site::SiteRecord;
use crate::utils::url_domain;

const SITE_COLUMNS: &str = "id, name, domain, url, pri, rss, cookie, ua, apikey, token, proxy, filter, \
     render, public, note, limit_interval, limit_count, limit_seconds, timeout, is_active, \
     lst_mod_date, downloader, types, browse, browse_method, browse_config, search, \
     search_method, search_config";

/// Stored types: a JSON array, or comma separated text
fn parse_types(raw: Option<String>) -> Vec<String> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(types) => types,
        Err(_) => raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// Layout blobs stay text; the adapter decodes them
fn layout_text(raw: Option<String>) -> Value {
    raw.map(Value::String).unwrap_or(Value::Null)
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<SiteRecord> {
    Ok(SiteRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        domain: row.get(2)?,
        url: row.get(3)?,
        pri: row.get(4)?,
        rss: row.get(5)?,
        cookie: row.get(6)?,
        ua: row.get(7)?,
        apikey: row.get(8)?,
        token: row.get(9)?,
        proxy: row.get::<_, i32>(10)? != 0,
        filter: row.get(11)?,
        render: row.get::<_, i32>(12)? != 0,
        public: row.get::<_, i32>(13)? != 0,
        note: row.get(14)?,
        limit_interval: row.get(15)?,
        limit_count: row.get(16)?,
        limit_seconds: row.get(17)?,
        timeout: row.get(18)?,
        is_active: row.get::<_, i32>(19)? != 0,
        lst_mod_date: row.get(20)?,
        downloader: row.get(21)?,
        types: parse_types(row.get(22)?),
        browse: row.get(23)?,
        browse_method: row.get(24)?,
        browse_config: layout_text(row.get(25)?),
        search: row.get(26)?,
        search_method: row.get(27)?,
        search_config: layout_text(row.get(28)?),
    })
}

/// Site lookups
#[derive(Clone)]
pub struct SiteRepository {
    db: Database,
}

impl SiteRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn get_by_id(&self, id: i64) -> Result<Option<SiteRecord>> {
        let conn = self.db.conn();
        conn.query_row(
            &format!("SELECT {} FROM sites WHERE id = ?1", SITE_COLUMNS),
            [id],
            site_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to load site {}", id))
    }

    /// Site whose domain has the same netloc as `domain` (a URL or bare host)
    pub fn get_by_domain(&self, domain: &str) -> Result<Option<SiteRecord>> {
        let wanted = url_domain(domain);
        Ok(self.list_all()?.into_iter().find(|site| url_domain(&site.domain) == wanted))
    }

    /// Active sites, highest priority (lowest `pri`) first
    pub fn list_active(&self) -> Result<Vec<SiteRecord>> {
        self.query(&format!(
            "SELECT {} FROM sites WHERE is_active = 1 ORDER BY pri, id",
            SITE_COLUMNS
        ))
    }

    pub fn list_all(&self) -> Result<Vec<SiteRecord>> {
        self.query(&format!("SELECT {} FROM sites ORDER BY pri, id", SITE_COLUMNS))
    }

    fn query(&self, sql: &str) -> Result<Vec<SiteRecord>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(sql)?;
        let sites = stmt
            .query_map([], site_from_row)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to load sites")?;
        Ok(sites)
    }

    #[cfg(test)]
    pub fn insert(&self, site: &SiteRecord) -> Result<i64> {
        let blob = |value: &Value| match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        };
        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO sites (name, domain, url, pri, rss, cookie, ua, proxy, render, public, timeout, \
             is_active, types, browse, browse_method, browse_config, search, search_method, search_config) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            rusqlite::params![
                site.name,
                site.domain,
                site.url,
                site.pri,
                site.rss,
                site.cookie,
                site.ua,
                site.proxy,
                site.render,
                site.public,
                site.timeout,
                site.is_active,
                serde_json::to_string(&site.types)?,
                site.browse,
                site.browse_method,
                blob(&site.browse_config),
                site.search,
                site.search_method,
                blob(&site.search_config),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}
