//! Field selector sets and the per-field resolvers

use handlebars::Handlebars;
use regex::Regex;
use scraper::ElementRef;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, error, warn};

use super::filter::{apply_filters, FilterContext};
use super::record::TorrentRecord;
use super::selector::{CssSelector, SelectorSpec};
use super::{IndexerError, Result};
use crate::site::{CategoryConfig, MediaType, SiteCategoryHelper, SiteConfiguration};
use crate::utils::{format_size, parse_size, url_netloc};

/// Volume factor spec: a `case` table of selector → factor, or a plain selector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeFactorSpec {
    /// Checked in declaration order, first selector present wins
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_case",
        deserialize_with = "deserialize_case"
    )]
    pub case: Vec<(CssSelector, f64)>,

    #[serde(flatten)]
    pub spec: SelectorSpec,
}

fn serialize_case<S: Serializer>(case: &[(CssSelector, f64)], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(case.len()))?;
    for (selector, factor) in case {
        map.serialize_entry(selector.as_str(), factor)?;
    }
    map.end()
}

fn deserialize_case<'de, D>(deserializer: D) -> std::result::Result<Vec<(CssSelector, f64)>, D::Error>
where
    D: Deserializer<'de>,
{
    let table: indexmap::IndexMap<String, f64> = indexmap::IndexMap::deserialize(deserializer)?;
    table
        .into_iter()
        .map(|(source, factor)| {
            CssSelector::parse(&source)
                .map(|selector| (selector, factor))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

/// Selector specs by logical field
///
/// A field that is `None` is never resolved, so the record never carries it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldSelectorSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_default: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_optional: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_free_forever: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_normal: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seeders: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leechers: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grabs: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdbid: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_added: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_elapsed: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_date: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_and_run: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<SelectorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloadvolumefactor: Option<VolumeFactorSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploadvolumefactor: Option<VolumeFactorSpec>,
}

/// Decode one field spec, which may arrive as an object or as a JSON string
///
/// Blank, empty and malformed specs all come back as `None`.
fn decode_spec<T: for<'de> Deserialize<'de>>(name: &str, value: &Value) -> Option<T> {
    let value = match value {
        Value::String(s) if s.trim().is_empty() => return None,
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(e) => {
                warn!("Field {} is not valid JSON, dropped: {}", name, e);
                return None;
            }
        },
        Value::Null => return None,
        other => other.clone(),
    };
    if value.as_object().is_some_and(Map::is_empty) {
        return None;
    }
    match serde_json::from_value(value) {
        Ok(spec) => Some(spec),
        Err(e) => {
            warn!("Field {} has an invalid spec, dropped: {}", name, e);
            None
        }
    }
}

impl FieldSelectorSet {
    /// Build from a field-name → spec map, dropping specs that do not decode
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut set = Self::default();
        for (name, value) in map {
            match name.as_str() {
                "id" => set.id = decode_spec(name, value),
                "title" => set.title = decode_spec(name, value),
                "title_default" => set.title_default = decode_spec(name, value),
                "title_optional" => set.title_optional = decode_spec(name, value),
                "description" => set.description = decode_spec(name, value),
                "tags" => set.tags = decode_spec(name, value),
                "subject" => set.subject = decode_spec(name, value),
                "description_free_forever" => set.description_free_forever = decode_spec(name, value),
                "description_normal" => set.description_normal = decode_spec(name, value),
                "details" => set.details = decode_spec(name, value),
                "download" => set.download = decode_spec(name, value),
                "size" => set.size = decode_spec(name, value),
                "seeders" => set.seeders = decode_spec(name, value),
                "leechers" => set.leechers = decode_spec(name, value),
                "grabs" => set.grabs = decode_spec(name, value),
                "imdbid" => set.imdbid = decode_spec(name, value),
                "date_added" => set.date_added = decode_spec(name, value),
                "date_elapsed" => set.date_elapsed = decode_spec(name, value),
                "free_date" | "freedate" => set.free_date = decode_spec(name, value),
                "labels" => set.labels = decode_spec(name, value),
                "hit_and_run" | "hr" => set.hit_and_run = decode_spec(name, value),
                "category" => set.category = decode_spec(name, value),
                "downloadvolumefactor" => set.downloadvolumefactor = decode_spec(name, value),
                "uploadvolumefactor" => set.uploadvolumefactor = decode_spec(name, value),
                other => debug!("Ignoring unknown field {}", other),
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl<'de> Deserialize<'de> for FieldSelectorSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Object(map) => Self::from_map(&map),
            Value::String(s) => match serde_json::from_str::<Map<String, Value>>(&s) {
                Ok(map) => Self::from_map(&map),
                Err(_) => Self::default(),
            },
            _ => Self::default(),
        })
    }
}

type Resolve = fn(&FieldResolver<'_>, &FieldSelectorSet, ElementRef<'_>, &mut TorrentRecord) -> Result<()>;

/// Resolution order; each entry runs independently of the others
const RESOLVERS: &[(&str, Resolve)] = &[
    ("id", resolve_id),
    ("title", resolve_title),
    ("description", resolve_description),
    ("details", resolve_details),
    ("download", resolve_download),
    ("grabs", resolve_grabs),
    ("leechers", resolve_leechers),
    ("seeders", resolve_seeders),
    ("size", resolve_size),
    ("imdbid", resolve_imdbid),
    ("downloadvolumefactor", resolve_download_factor),
    ("uploadvolumefactor", resolve_upload_factor),
    ("date_added", resolve_pubdate),
    ("date_elapsed", resolve_date_elapsed),
    ("free_date", resolve_free_date),
    ("labels", resolve_labels),
    ("hit_and_run", resolve_hit_and_run),
    ("category", resolve_category),
];

/// Turns one matched node into a [`TorrentRecord`]
pub struct FieldResolver<'a> {
    site_name: &'a str,
    base_url: &'a str,
    domain: &'a str,
    category: Option<&'a CategoryConfig>,
    category_helper: Option<&'a SiteCategoryHelper>,
    filter_ctx: FilterContext<'a>,
    fallback_page_url: Option<&'a str>,
}

impl<'a> FieldResolver<'a> {
    pub fn new(site: &'a SiteConfiguration, filter_ctx: FilterContext<'a>) -> Self {
        Self {
            site_name: &site.name,
            base_url: &site.url,
            domain: &site.domain,
            category: site.category.as_ref(),
            category_helper: None,
            filter_ctx,
            fallback_page_url: None,
        }
    }

    /// Classifier consulted when the site's own category tables do not match
    pub fn with_category_helper(mut self, helper: Option<&'a SiteCategoryHelper>) -> Self {
        self.category_helper = helper;
        self
    }

    /// Page URL used when the field set has no `details` spec
    pub fn with_page_url(mut self, page_url: Option<&'a str>) -> Self {
        self.fallback_page_url = page_url;
        self
    }

    /// Resolve every declared field of `fields` against `node`
    ///
    /// A failing resolver is logged and leaves its field unset.
    pub fn resolve(&self, fields: &FieldSelectorSet, node: ElementRef<'_>) -> TorrentRecord {
        let mut record = TorrentRecord::default();
        for (name, resolve) in RESOLVERS {
            if let Err(e) = resolve(self, fields, node, &mut record) {
                error!("{} field {} failed: {}", self.site_name, name, e);
            }
        }
        debug!("Resolved torrent: {:?}", record);
        record
    }

    fn filters(&self, text: &str, spec: &SelectorSpec) -> Result<String> {
        apply_filters(text, &spec.filters, &self.filter_ctx)
    }

    /// Extract, then filter when something was extracted
    fn text(&self, spec: &SelectorSpec, node: ElementRef<'_>) -> Result<Option<String>> {
        match spec.extract(node) {
            Some(raw) => self.filters(&raw, spec).map(Some),
            None => Ok(None),
        }
    }

    /// Render `template` over the named sub-field extractions
    fn compose(&self, template: &str, parts: &[(&str, &Option<SelectorSpec>)], node: ElementRef<'_>) -> Result<String> {
        let mut values = Map::new();
        for (name, spec) in parts {
            if let Some(spec) = spec {
                let value = spec.extract(node).map(Value::String).unwrap_or(Value::Null);
                values.insert(name.to_string(), value);
            }
        }
        let mut engine = Handlebars::new();
        engine.register_escape_fn(handlebars::no_escape);
        engine
            .render_template(template, &serde_json::json!({ "fields": values }))
            .map_err(|e| IndexerError::Template(e.to_string()))
    }

    /// Title or description: direct selector first, template second
    fn composite(
        &self,
        spec: &SelectorSpec,
        parts: &[(&str, &Option<SelectorSpec>)],
        node: ElementRef<'_>,
    ) -> Result<Option<String>> {
        let raw = if spec.selector.is_some() {
            spec.extract(node)
        } else if let Some(template) = &spec.text {
            Some(self.compose(template, parts, node)?)
        } else {
            None
        };
        match raw {
            Some(raw) => self.filters(&raw, spec).map(Some),
            None => Ok(None),
        }
    }

    /// Make a detail link absolute against the site base
    pub(crate) fn absolute_link(&self, link: &str) -> String {
        absolute_link(self.base_url, link)
    }

    /// Make a download link absolute, honouring links that embed the site domain
    fn download_link(&self, link: &str) -> String {
        if link.starts_with("http") || link.starts_with("magnet") || link.starts_with("//") {
            return absolute_link(self.base_url, link);
        }
        let (scheme, domain) = url_netloc(self.domain);
        if !domain.is_empty() && link.contains(&domain) {
            if link.starts_with('/') {
                format!("{}:{}", scheme, link)
            } else {
                format!("{}://{}", scheme, link)
            }
        } else {
            absolute_link(self.base_url, link)
        }
    }

    /// Count fields: the part before `/`, commas dropped, 0 unless all digits
    fn count(&self, spec: &SelectorSpec, node: ElementRef<'_>) -> Result<u64> {
        let Some(raw) = spec.extract(node) else {
            return Ok(0);
        };
        let head = raw.split('/').next().unwrap_or_default().replace(',', "");
        let value = self.filters(&head, spec)?;
        if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
            Ok(value.parse().unwrap_or(0))
        } else {
            Ok(0)
        }
    }

    fn volume_factor(&self, spec: &VolumeFactorSpec, node: ElementRef<'_>) -> f64 {
        if !spec.case.is_empty() {
            return spec
                .case
                .iter()
                .find(|(selector, _)| selector.matches_within(node))
                .map(|(_, factor)| *factor)
                .unwrap_or(1.0);
        }
        static NUMBER: OnceLock<Regex> = OnceLock::new();
        let number = NUMBER.get_or_init(|| Regex::new(r"(\d+\.?\d*)").expect("valid number pattern"));
        spec.spec
            .extract(node)
            .and_then(|text| number.captures(&text).and_then(|c| c[1].parse().ok()))
            .unwrap_or(1.0)
    }

    /// Map a raw category code onto a media type
    pub(crate) fn classify(&self, value: &str) -> MediaType {
        if value.is_empty() {
            return MediaType::Unknown;
        }
        if let Some(category) = self.category {
            let in_tv = category.tv.iter().any(|c| c.id == value);
            let in_movie = category.movie.iter().any(|c| c.id == value);
            if in_tv && !in_movie {
                return MediaType::Tv;
            }
            if in_movie {
                return MediaType::Movie;
            }
        }
        self.category_helper
            .map(|helper| helper.get_media_type(self.domain, value))
            .unwrap_or(MediaType::Unknown)
    }
}

/// Resolve `link` against `base_url` (which ends with `/`)
pub(crate) fn absolute_link(base_url: &str, link: &str) -> String {
    if link.starts_with("http") || link.starts_with("magnet") {
        link.to_string()
    } else if link.starts_with("//") {
        let scheme = base_url.split(':').next().unwrap_or("http");
        format!("{}:{}", scheme, link)
    } else if let Some(rest) = link.strip_prefix('/') {
        format!("{}{}", base_url, rest)
    } else {
        format!("{}{}", base_url, link)
    }
}

fn resolve_id(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    if let Some(spec) = &f.id {
        rec.id = r.text(spec, node)?;
    }
    Ok(())
}

fn resolve_title(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    if let Some(spec) = &f.title {
        let parts = [("title_default", &f.title_default), ("title_optional", &f.title_optional)];
        rec.title = r.composite(spec, &parts, node)?;
    }
    Ok(())
}

fn resolve_description(
    r: &FieldResolver<'_>,
    f: &FieldSelectorSet,
    node: ElementRef<'_>,
    rec: &mut TorrentRecord,
) -> Result<()> {
    if let Some(spec) = &f.description {
        let parts = [
            ("tags", &f.tags),
            ("subject", &f.subject),
            ("description_free_forever", &f.description_free_forever),
            ("description_normal", &f.description_normal),
        ];
        rec.description = r.composite(spec, &parts, node)?;
    }
    Ok(())
}

fn resolve_details(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    match &f.details {
        Some(spec) => {
            if let Some(link) = r.text(spec, node)?.filter(|l| !l.is_empty()) {
                rec.page_url = Some(r.absolute_link(&link));
            }
        }
        None => rec.page_url = r.fallback_page_url.map(str::to_string),
    }
    Ok(())
}

fn resolve_download(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    let Some(spec) = &f.download else {
        return Ok(());
    };
    if let Some(link) = r.text(spec, node)?.filter(|l| !l.is_empty()) {
        let absolute = r.download_link(&link);
        rec.enclosure = Some(apply_filters(&absolute, &spec.sp_filters, &r.filter_ctx)?);
    }
    Ok(())
}

fn resolve_grabs(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    if let Some(spec) = &f.grabs {
        rec.grabs = Some(r.count(spec, node)?);
    }
    Ok(())
}

fn resolve_leechers(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    if let Some(spec) = &f.leechers {
        rec.peers = Some(r.count(spec, node)?);
    }
    Ok(())
}

fn resolve_seeders(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    if let Some(spec) = &f.seeders {
        rec.seeders = Some(r.count(spec, node)?);
    }
    Ok(())
}

fn resolve_size(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    let Some(spec) = &f.size else {
        return Ok(());
    };
    let size = match spec.extract(node).filter(|s| !s.is_empty()) {
        Some(raw) => parse_size(&r.filters(raw.replace('\n', "").trim(), spec)?),
        None => 0,
    };
    debug!("Size {}", format_size(size));
    rec.size = Some(size);
    Ok(())
}

fn resolve_imdbid(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    if let Some(spec) = &f.imdbid {
        rec.imdbid = r.text(spec, node)?;
    }
    Ok(())
}

fn resolve_download_factor(
    r: &FieldResolver<'_>,
    f: &FieldSelectorSet,
    node: ElementRef<'_>,
    rec: &mut TorrentRecord,
) -> Result<()> {
    if let Some(spec) = &f.downloadvolumefactor {
        rec.downloadvolumefactor = Some(r.volume_factor(spec, node));
    }
    Ok(())
}

fn resolve_upload_factor(
    r: &FieldResolver<'_>,
    f: &FieldSelectorSet,
    node: ElementRef<'_>,
    rec: &mut TorrentRecord,
) -> Result<()> {
    if let Some(spec) = &f.uploadvolumefactor {
        rec.uploadvolumefactor = Some(r.volume_factor(spec, node));
    }
    Ok(())
}

fn resolve_pubdate(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    let Some(spec) = &f.date_added else {
        return Ok(());
    };
    if let Some(raw) = spec.extract(node) {
        rec.pubdate = Some(r.filters(raw.replace('\n', " ").trim(), spec)?);
    }
    Ok(())
}

fn resolve_date_elapsed(
    r: &FieldResolver<'_>,
    f: &FieldSelectorSet,
    node: ElementRef<'_>,
    rec: &mut TorrentRecord,
) -> Result<()> {
    if let Some(spec) = &f.date_elapsed {
        rec.date_elapsed = r.text(spec, node)?;
    }
    Ok(())
}

fn resolve_free_date(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    if let Some(spec) = &f.free_date {
        rec.freedate = r.text(spec, node)?;
    }
    Ok(())
}

fn resolve_labels(_: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    if let Some(spec) = &f.labels {
        let labels = spec.extract_all(node).into_iter().filter(|l| !l.is_empty()).collect();
        rec.labels = Some(labels);
    }
    Ok(())
}

fn resolve_hit_and_run(
    _: &FieldResolver<'_>,
    f: &FieldSelectorSet,
    node: ElementRef<'_>,
    rec: &mut TorrentRecord,
) -> Result<()> {
    if let Some(spec) = &f.hit_and_run {
        rec.hit_and_run = Some(!spec.select(node).is_empty());
    }
    Ok(())
}

fn resolve_category(r: &FieldResolver<'_>, f: &FieldSelectorSet, node: ElementRef<'_>, rec: &mut TorrentRecord) -> Result<()> {
    if let Some(spec) = &f.category {
        let value = r.text(spec, node)?.unwrap_or_default();
        rec.category = Some(r.classify(&value));
    }
    Ok(())
}
